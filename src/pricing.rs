// Pricing
// Revalidated fare checks, per-passenger fare allocation and the aggregate price of a run

use crate::config::PricingConfig;
use crate::model::{Fare, FareBreakdown, PassengerFare, PassengerManifest, PassengerType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("Currency mismatch: expected {expected}, upstream quoted {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("Negative fare component in quote: base {base}, tax {tax}")]
    NegativeFare { base: Decimal, tax: Decimal },

    #[error("Quote has no fare breakdown for {0:?} passengers")]
    MissingBreakdown(PassengerType),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChange {
    pub quoted: Decimal,
    pub revalidated: Decimal,
}

impl PriceChange {
    pub fn delta(&self) -> Decimal {
        self.revalidated - self.quoted
    }
}

/// Compares the revalidated fare against the one the leg was selected with.
///
/// A currency other than the configured one, or a negative component, is an error.
/// A total moving by more than the configured tolerance is returned as a
/// [`PriceChange`] for the caller to record; it never fails the check.
pub fn validate_fare(
    quoted: &Fare,
    revalidated: &Fare,
    config: &PricingConfig,
) -> Result<Option<PriceChange>, PricingError> {
    if !revalidated.currency.eq_ignore_ascii_case(&config.currency) {
        return Err(PricingError::CurrencyMismatch {
            expected: config.currency.clone(),
            actual: revalidated.currency.clone(),
        });
    }
    if revalidated.base < Decimal::ZERO || revalidated.tax < Decimal::ZERO {
        return Err(PricingError::NegativeFare {
            base: revalidated.base,
            tax: revalidated.tax,
        });
    }

    let change = PriceChange {
        quoted: quoted.total(),
        revalidated: revalidated.total(),
    };
    if change.delta().abs() > config.price_change_tolerance {
        Ok(Some(change))
    } else {
        Ok(None)
    }
}

/// Splits each passenger-type breakdown evenly across the passengers of that type,
/// in manifest order.
pub fn allocate_passenger_fares(
    manifest: &PassengerManifest,
    breakdown: &[FareBreakdown],
) -> Result<Vec<PassengerFare>, PricingError> {
    manifest
        .passengers
        .iter()
        .map(|passenger| {
            let entry = breakdown
                .iter()
                .find(|b| b.passenger_type == passenger.passenger_type && b.count > 0)
                .ok_or(PricingError::MissingBreakdown(passenger.passenger_type))?;
            let count = Decimal::from(entry.count);
            Ok(PassengerFare {
                base: (entry.base / count).round_dp(2),
                tax: (entry.tax / count).round_dp(2),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFare {
    pub leg_index: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub currency: String,
    pub leg_fares: Vec<LegFare>,
    pub ancillary_total: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
}

// Pure: the same ticketed fares always produce the same total. The platform fee is
// charged once per run and only when something was actually ticketed.
pub fn assemble_price(
    currency: &str,
    ticketed_fares: &[(usize, Decimal)],
    ancillary_total: Decimal,
    platform_fee: Decimal,
) -> PriceBreakdown {
    let leg_fares: Vec<LegFare> = ticketed_fares
        .iter()
        .map(|(leg_index, amount)| LegFare {
            leg_index: *leg_index,
            amount: *amount,
        })
        .collect();

    let platform_fee = if leg_fares.is_empty() {
        Decimal::ZERO
    } else {
        platform_fee
    };
    let fares: Decimal = leg_fares.iter().map(|f| f.amount).sum();

    PriceBreakdown {
        currency: currency.to_string(),
        leg_fares,
        ancillary_total,
        platform_fee,
        total: fares + ancillary_total + platform_fee,
    }
}

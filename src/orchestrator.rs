// Booking orchestrator
// Runs every leg of an itinerary, then aggregates tickets, failures and the payable price

use crate::ancillary::AncillarySelection;
use crate::client::BookingApi;
use crate::config::{EngineConfig, LegScheduling, OrchestrationConfig, PricingConfig};
use crate::leg::{FailureReason, LegFailure, LegOutcome, LegProcessor, LegStage};
use crate::matcher::SessionRefreshMatcher;
use crate::model::{Itinerary, PassengerManifest};
use crate::pricing::{assemble_price, PriceBreakdown};
use crate::retry::{RetryPolicy, RetryingExecutor, Sleeper, TokioSleeper};
use futures::stream::{FuturesUnordered, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Success,
    PartialFailure,
    Failure,
}

impl BookingStatus {
    fn from_outcomes(outcomes: &[LegOutcome]) -> Self {
        let ticketed = outcomes.iter().filter(|o| o.is_success()).count();
        if ticketed == 0 {
            BookingStatus::Failure
        } else if ticketed == outcomes.len() {
            BookingStatus::Success
        } else {
            BookingStatus::PartialFailure
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingOutcome {
    pub leg_outcomes: Vec<LegOutcome>,
    pub price: PriceBreakdown,
    pub status: BookingStatus,
}

impl BookingOutcome {
    fn from_outcomes(leg_outcomes: Vec<LegOutcome>, pricing: &PricingConfig) -> Self {
        let ticketed_fares: Vec<(usize, Decimal)> = leg_outcomes
            .iter()
            .filter_map(LegOutcome::confirmation)
            .map(|c| (c.leg_index, c.fare.total()))
            .collect();
        let ancillary_total: Decimal = leg_outcomes
            .iter()
            .filter_map(LegOutcome::confirmation)
            .map(|c| c.ancillary_total)
            .sum();

        let price = assemble_price(
            &pricing.currency,
            &ticketed_fares,
            ancillary_total,
            pricing.platform_fee,
        );
        let status = BookingStatus::from_outcomes(&leg_outcomes);

        Self {
            leg_outcomes,
            price,
            status,
        }
    }

    pub fn aggregate_price(&self) -> Decimal {
        self.price.total
    }

    pub fn pnrs(&self) -> Vec<&str> {
        self.leg_outcomes
            .iter()
            .filter_map(LegOutcome::confirmation)
            .map(|c| c.pnr.as_str())
            .collect()
    }

    pub fn ticket_numbers(&self) -> Vec<&str> {
        self.leg_outcomes
            .iter()
            .filter_map(LegOutcome::confirmation)
            .flat_map(|c| c.ticket_numbers.iter().map(String::as_str))
            .collect()
    }

    pub fn failed_legs(&self) -> Vec<&LegFailure> {
        self.leg_outcomes.iter().filter_map(LegOutcome::failure).collect()
    }
}

pub struct BookingOrchestrator {
    processor: LegProcessor,
    pricing: PricingConfig,
    orchestration: OrchestrationConfig,
}

impl BookingOrchestrator {
    pub fn new(api: Arc<dyn BookingApi>, config: &EngineConfig) -> Self {
        Self::with_sleeper(api, config, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        api: Arc<dyn BookingApi>,
        config: &EngineConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let executor = RetryingExecutor::new(
            SessionRefreshMatcher::new(api.clone()),
            sleeper,
            RetryPolicy::from(&config.retry),
        );
        Self {
            processor: LegProcessor::new(api, executor, config.pricing.clone()),
            pricing: config.pricing.clone(),
            orchestration: config.orchestration.clone(),
        }
    }

    /// Books every leg of `itinerary`. Legs are independent upstream
    /// transactions, so a failed leg never undoes a ticketed one; the outcome
    /// reports each leg separately, in itinerary order.
    pub async fn run(
        &self,
        itinerary: &Itinerary,
        manifest: &PassengerManifest,
        ancillaries: &[AncillarySelection],
    ) -> BookingOutcome {
        let span = info_span!("booking", legs = itinerary.legs().len(), kind = ?itinerary.kind());
        async move {
            if let Err(e) = manifest.validate(itinerary.search_context()) {
                error!(error = %e, "passenger manifest rejected");
                let outcomes = (0..itinerary.legs().len())
                    .map(|index| {
                        LegOutcome::Failed(LegFailure::new(
                            index,
                            LegStage::Validate,
                            FailureReason::Validation,
                            e.to_string(),
                        ))
                    })
                    .collect();
                return BookingOutcome::from_outcomes(outcomes, &self.pricing);
            }

            let mut completed = Vec::new();
            let finished = match self.orchestration.deadline() {
                None => {
                    self.process_legs(itinerary, manifest, ancillaries, &mut completed).await;
                    true
                }
                Some(deadline) => tokio::time::timeout(
                    deadline,
                    self.process_legs(itinerary, manifest, ancillaries, &mut completed),
                )
                .await
                .is_ok(),
            };
            let outcomes = if finished {
                completed
            } else {
                let deadline_ms = self.orchestration.deadline_ms.unwrap_or_default();
                deadline_outcomes(itinerary.legs().len(), deadline_ms, &completed)
            };

            let outcome = BookingOutcome::from_outcomes(outcomes, &self.pricing);
            info!(
                status = ?outcome.status,
                total = %outcome.price.total,
                pnrs = ?outcome.pnrs(),
                "booking finished"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    // Finished outcomes are pushed to `completed` as they arrive so a deadline
    // can still report what was ticketed before it fired
    async fn process_legs(
        &self,
        itinerary: &Itinerary,
        manifest: &PassengerManifest,
        ancillaries: &[AncillarySelection],
        completed: &mut Vec<LegOutcome>,
    ) {
        let context = itinerary.search_context();
        let empty = AncillarySelection::default();
        let selection_for = |index: usize| ancillaries.get(index).unwrap_or(&empty);

        match self.orchestration.scheduling {
            LegScheduling::Sequential => {
                for (index, leg) in itinerary.legs().iter().enumerate() {
                    let outcome = self
                        .processor
                        .process(index, leg, context, manifest, selection_for(index))
                        .await;
                    completed.push(outcome);
                }
            }
            LegScheduling::Concurrent => {
                let mut pending: FuturesUnordered<_> = itinerary
                    .legs()
                    .iter()
                    .enumerate()
                    .map(|(index, leg)| {
                        self.processor
                            .process(index, leg, context, manifest, selection_for(index))
                    })
                    .collect();
                while let Some(outcome) = pending.next().await {
                    completed.push(outcome);
                }
                completed.sort_by_key(LegOutcome::leg_index);
            }
        }
    }
}

fn deadline_outcomes(legs: usize, deadline_ms: u64, completed: &[LegOutcome]) -> Vec<LegOutcome> {
    let pnrs: Vec<&str> = completed
        .iter()
        .filter_map(LegOutcome::confirmation)
        .map(|c| c.pnr.as_str())
        .collect();
    let message = if pnrs.is_empty() {
        format!("booking did not finish within {}ms", deadline_ms)
    } else {
        format!(
            "booking did not finish within {}ms; PNRs issued before the deadline: {}",
            deadline_ms,
            pnrs.join(", ")
        )
    };
    warn!(deadline_ms, completed = completed.len(), "booking deadline exceeded");

    (0..legs)
        .map(|index| {
            LegOutcome::Failed(LegFailure::new(
                index,
                LegStage::Deadline,
                FailureReason::Deadline,
                message.clone(),
            ))
        })
        .collect()
}

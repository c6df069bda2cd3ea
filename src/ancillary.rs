// Ancillary services
// Per-leg baggage, meal, seat and other paid add-ons, and their additive total

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncillaryKind {
    Baggage,
    Meal,
    Seat,
    Option,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncillaryItem {
    pub kind: AncillaryKind,
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub passenger_index: usize,
    #[serde(default)]
    pub segment_index: usize,
}

// Baggage, meals and seats occupy one slot per passenger and segment, so picking a
// seat twice (from the seat map and from a generic option list) replaces rather than
// adds. Generic options are keyed by code in their own namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SelectionKey {
    Slot {
        kind: AncillaryKind,
        passenger_index: usize,
        segment_index: usize,
    },
    Option {
        passenger_index: usize,
        code: String,
    },
}

impl std::fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionKey::Slot {
                kind,
                passenger_index,
                segment_index,
            } => write!(f, "{:?}:{}:{}", kind, segment_index, passenger_index),
            SelectionKey::Option { passenger_index, code } => {
                write!(f, "Option:{}:{}", passenger_index, code)
            }
        }
    }
}

impl AncillaryItem {
    pub fn key(&self) -> SelectionKey {
        match self.kind {
            AncillaryKind::Option => SelectionKey::Option {
                passenger_index: self.passenger_index,
                code: self.code.clone(),
            },
            kind => SelectionKey::Slot {
                kind,
                passenger_index: self.passenger_index,
                segment_index: self.segment_index,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AncillaryItem>", into = "Vec<AncillaryItem>")]
pub struct AncillarySelection {
    items: BTreeMap<SelectionKey, AncillaryItem>,
}

impl AncillarySelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects an item, returning whatever previously occupied its slot.
    pub fn select(&mut self, item: AncillaryItem) -> Option<AncillaryItem> {
        self.items.insert(item.key(), item)
    }

    pub fn items(&self) -> impl Iterator<Item = &AncillaryItem> {
        self.items.values()
    }

    pub fn for_passenger(&self, passenger_index: usize) -> Vec<AncillaryItem> {
        self.items()
            .filter(|item| item.passenger_index == passenger_index)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<AncillaryItem>> for AncillarySelection {
    fn from(items: Vec<AncillaryItem>) -> Self {
        let mut selection = AncillarySelection::new();
        for item in items {
            selection.select(item);
        }
        selection
    }
}

impl From<AncillarySelection> for Vec<AncillaryItem> {
    fn from(selection: AncillarySelection) -> Self {
        selection.items.into_values().collect()
    }
}

pub struct AncillaryAggregator;

impl AncillaryAggregator {
    // "No baggage" / "no meal" entries carry a zero price and are summed as such.
    // A negative price is never a discount: it is logged and left out.
    pub fn leg_total(selection: &AncillarySelection) -> Decimal {
        selection
            .items
            .iter()
            .filter_map(|(key, item)| {
                if item.price < Decimal::ZERO {
                    warn!(key = %key, price = %item.price, "ignoring negative ancillary price");
                    None
                } else {
                    Some(item.price)
                }
            })
            .sum()
    }

    pub fn total(selections: &[AncillarySelection]) -> Decimal {
        selections.iter().map(Self::leg_total).sum()
    }
}

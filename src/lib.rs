// Main library file for the flight booking engine

// Booking pipeline, innermost first
pub mod model;
pub mod supplier;
pub mod client;
pub mod matcher;
pub mod retry;
pub mod ancillary;
pub mod pricing;
pub mod leg;
pub mod orchestrator;

pub mod config;
pub mod logging;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience
pub use ancillary::{AncillaryAggregator, AncillaryItem, AncillaryKind, AncillarySelection};
pub use client::{ApiError, BookingApi, ClientStats, HttpBookingApi};
pub use config::{ConfigError, EngineConfig, LegScheduling};
pub use leg::{FailureReason, LegConfirmation, LegFailure, LegOutcome, LegStage};
pub use matcher::{score_candidate, select_best, MatchError, SessionRefreshMatcher};
pub use model::{
    Candidate, Itinerary, ItineraryError, ItineraryKind, Leg, Passenger, PassengerManifest,
    SearchContext,
};
pub use orchestrator::{BookingOrchestrator, BookingOutcome, BookingStatus};
pub use pricing::{PriceBreakdown, PricingError};
pub use retry::{ExecutionError, RetryPolicy, RetryingExecutor};

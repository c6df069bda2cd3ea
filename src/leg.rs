// Leg processor
// Revalidate, reserve (non-LCC only) and ticket one leg, each stage through the retrying executor

use crate::ancillary::{AncillaryAggregator, AncillarySelection};
use crate::client::{
    BookingApi, FareQuote, IssuedTicket, Reservation, TicketPassenger, TicketRequest,
};
use crate::config::PricingConfig;
use crate::model::{Fare, Leg, PassengerManifest, SearchContext, Session};
use crate::pricing::{allocate_passenger_fares, validate_fare, PriceChange};
use crate::retry::{ExecutionError, RetryingExecutor};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStage {
    Validate,
    Revalidate,
    Reserve,
    Ticket,
    Deadline,
}

impl fmt::Display for LegStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LegStage::Validate => "validate",
            LegStage::Revalidate => "revalidate",
            LegStage::Reserve => "reserve",
            LegStage::Ticket => "ticket",
            LegStage::Deadline => "deadline",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SessionRefreshFailed,
    RetriesExhausted,
    ReservationFailed,
    TicketingFailed,
    Validation,
    Deadline,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::SessionRefreshFailed => "session refresh failed",
            FailureReason::RetriesExhausted => "retries exhausted",
            FailureReason::ReservationFailed => "reservation failed",
            FailureReason::TicketingFailed => "ticketing failed",
            FailureReason::Validation => "validation failed",
            FailureReason::Deadline => "deadline exceeded",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFailure {
    pub leg_index: usize,
    pub stage: LegStage,
    pub reason: FailureReason,
    pub message: String,
}

impl LegFailure {
    pub fn new(
        leg_index: usize,
        stage: LegStage,
        reason: FailureReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            leg_index,
            stage,
            reason,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegConfirmation {
    pub leg_index: usize,
    pub pnr: String,
    pub booking_id: u64,
    pub ticket_numbers: Vec<String>,
    // Revalidated fare, which is what the leg is charged at
    pub fare: Fare,
    pub is_lcc: bool,
    pub price_change: Option<PriceChange>,
    pub ancillary_total: Decimal,
    pub final_trace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LegOutcome {
    Ticketed(LegConfirmation),
    Failed(LegFailure),
}

impl LegOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LegOutcome::Ticketed(_))
    }

    pub fn leg_index(&self) -> usize {
        match self {
            LegOutcome::Ticketed(confirmation) => confirmation.leg_index,
            LegOutcome::Failed(failure) => failure.leg_index,
        }
    }

    pub fn confirmation(&self) -> Option<&LegConfirmation> {
        match self {
            LegOutcome::Ticketed(confirmation) => Some(confirmation),
            LegOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&LegFailure> {
        match self {
            LegOutcome::Ticketed(_) => None,
            LegOutcome::Failed(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone)]
struct Revalidated {
    quote: FareQuote,
    price_change: Option<PriceChange>,
}

// Every transition consumes the previous state; the session carried forward is
// always the one the last successful stage ran with
enum LegState {
    Revalidating {
        session: Session,
    },
    Reserving {
        session: Session,
        revalidated: Revalidated,
    },
    Ticketing {
        session: Session,
        revalidated: Revalidated,
        reservation: Option<Reservation>,
    },
    Done(LegConfirmation),
    Failed(LegFailure),
}

// Inputs shared by every stage of one leg
struct LegRun<'a> {
    index: usize,
    leg: &'a Leg,
    context: &'a SearchContext,
    manifest: &'a PassengerManifest,
    ancillaries: &'a AncillarySelection,
}

impl LegRun<'_> {
    fn fail(&self, stage: LegStage, reason: FailureReason, message: impl Into<String>) -> LegState {
        let failure = LegFailure::new(self.index, stage, reason, message);
        warn!(
            stage = %failure.stage,
            reason = %failure.reason,
            message = %failure.message,
            "leg failed"
        );
        LegState::Failed(failure)
    }

    fn fail_execution(&self, stage: LegStage, error: ExecutionError) -> LegState {
        match error {
            ExecutionError::SessionRefreshFailed(e) => {
                self.fail(stage, FailureReason::SessionRefreshFailed, e.to_string())
            }
            ExecutionError::AttemptsExhausted { last_error, .. } => {
                let reason = match stage {
                    LegStage::Reserve => FailureReason::ReservationFailed,
                    LegStage::Ticket => FailureReason::TicketingFailed,
                    _ => FailureReason::RetriesExhausted,
                };
                self.fail(stage, reason, last_error.upstream_message())
            }
        }
    }

    fn documents_missing(&self, stage: LegStage) -> Option<LegState> {
        if self.manifest.all_documented() {
            return None;
        }
        Some(self.fail(
            stage,
            FailureReason::Validation,
            "travel document required for every passenger",
        ))
    }
}

pub struct LegProcessor {
    api: Arc<dyn BookingApi>,
    executor: RetryingExecutor,
    pricing: PricingConfig,
}

impl LegProcessor {
    pub fn new(
        api: Arc<dyn BookingApi>,
        executor: RetryingExecutor,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            api,
            executor,
            pricing,
        }
    }

    /// Drives one leg to a terminal outcome. Never returns an error: every
    /// failure is reported as a `LegOutcome::Failed` naming the stage.
    pub async fn process(
        &self,
        index: usize,
        leg: &Leg,
        context: &SearchContext,
        manifest: &PassengerManifest,
        ancillaries: &AncillarySelection,
    ) -> LegOutcome {
        let run = LegRun {
            index,
            leg,
            context,
            manifest,
            ancillaries,
        };
        let span = info_span!(
            "leg",
            index,
            trace_id = %leg.session.trace_id,
            dual = leg.is_dual()
        );

        async move {
            let mut state = LegState::Revalidating {
                session: leg.session.clone(),
            };
            loop {
                state = match state {
                    LegState::Done(confirmation) => {
                        info!(
                            pnr = %confirmation.pnr,
                            tickets = confirmation.ticket_numbers.len(),
                            "leg ticketed"
                        );
                        return LegOutcome::Ticketed(confirmation);
                    }
                    LegState::Failed(failure) => return LegOutcome::Failed(failure),
                    LegState::Revalidating { session } => self.revalidate(&run, session).await,
                    LegState::Reserving { session, revalidated } => {
                        self.reserve(&run, session, revalidated).await
                    }
                    LegState::Ticketing {
                        session,
                        revalidated,
                        reservation,
                    } => self.ticket(&run, session, revalidated, reservation).await,
                };
            }
        }
        .instrument(span)
        .await
    }

    async fn revalidate(&self, run: &LegRun<'_>, session: Session) -> LegState {
        let api = &self.api;
        let executed = match self
            .executor
            .execute(
                LegStage::Revalidate,
                session,
                &run.leg.original,
                run.context,
                |session| async move { api.revalidate(&session).await },
            )
            .await
        {
            Ok(executed) => executed,
            Err(e) => return run.fail_execution(LegStage::Revalidate, e),
        };

        let quote = executed.value;
        let price_change = match validate_fare(&run.leg.original.fare, &quote.fare, &self.pricing)
        {
            Ok(change) => change,
            Err(e) => {
                return run.fail(LegStage::Revalidate, FailureReason::Validation, e.to_string())
            }
        };
        if let Some(change) = &price_change {
            warn!(
                quoted = %change.quoted,
                revalidated = %change.revalidated,
                "fare changed since selection"
            );
        }

        // The quote may carry a fresher result reference than the one searched;
        // an empty one means the upstream kept the existing reference
        let result_ref = if quote.result_ref.is_empty() {
            &executed.session.result_ref
        } else {
            &quote.result_ref
        };
        let session = Session::new(&executed.session.trace_id, result_ref);
        let revalidated = Revalidated { quote, price_change };
        if revalidated.quote.is_lcc {
            LegState::Ticketing {
                session,
                revalidated,
                reservation: None,
            }
        } else {
            LegState::Reserving { session, revalidated }
        }
    }

    async fn reserve(
        &self,
        run: &LegRun<'_>,
        session: Session,
        revalidated: Revalidated,
    ) -> LegState {
        if revalidated.quote.passport_required_at_book {
            if let Some(failed) = run.documents_missing(LegStage::Reserve) {
                return failed;
            }
        }

        let api = &self.api;
        let manifest = run.manifest;
        match self
            .executor
            .execute(
                LegStage::Reserve,
                session,
                &run.leg.original,
                run.context,
                |session| async move { api.reserve(&session, manifest).await },
            )
            .await
        {
            Ok(executed) => {
                info!(
                    pnr = %executed.value.pnr,
                    booking_id = executed.value.booking_id,
                    "reserved"
                );
                LegState::Ticketing {
                    session: executed.session,
                    revalidated,
                    reservation: Some(executed.value),
                }
            }
            Err(e) => run.fail_execution(LegStage::Reserve, e),
        }
    }

    async fn ticket(
        &self,
        run: &LegRun<'_>,
        session: Session,
        revalidated: Revalidated,
        reservation: Option<Reservation>,
    ) -> LegState {
        let quote = &revalidated.quote;
        let documents_needed =
            quote.passport_required_at_ticket || (quote.is_lcc && quote.passport_required_at_book);
        if documents_needed {
            if let Some(failed) = run.documents_missing(LegStage::Ticket) {
                return failed;
            }
        }

        let request = match &reservation {
            Some(reservation) => TicketRequest::Reserved {
                pnr: reservation.pnr.clone(),
                booking_id: reservation.booking_id,
            },
            None => match self.lcc_passengers(run, quote) {
                Ok(passengers) => TicketRequest::Lcc { passengers },
                Err(message) => {
                    return run.fail(LegStage::Ticket, FailureReason::Validation, message)
                }
            },
        };

        let api = &self.api;
        let request = &request;
        let executed = match self
            .executor
            .execute(
                LegStage::Ticket,
                session,
                &run.leg.original,
                run.context,
                |session| async move { api.ticket(&session, request).await },
            )
            .await
        {
            Ok(executed) => executed,
            Err(e) => return run.fail_execution(LegStage::Ticket, e),
        };

        let IssuedTicket {
            pnr,
            booking_id,
            ticket_numbers,
        } = executed.value;
        LegState::Done(LegConfirmation {
            leg_index: run.index,
            pnr,
            booking_id,
            ticket_numbers,
            fare: revalidated.quote.fare.clone(),
            is_lcc: revalidated.quote.is_lcc,
            price_change: revalidated.price_change,
            ancillary_total: AncillaryAggregator::leg_total(run.ancillaries),
            final_trace: executed.session.trace_id,
        })
    }

    // No reservation exists for LCC fares, so the ticket call carries the whole
    // manifest with each passenger's fare share and selected extras
    fn lcc_passengers(
        &self,
        run: &LegRun<'_>,
        quote: &FareQuote,
    ) -> Result<Vec<TicketPassenger>, String> {
        let fares =
            allocate_passenger_fares(run.manifest, &quote.breakdown).map_err(|e| e.to_string())?;
        Ok(run
            .manifest
            .passengers
            .iter()
            .zip(fares)
            .enumerate()
            .map(|(i, (passenger, fare))| TicketPassenger {
                passenger: passenger.clone(),
                fare,
                ancillaries: run.ancillaries.for_passenger(i),
            })
            .collect())
    }
}

// Test support
// Scripted in-memory upstream, a sleeper that records instead of waiting, and fixtures

use crate::client::{
    ApiError, BookingApi, FareQuote, IssuedTicket, Reservation, SearchRequest, SearchResults,
    TicketRequest,
};
use crate::model::{
    Candidate, Fare, FareBreakdown, Passenger, PassengerManifest, PassengerType, Segment,
    SegmentGroups, Session,
};
use crate::retry::Sleeper;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

type Script<T> = Mutex<HashMap<String, VecDeque<Result<T, ApiError>>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Search(SearchRequest),
    Revalidate(Session),
    Reserve(Session),
    Ticket(Session, TicketRequest),
}

/// Upstream double answering from per-trace queues. An unscripted call fails
/// with a network error, so tests only script the happy paths they care about.
#[derive(Default)]
pub struct ScriptedApi {
    searches: Mutex<VecDeque<Result<SearchResults, ApiError>>>,
    revalidations: Script<FareQuote>,
    reservations: Script<Reservation>,
    tickets: Script<IssuedTicket>,
    ticket_delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<Call>>,
}

fn next_scripted<T>(script: &Script<T>, trace_id: &str, operation: &str) -> Result<T, ApiError> {
    script
        .lock()
        .get_mut(trace_id)
        .and_then(|queue| queue.pop_front())
        .unwrap_or_else(|| {
            Err(ApiError::NetworkError(format!(
                "no scripted {} response for trace {}",
                operation, trace_id
            )))
        })
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_search(&self, result: Result<SearchResults, ApiError>) {
        self.searches.lock().push_back(result);
    }

    pub fn on_revalidate(&self, trace_id: &str, result: Result<FareQuote, ApiError>) {
        self.revalidations
            .lock()
            .entry(trace_id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn on_reserve(&self, trace_id: &str, result: Result<Reservation, ApiError>) {
        self.reservations
            .lock()
            .entry(trace_id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn on_ticket(&self, trace_id: &str, result: Result<IssuedTicket, ApiError>) {
        self.tickets
            .lock()
            .entry(trace_id.to_string())
            .or_default()
            .push_back(result);
    }

    // Ticket calls on this trace wait on the tokio clock before answering
    pub fn delay_tickets_for(&self, trace_id: &str, delay: Duration) {
        self.ticket_delays.lock().insert(trace_id.to_string(), delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn search_requests(&self) -> Vec<SearchRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Search(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn revalidate_calls(&self) -> Vec<Session> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Revalidate(session) => Some(session.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn reserve_calls(&self) -> Vec<Session> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Reserve(session) => Some(session.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn ticket_calls(&self) -> Vec<(Session, TicketRequest)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Ticket(session, request) => Some((session.clone(), request.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl BookingApi for ScriptedApi {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, ApiError> {
        self.calls.lock().push(Call::Search(request.clone()));
        self.searches.lock().pop_front().unwrap_or_else(|| {
            Err(ApiError::NetworkError(
                "no scripted search response".to_string(),
            ))
        })
    }

    async fn revalidate(&self, session: &Session) -> Result<FareQuote, ApiError> {
        self.calls.lock().push(Call::Revalidate(session.clone()));
        next_scripted(&self.revalidations, &session.trace_id, "revalidate")
    }

    async fn reserve(
        &self,
        session: &Session,
        _manifest: &PassengerManifest,
    ) -> Result<Reservation, ApiError> {
        self.calls.lock().push(Call::Reserve(session.clone()));
        next_scripted(&self.reservations, &session.trace_id, "reserve")
    }

    async fn ticket(
        &self,
        session: &Session,
        request: &TicketRequest,
    ) -> Result<IssuedTicket, ApiError> {
        self.calls
            .lock()
            .push(Call::Ticket(session.clone(), request.clone()));
        let delay = self.ticket_delays.lock().get(&session.trace_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        next_scripted(&self.tickets, &session.trace_id, "ticket")
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

pub fn segment(
    carrier: &str,
    flight_number: &str,
    origin: &str,
    destination: &str,
    departure: &str,
) -> Segment {
    let departure = NaiveDateTime::parse_from_str(departure, "%Y-%m-%dT%H:%M:%S").unwrap();
    Segment {
        carrier: carrier.to_string(),
        flight_number: flight_number.to_string(),
        origin: origin.to_string(),
        destination: destination.to_string(),
        departure,
        arrival: departure + ChronoDuration::hours(2),
    }
}

fn inr(base: i64, tax: i64) -> Fare {
    Fare::new("INR", Decimal::from(base), Decimal::from(tax))
}

// Selected at INR 4000 + 1000
pub fn candidate(result_ref: &str, segments: Vec<Segment>) -> Candidate {
    Candidate {
        result_ref: result_ref.to_string(),
        segments: SegmentGroups::SingleSegmentGroup { segments },
        fare: inr(4000, 1000),
    }
}

pub fn dual_candidate(
    result_ref: &str,
    outbound: Vec<Segment>,
    inbound: Vec<Segment>,
) -> Candidate {
    Candidate {
        result_ref: result_ref.to_string(),
        segments: SegmentGroups::DualSegmentGroup { outbound, inbound },
        fare: inr(4000, 1000),
    }
}

/// Quote for a single adult, no passport requirements.
pub fn quote(result_ref: &str, base: i64, tax: i64, is_lcc: bool) -> FareQuote {
    FareQuote {
        result_ref: result_ref.to_string(),
        fare: inr(base, tax),
        is_lcc,
        breakdown: vec![FareBreakdown {
            passenger_type: PassengerType::Adult,
            count: 1,
            base: Decimal::from(base),
            tax: Decimal::from(tax),
        }],
        passport_required_at_book: false,
        passport_required_at_ticket: false,
    }
}

fn passenger(
    passenger_type: PassengerType,
    title: &str,
    first_name: &str,
    born: Option<NaiveDate>,
) -> Passenger {
    Passenger {
        passenger_type,
        title: title.to_string(),
        first_name: first_name.to_string(),
        last_name: "Sharma".to_string(),
        date_of_birth: born,
        email: Some(format!("{}@example.com", first_name.to_lowercase())),
        phone: Some("9876543210".to_string()),
        document: None,
    }
}

pub fn adult(first_name: &str) -> Passenger {
    passenger(PassengerType::Adult, "Mr", first_name, None)
}

pub fn child(first_name: &str) -> Passenger {
    passenger(PassengerType::Child, "Miss", first_name, NaiveDate::from_ymd_opt(2017, 3, 14))
}

pub fn infant(first_name: &str) -> Passenger {
    passenger(PassengerType::Infant, "Mstr", first_name, NaiveDate::from_ymd_opt(2024, 11, 2))
}

pub fn manifest_of(passengers: Vec<Passenger>) -> PassengerManifest {
    PassengerManifest::new(passengers)
}

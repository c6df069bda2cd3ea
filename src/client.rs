// Upstream booking API client
// The four supplier operations the engine depends on, and an HTTP+JSON implementation of them

use crate::ancillary::AncillaryItem;
use crate::config::UpstreamConfig;
use crate::model::{
    Candidate, Fare, FareBreakdown, Passenger, PassengerFare, PassengerManifest, SearchContext,
    Session,
};
use crate::supplier::{
    self, BookRequestBody, BookResponseBody, Envelope, FareQuoteResponseBody, PassengerBody,
    SearchRequestBody, SearchResponseBody, SessionRequestBody, TicketRequestBody,
    TicketResponseBody,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// Every upstream failure is decoded into one of these at the client boundary.
// Only `SessionExpired` is recoverable by re-searching.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Upstream rejected request: {code} - {message}")]
    Rejected { code: i32, message: String },

    #[error("Decode error: {0}")]
    DecodeError(String),
}

impl ApiError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }

    // The supplier's own wording where there is one, for operator diagnosis
    pub fn upstream_message(&self) -> String {
        match self {
            ApiError::Rejected { message, .. } | ApiError::SessionExpired(message) => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub context: SearchContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub trace_id: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FareQuote {
    pub result_ref: String,
    pub fare: Fare,
    pub is_lcc: bool,
    pub breakdown: Vec<FareBreakdown>,
    pub passport_required_at_book: bool,
    pub passport_required_at_ticket: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub pnr: String,
    pub booking_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTicket {
    pub pnr: String,
    pub booking_id: u64,
    pub ticket_numbers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketPassenger {
    pub passenger: Passenger,
    pub fare: PassengerFare,
    pub ancillaries: Vec<AncillaryItem>,
}

// LCC fares are ticketed in one call carrying the whole manifest; everything else
// is ticketed against an earlier reservation
#[derive(Debug, Clone, PartialEq)]
pub enum TicketRequest {
    Lcc { passengers: Vec<TicketPassenger> },
    Reserved { pnr: String, booking_id: u64 },
}

#[async_trait]
pub trait BookingApi: Send + Sync + 'static {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, ApiError>;

    // Confirms the current price of the candidate referenced by the session
    async fn revalidate(&self, session: &Session) -> Result<FareQuote, ApiError>;

    async fn reserve(
        &self,
        session: &Session,
        manifest: &PassengerManifest,
    ) -> Result<Reservation, ApiError>;

    async fn ticket(
        &self,
        session: &Session,
        request: &TicketRequest,
    ) -> Result<IssuedTicket, ApiError>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub sessions_expired: usize,
}

pub struct HttpBookingApi {
    http: reqwest::Client,
    config: UpstreamConfig,
    stats: Mutex<ClientStats>,
}

impl HttpBookingApi {
    pub fn new(config: UpstreamConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Ok(Self {
            http,
            config,
            stats: Mutex::new(ClientStats::default()),
        })
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    fn session_body(&self, session: &Session) -> SessionRequestBody {
        SessionRequestBody {
            end_user_ip: self.config.end_user_ip.clone(),
            token_id: self.config.token_id.clone(),
            trace_id: session.trace_id.clone(),
            result_index: session.result_ref.clone(),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        let url = self.config.url(path);
        self.stats.lock().requests_sent += 1;
        debug!(url = %url, "POST upstream");

        let response = self.http.post(&url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.config.timeout_ms)
            } else {
                ApiError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::NetworkError(format!("HTTP {} from {}", status, path)));
        }

        let envelope: Envelope<Resp> = response
            .json()
            .await
            .map_err(|e| ApiError::DecodeError(e.to_string()))?;
        Ok(envelope.response)
    }

    fn record<T>(&self, operation: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
        let mut stats = self.stats.lock();
        match &result {
            Ok(_) => stats.requests_succeeded += 1,
            Err(e) => {
                stats.requests_failed += 1;
                if e.is_session_expired() {
                    stats.sessions_expired += 1;
                }
                warn!(operation, error = %e, "upstream call failed");
            }
        }
        result
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, ApiError> {
        let body =
            SearchRequestBody::new(request, &self.config.end_user_ip, &self.config.token_id);
        let result = self
            .post::<_, SearchResponseBody>(&self.config.search_path, &body)
            .await
            .and_then(supplier::decode_search);
        self.record("search", result)
    }

    async fn revalidate(&self, session: &Session) -> Result<FareQuote, ApiError> {
        let body = self.session_body(session);
        let result = self
            .post::<_, FareQuoteResponseBody>(&self.config.fare_quote_path, &body)
            .await
            .and_then(supplier::decode_fare_quote);
        self.record("revalidate", result)
    }

    async fn reserve(
        &self,
        session: &Session,
        manifest: &PassengerManifest,
    ) -> Result<Reservation, ApiError> {
        let body = BookRequestBody {
            end_user_ip: self.config.end_user_ip.clone(),
            token_id: self.config.token_id.clone(),
            trace_id: session.trace_id.clone(),
            result_index: session.result_ref.clone(),
            passengers: manifest
                .passengers
                .iter()
                .enumerate()
                .map(|(i, p)| PassengerBody::from_passenger(p, i == 0))
                .collect(),
        };
        let result = self
            .post::<_, BookResponseBody>(&self.config.book_path, &body)
            .await
            .and_then(supplier::decode_booking);
        self.record("reserve", result)
    }

    async fn ticket(
        &self,
        session: &Session,
        request: &TicketRequest,
    ) -> Result<IssuedTicket, ApiError> {
        let mut body = TicketRequestBody {
            end_user_ip: self.config.end_user_ip.clone(),
            token_id: self.config.token_id.clone(),
            trace_id: session.trace_id.clone(),
            result_index: None,
            pnr: None,
            booking_id: None,
            passengers: None,
        };
        match request {
            TicketRequest::Lcc { passengers } => {
                body.result_index = Some(session.result_ref.clone());
                body.passengers = Some(
                    passengers
                        .iter()
                        .enumerate()
                        .map(|(i, p)| PassengerBody::from_ticket_passenger(p, i == 0))
                        .collect(),
                );
            }
            TicketRequest::Reserved { pnr, booking_id } => {
                body.pnr = Some(pnr.clone());
                body.booking_id = Some(*booking_id);
            }
        }

        let result = self
            .post::<_, TicketResponseBody>(&self.config.ticket_path, &body)
            .await
            .and_then(supplier::decode_ticket);
        self.record("ticket", result)
    }
}

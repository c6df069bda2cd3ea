// Upstream wire format
// Request/response bodies of the supplier's JSON API and the decode step that turns
// its loosely shaped responses into the closed result set the engine works with

use crate::ancillary::{AncillaryItem, AncillaryKind};
use crate::client::{
    ApiError, FareQuote, IssuedTicket, Reservation, SearchRequest, SearchResults, TicketPassenger,
};
use crate::model::{
    Candidate, Fare, FareBreakdown, Passenger, PassengerType, Segment, SegmentGroups,
};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const STATUS_SUCCESSFUL: i32 = 1;
pub const STATUS_FAILED: i32 = 2;
pub const STATUS_INVALID_SESSION: i32 = 4;
pub const ERROR_SESSION_EXPIRED: i32 = 6;
pub const TICKET_STATUS_SUCCESSFUL: i32 = 1;

const JOURNEY_ONE_WAY: u8 = 1;
const JOURNEY_RETURN: u8 = 2;

// Requests

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchRequestBody {
    pub end_user_ip: String,
    pub token_id: String,
    pub adult_count: u32,
    pub child_count: u32,
    pub infant_count: u32,
    pub direct_flight: bool,
    pub journey_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_airlines: Option<Vec<String>>,
    pub segments: Vec<SearchSegmentBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchSegmentBody {
    pub origin: String,
    pub destination: String,
    pub flight_cabin_class: u8,
    pub preferred_departure_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionRequestBody {
    pub end_user_ip: String,
    pub token_id: String,
    pub trace_id: String,
    pub result_index: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookRequestBody {
    pub end_user_ip: String,
    pub token_id: String,
    pub trace_id: String,
    pub result_index: String,
    pub passengers: Vec<PassengerBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TicketRequestBody {
    pub end_user_ip: String,
    pub token_id: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_index: Option<String>,
    #[serde(rename = "PNR", skip_serializing_if = "Option::is_none")]
    pub pnr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passengers: Option<Vec<PassengerBody>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PassengerBody {
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub pax_type: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_expiry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    pub is_lead_pax: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fare: Option<PassengerFareBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub baggage: Vec<SsrBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub meal_dynamic: Vec<SsrBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub seat_dynamic: Vec<SsrBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub special_services: Vec<SsrBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PassengerFareBody {
    pub base_fare: Decimal,
    pub tax: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SsrBody {
    pub code: String,
    pub description: String,
    pub price: Decimal,
    pub segment_index: usize,
}

impl SearchRequestBody {
    pub fn new(request: &SearchRequest, end_user_ip: &str, token_id: &str) -> Self {
        let context = &request.context;
        let cabin = context.cabin_class.upstream_code();
        let mut segments = vec![SearchSegmentBody {
            origin: request.origin.clone(),
            destination: request.destination.clone(),
            flight_cabin_class: cabin,
            preferred_departure_time: format!("{}T00:00:00", request.departure_date),
        }];
        if let Some(return_date) = request.return_date {
            segments.push(SearchSegmentBody {
                origin: request.destination.clone(),
                destination: request.origin.clone(),
                flight_cabin_class: cabin,
                preferred_departure_time: format!("{}T00:00:00", return_date),
            });
        }

        Self {
            end_user_ip: end_user_ip.to_string(),
            token_id: token_id.to_string(),
            adult_count: context.adults,
            child_count: context.children,
            infant_count: context.infants,
            direct_flight: context.direct_only,
            journey_type: if request.return_date.is_some() {
                JOURNEY_RETURN
            } else {
                JOURNEY_ONE_WAY
            },
            preferred_airlines: if context.preferred_airlines.is_empty() {
                None
            } else {
                Some(context.preferred_airlines.clone())
            },
            segments,
        }
    }
}

impl PassengerBody {
    pub fn from_passenger(passenger: &Passenger, is_lead: bool) -> Self {
        let document = passenger.document.as_ref();
        Self {
            title: passenger.title.clone(),
            first_name: passenger.first_name.clone(),
            last_name: passenger.last_name.clone(),
            pax_type: passenger.passenger_type.upstream_code(),
            date_of_birth: passenger.date_of_birth.map(|d| format!("{}T00:00:00", d)),
            email: passenger.email.clone(),
            contact_no: passenger.phone.clone(),
            passport_no: document.map(|d| d.number.clone()),
            passport_expiry: document.map(|d| format!("{}T00:00:00", d.expiry)),
            nationality: document.map(|d| d.nationality.clone()),
            is_lead_pax: is_lead,
            fare: None,
            baggage: Vec::new(),
            meal_dynamic: Vec::new(),
            seat_dynamic: Vec::new(),
            special_services: Vec::new(),
        }
    }

    pub fn from_ticket_passenger(ticket_passenger: &TicketPassenger, is_lead: bool) -> Self {
        let mut body = Self::from_passenger(&ticket_passenger.passenger, is_lead);
        body.fare = Some(PassengerFareBody {
            base_fare: ticket_passenger.fare.base,
            tax: ticket_passenger.fare.tax,
        });
        for item in &ticket_passenger.ancillaries {
            let ssr = SsrBody::from(item);
            match item.kind {
                AncillaryKind::Baggage => body.baggage.push(ssr),
                AncillaryKind::Meal => body.meal_dynamic.push(ssr),
                AncillaryKind::Seat => body.seat_dynamic.push(ssr),
                AncillaryKind::Option => body.special_services.push(ssr),
            }
        }
        body
    }
}

impl From<&AncillaryItem> for SsrBody {
    fn from(item: &AncillaryItem) -> Self {
        Self {
            code: item.code.clone(),
            description: item.description.clone(),
            price: item.price,
            segment_index: item.segment_index,
        }
    }
}

// Responses

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope<T> {
    pub response: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ErrorBody {
    pub error_code: i32,
    pub error_message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SearchResponseBody {
    pub response_status: Option<i32>,
    pub error: Option<ErrorBody>,
    pub trace_id: Option<String>,
    pub results: Vec<Vec<ResultBody>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FareQuoteResponseBody {
    pub response_status: Option<i32>,
    pub error: Option<ErrorBody>,
    pub trace_id: Option<String>,
    pub results: Option<ResultBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BookResponseBody {
    pub response_status: Option<i32>,
    pub error: Option<ErrorBody>,
    pub trace_id: Option<String>,
    pub response: Option<BookDetailBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BookDetailBody {
    #[serde(rename = "PNR")]
    pub pnr: String,
    pub booking_id: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TicketResponseBody {
    pub response_status: Option<i32>,
    pub error: Option<ErrorBody>,
    pub trace_id: Option<String>,
    pub response: Option<TicketDetailBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TicketDetailBody {
    #[serde(rename = "PNR")]
    pub pnr: String,
    pub booking_id: u64,
    pub ticket_status: Option<i32>,
    pub message: Option<String>,
    pub flight_itinerary: Option<FlightItineraryBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FlightItineraryBody {
    pub passenger: Vec<TicketedPassengerBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TicketedPassengerBody {
    pub ticket: Option<TicketNumberBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TicketNumberBody {
    pub ticket_number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ResultBody {
    pub result_index: String,
    #[serde(rename = "IsLCC")]
    pub is_lcc: bool,
    pub is_passport_required_at_book: bool,
    pub is_passport_required_at_ticket: bool,
    pub fare: FareBody,
    pub fare_breakdown: Vec<FareBreakdownBody>,
    pub segments: Vec<Vec<SegmentBody>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FareBody {
    pub currency: String,
    pub base_fare: Decimal,
    pub tax: Decimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FareBreakdownBody {
    pub passenger_type: i32,
    pub passenger_count: u32,
    pub base_fare: Decimal,
    pub tax: Decimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SegmentBody {
    pub airline: AirlineBody,
    pub origin: EndpointBody,
    pub destination: EndpointBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AirlineBody {
    pub airline_code: String,
    pub flight_number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct EndpointBody {
    pub airport: AirportBody,
    pub dep_time: Option<NaiveDateTime>,
    pub arr_time: Option<NaiveDateTime>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AirportBody {
    pub airport_code: String,
}

// Decoding

fn is_session_expired(status: Option<i32>, error: Option<&ErrorBody>) -> bool {
    status == Some(STATUS_INVALID_SESSION)
        || error.map_or(false, |e| e.error_code == ERROR_SESSION_EXPIRED)
}

fn error_message(error: Option<&ErrorBody>, fallback: &str) -> String {
    error
        .map(|e| e.error_message.trim())
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

// Shared status check for search, fare quote and book responses
fn check_status(status: Option<i32>, error: Option<&ErrorBody>) -> Result<(), ApiError> {
    if is_session_expired(status, error) {
        return Err(ApiError::SessionExpired(error_message(error, "session expired")));
    }

    let error_code = error.map_or(0, |e| e.error_code);
    if status == Some(STATUS_SUCCESSFUL) && error_code == 0 {
        return Ok(());
    }

    Err(ApiError::Rejected {
        code: if error_code != 0 {
            error_code
        } else {
            status.unwrap_or(0)
        },
        message: error_message(error, "upstream did not report success"),
    })
}

pub fn decode_search(body: SearchResponseBody) -> Result<SearchResults, ApiError> {
    check_status(body.response_status, body.error.as_ref())?;
    let trace_id = body
        .trace_id
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::DecodeError("search response has no TraceId".to_string()))?;

    // Results arrive grouped by direction; the matcher wants one flat list
    let candidates = body
        .results
        .into_iter()
        .flatten()
        .map(decode_candidate)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SearchResults { trace_id, candidates })
}

pub fn decode_fare_quote(body: FareQuoteResponseBody) -> Result<FareQuote, ApiError> {
    check_status(body.response_status, body.error.as_ref())?;
    let result = body
        .results
        .ok_or_else(|| ApiError::DecodeError("fare quote response has no Results".to_string()))?;

    let breakdown = result
        .fare_breakdown
        .iter()
        .map(|b| {
            PassengerType::from_upstream_code(b.passenger_type)
                .map(|passenger_type| FareBreakdown {
                    passenger_type,
                    count: b.passenger_count,
                    base: b.base_fare,
                    tax: b.tax,
                })
                .ok_or_else(|| {
                    ApiError::DecodeError(format!("unknown passenger type {}", b.passenger_type))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FareQuote {
        result_ref: result.result_index,
        fare: Fare::new(&result.fare.currency, result.fare.base_fare, result.fare.tax),
        is_lcc: result.is_lcc,
        breakdown,
        passport_required_at_book: result.is_passport_required_at_book,
        passport_required_at_ticket: result.is_passport_required_at_ticket,
    })
}

pub fn decode_booking(body: BookResponseBody) -> Result<Reservation, ApiError> {
    check_status(body.response_status, body.error.as_ref())?;
    let detail = body
        .response
        .filter(|d| !d.pnr.is_empty())
        .ok_or_else(|| ApiError::DecodeError("book response has no PNR".to_string()))?;

    Ok(Reservation {
        pnr: detail.pnr,
        booking_id: detail.booking_id,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketVerdict {
    Successful,
    NestedSuccess,
    NotFailed,
    SessionExpired,
    Failed,
}

impl TicketVerdict {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            TicketVerdict::Successful | TicketVerdict::NestedSuccess | TicketVerdict::NotFailed
        )
    }
}

/// Normalises the three places the ticket response may carry its outcome.
///
/// Checked in order: the top-level `ResponseStatus`, the nested
/// `Response.TicketStatus`, and finally any top-level status other than the
/// explicit failure code. A session-expired error is recognised before the
/// last, most permissive check.
pub fn ticket_verdict(body: &TicketResponseBody) -> TicketVerdict {
    let status = body.response_status;
    let error = body.error.as_ref();

    if status == Some(STATUS_SUCCESSFUL) {
        return TicketVerdict::Successful;
    }
    if body.response.as_ref().and_then(|r| r.ticket_status) == Some(TICKET_STATUS_SUCCESSFUL) {
        return TicketVerdict::NestedSuccess;
    }
    if is_session_expired(status, error) {
        return TicketVerdict::SessionExpired;
    }
    match status {
        Some(code) if code != STATUS_FAILED => TicketVerdict::NotFailed,
        _ => TicketVerdict::Failed,
    }
}

pub fn decode_ticket(body: TicketResponseBody) -> Result<IssuedTicket, ApiError> {
    match ticket_verdict(&body) {
        TicketVerdict::SessionExpired => {
            return Err(ApiError::SessionExpired(error_message(
                body.error.as_ref(),
                "session expired",
            )))
        }
        TicketVerdict::Failed => {
            let nested = body.response.as_ref().and_then(|r| r.message.clone());
            let message = match body.error.as_ref().filter(|e| !e.error_message.trim().is_empty()) {
                Some(e) => e.error_message.trim().to_string(),
                None => nested.unwrap_or_else(|| "ticketing failed".to_string()),
            };
            return Err(ApiError::Rejected {
                code: body
                    .error
                    .as_ref()
                    .map_or(body.response_status.unwrap_or(0), |e| e.error_code),
                message,
            });
        }
        _ => {}
    }

    let detail = body.response.unwrap_or_default();
    let ticket_numbers = detail
        .flight_itinerary
        .map(|itinerary| {
            itinerary
                .passenger
                .into_iter()
                .filter_map(|p| p.ticket)
                .map(|t| t.ticket_number)
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(IssuedTicket {
        pnr: detail.pnr,
        booking_id: detail.booking_id,
        ticket_numbers,
    })
}

fn decode_segment(body: SegmentBody) -> Result<Segment, ApiError> {
    let departure = body.origin.dep_time.ok_or_else(|| {
        ApiError::DecodeError(format!(
            "segment {}{} has no departure time",
            body.airline.airline_code, body.airline.flight_number
        ))
    })?;
    let arrival = body.destination.arr_time.unwrap_or(departure);

    Ok(Segment {
        carrier: body.airline.airline_code,
        flight_number: body.airline.flight_number,
        origin: body.origin.airport.airport_code,
        destination: body.destination.airport.airport_code,
        departure,
        arrival,
    })
}

pub fn decode_candidate(body: ResultBody) -> Result<Candidate, ApiError> {
    let mut groups = body
        .segments
        .into_iter()
        .map(|group| group.into_iter().map(decode_segment).collect::<Result<Vec<_>, _>>())
        .collect::<Result<Vec<_>, _>>()?;

    let segments = match groups.len() {
        1 => SegmentGroups::SingleSegmentGroup {
            segments: groups.remove(0),
        },
        2 => {
            let inbound = groups.remove(1);
            let outbound = groups.remove(0);
            SegmentGroups::DualSegmentGroup { outbound, inbound }
        }
        n => {
            return Err(ApiError::DecodeError(format!(
                "result {} has {} segment groups",
                body.result_index, n
            )))
        }
    };

    Ok(Candidate {
        result_ref: body.result_index,
        segments,
        fare: Fare::new(&body.fare.currency, body.fare.base_fare, body.fare.tax),
    })
}

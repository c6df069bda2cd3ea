// Booking data model
// Itineraries, their legs and the immutable flight candidates each leg was selected from

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use thiserror::Error;

pub const MAX_MULTI_CITY_LEGS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItineraryError {
    #[error("{kind:?} itinerary needs {expected} leg(s), got {actual}")]
    LegCount {
        kind: ItineraryKind,
        expected: &'static str,
        actual: usize,
    },

    #[error("leg {index}: {kind:?} itinerary cannot carry a {shape} candidate")]
    ShapeMismatch {
        index: usize,
        kind: ItineraryKind,
        shape: &'static str,
    },

    #[error("leg {index}: candidate has an empty segment group")]
    EmptySegmentGroup { index: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManifestError {
    #[error("manifest has no passengers")]
    Empty,

    #[error("manifest needs at least one adult")]
    NoAdult,

    #[error("{infants} infant(s) but only {adults} adult(s)")]
    TooManyInfants { infants: usize, adults: usize },

    #[error("manifest has {actual} {passenger_type:?} passenger(s) but the search was for {expected}")]
    CountMismatch {
        passenger_type: PassengerType,
        expected: u32,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItineraryKind {
    OneWay,
    DomesticRoundTrip,
    InternationalRoundTrip,
    MultiCity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub carrier: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
}

// The upstream returns a combined international round trip as one result whose
// segments come in two directional groups sharing a single trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SegmentGroups {
    SingleSegmentGroup {
        segments: Vec<Segment>,
    },
    DualSegmentGroup {
        outbound: Vec<Segment>,
        inbound: Vec<Segment>,
    },
}

impl SegmentGroups {
    pub fn outbound(&self) -> &[Segment] {
        match self {
            SegmentGroups::SingleSegmentGroup { segments } => segments,
            SegmentGroups::DualSegmentGroup { outbound, .. } => outbound,
        }
    }

    pub fn inbound(&self) -> Option<&[Segment]> {
        match self {
            SegmentGroups::SingleSegmentGroup { .. } => None,
            SegmentGroups::DualSegmentGroup { inbound, .. } => Some(inbound),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.outbound().len() + self.inbound().map_or(0, |segments| segments.len())
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            SegmentGroups::SingleSegmentGroup { .. } => "single-segment-group",
            SegmentGroups::DualSegmentGroup { .. } => "dual-segment-group",
        }
    }

    pub fn is_dual(&self) -> bool {
        matches!(self, SegmentGroups::DualSegmentGroup { .. })
    }

    fn has_empty_group(&self) -> bool {
        self.outbound().is_empty() || self.inbound().map_or(false, |segments| segments.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fare {
    pub currency: String,
    pub base: Decimal,
    pub tax: Decimal,
}

impl Fare {
    pub fn new(currency: &str, base: Decimal, tax: Decimal) -> Self {
        Self {
            currency: currency.to_string(),
            base,
            tax,
        }
    }

    pub fn total(&self) -> Decimal {
        self.base + self.tax
    }
}

// Fare for all passengers of one type, as priced by the upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub passenger_type: PassengerType,
    pub count: u32,
    pub base: Decimal,
    pub tax: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerFare {
    pub base: Decimal,
    pub tax: Decimal,
}

/// Snapshot of a previously searched flight. Only ever used as the matching
/// target when the leg's trace expires; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub result_ref: String,
    pub segments: SegmentGroups,
    pub fare: Fare,
}

impl Candidate {
    pub fn first_segment(&self) -> Option<&Segment> {
        self.segments.outbound().first()
    }

    pub fn origin(&self) -> Option<&str> {
        self.first_segment().map(|s| s.origin.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.segments.outbound().last().map(|s| s.destination.as_str())
    }

    pub fn departure(&self) -> Option<NaiveDateTime> {
        self.first_segment().map(|s| s.departure)
    }
}

// Upstream session handle plus the result reference that is only valid inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub trace_id: String,
    pub result_ref: String,
}

impl Session {
    pub fn new(trace_id: &str, result_ref: &str) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            result_ref: result_ref.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub session: Session,
    pub original: Candidate,
}

impl Leg {
    pub fn new(trace_id: &str, original: Candidate) -> Self {
        Self {
            session: Session::new(trace_id, &original.result_ref),
            original,
        }
    }

    pub fn is_dual(&self) -> bool {
        self.original.segments.is_dual()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    All,
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    PremiumBusiness,
    First,
}

impl CabinClass {
    pub fn upstream_code(self) -> u8 {
        match self {
            CabinClass::All => 1,
            CabinClass::Economy => 2,
            CabinClass::PremiumEconomy => 3,
            CabinClass::Business => 4,
            CabinClass::PremiumBusiness => 5,
            CabinClass::First => 6,
        }
    }
}

// Passenger mix and filters of the search the itinerary came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchContext {
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
    pub cabin_class: CabinClass,
    pub direct_only: bool,
    pub preferred_airlines: Vec<String>,
}

impl Default for SearchContext {
    fn default() -> Self {
        Self {
            adults: 1,
            children: 0,
            infants: 0,
            cabin_class: CabinClass::Economy,
            direct_only: false,
            preferred_airlines: Vec::new(),
        }
    }
}

impl SearchContext {
    pub fn expected(&self, passenger_type: PassengerType) -> u32 {
        match passenger_type {
            PassengerType::Adult => self.adults,
            PassengerType::Child => self.children,
            PassengerType::Infant => self.infants,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ItineraryDef {
    kind: ItineraryKind,
    #[serde(default)]
    search_context: SearchContext,
    legs: Vec<Leg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ItineraryDef")]
pub struct Itinerary {
    kind: ItineraryKind,
    search_context: SearchContext,
    legs: Vec<Leg>,
}

impl Itinerary {
    pub fn new(
        kind: ItineraryKind,
        search_context: SearchContext,
        legs: Vec<Leg>,
    ) -> Result<Self, ItineraryError> {
        let (expected, count_ok) = match kind {
            ItineraryKind::OneWay | ItineraryKind::InternationalRoundTrip => {
                ("exactly 1", legs.len() == 1)
            }
            ItineraryKind::DomesticRoundTrip => ("exactly 2", legs.len() == 2),
            ItineraryKind::MultiCity => (
                "1 to 5",
                (1..=MAX_MULTI_CITY_LEGS).contains(&legs.len()),
            ),
        };
        if !count_ok {
            return Err(ItineraryError::LegCount {
                kind,
                expected,
                actual: legs.len(),
            });
        }

        for (index, leg) in legs.iter().enumerate() {
            let segments = &leg.original.segments;
            if segments.has_empty_group() {
                return Err(ItineraryError::EmptySegmentGroup { index });
            }
            let wants_dual = kind == ItineraryKind::InternationalRoundTrip;
            if leg.is_dual() != wants_dual {
                return Err(ItineraryError::ShapeMismatch {
                    index,
                    kind,
                    shape: segments.shape_name(),
                });
            }
        }

        Ok(Self {
            kind,
            search_context,
            legs,
        })
    }

    pub fn kind(&self) -> ItineraryKind {
        self.kind
    }

    pub fn search_context(&self) -> &SearchContext {
        &self.search_context
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }
}

impl TryFrom<ItineraryDef> for Itinerary {
    type Error = ItineraryError;

    fn try_from(def: ItineraryDef) -> Result<Self, Self::Error> {
        Itinerary::new(def.kind, def.search_context, def.legs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerType {
    Adult,
    Child,
    Infant,
}

impl PassengerType {
    pub fn upstream_code(self) -> i32 {
        match self {
            PassengerType::Adult => 1,
            PassengerType::Child => 2,
            PassengerType::Infant => 3,
        }
    }

    pub fn from_upstream_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(PassengerType::Adult),
            2 => Some(PassengerType::Child),
            3 => Some(PassengerType::Infant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelDocument {
    pub number: String,
    pub expiry: NaiveDate,
    pub nationality: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    pub passenger_type: PassengerType,
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub document: Option<TravelDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerManifest {
    pub passengers: Vec<Passenger>,
}

impl PassengerManifest {
    pub fn new(passengers: Vec<Passenger>) -> Self {
        Self { passengers }
    }

    pub fn count(&self, passenger_type: PassengerType) -> usize {
        self.passengers
            .iter()
            .filter(|p| p.passenger_type == passenger_type)
            .count()
    }

    pub fn all_documented(&self) -> bool {
        self.passengers.iter().all(|p| p.document.is_some())
    }

    pub fn validate(&self, context: &SearchContext) -> Result<(), ManifestError> {
        if self.passengers.is_empty() {
            return Err(ManifestError::Empty);
        }

        let adults = self.count(PassengerType::Adult);
        let infants = self.count(PassengerType::Infant);
        if adults == 0 {
            return Err(ManifestError::NoAdult);
        }
        if infants > adults {
            return Err(ManifestError::TooManyInfants { infants, adults });
        }

        for passenger_type in [PassengerType::Adult, PassengerType::Child, PassengerType::Infant] {
            let expected = context.expected(passenger_type);
            let actual = self.count(passenger_type);
            if actual != expected as usize {
                return Err(ManifestError::CountMismatch {
                    passenger_type,
                    expected,
                    actual,
                });
            }
        }

        Ok(())
    }
}

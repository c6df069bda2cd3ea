// Session-refresh matcher
// Re-runs the search after an expired trace and relocates the originally selected flight

use crate::client::{ApiError, BookingApi, SearchRequest};
use crate::model::{Candidate, SearchContext, Segment, Session};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const GATE_SCORE: i64 = 100;
pub const SEGMENT_COUNT_MATCH: i64 = 50;
pub const SEGMENT_COUNT_PENALTY: i64 = 10;
pub const CARRIER_MATCH: i64 = 20;
pub const FLIGHT_NUMBER_MATCH: i64 = 10;
pub const DEPARTURE_WINDOW_MINUTES: i64 = 60;
pub const DEPARTURE_CLOSE_BONUS: i64 = 5;
pub const DEPARTURE_FAR_PENALTY: i64 = -5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("No replacement for {result_ref} among {searched} candidate(s)")]
    NoMatchFound { result_ref: String, searched: usize },

    #[error("Candidate {0} has no segments to search from")]
    UnsearchableCandidate(String),

    #[error("Re-search failed: {0}")]
    UpstreamError(#[from] ApiError),
}

// Origin, destination and departure calendar date of one directional group
fn same_route_and_day(original: &[Segment], replacement: &[Segment]) -> bool {
    match (
        original.first(),
        original.last(),
        replacement.first(),
        replacement.last(),
    ) {
        (Some(o_first), Some(o_last), Some(r_first), Some(r_last)) => {
            o_first.origin == r_first.origin
                && o_last.destination == r_last.destination
                && o_first.departure.date() == r_first.departure.date()
        }
        _ => false,
    }
}

fn passes_gate(original: &Candidate, replacement: &Candidate) -> bool {
    if !same_route_and_day(original.segments.outbound(), replacement.segments.outbound()) {
        return false;
    }
    match (original.segments.inbound(), replacement.segments.inbound()) {
        (None, None) => true,
        (Some(original_in), Some(replacement_in)) => {
            same_route_and_day(original_in, replacement_in)
        }
        _ => false,
    }
}

/// Scores a re-searched candidate against the original selection.
///
/// Returns `None` when the replacement fails the primary gate (different origin,
/// destination or departure date), which excludes it from selection entirely.
pub fn score_candidate(original: &Candidate, replacement: &Candidate) -> Option<i64> {
    if !passes_gate(original, replacement) {
        return None;
    }
    let original_first = original.first_segment()?;
    let replacement_first = replacement.first_segment()?;

    let mut score = GATE_SCORE;

    let original_count = original.segments.segment_count() as i64;
    let replacement_count = replacement.segments.segment_count() as i64;
    if original_count == replacement_count {
        score += SEGMENT_COUNT_MATCH;
    } else {
        score -= SEGMENT_COUNT_PENALTY * (original_count - replacement_count).abs();
    }

    if original_first.carrier == replacement_first.carrier {
        score += CARRIER_MATCH;
        if original_first.flight_number == replacement_first.flight_number {
            score += FLIGHT_NUMBER_MATCH;
        }
    }

    let minutes = (replacement_first.departure - original_first.departure)
        .num_minutes()
        .abs();
    if minutes <= DEPARTURE_WINDOW_MINUTES {
        score += DEPARTURE_CLOSE_BONUS - minutes / 10;
    } else {
        score += DEPARTURE_FAR_PENALTY;
    }

    Some(score)
}

/// Index and score of the strictly highest scoring candidate. Ties keep the
/// first-seen candidate.
pub fn select_best(original: &Candidate, candidates: &[Candidate]) -> Option<(usize, i64)> {
    let mut best: Option<(usize, i64)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let score = match score_candidate(original, candidate) {
            Some(score) => score,
            None => continue,
        };
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best
}

// One-way search for a single group, return search for a combined round trip
pub fn synthetic_request(original: &Candidate, context: &SearchContext) -> Option<SearchRequest> {
    let origin = original.origin()?;
    let destination = original.destination()?;
    let departure = original.departure()?;
    let return_date = original
        .segments
        .inbound()
        .and_then(|inbound| inbound.first())
        .map(|segment| segment.departure.date());

    Some(SearchRequest {
        origin: origin.to_string(),
        destination: destination.to_string(),
        departure_date: departure.date(),
        return_date,
        context: context.clone(),
    })
}

pub struct SessionRefreshMatcher {
    api: Arc<dyn BookingApi>,
}

impl SessionRefreshMatcher {
    pub fn new(api: Arc<dyn BookingApi>) -> Self {
        Self { api }
    }

    /// Searches again and returns the session (new trace plus the winning
    /// result reference) in which the original flight can be booked.
    pub async fn refresh(
        &self,
        original: &Candidate,
        context: &SearchContext,
        current: &Session,
    ) -> Result<Session, MatchError> {
        let request = synthetic_request(original, context)
            .ok_or_else(|| MatchError::UnsearchableCandidate(original.result_ref.clone()))?;

        debug!(
            expired_trace = %current.trace_id,
            origin = %request.origin,
            destination = %request.destination,
            date = %request.departure_date,
            "re-searching after expired session"
        );

        let results = self.api.search(&request).await?;

        match select_best(original, &results.candidates) {
            Some((index, score)) => {
                let winner = &results.candidates[index];
                info!(
                    expired_trace = %current.trace_id,
                    trace_id = %results.trace_id,
                    result_ref = %winner.result_ref,
                    score,
                    "session refreshed"
                );
                Ok(Session::new(&results.trace_id, &winner.result_ref))
            }
            None => {
                warn!(
                    result_ref = %original.result_ref,
                    searched = results.candidates.len(),
                    "no re-searched candidate passed the match gate"
                );
                Err(MatchError::NoMatchFound {
                    result_ref: original.result_ref.clone(),
                    searched: results.candidates.len(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SearchResults;
    use crate::testing::{candidate, dual_candidate, segment, ScriptedApi};
    use test_case::test_case;
    use tokio_test::{assert_err, assert_ok};

    fn original() -> Candidate {
        candidate(
            "OB1",
            vec![segment("6E", "201", "DEL", "BOM", "2025-06-01T06:00:00")],
        )
    }

    #[test_case("6E", "201", "BLR", "BOM", "2025-06-01T06:00:00" ; "different origin")]
    #[test_case("6E", "201", "DEL", "GOI", "2025-06-01T06:00:00" ; "different destination")]
    #[test_case("6E", "201", "DEL", "BOM", "2025-06-02T06:00:00" ; "different date")]
    fn test_gate_excludes_candidate(
        carrier: &str,
        flight: &str,
        from: &str,
        to: &str,
        departure: &str,
    ) {
        let replacement = candidate("N1", vec![segment(carrier, flight, from, to, departure)]);
        assert_eq!(score_candidate(&original(), &replacement), None);
        assert_eq!(select_best(&original(), &[replacement]), None);
    }

    #[test_case("6E", "201", "2025-06-01T06:00:00" => Some(185) ; "exact same flight")]
    #[test_case("6E", "201", "2025-06-01T06:50:00" => Some(180) ; "same flight moved 50 minutes")]
    #[test_case("6E", "999", "2025-06-01T06:00:00" => Some(175) ; "carrier only")]
    #[test_case("AI", "201", "2025-06-01T06:00:00" => Some(155) ; "other carrier")]
    #[test_case("AI", "887", "2025-06-01T09:00:00" => Some(145) ; "far departure")]
    #[test_case("AI", "887", "2025-06-01T23:59:00" => Some(145) ; "late departure same day")]
    fn test_score_single_segment(carrier: &str, flight: &str, departure: &str) -> Option<i64> {
        let replacement = candidate("N1", vec![segment(carrier, flight, "DEL", "BOM", departure)]);
        score_candidate(&original(), &replacement)
    }

    #[test]
    fn test_segment_count_mismatch_is_penalised_per_segment() {
        let connecting = candidate(
            "N1",
            vec![
                segment("6E", "201", "DEL", "AMD", "2025-06-01T06:00:00"),
                segment("6E", "305", "AMD", "HYD", "2025-06-01T09:00:00"),
                segment("6E", "411", "HYD", "BOM", "2025-06-01T13:00:00"),
            ],
        );
        // 100 - 2*10 + 20 + 10 + 5
        assert_eq!(score_candidate(&original(), &connecting), Some(115));
    }

    #[test]
    fn test_full_match_never_scores_below_gate_only_match() {
        let full = candidate("N1", vec![segment("6E", "201", "DEL", "BOM", "2025-06-01T11:00:00")]);
        let gate_only = candidate(
            "N2",
            vec![
                segment("AI", "887", "DEL", "NAG", "2025-06-01T06:00:00"),
                segment("AI", "629", "NAG", "BOM", "2025-06-01T08:00:00"),
            ],
        );
        let full_score = score_candidate(&original(), &full).unwrap();
        let gate_score = score_candidate(&original(), &gate_only).unwrap();
        assert!(full_score >= gate_score);
    }

    #[test]
    fn test_ties_keep_first_seen_candidate() {
        let a = candidate("A", vec![segment("AI", "887", "DEL", "BOM", "2025-06-01T06:00:00")]);
        let b = candidate("B", vec![segment("AI", "887", "DEL", "BOM", "2025-06-01T06:00:00")]);
        assert_eq!(select_best(&original(), &[a, b]), Some((0, 155)));
    }

    #[test]
    fn test_select_best_among_170_100_and_gated_out() {
        let original = candidate(
            "OB1",
            vec![segment("6E", "201", "DEL", "BOM", "2025-06-01T06:00:00")],
        );
        let scores_100 = candidate(
            "N100",
            vec![
                segment("6E", "777", "DEL", "AMD", "2025-06-01T06:50:00"),
                segment("6E", "778", "AMD", "HYD", "2025-06-01T09:00:00"),
                segment("6E", "779", "HYD", "BOM", "2025-06-01T12:00:00"),
            ],
        );
        let scores_170 = candidate(
            "N170",
            vec![segment("6E", "555", "DEL", "BOM", "2025-06-01T06:50:00")],
        );
        let gated_out = candidate(
            "NX",
            vec![segment("6E", "201", "DEL", "BOM", "2025-06-03T06:00:00")],
        );

        assert_eq!(score_candidate(&original, &scores_100), Some(100));
        assert_eq!(score_candidate(&original, &scores_170), Some(170));
        assert_eq!(
            select_best(&original, &[scores_100, scores_170, gated_out]),
            Some((1, 170))
        );
    }

    #[test]
    fn test_dual_group_gate_checks_inbound_too() {
        let original = dual_candidate(
            "RT1",
            vec![segment("EK", "511", "DEL", "DXB", "2025-06-01T04:00:00")],
            vec![segment("EK", "512", "DXB", "DEL", "2025-06-10T22:00:00")],
        );
        let same = dual_candidate(
            "RT2",
            vec![segment("EK", "511", "DEL", "DXB", "2025-06-01T04:00:00")],
            vec![segment("EK", "512", "DXB", "DEL", "2025-06-10T22:00:00")],
        );
        let wrong_return_day = dual_candidate(
            "RT3",
            vec![segment("EK", "511", "DEL", "DXB", "2025-06-01T04:00:00")],
            vec![segment("EK", "512", "DXB", "DEL", "2025-06-11T22:00:00")],
        );
        let one_way = candidate(
            "OW",
            vec![segment("EK", "511", "DEL", "DXB", "2025-06-01T04:00:00")],
        );

        assert_eq!(score_candidate(&original, &same), Some(185));
        assert_eq!(score_candidate(&original, &wrong_return_day), None);
        assert_eq!(score_candidate(&original, &one_way), None);

        let request = synthetic_request(&original, &SearchContext::default()).unwrap();
        assert_eq!(request.destination, "DXB");
        assert_eq!(request.return_date.map(|d| d.to_string()), Some("2025-06-10".to_string()));
    }

    #[test]
    fn test_synthetic_request_spans_first_origin_to_last_destination() {
        let connecting = candidate(
            "OB1",
            vec![
                segment("6E", "201", "DEL", "AMD", "2025-06-01T06:00:00"),
                segment("6E", "305", "AMD", "BOM", "2025-06-01T09:00:00"),
            ],
        );
        let context = SearchContext {
            adults: 2,
            direct_only: true,
            ..SearchContext::default()
        };
        let request = synthetic_request(&connecting, &context).unwrap();
        assert_eq!(request.origin, "DEL");
        assert_eq!(request.destination, "BOM");
        assert_eq!(request.departure_date.to_string(), "2025-06-01");
        assert_eq!(request.return_date, None);
        assert_eq!(request.context, context);
    }

    #[tokio::test]
    async fn test_refresh_returns_new_trace_and_winning_ref() {
        let api = Arc::new(ScriptedApi::new());
        api.on_search(Ok(SearchResults {
            trace_id: "T2".to_string(),
            candidates: vec![
                candidate("N1", vec![segment("AI", "887", "DEL", "BOM", "2025-06-01T09:00:00")]),
                candidate("N2", vec![segment("6E", "201", "DEL", "BOM", "2025-06-01T06:00:00")]),
            ],
        }));

        let matcher = SessionRefreshMatcher::new(api.clone());
        let session = assert_ok!(
            matcher
                .refresh(&original(), &SearchContext::default(), &Session::new("T1", "OB1"))
                .await
        );

        assert_eq!(session, Session::new("T2", "N2"));
        assert_eq!(api.search_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_gate_pass_is_no_match() {
        let api = Arc::new(ScriptedApi::new());
        api.on_search(Ok(SearchResults {
            trace_id: "T2".to_string(),
            candidates: vec![candidate(
                "N1",
                vec![segment("6E", "201", "DEL", "GOI", "2025-06-01T06:00:00")],
            )],
        }));

        let matcher = SessionRefreshMatcher::new(api);
        let err = assert_err!(
            matcher
                .refresh(&original(), &SearchContext::default(), &Session::new("T1", "OB1"))
                .await
        );
        assert_eq!(
            err,
            MatchError::NoMatchFound {
                result_ref: "OB1".to_string(),
                searched: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_round_trip_runs_return_search_and_matches_both_directions() {
        let original = dual_candidate(
            "RT1",
            vec![segment("EK", "511", "DEL", "DXB", "2025-06-01T04:00:00")],
            vec![segment("EK", "512", "DXB", "DEL", "2025-06-10T22:00:00")],
        );
        let api = Arc::new(ScriptedApi::new());
        api.on_search(Ok(SearchResults {
            trace_id: "T9".to_string(),
            candidates: vec![
                candidate(
                    "OW",
                    vec![segment("EK", "511", "DEL", "DXB", "2025-06-01T04:00:00")],
                ),
                dual_candidate(
                    "RT-late",
                    vec![segment("EK", "511", "DEL", "DXB", "2025-06-01T04:00:00")],
                    vec![segment("EK", "512", "DXB", "DEL", "2025-06-11T22:00:00")],
                ),
                dual_candidate(
                    "RT-same",
                    vec![segment("EK", "511", "DEL", "DXB", "2025-06-01T04:30:00")],
                    vec![segment("EK", "512", "DXB", "DEL", "2025-06-10T22:00:00")],
                ),
            ],
        }));

        let matcher = SessionRefreshMatcher::new(api.clone());
        let session = assert_ok!(
            matcher
                .refresh(&original, &SearchContext::default(), &Session::new("T1", "RT1"))
                .await
        );
        assert_eq!(session, Session::new("T9", "RT-same"));

        let requests = api.search_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].origin, "DEL");
        assert_eq!(requests[0].destination, "DXB");
        assert_eq!(
            requests[0].return_date.map(|d| d.to_string()),
            Some("2025-06-10".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_surfaces_search_failure() {
        let api = Arc::new(ScriptedApi::new());
        api.on_search(Err(ApiError::Timeout(60_000)));

        let matcher = SessionRefreshMatcher::new(api);
        let err = assert_err!(
            matcher
                .refresh(&original(), &SearchContext::default(), &Session::new("T1", "OB1"))
                .await
        );
        assert_eq!(err, MatchError::UpstreamError(ApiError::Timeout(60_000)));
    }
}

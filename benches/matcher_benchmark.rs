use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flight_booking_engine::model::{Candidate, Fare, Segment, SegmentGroups};
use flight_booking_engine::{score_candidate, select_best};
use rand::{seq::SliceRandom, thread_rng, Rng};
use rust_decimal::Decimal;

const CARRIERS: [&str; 5] = ["6E", "AI", "UK", "SG", "QP"];
const HUBS: [&str; 4] = ["AMD", "HYD", "BLR", "NAG"];

fn departure_base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

fn segment(
    carrier: &str,
    flight: u32,
    origin: &str,
    destination: &str,
    departure: NaiveDateTime,
) -> Segment {
    Segment {
        carrier: carrier.to_string(),
        flight_number: flight.to_string(),
        origin: origin.to_string(),
        destination: destination.to_string(),
        departure,
        arrival: departure + Duration::hours(2),
    }
}

// A realistic re-search result: mostly DEL-BOM the same day, some connecting,
// a few on the wrong date so the gate has work to do
fn random_candidates(count: usize) -> Vec<Candidate> {
    let mut rng = thread_rng();
    let base = departure_base();

    (0..count)
        .map(|i| {
            let carrier = CARRIERS.choose(&mut rng).unwrap();
            let day_offset = if rng.gen_ratio(1, 10) { 1 } else { 0 };
            let departure =
                base + Duration::days(day_offset) + Duration::minutes(rng.gen_range(0..1440));
            let segments = if rng.gen_bool(0.3) {
                let hub = HUBS.choose(&mut rng).unwrap();
                vec![
                    segment(carrier, rng.gen_range(100..999), "DEL", hub, departure),
                    segment(
                        carrier,
                        rng.gen_range(100..999),
                        hub,
                        "BOM",
                        departure + Duration::hours(3),
                    ),
                ]
            } else {
                vec![segment(carrier, rng.gen_range(100..999), "DEL", "BOM", departure)]
            };
            Candidate {
                result_ref: format!("OB{}", i),
                segments: SegmentGroups::SingleSegmentGroup { segments },
                fare: Fare::new(
                    "INR",
                    Decimal::from(rng.gen_range(3000..9000)),
                    Decimal::from(900),
                ),
            }
        })
        .collect()
}

fn original() -> Candidate {
    Candidate {
        result_ref: "ORIGINAL".to_string(),
        segments: SegmentGroups::SingleSegmentGroup {
            segments: vec![segment("6E", 201, "DEL", "BOM", departure_base() + Duration::hours(6))],
        },
        fare: Fare::new("INR", Decimal::from(4000), Decimal::from(1000)),
    }
}

pub fn select_best_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_refresh_matcher");
    let original = original();

    for size in [10, 100, 1000].iter() {
        let candidates = random_candidates(*size);
        group.bench_with_input(BenchmarkId::new("select_best", size), &candidates, |b, candidates| {
            b.iter(|| select_best(black_box(&original), black_box(candidates)))
        });
    }

    group.finish();
}

pub fn score_benchmark(c: &mut Criterion) {
    let original = original();
    let replacement = random_candidates(1).remove(0);
    c.bench_function("score_candidate", |b| {
        b.iter(|| score_candidate(black_box(&original), black_box(&replacement)))
    });
}

criterion_group!(benches, select_best_benchmark, score_benchmark);
criterion_main!(benches);

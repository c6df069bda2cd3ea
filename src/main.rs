// flight-booker CLI
// Books a prepared itinerary against the configured upstream and prints the outcome as JSON

use anyhow::Context;
use clap::Parser;
use flight_booking_engine::logging::init_tracing;
use flight_booking_engine::{
    AncillarySelection, BookingOrchestrator, BookingStatus, EngineConfig, HttpBookingApi, Itinerary,
    PassengerManifest,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "flight-booker",
    version,
    about = "Revalidate, reserve and ticket a flight itinerary"
)]
struct Args {
    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Booking request: itinerary, passenger manifest and per-leg ancillaries (JSON)
    #[arg(short, long)]
    request: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Deserialize)]
struct BookingRequest {
    itinerary: Itinerary,
    manifest: PassengerManifest,
    #[serde(default)]
    ancillaries: Vec<AncillarySelection>,
}

async fn book(args: &Args) -> anyhow::Result<BookingStatus> {
    let config = EngineConfig::from_file(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let raw = std::fs::read_to_string(&args.request)
        .with_context(|| format!("reading booking request {}", args.request.display()))?;
    let request: BookingRequest = serde_json::from_str(&raw).context("parsing booking request")?;

    let api = HttpBookingApi::new(config.upstream.clone()).context("building upstream client")?;
    let api = Arc::new(api);
    let orchestrator = BookingOrchestrator::new(api.clone(), &config);

    let outcome = orchestrator
        .run(&request.itinerary, &request.manifest, &request.ancillaries)
        .await;

    tracing::debug!(stats = ?api.stats(), "upstream client stats");
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.status)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(args.verbose, args.json_logs) {
        eprintln!("{}", e);
        return ExitCode::from(1);
    }

    match book(&args).await {
        Ok(BookingStatus::Success) => ExitCode::SUCCESS,
        Ok(BookingStatus::PartialFailure) => {
            tracing::warn!("booking partially failed, see failed legs in the outcome");
            ExitCode::from(2)
        }
        Ok(BookingStatus::Failure) => ExitCode::from(1),
        Err(e) => {
            tracing::error!("booking aborted: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

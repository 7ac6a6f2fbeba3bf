//! Basic scan example demonstrating a weighted multi-engine verdict.
//!
//! This example shows how to:
//! - Build a consensus engine from three adapters
//! - Build a ScanService
//! - Scan a file and read the verdict and effective weights
//!
//! Run with: cargo run --example basic_scan

use scanquorum::prelude::*;
use std::io::Write;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Scanquorum Basic Scan Example ===\n");

    // Mock engines stand in for bytescale, cloudmersive and clamav
    let engine = ConsensusEngine::builder()
        .add_engine(MockAdapter::clean().with_name("bytescale"), 34.0)
        .add_engine(MockAdapter::clean().with_name("cloudmersive"), 37.0)
        .add_engine(MockAdapter::clean().with_name("clamav"), 29.0)
        .build()?;

    let service = ScanService::builder().with_engine(engine).build()?;

    // In practice this would be an uploaded file
    let mut upload = tempfile::NamedTempFile::new()?;
    upload.write_all(b"This is the content of a clean file.")?;

    let user = UserSession::new("user-123")?;
    let target = ScanTarget::from_path(upload.path()).with_filename("document.txt");

    println!("Scanning file: {:?}", target.filename());
    let response = service.scan_file(&user, target, ScanOptions::new()).await?;
    print_report(&response);

    // One engine down for this attempt: its weight moves to the others
    println!("\n\n=== Scanning with clamav disabled ===\n");
    let target = ScanTarget::from_path(upload.path()).with_filename("document.txt");
    let response = service
        .scan_file(&user, target, ScanOptions::new().disable_engine("clamav"))
        .await?;
    print_report(&response);

    Ok(())
}

fn print_report(response: &ScanResponse) {
    let report = &response.report;

    println!("\n=== Scan Results ===");
    println!("Operation ID: {}", response.operation_id);
    println!("Duration: {:?}", report.duration);

    for outcome in &report.outcomes {
        println!(
            "  - {:<13} {:<10} weight {:>5.1}%  {}",
            outcome.engine,
            outcome.kind,
            report.allocation.weight(&outcome.engine),
            outcome.failure_reason
        );
    }

    let verdict = &report.verdict;
    match verdict.category {
        VerdictCategory::Safe => println!("\n✅ SAFE ({:.2})", verdict.weighted_score),
        VerdictCategory::Suspicious => {
            println!("\n⚠️ SUSPICIOUS ({:.2})", verdict.weighted_score)
        }
        VerdictCategory::Malicious => println!("\n❌ MALICIOUS ({:.2})", verdict.weighted_score),
        VerdictCategory::Unknown => println!("\n❔ UNKNOWN: too few engines answered"),
    }

    if let Some(error) = response.coverage_error {
        println!("  {}", error);
    }
}

//! Custom adapter example.
//!
//! This example shows how to:
//! - Implement the `EngineAdapter` trait for your own engine
//! - Honor the cancellation token
//! - Report ordinary failures as outcomes instead of errors
//!
//! Run with: cargo run --example custom_backend

use async_trait::async_trait;
use scanquorum::prelude::*;
use std::io::Write;
use tokio_util::sync::CancellationToken;

/// An engine that flags files containing a marker string.
#[derive(Debug)]
struct MarkerEngine {
    marker: &'static [u8],
}

#[async_trait]
impl EngineAdapter for MarkerEngine {
    fn name(&self) -> &str {
        "marker"
    }

    async fn scan(
        &self,
        target: &ScanTarget,
        cancel: &CancellationToken,
    ) -> Result<EngineOutcome, EngineError> {
        if cancel.is_cancelled() {
            return Ok(EngineOutcome::cancelled(self.name()));
        }

        let data = match target.read().await {
            Ok(data) => data,
            Err(e) => return Ok(EngineOutcome::unknown(self.name(), e.to_string())),
        };

        if data.windows(self.marker.len()).any(|w| w == self.marker) {
            Ok(EngineOutcome::infected(self.name(), "Marker.Test"))
        } else {
            Ok(EngineOutcome::clean(self.name()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Scanquorum Custom Adapter Example ===\n");

    let engine = ConsensusEngine::builder()
        .add_engine(MarkerEngine { marker: b"X5O!P%@AP" }, 50.0)
        .add_engine(MockAdapter::clean().with_name("clamav"), 30.0)
        .add_engine(MockAdapter::clean().with_name("cloudmersive"), 20.0)
        .build()?;

    let user = UserSession::new("custom-demo")?;
    let service = ScanService::builder().with_engine(engine).build()?;

    for (name, content) in [
        ("clean.txt", b"nothing to see here".as_slice()),
        ("eicar.com", b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR".as_slice()),
    ] {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(content)?;

        let response = service
            .scan_file(
                &user,
                ScanTarget::from_path(file.path()).with_filename(name),
                ScanOptions::new(),
            )
            .await?;

        let verdict = &response.report.verdict;
        println!(
            "{:<10} -> {} (score {:.2}, {} of {} engines detected)",
            name,
            verdict.category,
            verdict.weighted_score,
            verdict.malicious_count,
            verdict.valid_result_count
        );
    }

    Ok(())
}

//! Per-user cancellation example.
//!
//! This example shows how to:
//! - Subscribe to a user's activity feed
//! - Stop every operation of one user without touching another user
//! - Stop everything and observe the global-stop cooldown
//!
//! Run with: cargo run --example user_isolation

use scanquorum::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Scanquorum User Isolation Example ===\n");

    let activity = Arc::new(BroadcastActivity::new());
    let registry = Arc::new(
        OperationRegistry::new(RegistryConfig::default()).with_activity(activity.clone()),
    );
    let reaper = IdleReaper::spawn(registry.clone());

    let alice = UserSession::new("alice-session")?;
    let bob = UserSession::new("bob-session")?;

    let mut alice_feed = activity.subscribe(&alice);
    tokio::spawn(async move {
        while let Ok(event) = alice_feed.recv().await {
            println!("  [alice feed] {}", event.kind());
        }
    });

    let a1 = registry.open(
        &alice,
        OperationKind::Scan,
        OperationMetadata::new().with_filename("report.pdf"),
    )?;
    let _a2 = registry.open(&alice, OperationKind::Download, OperationMetadata::new())?;
    let b1 = registry.open(
        &bob,
        OperationKind::Scan,
        OperationMetadata::new().with_filename("photo.png"),
    )?;

    registry.touch(
        &a1.id,
        "clamav_scan_start",
        serde_json::json!({"engine": "clamav", "status": "starting"}),
    )?;

    let status = registry.status(None);
    println!("Open operations: {} across {:?} users", status.operations.len(), status.user_count);

    let stopped = registry.cancel_user(&alice).await;
    println!("\nStopped {} operations for alice: {:?}", stopped.count, stopped.ids);
    println!("Bob's scan still running: {}", !b1.is_cancelled());

    let stopped = registry.cancel_all().await;
    println!("\nGlobal stop cancelled {} operations", stopped.count);

    match registry.open(&bob, OperationKind::Scan, OperationMetadata::new()) {
        Err(RegistryError::SystemStopping { retry_after }) => {
            println!("New scans refused, retry in {:?}", retry_after);
        }
        other => println!("Unexpected: {:?}", other.map(|h| h.id)),
    }

    tokio::time::sleep(registry.config().global_stop_cooldown + Duration::from_millis(100)).await;
    let reopened = registry.open(&bob, OperationKind::Scan, OperationMetadata::new())?;
    println!("After cooldown, opened {}", reopened.id);

    reaper.shutdown().await;
    Ok(())
}

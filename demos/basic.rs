//! Basic example: guest and customer limits from a TOML file.
//!
//! Run with: `cargo run --example basic`
//!
//! Set `RUST_LOG=admission_throttle=debug` to see every decision.

use admission_throttle::{
    AdmissionController, DefaultClassifier, EnforcementGate, FileConfig, MockClock, Principal,
    RequestMetadata, ScopedLimitPolicy, ORDER_REQUEST_TYPE_ID,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
[deployment]
backpressure_logger = "memory"

[backpressure]
enabled = true
limit = 5
guest_limit = 3
period = 60
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("admission_throttle=info")),
        )
        .init();

    let config = Arc::new(FileConfig::from_toml(CONFIG)?);
    // A mock clock lets the example skip ahead without sleeping
    let clock = MockClock::new(Instant::now());

    let controller = AdmissionController::builder()
        .with_gate(EnforcementGate::new(config.clone(), config.clone()))
        .with_policy(Arc::new(ScopedLimitPolicy::new(config)))
        .with_clock(Arc::new(clock.clone()))
        .build()?;

    let guest = RequestMetadata {
        request_type_id: ORDER_REQUEST_TYPE_ID.to_string(),
        remote_addr: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        principal: None,
    };
    let customer = RequestMetadata {
        principal: Some(Principal {
            user_id: "1001".to_string(),
            identity_code: 1,
        }),
        ..guest.clone()
    };

    println!("=== Admission Control Example ===\n");
    println!("Policy: guests 3/min, customers 5/min\n");

    println!("Guest places 5 orders in 5 seconds:");
    for i in 1..=5 {
        let decision = controller.check_request(&DefaultClassifier, &guest)?;
        match decision.rejection() {
            None => println!("  order {i}: admitted"),
            Some(rejection) => println!(
                "  order {i}: rejected, retry in {}s",
                rejection.retry_after_secs().unwrap_or_default()
            ),
        }
        clock.advance(Duration::from_secs(1));
    }

    println!("\nCustomer from the same address (separate counter):");
    for i in 1..=6 {
        let decision = controller.check_request(&DefaultClassifier, &customer)?;
        println!(
            "  order {i}: {}",
            if decision.is_admitted() { "admitted" } else { "rejected" }
        );
    }

    println!("\nOne minute later the guest window has drained:");
    clock.advance(Duration::from_secs(60));
    let decision = controller.check_request(&DefaultClassifier, &guest)?;
    println!("  order 6: {}", if decision.is_admitted() { "admitted" } else { "rejected" });

    let snapshot = controller.metrics().snapshot();
    println!("\n=== Metrics ===");
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}

//! Example: a request log shared through Redis.
//!
//! Several processes pointed at the same Redis share one set of windows, so
//! a caller gets the same allowance however requests are spread.
//!
//! Start Redis:
//! ```bash
//! docker run -p 6379:6379 redis:7-alpine
//! ```
//!
//! Run the example (twice at once to see the shared limit):
//! ```bash
//! cargo run --example redis --features redis-log
//! ```

use admission_throttle::{
    AdmissionController, CircuitBreakerConfig, EnforcementGate, MemoryConfig, RedisLogConfig,
    RedisRequestLog, RequestContext, Scope, ScopedLimitPolicy, ENABLED_CONFIG_PATH,
    LOGGER_CONFIG_PATH, ORDER_REQUEST_TYPE_ID,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("admission_throttle=debug")),
        )
        .init();

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let log = RedisRequestLog::connect_with_config(
        &url,
        RedisLogConfig {
            key_prefix: "admission_throttle_demo:".to_string(),
            timeout: Duration::from_millis(200),
            ..RedisLogConfig::default()
        },
    )
    .await?;

    let config = Arc::new(MemoryConfig::new());
    config.set_deployment(LOGGER_CONFIG_PATH, "redis");
    config.set_scoped(ENABLED_CONFIG_PATH, Scope::Default, "1");
    config.set_scoped("sales/backpressure/guest_limit", Scope::Default, "10");
    config.set_scoped("sales/backpressure/period", Scope::Default, "30");

    let controller = AdmissionController::builder()
        .with_gate(EnforcementGate::new(config.clone(), config.clone()))
        .with_policy(Arc::new(ScopedLimitPolicy::new(config)))
        .with_request_log(Arc::new(log))
        .with_circuit_breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(5),
        })
        .build()?;

    let guest = RequestContext::anonymous(
        IpAddr::V4(Ipv4Addr::new(198, 51, 100, 20)),
        ORDER_REQUEST_TYPE_ID,
    );

    println!("Guest limit: 10 per 30s, shared by every process using this Redis\n");
    for i in 1..=15 {
        let decision = controller.check(&guest)?;
        println!(
            "request {i:>2}: {}",
            if decision.is_admitted() { "admitted" } else { "rejected" }
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    println!("\nCircuit: {:?}", controller.circuit_breaker().state());
    println!("Metrics: {:?}", controller.metrics().snapshot());
    Ok(())
}

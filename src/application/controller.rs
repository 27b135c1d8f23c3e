//! Admission decision pipeline.
//!
//! A check walks `Idle → EnforcementChecked → PolicyResolved → CountChecked`
//! and ends in `Admitted` or `Rejected`:
//!
//! 1. Enforcement gate inactive: admit, touch nothing else.
//! 2. Resolve `(limit, window)`; a configuration error aborts the check.
//! 3. Count the identity's requests in the trailing window.
//! 4. Below the limit: admit and record the request.
//! 5. At or above the limit: reject; nothing is recorded.
//!
//! Recorded requests are never retracted, even if the caller later abandons
//! the admitted work.

use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::application::gate::EnforcementGate;
use crate::application::metrics::Metrics;
use crate::application::policy::LimitPolicy;
use crate::application::ports::{Clock, ContextClassifier, RequestLog, RequestMetadata};
use crate::domain::context::RequestContext;
use crate::domain::decision::{AdmissionDecision, Rejection};
use crate::domain::error::{
    AdmissionError, AdmissionStage, BackingStoreError, BuildError, ConfigurationError,
};
use crate::domain::limit::LimitConfig;
use crate::domain::window::WindowOutcome;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::memory_log::MemoryRequestLog;
use std::panic;
use std::sync::Arc;
use std::time::Instant;

/// What to do when the request log fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Admit the request without recording it.
    ///
    /// An outage of the request log does not become an outage of the
    /// protected operation; protection is weaker until the log recovers.
    #[default]
    FailOpen,
    /// Return the backing-store error to the caller.
    FailClosed,
}

/// How the window check and the recording are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountingMode {
    /// Check and record in one atomic log operation. Never admits more than
    /// `limit` requests per window, even when callers' clock reads race.
    #[default]
    Atomic,
    /// Count, then record in a separate call. Concurrent requests for one
    /// identity near the limit can all see room, so a window may briefly
    /// admit more than `limit` (at most one extra per concurrent caller).
    /// The retry hint comes from the log when it can report one.
    CountThenRecord,
}

/// Decides per request whether to admit or reject.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    gate: EnforcementGate,
    policy: Arc<dyn LimitPolicy>,
    log: Arc<dyn RequestLog>,
    clock: Arc<dyn Clock>,
    circuit_breaker: Arc<CircuitBreaker>,
    metrics: Metrics,
    failure_policy: FailurePolicy,
    counting_mode: CountingMode,
}

type StageResult<T> = Result<T, (AdmissionStage, BackingStoreError)>;

impl AdmissionController {
    /// Start building a controller.
    pub fn builder() -> AdmissionControllerBuilder {
        AdmissionControllerBuilder::default()
    }

    /// Decide whether the request described by `context` is admitted.
    ///
    /// # Errors
    /// - `AdmissionError::Configuration` if the gate or the limit cannot be
    ///   read.
    /// - `AdmissionError::BackingStore` if the request log fails and the
    ///   failure policy is [`FailurePolicy::FailClosed`].
    pub fn check(&self, context: &RequestContext) -> Result<AdmissionDecision, AdmissionError> {
        let span = tracing::debug_span!(
            "admission",
            request_type = context.request_type_id(),
            identity = context.identity_key(),
        );
        let _enter = span.enter();

        if !self.enforcement_active()? {
            return Ok(self.bypass());
        }
        self.decide(context)
    }

    /// Classify the request, then decide as [`check`](Self::check) does.
    ///
    /// The gate is consulted before classification, so a disabled gate never
    /// runs the classifier.
    ///
    /// # Errors
    /// As [`check`](Self::check); a classification failure is a
    /// configuration error.
    pub fn check_request(
        &self,
        classifier: &dyn ContextClassifier,
        metadata: &RequestMetadata,
    ) -> Result<AdmissionDecision, AdmissionError> {
        let span = tracing::debug_span!(
            "admission",
            request_type = %metadata.request_type_id,
            identity = tracing::field::Empty,
        );
        let _enter = span.enter();

        if !self.enforcement_active()? {
            return Ok(self.bypass());
        }
        let context = classifier
            .classify(metadata)
            .map_err(|e| self.configuration_failure(AdmissionStage::EnforcementChecked, e))?;
        tracing::Span::current().record("identity", context.identity_key());
        self.decide(&context)
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get a reference to the circuit breaker.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// Get a reference to the request log.
    pub fn request_log(&self) -> &Arc<dyn RequestLog> {
        &self.log
    }

    /// Get a reference to the enforcement gate.
    pub fn gate(&self) -> &EnforcementGate {
        &self.gate
    }

    /// The active failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// The active counting mode.
    pub fn counting_mode(&self) -> CountingMode {
        self.counting_mode
    }

    fn enforcement_active(&self) -> Result<bool, AdmissionError> {
        self.gate
            .is_active()
            .map_err(|e| self.configuration_failure(AdmissionStage::Idle, e))
    }

    fn bypass(&self) -> AdmissionDecision {
        tracing::debug!("enforcement inactive, admitting");
        self.metrics.record_bypassed();
        AdmissionDecision::Admitted
    }

    fn decide(&self, context: &RequestContext) -> Result<AdmissionDecision, AdmissionError> {
        let limit = self
            .policy
            .resolve(context)
            .map_err(|e| self.configuration_failure(AdmissionStage::EnforcementChecked, e))?;

        if limit.rejects_all() {
            return Ok(self.reject(context, &limit, None));
        }

        if !self.circuit_breaker.allow_request() {
            return self.degrade(AdmissionStage::PolicyResolved, BackingStoreError::CircuitOpen);
        }

        let now = self.clock.now();
        let outcome = match self.counting_mode {
            CountingMode::Atomic => self.guarded(AdmissionStage::PolicyResolved, || {
                self.log
                    .try_admit(context.key(), limit.limit(), limit.window(), now)
            }),
            CountingMode::CountThenRecord => self.count_then_record(context, &limit, now),
        };

        match outcome {
            Ok(WindowOutcome::Admitted) => {
                self.circuit_breaker.record_success();
                self.metrics.record_admitted();
                tracing::debug!(limit = limit.limit(), "admitted");
                Ok(AdmissionDecision::Admitted)
            }
            Ok(WindowOutcome::Full { retry_after }) => {
                self.circuit_breaker.record_success();
                Ok(self.reject(context, &limit, Some(retry_after.unwrap_or(limit.window()))))
            }
            Err((stage, error)) => {
                self.circuit_breaker.record_failure();
                self.degrade(stage, error)
            }
        }
    }

    fn count_then_record(
        &self,
        context: &RequestContext,
        limit: &LimitConfig,
        now: Instant,
    ) -> StageResult<WindowOutcome> {
        let count = self.guarded(AdmissionStage::PolicyResolved, || {
            self.log.count(context.key(), limit.window(), now)
        })?;

        if count >= u64::from(limit.limit()) {
            let retry_after = self.guarded(AdmissionStage::CountChecked, || {
                self.log.retry_after(context.key(), limit.window(), now)
            })?;
            return Ok(WindowOutcome::Full { retry_after });
        }

        self.guarded(AdmissionStage::CountChecked, || {
            self.log.record(context.key(), now)
        })?;
        Ok(WindowOutcome::Admitted)
    }

    /// Run a request-log call, turning a panic into a backing-store error.
    fn guarded<T>(
        &self,
        stage: AdmissionStage,
        call: impl FnOnce() -> Result<T, BackingStoreError>,
    ) -> StageResult<T> {
        match panic::catch_unwind(panic::AssertUnwindSafe(call)) {
            Ok(result) => result.map_err(|e| (stage, e)),
            Err(_) => Err((
                stage,
                BackingStoreError::Unavailable("request log panicked".to_string()),
            )),
        }
    }

    fn reject(
        &self,
        context: &RequestContext,
        limit: &LimitConfig,
        retry_after: Option<std::time::Duration>,
    ) -> AdmissionDecision {
        let rejection = Rejection::new(context, retry_after);
        self.metrics.record_rejected();
        tracing::info!(
            limit = limit.limit(),
            window_secs = limit.window().as_secs(),
            retry_after_secs = rejection.retry_after_secs(),
            "request rejected by backpressure"
        );
        AdmissionDecision::Rejected(rejection)
    }

    fn degrade(
        &self,
        stage: AdmissionStage,
        error: BackingStoreError,
    ) -> Result<AdmissionDecision, AdmissionError> {
        match self.failure_policy {
            FailurePolicy::FailOpen => {
                if error == BackingStoreError::CircuitOpen {
                    tracing::debug!("request log circuit open, admitting without enforcement");
                } else {
                    tracing::warn!(%error, %stage, "request log failed, admitting without enforcement");
                }
                self.metrics.record_degraded();
                Ok(AdmissionDecision::Admitted)
            }
            FailurePolicy::FailClosed => {
                tracing::error!(%error, %stage, "request log failed");
                self.metrics.record_failed();
                Err(AdmissionError::BackingStore {
                    stage,
                    source: error,
                })
            }
        }
    }

    fn configuration_failure(
        &self,
        stage: AdmissionStage,
        error: ConfigurationError,
    ) -> AdmissionError {
        tracing::error!(%error, %stage, "backpressure misconfigured");
        self.metrics.record_failed();
        AdmissionError::Configuration {
            stage,
            source: error,
        }
    }
}

/// Builder for constructing an [`AdmissionController`].
#[derive(Default)]
pub struct AdmissionControllerBuilder {
    gate: Option<EnforcementGate>,
    policy: Option<Arc<dyn LimitPolicy>>,
    log: Option<Arc<dyn RequestLog>>,
    clock: Option<Arc<dyn Clock>>,
    circuit_breaker: CircuitBreakerConfig,
    metrics: Option<Metrics>,
    failure_policy: FailurePolicy,
    counting_mode: CountingMode,
}

impl AdmissionControllerBuilder {
    /// Set the enforcement gate (required).
    pub fn with_gate(mut self, gate: EnforcementGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Set the limit policy (required).
    pub fn with_policy(mut self, policy: Arc<dyn LimitPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the request log. Defaults to an in-memory log.
    pub fn with_request_log(mut self, log: Arc<dyn RequestLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Set a custom clock. Defaults to the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Configure the circuit breaker around the request log.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Share an existing metrics tracker.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the behavior on request-log failure. Defaults to fail-open.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the counting mode. Defaults to atomic.
    pub fn with_counting_mode(mut self, mode: CountingMode) -> Self {
        self.counting_mode = mode;
        self
    }

    /// Build the controller.
    ///
    /// # Errors
    /// Returns `BuildError` if the gate or the policy is missing, or if the
    /// circuit breaker threshold is zero.
    pub fn build(self) -> Result<AdmissionController, BuildError> {
        let gate = self.gate.ok_or(BuildError::MissingGate)?;
        let policy = self.policy.ok_or(BuildError::MissingPolicy)?;
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(BuildError::ZeroFailureThreshold);
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let log: Arc<dyn RequestLog> = self
            .log
            .unwrap_or_else(|| Arc::new(MemoryRequestLog::new()));
        let circuit_breaker = Arc::new(CircuitBreaker::with_config(
            self.circuit_breaker,
            Arc::clone(&clock),
        ));

        Ok(AdmissionController {
            gate,
            policy,
            log,
            clock,
            circuit_breaker,
            metrics: self.metrics.unwrap_or_default(),
            failure_policy: self.failure_policy,
            counting_mode: self.counting_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::circuit_breaker::CircuitState;
    use crate::application::gate::{ENABLED_CONFIG_PATH, LOGGER_CONFIG_PATH};
    use crate::application::policy::{ScopedLimitPolicy, ORDER_REQUEST_TYPE_ID};
    use crate::application::ports::Scope;
    use crate::infrastructure::config::MemoryConfig;
    use crate::infrastructure::mocks::{FailingRequestLog, MockClock};
    use std::time::Duration;

    struct Fixture {
        config: Arc<MemoryConfig>,
        clock: MockClock,
        log: Arc<MemoryRequestLog>,
    }

    impl Fixture {
        fn new(limit: u32, guest_limit: u32, period: u64) -> Self {
            let config = Arc::new(MemoryConfig::new());
            config.set_deployment(LOGGER_CONFIG_PATH, "memory");
            config.set_scoped(ENABLED_CONFIG_PATH, Scope::Store, "1");
            config.set_scoped("sales/backpressure/limit", Scope::Store, limit.to_string());
            config.set_scoped(
                "sales/backpressure/guest_limit",
                Scope::Store,
                guest_limit.to_string(),
            );
            config.set_scoped("sales/backpressure/period", Scope::Store, period.to_string());

            Self {
                config,
                clock: MockClock::new(Instant::now()),
                log: Arc::new(MemoryRequestLog::new()),
            }
        }

        fn builder(&self) -> AdmissionControllerBuilder {
            AdmissionController::builder()
                .with_gate(EnforcementGate::new(
                    self.config.clone(),
                    self.config.clone(),
                ))
                .with_policy(Arc::new(ScopedLimitPolicy::new(self.config.clone())))
                .with_request_log(self.log.clone())
                .with_clock(Arc::new(self.clock.clone()))
        }

        fn controller(&self) -> AdmissionController {
            self.builder().build().unwrap()
        }
    }

    fn guest(addr: &str) -> RequestContext {
        RequestContext::new(
            crate::domain::context::IdentityType::AnonymousByAddress,
            addr,
            ORDER_REQUEST_TYPE_ID,
        )
    }

    #[test]
    fn test_admits_up_to_limit_then_rejects() {
        let fx = Fixture::new(3, 3, 60);
        let controller = fx.controller();
        let ctx = RequestContext::customer("42", ORDER_REQUEST_TYPE_ID);

        for _ in 0..3 {
            assert!(controller.check(&ctx).unwrap().is_admitted());
        }
        let decision = controller.check(&ctx).unwrap();
        assert!(decision.is_rejected());
        assert_eq!(decision.rejection().unwrap().retry_after_secs(), Some(60));

        assert_eq!(controller.metrics().admitted(), 3);
        assert_eq!(controller.metrics().rejected(), 1);
    }

    #[test]
    fn test_bypass_does_not_touch_log() {
        let fx = Fixture::new(1, 1, 60);
        fx.config.set_scoped(ENABLED_CONFIG_PATH, Scope::Store, "0");
        let controller = fx.controller();
        let ctx = guest("1.2.3.4");

        for _ in 0..10 {
            assert!(controller.check(&ctx).unwrap().is_admitted());
        }

        assert!(fx.log.is_empty());
        assert_eq!(controller.metrics().bypassed(), 10);
        assert_eq!(controller.metrics().admitted(), 0);
    }

    #[test]
    fn test_zero_limit_rejects_first_request() {
        let fx = Fixture::new(5, 0, 60);
        let controller = fx.controller();

        let decision = controller.check(&guest("1.2.3.4")).unwrap();
        assert!(decision.is_rejected());
        assert_eq!(decision.rejection().unwrap().retry_after(), None);
        assert!(fx.log.is_empty());
    }

    #[test]
    fn test_guest_and_customer_limits_differ() {
        let fx = Fixture::new(3, 1, 60);
        let controller = fx.controller();
        let customer = RequestContext::customer("42", ORDER_REQUEST_TYPE_ID);
        let anon = guest("1.2.3.4");

        assert!(controller.check(&anon).unwrap().is_admitted());
        assert!(controller.check(&anon).unwrap().is_rejected());

        for _ in 0..3 {
            assert!(controller.check(&customer).unwrap().is_admitted());
        }
        assert!(controller.check(&customer).unwrap().is_rejected());
    }

    #[test]
    fn test_retry_after_tracks_oldest_entry() {
        let fx = Fixture::new(2, 2, 60);
        let controller = fx.controller();
        let ctx = guest("1.2.3.4");

        assert!(controller.check(&ctx).unwrap().is_admitted());
        fx.clock.advance(Duration::from_secs(10));
        assert!(controller.check(&ctx).unwrap().is_admitted());
        fx.clock.advance(Duration::from_secs(5));

        let decision = controller.check(&ctx).unwrap();
        assert_eq!(decision.rejection().unwrap().retry_after_secs(), Some(45));
    }

    #[test]
    fn test_configuration_error_is_fatal() {
        let fx = Fixture::new(3, 3, 60);
        fx.config
            .set_scoped("sales/backpressure/period", Scope::Store, "soon");
        let controller = fx.controller();

        let err = controller
            .check(&RequestContext::customer("42", ORDER_REQUEST_TYPE_ID))
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.stage(), AdmissionStage::EnforcementChecked);
        assert!(fx.log.is_empty());
        assert_eq!(controller.metrics().failed(), 1);
    }

    #[test]
    fn test_count_then_record_mode() {
        let fx = Fixture::new(2, 2, 60);
        let controller = fx
            .builder()
            .with_counting_mode(CountingMode::CountThenRecord)
            .build()
            .unwrap();
        let ctx = guest("1.2.3.4");

        assert!(controller.check(&ctx).unwrap().is_admitted());
        assert!(controller.check(&ctx).unwrap().is_admitted());
        let decision = controller.check(&ctx).unwrap();
        assert_eq!(decision.rejection().unwrap().retry_after_secs(), Some(60));
        assert_eq!(fx.log.len(), 1);
    }

    #[test]
    fn test_retry_hint_same_in_both_modes() {
        for mode in [CountingMode::Atomic, CountingMode::CountThenRecord] {
            let fx = Fixture::new(2, 2, 60);
            let controller = fx.builder().with_counting_mode(mode).build().unwrap();
            let ctx = guest("1.2.3.4");

            assert!(controller.check(&ctx).unwrap().is_admitted());
            fx.clock.advance(Duration::from_secs(10));
            assert!(controller.check(&ctx).unwrap().is_admitted());
            fx.clock.advance(Duration::from_secs(5));

            let decision = controller.check(&ctx).unwrap();
            assert_eq!(
                decision.rejection().unwrap().retry_after_secs(),
                Some(45),
                "{mode:?}"
            );
        }
    }

    #[test]
    fn test_fail_open_on_log_failure() {
        let fx = Fixture::new(1, 1, 60);
        let failing = Arc::new(FailingRequestLog::new());
        let controller = fx
            .builder()
            .with_request_log(failing.clone())
            .build()
            .unwrap();
        let ctx = guest("1.2.3.4");

        assert!(controller.check(&ctx).unwrap().is_admitted());
        assert!(controller.check(&ctx).unwrap().is_admitted());
        assert_eq!(controller.metrics().degraded(), 2);
        assert_eq!(controller.circuit_breaker().consecutive_failures(), 2);
    }

    #[test]
    fn test_fail_closed_surfaces_error() {
        let fx = Fixture::new(1, 1, 60);
        let controller = fx
            .builder()
            .with_request_log(Arc::new(FailingRequestLog::new()))
            .with_failure_policy(FailurePolicy::FailClosed)
            .build()
            .unwrap();

        let err = controller.check(&guest("1.2.3.4")).unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::BackingStore {
                stage: AdmissionStage::PolicyResolved,
                source: BackingStoreError::Unavailable(_),
            }
        ));
    }

    #[test]
    fn test_open_circuit_skips_log() {
        let fx = Fixture::new(1, 1, 60);
        let failing = Arc::new(FailingRequestLog::new());
        let controller = fx
            .builder()
            .with_request_log(failing.clone())
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(30),
            })
            .build()
            .unwrap();
        let ctx = guest("1.2.3.4");

        controller.check(&ctx).unwrap();
        controller.check(&ctx).unwrap();
        assert_eq!(controller.circuit_breaker().state(), CircuitState::Open);
        let calls = failing.calls();

        for _ in 0..5 {
            assert!(controller.check(&ctx).unwrap().is_admitted());
        }
        assert_eq!(failing.calls(), calls);
        assert_eq!(controller.metrics().degraded(), 7);
    }

    #[test]
    fn test_circuit_recovers_after_timeout() {
        let fx = Fixture::new(1, 1, 60);
        let failing = Arc::new(FailingRequestLog::new());
        let controller = fx
            .builder()
            .with_request_log(failing.clone())
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(30),
            })
            .build()
            .unwrap();
        let ctx = guest("1.2.3.4");

        controller.check(&ctx).unwrap();
        assert_eq!(controller.circuit_breaker().state(), CircuitState::Open);

        failing.set_failing(false);
        fx.clock.advance(Duration::from_secs(30));

        assert!(controller.check(&ctx).unwrap().is_admitted());
        assert_eq!(controller.circuit_breaker().state(), CircuitState::Closed);
        assert!(controller.check(&ctx).unwrap().is_rejected());
    }

    #[test]
    fn test_build_requires_gate_and_policy() {
        assert!(matches!(
            AdmissionController::builder().build(),
            Err(BuildError::MissingGate)
        ));

        let fx = Fixture::new(1, 1, 60);
        let missing_policy = AdmissionController::builder()
            .with_gate(EnforcementGate::new(fx.config.clone(), fx.config.clone()))
            .build();
        assert!(matches!(missing_policy, Err(BuildError::MissingPolicy)));

        let zero_threshold = fx
            .builder()
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 0,
                recovery_timeout: Duration::from_secs(1),
            })
            .build();
        assert!(matches!(zero_threshold, Err(BuildError::ZeroFailureThreshold)));
    }
}

//! Enforcement gate behavior as seen through the controller.

use admission_throttle::{
    AdmissionController, AdmissionStage, ConfigurationError, DeploymentConfig, EnforcementGate,
    EnforcementState, MemoryConfig, MemoryRequestLog, RequestContext, Scope, ScopedLimitPolicy,
    ENABLED_CONFIG_PATH, LOGGER_CONFIG_PATH, ORDER_REQUEST_TYPE_ID,
};
use std::sync::Arc;

fn store_limits(config: &MemoryConfig) {
    config.set_scoped("sales/backpressure/limit", Scope::Default, "1");
    config.set_scoped("sales/backpressure/guest_limit", Scope::Default, "1");
    config.set_scoped("sales/backpressure/period", Scope::Default, "60");
}

fn controller_over(
    deployment: Arc<dyn DeploymentConfig>,
    config: Arc<MemoryConfig>,
) -> (AdmissionController, Arc<MemoryRequestLog>) {
    let log = Arc::new(MemoryRequestLog::new());
    let controller = AdmissionController::builder()
        .with_gate(EnforcementGate::new(deployment, config.clone()))
        .with_policy(Arc::new(ScopedLimitPolicy::new(config)))
        .with_request_log(log.clone())
        .build()
        .unwrap();
    (controller, log)
}

#[test]
fn test_store_enabled_without_logger_is_inactive() {
    let config = Arc::new(MemoryConfig::new());
    store_limits(&config);
    config.set_scoped(ENABLED_CONFIG_PATH, Scope::Store, "1");
    let (controller, log) = controller_over(config.clone(), config.clone());

    assert_eq!(
        controller.gate().state().unwrap(),
        EnforcementState {
            logger_configured: false,
            store_enabled: true,
        }
    );

    let ctx = RequestContext::customer("42", ORDER_REQUEST_TYPE_ID);
    for _ in 0..5 {
        assert!(controller.check(&ctx).unwrap().is_admitted());
    }
    assert!(log.is_empty());
}

#[test]
fn test_gate_skips_policy_when_inactive() {
    // A broken policy is never consulted while enforcement is off
    let config = Arc::new(MemoryConfig::new());
    config.set_scoped("sales/backpressure/period", Scope::Default, "never");
    let (controller, _) = controller_over(config.clone(), config.clone());

    let ctx = RequestContext::customer("42", ORDER_REQUEST_TYPE_ID);
    assert!(controller.check(&ctx).unwrap().is_admitted());

    config.set_deployment(LOGGER_CONFIG_PATH, "memory");
    config.set_scoped(ENABLED_CONFIG_PATH, Scope::Default, "yes");
    assert!(controller.check(&ctx).unwrap_err().is_configuration());
}

#[derive(Debug)]
struct BrokenDeployment;

impl DeploymentConfig for BrokenDeployment {
    fn get(&self, _path: &str) -> Result<Option<String>, ConfigurationError> {
        Err(ConfigurationError::unreadable("env.php missing"))
    }
}

#[test]
fn test_unreadable_deployment_config_is_an_error() {
    let config = Arc::new(MemoryConfig::new());
    store_limits(&config);
    config.set_scoped(ENABLED_CONFIG_PATH, Scope::Store, "1");
    let (controller, log) = controller_over(Arc::new(BrokenDeployment), config);

    let err = controller
        .check(&RequestContext::customer("42", ORDER_REQUEST_TYPE_ID))
        .unwrap_err();

    assert_eq!(err.stage(), AdmissionStage::Idle);
    assert!(err.is_configuration());
    assert!(log.is_empty());
    assert_eq!(controller.metrics().failed(), 1);
}

#[test]
fn test_numeric_flag_other_than_one_enables() {
    let config = Arc::new(MemoryConfig::new());
    store_limits(&config);
    config.set_deployment(LOGGER_CONFIG_PATH, "redis");
    config.set_scoped(ENABLED_CONFIG_PATH, Scope::Store, "2");
    let (controller, log) = controller_over(config.clone(), config);

    let ctx = RequestContext::customer("42", ORDER_REQUEST_TYPE_ID);
    assert!(controller.check(&ctx).unwrap().is_admitted());
    assert!(controller.check(&ctx).unwrap().is_rejected());
    assert_eq!(log.entries(), 1);
}

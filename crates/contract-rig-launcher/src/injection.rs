// crates/contract-rig-launcher/src/injection.rs
// ============================================================================
// Module: Configuration Injection
// Description: Environment handed to the service under test.
// Purpose: Wire dependency coordinates, the test-mode flag, and relaxed rate
//          limits into one deterministic map.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Computes the environment handed to the launched service.

use std::collections::BTreeMap;

use contract_rig_config::ServiceConfig;
use contract_rig_core::SandboxEndpoints;

/// Builds the service environment. Explicit `service.env` entries win over
/// computed ones.
#[must_use]
pub fn service_env(config: &ServiceConfig, endpoints: &SandboxEndpoints) -> BTreeMap<String, String> {
    let names = &config.env_names;
    let relational = &endpoints.relational;
    let mut env = BTreeMap::from([
        (names.relational_host.clone(), relational.host.clone()),
        (names.relational_port.clone(), relational.port.to_string()),
        (names.relational_user.clone(), relational.credentials.user.clone()),
        (names.relational_password.clone(), relational.credentials.password.clone()),
        (names.relational_database.clone(), relational.database_name.clone()),
        (names.kv_url.clone(), endpoints.key_value.connection_url()),
        (names.test_mode.clone(), "1".to_string()),
    ]);
    env.extend(config.rate_limits.iter().map(|(key, value)| (key.clone(), value.clone())));
    env.extend(config.env.iter().map(|(key, value)| (key.clone(), value.clone())));
    env
}

// crates/contract-rig-launcher/src/address.rs
// ============================================================================
// Module: Address Computation
// Description: Rewrites loopback endpoints for services behind a boundary.
// Purpose: A containerized service cannot reach the host via 127.0.0.1, so
//          dependency hosts are replaced with the bridge gateway address.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Host rewriting for services that run behind a container boundary.

use std::net::IpAddr;

use contract_rig_core::SandboxEndpoints;

/// Docker's default bridge gateway on Linux.
pub const LINUX_BRIDGE_FALLBACK: &str = "172.17.0.1";
/// Host alias provided by Docker Desktop.
pub const DESKTOP_HOST_ALIAS: &str = "host.docker.internal";

/// Picks the gateway for `os` given the address reported by the runtime.
///
/// On Linux the inspected bridge gateway wins when it parses as an IP, else
/// the well-known default; elsewhere the desktop host alias is used.
#[must_use]
pub fn platform_gateway(os: &str, inspected: Option<&str>) -> String {
    if os != "linux" {
        return DESKTOP_HOST_ALIAS.to_string();
    }
    inspected
        .map(str::trim)
        .filter(|candidate| candidate.parse::<IpAddr>().is_ok())
        .map_or_else(|| LINUX_BRIDGE_FALLBACK.to_string(), str::to_string)
}

/// Returns true for hosts that only mean "this machine".
#[must_use]
pub fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_matches(['[', ']'])
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback() || ip.is_unspecified())
}

/// Returns endpoints as seen from inside the boundary. Non-loopback hosts are
/// already routable and kept.
#[must_use]
pub fn endpoints_for_service(endpoints: &SandboxEndpoints, gateway: Option<&str>) -> SandboxEndpoints {
    let Some(gateway) = gateway else {
        return endpoints.clone();
    };
    let mut rewritten = endpoints.clone();
    if is_loopback_host(&endpoints.relational.host) {
        rewritten.relational.host = gateway.to_string();
    }
    if is_loopback_host(&endpoints.key_value.host) {
        rewritten.key_value.host = gateway.to_string();
    }
    rewritten
}

/// Extra host entries letting the service resolve the desktop alias on Linux.
#[must_use]
pub fn extra_hosts_for(gateway: Option<&str>) -> Vec<String> {
    match gateway {
        Some(address) if address.parse::<IpAddr>().is_ok() => {
            vec![format!("{DESKTOP_HOST_ALIAS}:{address}")]
        }
        _ => Vec::new(),
    }
}

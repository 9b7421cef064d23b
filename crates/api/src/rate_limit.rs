//! Per-client rate limiting for the control API
//!
//! GCRA via tower_governor, keyed by peer IP. The detection loop is never
//! throttled; only HTTP callers are.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config with X-RateLimit-* response headers
pub type ControlGovernorConfig = GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request
    pub per_second: u64,
    /// Requests allowed back to back
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst_size: 20,
        }
    }
}

/// Build the governor config, or `None` if either quota value is zero.
///
/// Needs `into_make_service_with_connect_info::<SocketAddr>()` for the peer IP.
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<ControlGovernorConfig>> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}

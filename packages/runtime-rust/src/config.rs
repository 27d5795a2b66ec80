use std::time::Duration;

use serde::Deserialize;

use crate::events::RetryPolicy;
use crate::telemetry::TelemetryConfig;

/// Backoff schedule applied to failing listeners, in milliseconds.
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 5] = [200, 400, 800, 1_600, 3_200];

/// Runtime-level configuration for pipelines and event dispatch.
///
/// Every field has a default, so partial documents deserialize.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Timeout applied to requests that do not carry their own, in milliseconds.
    pub default_timeout_ms: u64,
    /// Maximum number of concurrently executing requests before load shedding.
    pub max_concurrent_requests: u32,
    /// Delays between listener attempts. Its length is the number of retries.
    pub retry_delays_ms: Vec<u64>,
    /// Maximum number of cached query responses.
    pub cache_capacity: usize,
    pub behaviors: BehaviorConfig,
    pub telemetry: TelemetryConfig,
}

impl CourierConfig {
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(&self.retry_delays_ms)
    }
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            max_concurrent_requests: 1_000,
            retry_delays_ms: DEFAULT_RETRY_DELAYS_MS.to_vec(),
            cache_capacity: 1_024,
            behaviors: BehaviorConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Switches for the standard behaviors placed in front of every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct BehaviorConfig {
    pub instrument: bool,
    pub load_shed: bool,
    pub timeout: bool,
    pub authorization: bool,
    pub validation: bool,
    pub unit_of_work: bool,
}

impl BehaviorConfig {
    /// No standard behaviors: handlers run bare unless behaviors are added per request.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            instrument: false,
            load_shed: false,
            timeout: false,
            authorization: false,
            validation: false,
            unit_of_work: false,
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            instrument: true,
            load_shed: true,
            timeout: true,
            authorization: true,
            validation: true,
            unit_of_work: true,
        }
    }
}

//! Orchestrator tunables.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};

/// Global knobs that tune orchestrator behaviour.
///
/// All fields carry defaults so deployments only spell out what they change.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How long a probe list discovered from the broker stays valid (seconds).
    pub probe_cache_ttl_secs: i64,
    /// Reserved queue carrying job results; never reported as a probe.
    pub results_queue: String,
    /// Rolling window over which tenant quota is consumed (seconds).
    pub quota_window_secs: i64,
    /// What happens to already dispatched jobs when a request is rejected
    /// part way through.
    pub on_abort: AbortPolicy,
    /// Document lock tuning.
    pub lock: LockConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            probe_cache_ttl_secs: 60,
            results_queue: "brain".to_string(),
            quota_window_secs: 24 * 60 * 60,
            on_abort: AbortPolicy::default(),
            lock: LockConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Rejects values the orchestrator cannot run with. Call once at load.
    pub fn validate(&self) -> Result<()> {
        seconds("orchestrator.probe_cache_ttl_secs", self.probe_cache_ttl_secs)?;
        let window = seconds("orchestrator.quota_window_secs", self.quota_window_secs)?;
        if window.is_zero() {
            return Err(WardenError::InvalidConfig(
                "orchestrator.quota_window_secs must be positive".to_string(),
            ));
        }
        if self.results_queue.trim().is_empty() {
            return Err(WardenError::InvalidConfig(
                "orchestrator.results_queue must not be empty".to_string(),
            ));
        }
        self.lock.validate()
    }

    pub fn probe_cache_ttl(&self) -> chrono::Duration {
        clamped(self.probe_cache_ttl_secs)
    }

    pub fn quota_window(&self) -> chrono::Duration {
        clamped(self.quota_window_secs)
    }
}

/// Non-negative `value` seconds as a duration, or an `InvalidConfig` naming
/// `field`.
fn seconds(field: &str, value: i64) -> Result<chrono::Duration> {
    if value < 0 {
        return Err(WardenError::InvalidConfig(format!(
            "{field} must not be negative (got {value})"
        )));
    }
    chrono::Duration::try_seconds(value).ok_or_else(|| {
        WardenError::InvalidConfig(format!("{field} is out of range (got {value})"))
    })
}

// Unvalidated configs saturate instead of panicking.
fn clamped(value: i64) -> chrono::Duration {
    chrono::Duration::try_seconds(value.max(0)).unwrap_or(chrono::Duration::MAX)
}

/// Rollback behaviour when an unknown probe or missing probe list aborts a
/// dispatch after earlier files already produced jobs.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    /// Leave already dispatched jobs running.
    #[default]
    Keep,
    /// Revoke (terminate) every job dispatched by the aborted call.
    Revoke,
}

/// Document lock tuning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    /// A lock held longer than this without release may be reclaimed (seconds).
    pub timeout_secs: i64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl LockConfig {
    pub fn validate(&self) -> Result<()> {
        seconds("orchestrator.lock.timeout_secs", self.timeout_secs).map(|_| ())
    }

    pub fn timeout(&self) -> chrono::Duration {
        clamped(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_payloads_fall_back_to_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"on_abort": "revoke", "lock": {}}"#).unwrap();
        assert_eq!(config.on_abort, AbortPolicy::Revoke);
        assert_eq!(config.probe_cache_ttl_secs, 60);
        assert_eq!(config.results_queue, "brain");
        assert_eq!(config.lock.timeout(), chrono::Duration::seconds(60));
        assert_eq!(config.quota_window(), chrono::Duration::hours(24));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_seconds_are_rejected_not_panicking() {
        let config = OrchestratorConfig {
            probe_cache_ttl_secs: i64::MAX,
            ..OrchestratorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, WardenError::InvalidConfig(ref msg) if msg.contains("probe_cache_ttl_secs")));
        assert_eq!(config.probe_cache_ttl(), chrono::Duration::MAX);

        let config = OrchestratorConfig {
            lock: LockConfig { timeout_secs: i64::MIN },
            ..OrchestratorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WardenError::InvalidConfig(ref msg)) if msg.contains("lock.timeout_secs")
        ));
        assert_eq!(config.lock.timeout(), chrono::Duration::zero());
    }

    #[test]
    fn quota_window_must_be_positive() {
        let config = OrchestratorConfig {
            quota_window_secs: 0,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(config.validate(), Err(WardenError::InvalidConfig(_))));

        let config = OrchestratorConfig {
            quota_window_secs: -5,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(config.validate(), Err(WardenError::InvalidConfig(_))));
        assert_eq!(config.quota_window(), chrono::Duration::zero());
    }
}

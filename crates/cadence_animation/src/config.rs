//! Scheduler configuration
//!
//! Resolved once when a [`TimeManager`](crate::scheduler::TimeManager) is
//! created, and can be loaded from TOML:
//!
//! ```toml
//! slow_motion_factor = 4.0
//! independent_animations_enabled = false
//! error_policy = "fail-fast"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ErrorPolicy};

/// Settings for the timing engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Divides the rate at which logical time advances (debug slow motion)
    pub slow_motion_factor: f64,
    /// Allow animations to be handed off to the compositor
    pub independent_animations_enabled: bool,
    /// Handling of begin-time authoring errors
    pub error_policy: ErrorPolicy,
    /// Drop cached compositor conversions when a target leaves the tree
    pub discard_composition_on_detach: bool,
    /// Logical time never advances
    pub lock_time_to_zero: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slow_motion_factor: 1.0,
            independent_animations_enabled: true,
            error_policy: ErrorPolicy::Raise,
            discard_composition_on_detach: true,
            lock_time_to_zero: false,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.slow_motion_factor.is_finite() || self.slow_motion_factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "slow_motion_factor must be positive, got {}",
                self.slow_motion_factor
            )));
        }
        Ok(())
    }

    pub fn with_slow_motion_factor(mut self, factor: f64) -> Self {
        self.slow_motion_factor = factor;
        self
    }

    pub fn with_independent_animations(mut self, enabled: bool) -> Self {
        self.independent_animations_enabled = enabled;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_discard_composition_on_detach(mut self, discard: bool) -> Self {
        self.discard_composition_on_detach = discard;
        self
    }

    pub fn with_lock_time_to_zero(mut self, lock: bool) -> Self {
        self.lock_time_to_zero = lock;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.slow_motion_factor, 1.0);
        assert!(config.independent_animations_enabled);
        assert_eq!(config.error_policy, ErrorPolicy::Raise);
    }

    #[test]
    fn test_from_toml() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            slow_motion_factor = 4.0
            error_policy = "fail-fast"
            "#,
        )
        .unwrap();
        assert_eq!(config.slow_motion_factor, 4.0);
        assert_eq!(config.error_policy, ErrorPolicy::FailFast);
        // Unspecified fields keep their defaults
        assert!(config.discard_composition_on_detach);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            SchedulerConfig::from_toml_str("slow_motion_factor = 0.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SchedulerConfig::from_toml_str("slow_motion_factor = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }
}

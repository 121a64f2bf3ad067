//! # Configuration
//!
//! Runtime-tunable settings for a `Campus`. Every field has a default, so a
//! partial TOML table (or none at all) is a valid configuration.

use crate::primitives::{
    DEFAULT_ACTIVITY_LOG_CAP, DEFAULT_ALERT_TTL_DAYS, DEFAULT_MAINTENANCE_INTERVAL_SECS,
    DEFAULT_PASSWORD_COST, DEFAULT_SESSION_TTL_HOURS, MAX_ALERT_TTL_DAYS, MAX_SESSION_TTL_HOURS,
};
use crate::{CampusError, CampusResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Settings for the workflows and background maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampusConfig {
    /// Lifetime of an issued session.
    pub session_ttl_hours: i64,
    /// Alert lifetime when the creator gives no expiry.
    pub alert_default_ttl_days: i64,
    /// Activity-log entries kept by the trim pass.
    pub activity_log_cap: usize,
    /// Seconds between maintenance passes.
    pub maintenance_interval_secs: u64,
    /// scrypt cost parameter (log2 N).
    pub password_cost: u8,
}

impl Default for CampusConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            alert_default_ttl_days: DEFAULT_ALERT_TTL_DAYS,
            activity_log_cap: DEFAULT_ACTIVITY_LOG_CAP,
            maintenance_interval_secs: DEFAULT_MAINTENANCE_INTERVAL_SECS,
            password_cost: DEFAULT_PASSWORD_COST,
        }
    }
}

impl CampusConfig {
    /// Reject values no workflow can operate with.
    pub fn validate(&self) -> CampusResult<()> {
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.session_ttl_hours) {
            return Err(CampusError::Validation(format!(
                "session_ttl_hours must be between 1 and {}",
                MAX_SESSION_TTL_HOURS
            )));
        }
        if !(1..=MAX_ALERT_TTL_DAYS).contains(&self.alert_default_ttl_days) {
            return Err(CampusError::Validation(format!(
                "alert_default_ttl_days must be between 1 and {}",
                MAX_ALERT_TTL_DAYS
            )));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(CampusError::Validation(
                "maintenance_interval_secs must be positive".to_string(),
            ));
        }
        if !(1..=20).contains(&self.password_cost) {
            return Err(CampusError::Validation(
                "password_cost must be between 1 and 20".to_string(),
            ));
        }
        Ok(())
    }

    /// Session lifetime as a duration, clamped to the accepted range.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS))
    }

    /// Default alert lifetime as a duration, clamped to the accepted range.
    #[must_use]
    pub fn alert_default_ttl(&self) -> Duration {
        Duration::days(self.alert_default_ttl_days.clamp(1, MAX_ALERT_TTL_DAYS))
    }

    /// Maintenance interval as a std duration (for the scheduler).
    #[must_use]
    pub fn maintenance_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.maintenance_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CampusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_ttl(), Duration::hours(24));
        assert_eq!(config.alert_default_ttl(), Duration::days(7));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: CampusConfig =
            serde_json::from_str(r#"{"activity_log_cap": 50}"#).expect("parse");
        assert_eq!(config.activity_log_cap, 50);
        assert_eq!(config.session_ttl_hours, DEFAULT_SESSION_TTL_HOURS);
    }

    #[test]
    fn rejects_zero_ttl() {
        let config = CampusConfig {
            session_ttl_hours: 0,
            ..CampusConfig::default()
        };
        assert!(matches!(config.validate(), Err(CampusError::Validation(_))));
    }

    #[test]
    fn rejects_huge_ttls_and_clamps_durations() {
        let huge_session = CampusConfig {
            session_ttl_hours: i64::MAX,
            ..CampusConfig::default()
        };
        assert!(matches!(huge_session.validate(), Err(CampusError::Validation(_))));
        assert_eq!(huge_session.session_ttl(), Duration::hours(MAX_SESSION_TTL_HOURS));

        let huge_alert = CampusConfig {
            alert_default_ttl_days: i64::MAX,
            ..CampusConfig::default()
        };
        assert!(huge_alert.validate().is_err());
        assert_eq!(huge_alert.alert_default_ttl(), Duration::days(MAX_ALERT_TTL_DAYS));
    }

    #[test]
    fn rejects_out_of_range_cost() {
        let config = CampusConfig {
            password_cost: 0,
            ..CampusConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

//! # App Configuration
//!
//! Optional TOML file plus environment overrides.
//!
//! ```toml
//! database = "/var/lib/campus/campus.redb"
//!
//! [campus]
//! session_ttl_hours = 12
//! activity_log_cap = 5000
//! maintenance_interval_secs = 900
//! ```
//!
//! Database path precedence: `--database` flag, then `CAMPUS_DB`, then the
//! file's `database`, then `campus.redb`.

use campus_core::{CampusConfig, CampusError, CampusResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the database file.
pub const DB_ENV: &str = "CAMPUS_DB";

/// Database file used when nothing else names one.
pub const DEFAULT_DATABASE: &str = "campus.redb";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database: Option<PathBuf>,
    pub campus: CampusConfig,
}

impl AppConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> CampusResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| CampusError::Validation(format!("Invalid config: {}", e)))?;
        config.campus.validate()?;
        Ok(config)
    }

    /// Load `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> CampusResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let metadata = std::fs::metadata(path).map_err(|e| {
            CampusError::Validation(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(CampusError::Validation(format!(
                "Config file '{}' is larger than {} bytes",
                path.display(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            CampusError::Validation(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(event = "config_loaded", path = %path.display());
        Ok(config)
    }

    /// Resolve the database path from the flag, the environment value and
    /// the file, in that order.
    #[must_use]
    pub fn database_path(&self, flag: Option<PathBuf>, env: Option<String>) -> PathBuf {
        flag.or_else(|| env.filter(|v| !v.trim().is_empty()).map(PathBuf::from))
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }
}

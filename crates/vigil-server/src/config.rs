use serde::{Deserialize, Serialize};
use vigil_audit::AuditConfig;
use vigil_auth::GuardConfig;

/// Root application configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [logging]
/// level = "info"
/// json = false
///
/// [guard]
/// stages = ["identity_binding", "concurrent_session"]
///
/// [guard.session]
/// max_concurrent_sessions = 3
/// session_ttl = "30m"
///
/// [audit]
/// checksum_algorithm = "sha256"
/// queue_capacity = 1024
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        self.guard.validate().map_err(|e| format!("guard: {e}"))?;
        self.audit.validate().map_err(|e| format!("audit: {e}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "vigil.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., VIGIL__GUARD__SESSION__MAX_CONCURRENT_SESSIONS=5
        builder = builder.add_source(
            Environment::with_prefix("VIGIL")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("guard.stages"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("logging.level"));
    }

    #[test]
    fn test_guard_errors_are_prefixed() {
        let mut cfg = AppConfig::default();
        cfg.guard.session.max_concurrent_sessions = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.starts_with("guard: "));
    }
}

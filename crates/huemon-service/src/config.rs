//! Monitor configuration.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use huemon_core::DEFAULT_PRODUCT_NAME;
use huemon_types::{IntervalSpec, PolicySettings};

/// Monitor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bridge connection settings.
    pub bridge: BridgeConfig,
    /// Policy engine settings.
    pub policy: PolicyConfig,
    /// Daily CSV export.
    pub export: ExportConfig,
    /// Alert delivery.
    pub notifications: NotificationConfig,
    /// Per-sensor policies.
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

impl Config {
    /// Load `huemon.toml` from the platform config directory, or defaults if absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Read and parse a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return all errors at once.
    ///
    /// This checks:
    /// - Bridge address is set and timeouts are within bounds
    /// - Policy tick interval is between 5 seconds and 1 hour
    /// - The webhook URL, if any, is an http(s) URL
    /// - Every sensor entry names an id or a name, at most once
    ///
    /// The bridge application key is not required here; it may be obtained
    /// by pairing. Quiet periods that do not parse are reported by
    /// [`warnings`](Self::warnings) instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.bridge.validate());
        errors.extend(self.policy.validate());
        errors.extend(self.export.validate());
        errors.extend(self.notifications.validate());

        let mut seen = HashSet::new();
        for (i, sensor) in self.sensors.iter().enumerate() {
            let prefix = format!("sensors[{}]", i);
            errors.extend(sensor.validate(&prefix));

            if let Some(key) = sensor.key()
                && !seen.insert(key.to_string())
            {
                errors.push(ValidationError {
                    field: prefix,
                    message: format!("duplicate sensor '{}'", key),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Problems that leave the monitor running with a policy switched off.
    pub fn warnings(&self) -> Vec<ValidationError> {
        self.sensors
            .iter()
            .enumerate()
            .flat_map(|(i, sensor)| sensor.warnings(&format!("sensors[{}]", i)))
            .collect()
    }

    /// [`load`](Self::load) followed by [`validate`](Self::validate).
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Per-sensor settings keyed by sensor id and by name.
    pub fn policies(&self) -> HashMap<String, PolicySettings> {
        let mut policies = HashMap::new();
        for sensor in &self.sensors {
            for key in [sensor.id.as_ref(), sensor.name.as_ref()].into_iter().flatten() {
                policies.insert(key.clone(), sensor.settings.clone());
            }
        }
        policies
    }
}

/// Bridge connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge host name or IP address.
    pub address: String,
    /// Application key; obtained with `huemon pair` when absent.
    pub app_key: Option<String>,
    /// Product name of the devices to monitor.
    pub product_name: String,
    /// Bound for short requests in seconds.
    pub request_timeout_secs: u64,
    /// Re-open the event stream after this many seconds without data.
    pub idle_timeout_secs: u64,
    pub pairing_attempts: u32,
    pub pairing_interval_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            app_key: None,
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            request_timeout_secs: 3,
            idle_timeout_secs: 86_400,
            pairing_attempts: 30,
            pairing_interval_secs: 5,
        }
    }
}

/// Maximum request timeout in seconds.
pub const MAX_REQUEST_TIMEOUT: u64 = 60;
/// Minimum idle timeout in seconds.
pub const MIN_IDLE_TIMEOUT: u64 = 60;

impl BridgeConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.address.trim().is_empty() {
            errors.push(ValidationError {
                field: "bridge.address".to_string(),
                message: "bridge address cannot be empty".to_string(),
            });
        }
        if let Some(key) = &self.app_key
            && key.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "bridge.app_key".to_string(),
                message: "app key cannot be empty string (omit it to pair)".to_string(),
            });
        }
        if self.product_name.is_empty() {
            errors.push(ValidationError {
                field: "bridge.product_name".to_string(),
                message: "product name cannot be empty".to_string(),
            });
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > MAX_REQUEST_TIMEOUT {
            errors.push(ValidationError {
                field: "bridge.request_timeout_secs".to_string(),
                message: format!(
                    "request timeout {} must be between 1 and {} seconds",
                    self.request_timeout_secs, MAX_REQUEST_TIMEOUT
                ),
            });
        }
        if self.idle_timeout_secs < MIN_IDLE_TIMEOUT {
            errors.push(ValidationError {
                field: "bridge.idle_timeout_secs".to_string(),
                message: format!(
                    "idle timeout {} is too short (minimum {} seconds)",
                    self.idle_timeout_secs, MIN_IDLE_TIMEOUT
                ),
            });
        }
        if self.pairing_attempts == 0 {
            errors.push(ValidationError {
                field: "bridge.pairing_attempts".to_string(),
                message: "pairing needs at least one attempt".to_string(),
            });
        }
        if self.pairing_interval_secs == 0 {
            errors.push(ValidationError {
                field: "bridge.pairing_interval_secs".to_string(),
                message: "pairing interval cannot be 0".to_string(),
            });
        }

        errors
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Policy engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Seconds between policy ticks.
    pub tick_interval_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
        }
    }
}

/// Minimum tick interval in seconds.
pub const MIN_TICK_INTERVAL: u64 = 5;
/// Maximum tick interval in seconds (1 hour).
pub const MAX_TICK_INTERVAL: u64 = 3600;

impl PolicyConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.tick_interval_secs < MIN_TICK_INTERVAL {
            errors.push(ValidationError {
                field: "policy.tick_interval_secs".to_string(),
                message: format!(
                    "tick interval {} is too short (minimum {} seconds)",
                    self.tick_interval_secs, MIN_TICK_INTERVAL
                ),
            });
        } else if self.tick_interval_secs > MAX_TICK_INTERVAL {
            errors.push(ValidationError {
                field: "policy.tick_interval_secs".to_string(),
                message: format!(
                    "tick interval {} is too long (maximum {} seconds / 1 hour)",
                    self.tick_interval_secs, MAX_TICK_INTERVAL
                ),
            });
        }
        errors
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

/// Daily CSV export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,
    /// Root directory; one sub-directory per day.
    pub directory: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_export_dir(),
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.enabled && self.directory.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "export.directory".to_string(),
                message: "export directory cannot be empty".to_string(),
            });
        }
        errors
    }
}

/// Alert delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// POST alerts here as JSON; alerts are only logged when absent.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 5,
        }
    }
}

impl NotificationConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Some(url) = &self.webhook_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "notifications.webhook_url".to_string(),
                message: format!("URL must start with http:// or https://, got: {}", url),
            });
        }
        if self.timeout_secs == 0 || self.timeout_secs > MAX_REQUEST_TIMEOUT {
            errors.push(ValidationError {
                field: "notifications.timeout_secs".to_string(),
                message: format!(
                    "timeout {} must be between 1 and {} seconds",
                    self.timeout_secs, MAX_REQUEST_TIMEOUT
                ),
            });
        }
        errors
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Policy for one sensor, matched by id or display name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub settings: PolicySettings,
}

impl SensorConfig {
    /// The id if present, otherwise the name.
    pub fn key(&self) -> Option<&str> {
        self.id.as_deref().or(self.name.as_deref())
    }

    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.key().is_none_or(str::is_empty) {
            errors.push(ValidationError {
                field: prefix.to_string(),
                message: "sensor needs an id or a name".to_string(),
            });
        }

        errors
    }

    /// Settings that load fine but never take effect.
    ///
    /// A quiet period that does not parse never matches, and `suspend`
    /// without any quiet period never suspends, so the sensor just keeps
    /// reporting.
    pub fn warnings(&self, prefix: &str) -> Vec<ValidationError> {
        let mut warnings = Vec::new();

        if let Some(spec) = &self.settings.quiet_dates
            && let Err(e) = IntervalSpec::parse(spec, false)
        {
            warnings.push(ValidationError {
                field: format!("{}.quiet_dates", prefix),
                message: format!("{} (ignored)", e),
            });
        }
        if let Some(spec) = &self.settings.quiet_times
            && let Err(e) = IntervalSpec::parse(spec, true)
        {
            warnings.push(ValidationError {
                field: format!("{}.quiet_times", prefix),
                message: format!("{} (ignored)", e),
            });
        }
        if self.settings.suspend && !self.settings.has_quiet_periods() {
            warnings.push(ValidationError {
                field: format!("{}.suspend", prefix),
                message: "suspend has no effect without quiet_dates or quiet_times".to_string(),
            });
        }

        warnings
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// One rejected setting.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `bridge.address` or `sensors[0].quiet_times`).
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<config_dir>/huemon/huemon.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("huemon")
        .join("huemon.toml")
}

/// Default root directory of the daily CSV files.
pub fn default_export_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("huemon")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            bridge: BridgeConfig {
                address: "192.168.1.2".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bridge.product_name, "Hue motion sensor");
        assert_eq!(config.bridge.request_timeout_secs, 3);
        assert_eq!(config.bridge.idle_timeout_secs, 86_400);
        assert_eq!(config.policy.tick_interval_secs, 60);
        assert!(config.export.enabled);
        assert!(config.sensors.is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let toml = r#"
            [bridge]
            address = "192.168.1.2"
            app_key = "abcdef"

            [policy]
            tick_interval_secs = 30

            [export]
            directory = "/var/lib/huemon"

            [notifications]
            webhook_url = "https://hooks.example.org/motion"

            [[sensors]]
            name = "Hall"
            notify = true
            target = "ops@example.org"
            quiet_times = "22:00-23:00, 06:00-07:00"
            suspend = true

            [[sensors]]
            id = "8f1c"
            quiet_dates = "2026-12-24-2026-12-26"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.bridge.app_key.as_deref(), Some("abcdef"));
        assert_eq!(config.bridge.pairing_attempts, 30);
        assert_eq!(config.policy.tick_interval_secs, 30);
        assert_eq!(config.export.directory, PathBuf::from("/var/lib/huemon"));
        assert_eq!(config.sensors.len(), 2);
        assert!(config.sensors[0].settings.notify);
        assert!(config.sensors[0].settings.suspend);
        assert_eq!(config.sensors[1].key(), Some("8f1c"));
        assert!(config.validate().is_ok());

        let policies = config.policies();
        assert!(policies["Hall"].notify);
        assert!(policies.contains_key("8f1c"));
    }

    #[test]
    fn test_save_creates_dirs_and_roundtrips_sensors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("huemon.toml");

        let mut config = valid();
        config.bridge.app_key = Some("key".to_string());
        config.sensors.push(SensorConfig {
            name: Some("Hall".to_string()),
            settings: PolicySettings {
                notify: true,
                ..Default::default()
            },
            ..Default::default()
        });

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();
        assert_eq!(loaded.bridge.address, "192.168.1.2");
        assert_eq!(loaded.bridge.app_key.as_deref(), Some("key"));
        assert_eq!(loaded.sensors[0].name.as_deref(), Some("Hall"));
        assert!(loaded.sensors[0].settings.notify);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::load("/nonexistent/path/huemon.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_broken_toml_is_parse_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_path_layout() {
        assert!(default_config_path().ends_with("huemon/huemon.toml"));
    }

    #[test]
    fn test_default_config_needs_address() {
        let Err(ConfigError::Validation(errors)) = Config::default().validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "bridge.address");
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_all_errors_reported_at_once() {
        let mut config = valid();
        config.bridge.request_timeout_secs = 0;
        config.policy.tick_interval_secs = 1;
        config.notifications.webhook_url = Some("ftp://nope".to_string());

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "bridge.request_timeout_secs",
                "policy.tick_interval_secs",
                "notifications.webhook_url"
            ]
        );
    }

    #[test]
    fn test_sensor_validation() {
        let mut config = valid();
        config.sensors = vec![
            SensorConfig::default(),
            SensorConfig {
                name: Some("Hall".into()),
                settings: PolicySettings {
                    quiet_times: Some("25:00-26:00".into()),
                    ..Default::default()
                },
                ..Default::default()
            },
            SensorConfig {
                name: Some("Hall".into()),
                settings: PolicySettings {
                    suspend: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["sensors[0]", "sensors[2]"]);

        let warnings = config.warnings();
        let fields: Vec<_> = warnings.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["sensors[1].quiet_times", "sensors[2].suspend"]);
    }

    #[test]
    fn test_unusable_quiet_periods_only_warn() {
        let mut config = valid();
        config.sensors = vec![
            SensorConfig {
                name: Some("Hall".into()),
                settings: PolicySettings {
                    suspend: true,
                    quiet_times: Some("late evening".into()),
                    quiet_dates: Some("christmas".into()),
                    ..Default::default()
                },
                ..Default::default()
            },
            SensorConfig {
                name: Some("Attic".into()),
                settings: PolicySettings {
                    suspend: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];

        assert!(config.validate().is_ok());
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].message.ends_with("(ignored)"));
        assert_eq!(warnings[2].field, "sensors[1].suspend");
        assert!(valid().warnings().is_empty());
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let error = ConfigError::Validation(vec![ValidationError {
            field: "bridge.address".to_string(),
            message: "bridge address cannot be empty".to_string(),
        }]);
        let display = error.to_string();
        assert!(display.starts_with("Invalid configuration"));
        assert!(display.contains("  - bridge.address: bridge address cannot be empty"));
    }
}

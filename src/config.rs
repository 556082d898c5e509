//! Configuration for the Govee driver
//!
//! Devices, logging, polling and connection policy, persisted as TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use govee_light::{ConnectionConfig, SessionOptions};
use govee_transport::is_h1167;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Version written by this release
pub const CONFIG_VERSION: u32 = 2;

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when neither RUST_LOG nor --log-level is given
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Refresh scheduler and device resolution timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    15
}

fn default_scan_timeout_secs() -> u64 {
    10
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            scan_timeout_secs: default_scan_timeout_secs(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

/// Connection policy overrides; unset keys keep the engine defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_cap_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_delay_ms: Option<u64>,
}

impl ConnectionSettings {
    /// Merge the overrides into the engine defaults
    pub fn to_connection_config(&self) -> ConnectionConfig {
        let defaults = ConnectionConfig::default();
        ConnectionConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            retry_delay: self
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            initial_timeout: self
                .initial_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.initial_timeout),
            reconnect_timeout: self
                .reconnect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconnect_timeout),
            backoff_cap: self
                .backoff_cap_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_cap),
            frame_delay: self
                .frame_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.frame_delay),
        }
    }
}

/// One configured light
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Bluetooth address (AA:BB:CC:DD:EE:FF)
    pub address: String,
    /// Friendly name, usable in place of the address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Segmented color layout and 0-100 brightness.
    /// Entries from version 1 files have no key and are segmented.
    #[serde(default = "default_true")]
    pub segmented: bool,
    #[serde(default)]
    pub music_mode_support: bool,
}

fn default_true() -> bool {
    true
}

impl DeviceEntry {
    /// New entry with the creation defaults
    ///
    /// `advertised_name` is the name seen while scanning; H1167 models
    /// get music mode support.
    pub fn new(address: impl Into<String>, advertised_name: Option<&str>) -> Self {
        Self {
            address: address.into(),
            name: None,
            segmented: true,
            music_mode_support: advertised_name.is_some_and(is_h1167),
        }
    }

    /// Name if set, otherwise the address
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// Whether `key` names this entry (address is case-insensitive)
    pub fn matches(&self, key: &str) -> bool {
        self.address.eq_ignore_ascii_case(key) || self.name.as_deref() == Some(key)
    }

    pub fn session_options(&self, connection: &ConnectionSettings) -> SessionOptions {
        SessionOptions {
            segmented: self.segmented,
            music_mode_support: self.music_mode_support,
            connection: connection.to_connection_config(),
        }
    }
}

/// Complete driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Missing in files written by the first release
    #[serde(default = "legacy_version")]
    pub version: u32,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

fn legacy_version() -> u32 {
    1
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            logging: LoggingConfig::default(),
            polling: PollingConfig::default(),
            connection: ConnectionSettings::default(),
            devices: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("govee-ble")
            .join("devices.toml")
    }

    /// Parse a config document, migrating older versions in memory
    ///
    /// Returns the config and whether it was migrated.
    pub fn parse(content: &str) -> anyhow::Result<(Self, bool)> {
        let mut config: AppConfig = toml::from_str(content)?;
        if config.version > CONFIG_VERSION {
            anyhow::bail!(
                "Config version {} is newer than supported version {}",
                config.version,
                CONFIG_VERSION
            );
        }
        let migrated = config.version < CONFIG_VERSION;
        if migrated {
            debug!("Migrating configuration from version {}", config.version);
            // Version 1 entries deserialize as segmented already
            config.version = CONFIG_VERSION;
        }
        Ok((config, migrated))
    }

    /// Load config from a file, or return default if not found
    ///
    /// A migrated file is saved back at the current version.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let (config, migrated) = Self::parse(&content)?;
        if migrated {
            config.save(path)?;
            info!(
                "Migrated {} to configuration version {}",
                path.display(),
                CONFIG_VERSION
            );
        }
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Find a device by address or name
    pub fn find_device(&self, key: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.matches(key))
    }

    pub fn find_device_mut(&mut self, key: &str) -> Option<&mut DeviceEntry> {
        self.devices.iter_mut().find(|d| d.matches(key))
    }

    /// Insert or replace the entry with the same address
    ///
    /// Returns true when an existing entry was replaced.
    pub fn upsert_device(&mut self, entry: DeviceEntry) -> bool {
        match self
            .devices
            .iter_mut()
            .find(|d| d.address.eq_ignore_ascii_case(&entry.address))
        {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                self.devices.push(entry);
                false
            }
        }
    }

    /// Remove a device by address or name
    pub fn remove_device(&mut self, key: &str) -> Option<DeviceEntry> {
        let index = self.devices.iter().position(|d| d.matches(key))?;
        Some(self.devices.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("govee-driver-test-{}-{}", std::process::id(), name))
            .join("devices.toml")
    }

    #[test]
    fn test_default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("version = 2"));
        assert!(toml_str.contains("interval_secs = 15"));
        assert!(toml_str.contains("level = \"info\""));
        // Unset connection overrides are not written
        assert!(!toml_str.contains("max_attempts"));
    }

    #[test]
    fn test_full_document() {
        let doc = r#"
version = 2

[logging]
level = "debug"

[polling]
interval_secs = 30
scan_timeout_secs = 5

[connection]
max_attempts = 5
frame_delay_ms = 20

[[devices]]
address = "A4:C1:38:00:00:01"
name = "Desk Strip"
segmented = false
music_mode_support = true
"#;
        let (config, migrated) = AppConfig::parse(doc).unwrap();
        assert!(!migrated);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.polling.interval(), Duration::from_secs(30));
        assert_eq!(config.polling.scan_timeout(), Duration::from_secs(5));

        let connection = config.connection.to_connection_config();
        assert_eq!(connection.max_attempts, 5);
        assert_eq!(connection.frame_delay, Duration::from_millis(20));
        assert_eq!(connection.backoff_cap, ConnectionConfig::default().backoff_cap);

        let device = config.find_device("Desk Strip").unwrap();
        assert!(!device.segmented);
        let options = device.session_options(&config.connection);
        assert!(options.music_mode_support);
        assert_eq!(options.connection.max_attempts, 5);
    }

    #[test]
    fn test_v1_entries_migrate_to_segmented() {
        let old_toml = r#"
[[devices]]
address = "A4:C1:38:00:00:01"
"#;
        let (config, migrated) = AppConfig::parse(old_toml).unwrap();
        assert!(migrated);
        assert_eq!(config.version, CONFIG_VERSION);
        assert!(config.devices[0].segmented);
        assert!(!config.devices[0].music_mode_support);

        let resaved = toml::to_string_pretty(&config).unwrap();
        assert!(resaved.contains("version = 2"));
        assert!(resaved.contains("segmented = true"));
    }

    #[test]
    fn test_newer_version_rejected() {
        assert!(AppConfig::parse("version = 3").is_err());
    }

    #[test]
    fn test_lookup_by_address_or_name() {
        let mut config = AppConfig::default();
        let mut entry = DeviceEntry::new("A4:C1:38:00:00:01", None);
        entry.name = Some("Shelf".into());
        config.devices.push(entry);

        assert!(config.find_device("a4:c1:38:00:00:01").is_some());
        assert!(config.find_device("Shelf").is_some());
        assert!(config.find_device("shelf").is_none());
        assert_eq!(config.find_device("Shelf").unwrap().label(), "Shelf");
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut config = AppConfig::default();
        assert!(!config.upsert_device(DeviceEntry::new("A4:C1:38:00:00:01", None)));

        let mut replacement = DeviceEntry::new("a4:c1:38:00:00:01", None);
        replacement.segmented = false;
        assert!(config.upsert_device(replacement));
        assert_eq!(config.devices.len(), 1);
        assert!(!config.devices[0].segmented);

        assert!(config.remove_device("A4:C1:38:00:00:01").is_some());
        assert!(config.remove_device("A4:C1:38:00:00:01").is_none());
    }

    #[test]
    fn test_new_entry_defaults() {
        let plain = DeviceEntry::new("A4:C1:38:00:00:01", Some("Govee_H6159_1234"));
        assert!(plain.segmented);
        assert!(!plain.music_mode_support);

        let h1167 = DeviceEntry::new("A4:C1:38:00:00:02", Some("ihoment_h1167_ABCD"));
        assert!(h1167.music_mode_support);

        let unnamed = DeviceEntry::new("A4:C1:38:00:00:03", None);
        assert_eq!(unnamed.label(), "A4:C1:38:00:00:03");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let path = temp_path("missing");
        assert_eq!(AppConfig::load(&path).unwrap(), AppConfig::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_load_migrates_and_resaves() {
        let path = temp_path("migrate");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[devices]]\naddress = \"A4:C1:38:00:00:01\"\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.version, CONFIG_VERSION);

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("version = 2"));
        assert!(on_disk.contains("segmented = true"));

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_save_creates_directories() {
        let path = temp_path("save");
        let mut config = AppConfig::default();
        config.upsert_device(DeviceEntry::new("A4:C1:38:00:00:01", None));
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}

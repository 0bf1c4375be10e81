//! Configuration loading: a JSON file on disk plus environment variable
//! overrides, in the shape of the teacher's own `config.rs`
//! (`Config::load()`, `apply_env_overrides`, a test-mode `config_dir()`
//! override).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

/// Recognized configuration keys, matching spec.md §6 exactly.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Direct transport target. Ignored when `site_id`/`email` are set.
    pub ip_connection_host: String,
    pub ip_connection_port: u16,
    /// IP module login password (distinct from the panel password).
    pub ip_connection_password: String,

    /// When both set, connect via the cloud relay instead of direct TCP.
    pub ip_connection_siteid: Option<String>,
    pub ip_connection_email: Option<String>,

    /// Panel password, used by `PanelProfile::initialize_communication`.
    pub password: String,

    /// Sync the panel's RTC to wall-clock time once at connect.
    pub sync_time: bool,

    /// Ordered status-block indices polled every loop iteration.
    pub status_requests: Vec<u8>,

    pub keep_alive_interval: u64,
    pub power_update_interval: u64,

    /// Key inclusion lists: only these keys are tracked/updated.
    pub zones: Vec<u16>,
    pub partitions: Vec<u16>,
    pub outputs: Vec<u16>,
    pub buses: Vec<u16>,
    pub repeaters: Vec<u16>,
    pub keypads: Vec<u16>,

    /// Partition property names muted from the human-readable notification.
    pub partitions_change_notification_ignore: Vec<String>,

    pub push_update_without_change: bool,
    pub push_power_update_without_change: bool,

    pub logging_dump_packets: bool,
    pub logging_dump_messages: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip_connection_host: "127.0.0.1".to_string(),
            ip_connection_port: 10000,
            ip_connection_password: String::new(),
            ip_connection_siteid: None,
            ip_connection_email: None,
            password: String::new(),
            sync_time: true,
            status_requests: vec![0, 1, 2, 3, 4],
            keep_alive_interval: 10,
            power_update_interval: 60,
            zones: Vec::new(),
            partitions: Vec::new(),
            outputs: Vec::new(),
            buses: Vec::new(),
            repeaters: Vec::new(),
            keypads: Vec::new(),
            partitions_change_notification_ignore: Vec::new(),
            push_update_without_change: false,
            push_power_update_without_change: false,
            logging_dump_packets: false,
            logging_dump_messages: false,
        }
    }
}

impl Config {
    /// Configuration directory: `PARADOX_BRIDGE_CONFIG_DIR` override in
    /// tests, otherwise the platform-standard config dir.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                std::env::temp_dir().join("paradox-bridge-test")
            }
            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("PARADOX_BRIDGE_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else {
                    dirs::config_dir()
                        .context("could not determine config directory")?
                        .join("paradox-bridge")
                }
            }
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Load from `{config_dir}/config.json`, falling back to defaults,
    /// then apply environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|_| Self::default());
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path instead of the resolved config dir.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! override_string {
            ($env:literal, $field:expr) => {
                if let Ok(v) = std::env::var($env) {
                    $field = v;
                }
            };
        }
        macro_rules! override_parsed {
            ($env:literal, $field:expr) => {
                if let Ok(v) = std::env::var($env) {
                    if let Ok(parsed) = v.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        override_string!("IP_CONNECTION_HOST", self.ip_connection_host);
        override_parsed!("IP_CONNECTION_PORT", self.ip_connection_port);
        override_string!("IP_CONNECTION_PASSWORD", self.ip_connection_password);
        if let Ok(v) = std::env::var("IP_CONNECTION_SITEID") {
            self.ip_connection_siteid = Some(v);
        }
        if let Ok(v) = std::env::var("IP_CONNECTION_EMAIL") {
            self.ip_connection_email = Some(v);
        }
        override_string!("PASSWORD", self.password);
        override_parsed!("SYNC_TIME", self.sync_time);
        override_parsed!("KEEP_ALIVE_INTERVAL", self.keep_alive_interval);
        override_parsed!("POWER_UPDATE_INTERVAL", self.power_update_interval);
        override_parsed!("PUSH_UPDATE_WITHOUT_CHANGE", self.push_update_without_change);
        override_parsed!(
            "PUSH_POWER_UPDATE_WITHOUT_CHANGE",
            self.push_power_update_without_change
        );
        override_parsed!("LOGGING_DUMP_PACKETS", self.logging_dump_packets);
        override_parsed!("LOGGING_DUMP_MESSAGES", self.logging_dump_messages);
    }

    /// Persist the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_dir()?.join("config.json");
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// True when site id and email are both configured, selecting the
    /// cloud relay transport over a direct connection.
    pub fn uses_relay(&self) -> bool {
        self.ip_connection_siteid.is_some() && self.ip_connection_email.is_some()
    }
}

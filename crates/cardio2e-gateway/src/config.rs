//! Gateway configuration
//!
//! Loaded from a TOML file with `[global]`, `[cardio2e]` and `[mqtt]`
//! sections. Only `cardio2e.password` and `mqtt.address` are required.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cardio2e_core::entity::{EntityType, ZoneConfig, DEFAULT_ZONE_COUNT};
use cardio2e_core::protocol::{ConnectionConfig, ListenerConfig, DEFAULT_BAUD_RATE};

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "cardio2e.toml";

/// Complete gateway configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    pub cardio2e: Cardio2eConfig,
    pub mqtt: MqttConfig,
}

/// `[global]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default the log level to debug
    pub debug: bool,
    /// Home Assistant discovery prefix
    pub ha_discover_prefix: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debug: false,
            ha_discover_prefix: "homeassistant".to_string(),
        }
    }
}

/// `[cardio2e]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cardio2eConfig {
    #[serde(default = "default_serial_port")]
    pub serial_port: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    /// Installer password used for `@S P I`
    pub password: String,
    /// Seconds between date syncs
    #[serde(default = "default_update_date_interval")]
    pub update_date_interval: u64,

    #[serde(default = "default_true")]
    pub fetch_light_names: bool,
    #[serde(default = "default_nlights")]
    pub nlights: u32,
    #[serde(default)]
    pub skip_init_light_state: bool,
    /// Lights that accept 0-100 instead of on/off
    #[serde(default)]
    pub dimmer_lights: Vec<u32>,

    #[serde(default = "default_true")]
    pub fetch_switch_names: bool,
    #[serde(default = "default_nswitches")]
    pub nswitches: u32,
    #[serde(default)]
    pub skip_init_switch_state: bool,

    #[serde(default = "default_true")]
    pub fetch_cover_names: bool,
    #[serde(default = "default_ncovers")]
    pub ncovers: u32,
    #[serde(default)]
    pub skip_init_cover_state: bool,

    #[serde(default = "default_true")]
    pub fetch_names_hvac: bool,
    #[serde(default = "default_nhvac")]
    pub nhvac: u32,

    /// Code appended to arm/disarm commands
    #[serde(default = "default_alarm_code")]
    pub alarm_code: u32,

    #[serde(default = "default_true")]
    pub fetch_zone_names: bool,
    #[serde(default = "default_nzones")]
    pub nzones: u32,
    /// Zones whose sensor reads active when normal
    #[serde(default)]
    pub zones_normal_as_off: Vec<u32>,
}

/// `[mqtt]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MqttConfig {
    pub address: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baudrate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_update_date_interval() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_nlights() -> u32 {
    10
}

fn default_nswitches() -> u32 {
    16
}

fn default_ncovers() -> u32 {
    20
}

fn default_nhvac() -> u32 {
    2
}

fn default_alarm_code() -> u32 {
    12345
}

fn default_nzones() -> u32 {
    DEFAULT_ZONE_COUNT as u32
}

fn default_mqtt_port() -> u16 {
    1883
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Path to load when none is given on the command line
    ///
    /// `cardio2e.toml` in the working directory, falling back to the user
    /// config directory.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("cardio2e").join(CONFIG_FILE_NAME))
            .unwrap_or(local)
    }

    /// Zone layout for decoding `@I Z` and `@I B`
    pub fn zone_config(&self) -> ZoneConfig {
        ZoneConfig {
            zone_count: self.cardio2e.nzones as usize,
            inverted: self.cardio2e.zones_normal_as_off.clone(),
        }
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            date_sync_interval: Duration::from_secs(self.cardio2e.update_date_interval),
            zones: self.zone_config(),
            ..ListenerConfig::default()
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
    }

    pub fn is_dimmer(&self, light_id: u32) -> bool {
        self.cardio2e.dimmer_lights.contains(&light_id)
    }

    /// Whether names of this entity type are fetched at startup
    pub fn fetch_names(&self, entity: EntityType) -> bool {
        let c = &self.cardio2e;
        match entity {
            EntityType::Light => c.fetch_light_names,
            EntityType::Switch => c.fetch_switch_names,
            EntityType::Cover => c.fetch_cover_names,
            EntityType::Hvac => c.fetch_names_hvac,
            EntityType::Zone => c.fetch_zone_names,
            _ => false,
        }
    }

    /// Number of configured entities of this type
    pub fn entity_count(&self, entity: EntityType) -> u32 {
        let c = &self.cardio2e;
        match entity {
            EntityType::Light => c.nlights,
            EntityType::Switch => c.nswitches,
            EntityType::Cover => c.ncovers,
            EntityType::Hvac | EntityType::Temperature => c.nhvac,
            EntityType::Security => 1,
            EntityType::Zone | EntityType::ZoneBypass => c.nzones,
        }
    }

    /// Whether the startup state fetch is skipped for this type
    pub fn skip_init_state(&self, entity: EntityType) -> bool {
        let c = &self.cardio2e;
        match entity {
            EntityType::Light => c.skip_init_light_state,
            EntityType::Switch => c.skip_init_switch_state,
            EntityType::Cover => c.skip_init_cover_state,
            _ => false,
        }
    }
}

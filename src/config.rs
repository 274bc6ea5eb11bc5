// Timeouts, topics, controller configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD: &str = "tuner/cmd"; // commands from the control center
pub const TOPIC_HEALTH: &str = "tuner/state/health"; // health status

// Live telemetry table, entries land at "<table>/<key>"
pub const LIVE_TABLE: &str = "control-center-live";

// Blocking budget for each vendor config call
pub const CONFIG_TIMEOUT: Duration = Duration::from_millis(100);

// Gain slot used when the tuner file doesn't pick one
pub const DEFAULT_PID_SLOT: u8 = 0;

// Primary closed-loop sensor index
pub const PRIMARY_PID_IDX: u8 = 0;

// Motion magic smoothing, fixed for every controller
pub const S_CURVE_STRENGTH: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read tuner config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid tuner config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Identity and neutral behavior, enough for a follower
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleConfig {
    pub id: i32,
    #[serde(default)]
    pub is_braked: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Gains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub f: f64,
    pub i_max: f64,
    pub i_zone: f64,
    /// Motion magic cruise velocity
    pub v: f64,
    /// Motion magic acceleration
    pub a: f64,
    pub allowable_error: f64,
}

/// Full closed-loop setup for the controller being tuned.
///
/// A missing soft limit means the limit is disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterConfig {
    pub id: i32,
    #[serde(default)]
    pub is_braked: bool,
    #[serde(default)]
    pub forward_limit: Option<f64>,
    #[serde(default)]
    pub reverse_limit: Option<f64>,
    #[serde(default)]
    pub is_inverted: bool,
    #[serde(default)]
    pub is_sensor_inverted: bool,
    #[serde(default = "default_voltage_compensation")]
    pub voltage_compensation: f64,
    #[serde(default)]
    pub ramp: f64,
    #[serde(default)]
    pub gains: Gains,
    #[serde(default = "default_maximum_output")]
    pub maximum_output: f64,
    #[serde(default = "default_minimum_output")]
    pub minimum_output: f64,
    #[serde(default)]
    pub starting_position: f64,
}

fn default_voltage_compensation() -> f64 {
    12.0
}

fn default_maximum_output() -> f64 {
    1.0
}

fn default_minimum_output() -> f64 {
    -1.0
}

/// What a controller gets configured with at construction
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerConfig {
    Simple(SimpleConfig),
    Master(MasterConfig),
}

impl ControllerConfig {
    pub fn id(&self) -> i32 {
        match self {
            ControllerConfig::Simple(config) => config.id,
            ControllerConfig::Master(config) => config.id,
        }
    }

    pub fn is_braked(&self) -> bool {
        match self {
            ControllerConfig::Simple(config) => config.is_braked,
            ControllerConfig::Master(config) => config.is_braked,
        }
    }
}

impl From<SimpleConfig> for ControllerConfig {
    fn from(config: SimpleConfig) -> Self {
        ControllerConfig::Simple(config)
    }
}

impl From<MasterConfig> for ControllerConfig {
    fn from(config: MasterConfig) -> Self {
        ControllerConfig::Master(config)
    }
}

/// A controller that mirrors the master
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveConfig {
    pub id: i32,
    #[serde(default)]
    pub is_braked: bool,
    /// Drive opposite to the master
    #[serde(default)]
    pub is_inverted: bool,
}

impl SlaveConfig {
    pub fn simple(&self) -> SimpleConfig {
        SimpleConfig {
            id: self.id,
            is_braked: self.is_braked,
        }
    }
}

/// Tuner file: one master plus its followers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunerConfig {
    #[serde(default)]
    pub pid_slot: u8,
    pub master: MasterConfig,
    #[serde(default)]
    pub slaves: Vec<SlaveConfig>,
}

impl TunerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

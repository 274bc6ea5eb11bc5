// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::controller::ControlMode;

// Command from the control center -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunerCommand {
    pub mode: ControlMode,
    pub reference: f64,
    #[serde(default)]
    pub arbitrary_feed_forward: f64,
}

impl TunerCommand {
    /// No output, used whenever commands go stale
    pub fn disabled() -> Self {
        Self {
            mode: ControlMode::Disabled,
            reference: 0.0,
            arbitrary_feed_forward: 0.0,
        }
    }
}

/// One live table entry value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiveValue {
    Number(f64),
    Boolean(bool),
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

use std::{fs, path::Path};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::GpioError;
use crate::gpio::{Channel, Mode};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    pub pin: Channel,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct InputConfig {
    pub trigger: TriggerConfig,
}

/// Where a channel lives on the Linux GPIO character device.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PinConfig {
    pub chip: String,
    pub line: u32,
}

/// Channel to gpiochip line mapping used by the hardware provider.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HardwareConfig {
    #[serde(default = "default_numbering")]
    pub numbering: Mode,
    pub pins: FxHashMap<Channel, PinConfig>,
}

fn default_numbering() -> Mode {
    Mode::Board
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub hardware: Option<HardwareConfig>,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GpioError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| GpioError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, GpioError> {
        serde_json::from_str(contents)
            .map_err(|e| GpioError::Config(format!("Invalid config json: {e}")))
    }

    pub fn trigger_pin(&self) -> Channel {
        self.input.trigger.pin
    }
}

use error_stack::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::channel::TemperatureRange;
use crate::error::ConfigError;
use crate::registry::{ClimateRegistry, ModeRegistry, PresetRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetConfig {
    pub name: String,
    pub code: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    /// Preset names offered to the host, in display order, with their device codes.
    pub presets: Vec<PresetConfig>,
    pub command_queue_depth: usize,
    /// Overrides the bounds reported by each channel.
    pub temperature_range: Option<TemperatureRange>,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        let preset = |name: &str, code| PresetConfig {
            name: name.to_string(),
            code,
        };

        ClimateConfig {
            presets: vec![
                preset("comfort", 1),
                preset("home", 2),
                preset("away", 3),
                preset("eco", 4),
            ],
            command_queue_depth: 10,
            temperature_range: None,
        }
    }
}

impl ClimateConfig {
    pub fn from_json(json: &str) -> Result<ClimateConfig, ConfigError> {
        let config: ClimateConfig = serde_json::from_str(json).change_context(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<ClimateConfig, ConfigError> {
        let path = path.as_ref();
        let into_context = || ConfigError::Io(path.display().to_string());

        let json = std::fs::read_to_string(path).change_context_lazy(into_context)?;
        ClimateConfig::from_json(&json).attach_printable_lazy(|| format!("Loading {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(range) = self.temperature_range {
            if !(range.min.is_finite() && range.max.is_finite() && range.min <= range.max) {
                return Err(ConfigError::InvalidRange {
                    min: range.min,
                    max: range.max,
                }
                .into());
            }
        }

        self.registry().map(|_| ())
    }

    pub fn registry(&self) -> Result<ClimateRegistry, ConfigError> {
        let presets = PresetRegistry::new(
            self.presets
                .iter()
                .map(|preset| (preset.name.clone(), preset.code)),
        )
        .change_context(ConfigError::Registry)?;

        Ok(ClimateRegistry::new(ModeRegistry::velbus(), presets))
    }

    pub fn queue_depth(&self) -> usize {
        self.command_queue_depth.max(1)
    }
}

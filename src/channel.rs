use core::fmt::{Display, Formatter};
use core::str::FromStr;
use std::sync::Arc;

use async_channel::Receiver;
use async_trait::async_trait;
use error_stack::Result;
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, TransportError};

/// Bus address of a module plus the channel index inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub address: u8,
    pub channel: u8,
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X}-{}", self.address, self.channel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub target_temperature: bool,
    pub preset: bool,
    pub mode: bool,
}

impl Capabilities {
    pub fn thermostat() -> Self {
        Capabilities {
            target_temperature: true,
            preset: true,
            mode: true,
        }
    }

    pub fn supports(&self, field: Field) -> bool {
        match field {
            Field::CurrentTemperature => true,
            Field::TargetTemperature => self.target_temperature,
            Field::Mode => self.mode,
            Field::Preset => self.preset,
        }
    }
}

/// Target temperature bounds declared by the device, in Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f32,
    pub max: f32,
}

impl TemperatureRange {
    pub fn contains(&self, value: f32) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

impl Default for TemperatureRange {
    fn default() -> Self {
        TemperatureRange { min: 7.0, max: 35.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    CurrentTemperature,
    TargetTemperature,
    Mode,
    Preset,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::CurrentTemperature,
        Field::TargetTemperature,
        Field::Mode,
        Field::Preset,
    ];

    pub fn is_writable(&self) -> bool {
        !matches!(self, Field::CurrentTemperature)
    }
}

impl FromStr for Field {
    type Err = AdapterError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s {
            "current_temperature" => Ok(Field::CurrentTemperature),
            "temperature" | "target_temperature" => Ok(Field::TargetTemperature),
            "hvac_mode" | "mode" => Ok(Field::Mode),
            "preset_mode" | "preset" => Ok(Field::Preset),
            _ => Err(AdapterError::UnknownField(String::from(s))),
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::CurrentTemperature => write!(f, "current_temperature"),
            Field::TargetTemperature => write!(f, "temperature"),
            Field::Mode => write!(f, "hvac_mode"),
            Field::Preset => write!(f, "preset_mode"),
        }
    }
}

/// A value as the device represents it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Temperature(f32),
    CoolMode(bool),
    PresetCode(u8),
}

/// Unsolicited report from a channel. `value` is `None` when the device reports the field as unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
    pub field: Field,
    pub value: Option<WireValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// One thermostat control point as exposed by the device library.
#[async_trait]
pub trait ThermostatChannel: Send + Sync {
    fn id(&self) -> ChannelId;

    fn name(&self) -> String;

    fn capabilities(&self) -> Capabilities;

    fn temperature_range(&self) -> TemperatureRange;

    /// Last value the device library holds for `field`. Never touches the bus.
    fn current_reading(&self, field: Field) -> Option<WireValue>;

    async fn set_value(&self, field: Field, value: WireValue) -> Result<Ack, TransportError>;

    /// Register for push reports. Every call returns a new subscription.
    fn subscribe(&self) -> Receiver<ChannelReport>;
}

pub trait BusController: Send + Sync {
    fn climate_channels(&self) -> Vec<Arc<dyn ThermostatChannel>>;
}

use thiserror::Error;

use crate::channel::Field;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Invalid HVAC mode: {0}")]
    InvalidMode(String),

    #[error("Invalid preset: {0}")]
    InvalidPreset(String),

    #[error("Value {value} out of range [{min}, {max}]")]
    OutOfRangeValue { value: f32, min: f32, max: f32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field {0} is read-only")]
    ReadOnlyField(Field),

    #[error("Field {0} is not supported by this channel")]
    Unsupported(Field),

    #[error("Value does not match field {0}")]
    ValueMismatch(Field),

    #[error("Command dispatcher is not running")]
    DispatcherStopped,

    #[error("Bus controller went away before setup completed")]
    SetupAborted,
}

impl AdapterError {
    /// Only failures that happened after the command left the adapter.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::Transport(_) | AdapterError::DispatcherStopped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Timeout waiting for acknowledge")]
    Timeout,

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Device disconnected")]
    Disconnected,
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Duplicate symbol '{0}'")]
    DuplicateSymbol(String),

    #[error("Duplicate wire value {0}")]
    DuplicateWire(String),

    #[error("Entry '{0}' does not round-trip")]
    RoundTrip(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {0}")]
    Io(String),

    #[error("Invalid configuration")]
    Parse,

    #[error("Invalid preset table")]
    Registry,

    #[error("Invalid temperature range [{min}, {max}]")]
    InvalidRange { min: f32, max: f32 },
}

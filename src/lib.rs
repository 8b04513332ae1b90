pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod messages;
pub mod registry;
pub mod setup;
pub mod sim;
pub mod state;

#[cfg(test)]
mod test_support;

pub use channel::{BusController, ChannelId, ChannelReport, Field, ThermostatChannel, WireValue};
pub use config::ClimateConfig;
pub use entity::{ClimateEntity, ControlSurface, EntityId};
pub use error::{AdapterError, ConfigError, TransportError};
pub use registry::HvacMode;
pub use setup::{ClimatePlatform, SetupContext, StateSink};
pub use state::{ClimateState, Value};

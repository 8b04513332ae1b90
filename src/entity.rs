use async_channel::Sender;
use async_trait::async_trait;
use core::fmt::{Display, Formatter};
use error_stack::{Report, Result, ResultExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;

use log::debug;

use crate::channel::{Capabilities, ChannelId, Field, TemperatureRange, ThermostatChannel, WireValue};
use crate::error::AdapterError;
use crate::messages::{PendingCommand, ToDispatcherMessage};
use crate::registry::{ClimateRegistry, HvacMode};
use crate::state::{ClimateState, StateView, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn for_channel(id: ChannelId) -> Self {
        EntityId(format!("climate.velbus_{:02x}_{}", id.address, id.channel))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TemperatureUnit {
    Celsius,
}

/// What the host platform sees of a climate entity.
#[async_trait]
pub trait ControlSurface: Send + Sync {
    fn entity_id(&self) -> &EntityId;

    fn current_value(&self, field: Field) -> Option<Value>;

    /// `None` for fields that cannot be set.
    fn target_value(&self, field: Field) -> Option<Value>;

    /// A `None` value is accepted and does nothing.
    async fn set_target(&self, field: Field, value: Option<Value>) -> Result<(), AdapterError>;

    fn supported_modes(&self) -> Vec<HvacMode>;

    fn supported_presets(&self) -> Vec<String>;
}

pub struct ClimateEntity {
    entity_id: EntityId,
    unique_id: String,
    name: String,
    capabilities: Capabilities,
    range: TemperatureRange,
    registry: Arc<ClimateRegistry>,
    state: StateView,
    to_dispatcher_channel: Sender<ToDispatcherMessage>,
}

impl ClimateEntity {
    pub fn new(
        channel: &dyn ThermostatChannel,
        range: TemperatureRange,
        registry: Arc<ClimateRegistry>,
        state: StateView,
        to_dispatcher_channel: Sender<ToDispatcherMessage>,
    ) -> Self {
        let id = channel.id();

        ClimateEntity {
            entity_id: EntityId::for_channel(id),
            unique_id: id.to_string(),
            name: channel.name(),
            capabilities: channel.capabilities(),
            range,
            registry,
            state,
            to_dispatcher_channel,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        TemperatureUnit::Celsius
    }

    pub fn supported_features(&self) -> Capabilities {
        self.capabilities
    }

    pub fn min_temp(&self) -> f32 {
        self.range.min
    }

    pub fn max_temp(&self) -> f32 {
        self.range.max
    }

    pub fn state(&self) -> ClimateState {
        self.state.snapshot()
    }

    pub fn state_view(&self) -> &StateView {
        &self.state
    }

    pub fn current_temperature(&self) -> Option<f32> {
        self.state.snapshot().current_temperature
    }

    pub fn target_temperature(&self) -> Option<f32> {
        self.state.snapshot().target_temperature
    }

    /// Absent while the device has not reported a mode the registry knows.
    pub fn hvac_mode(&self) -> Option<HvacMode> {
        self.state.snapshot().hvac_mode
    }

    pub fn preset_mode(&self) -> Option<String> {
        self.state.snapshot().preset_mode
    }

    pub async fn set_temperature(&self, temperature: Option<f32>) -> Result<(), AdapterError> {
        self.set_target(Field::TargetTemperature, temperature.map(Value::Temperature))
            .await
    }

    pub async fn set_hvac_mode(&self, mode: Option<HvacMode>) -> Result<(), AdapterError> {
        self.set_target(Field::Mode, mode.map(Value::Mode)).await
    }

    pub async fn set_preset_mode(&self, preset: &str) -> Result<(), AdapterError> {
        self.set_target(Field::Preset, Some(Value::Preset(preset.to_string())))
            .await
    }

    /// Entry point for callers that only have names, e.g. service calls from the host.
    pub async fn set_target_named(&self, field: &str, value: Option<&str>) -> Result<(), AdapterError> {
        let field = field.parse::<Field>()?;

        let value = match value {
            None => None,
            Some(value) => Some(match field {
                Field::CurrentTemperature | Field::TargetTemperature => {
                    Value::Temperature(value.trim().parse::<f32>().map_err(|_| {
                        Report::new(AdapterError::ValueMismatch(field))
                            .attach_printable(format!("'{}' is not a temperature", value))
                    })?)
                }
                Field::Mode => Value::Mode(value.parse::<HvacMode>()?),
                Field::Preset => Value::Preset(value.to_string()),
            }),
        };

        self.set_target(field, value).await
    }

    fn validate(&self, field: Field, value: &Value) -> Result<WireValue, AdapterError> {
        if !field.is_writable() {
            return Err(AdapterError::ReadOnlyField(field).into());
        }

        if !self.capabilities.supports(field) {
            return Err(AdapterError::Unsupported(field).into());
        }

        if let (Field::TargetTemperature, Value::Temperature(t)) = (field, value) {
            if !self.range.contains(*t) {
                return Err(AdapterError::OutOfRangeValue {
                    value: *t,
                    min: self.range.min,
                    max: self.range.max,
                }
                .into());
            }
        }

        self.registry.encode(field, value)
    }
}

#[async_trait]
impl ControlSurface for ClimateEntity {
    fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    fn current_value(&self, field: Field) -> Option<Value> {
        self.state.read(field)
    }

    fn target_value(&self, field: Field) -> Option<Value> {
        if field.is_writable() {
            self.state.read(field)
        } else {
            None
        }
    }

    async fn set_target(&self, field: Field, value: Option<Value>) -> Result<(), AdapterError> {
        let Some(value) = value else {
            debug!("No {} given for {}, nothing to do", field, self.entity_id);
            return Ok(());
        };

        let into_context = || format!("Could not execute set {} for {}", field, self.entity_id);

        let wire = self.validate(field, &value).attach_printable_lazy(into_context)?;
        let (reply, outcome) = oneshot::channel();

        self.to_dispatcher_channel
            .send(ToDispatcherMessage::SetTarget(PendingCommand {
                field,
                value,
                wire,
                reply,
            }))
            .await
            .map_err(|_| Report::new(AdapterError::DispatcherStopped))
            .attach_printable_lazy(into_context)?;

        let outcome = outcome
            .await
            .map_err(|_| Report::new(AdapterError::DispatcherStopped))
            .attach_printable_lazy(into_context)?;

        outcome.attach_printable_lazy(into_context)
    }

    fn supported_modes(&self) -> Vec<HvacMode> {
        self.registry.modes.modes()
    }

    fn supported_presets(&self) -> Vec<String> {
        self.registry.presets.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::error::TransportError;
    use crate::registry::{ModeRegistry, PresetRegistry};
    use crate::sim::SimulatedChannel;
    use crate::test_support::{set_logger, wait_for_state, RecordingSink};
    use tokio::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        channel: Arc<SimulatedChannel>,
        entity: ClimateEntity,
        sink: Arc<RecordingSink>,
        cancel_token: CancellationToken,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.cancel_token.cancel();
        }
    }

    fn start(channel: SimulatedChannel) -> Harness {
        set_logger();

        let channel = Arc::new(channel);
        let registry = Arc::new(ClimateRegistry::new(
            ModeRegistry::velbus(),
            PresetRegistry::new([("comfort", 1), ("home", 2), ("away", 3), ("eco", 4)]).unwrap(),
        ));
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, view) = Dispatcher::new(
            EntityId::for_channel(channel.id()),
            channel.clone(),
            registry.clone(),
            sink.clone(),
        );

        let (tx, rx) = async_channel::bounded(10);
        let cancel_token = CancellationToken::new();
        tokio::spawn(dispatcher.dispatcher_worker(rx, cancel_token.clone()));

        let range = channel.temperature_range();
        let entity = ClimateEntity::new(channel.as_ref(), range, registry, view, tx);

        Harness {
            channel,
            entity,
            sink,
            cancel_token,
        }
    }

    fn thermostat() -> SimulatedChannel {
        SimulatedChannel::new(ChannelId { address: 0x2a, channel: 1 }, "Bedroom")
            .with_range(TemperatureRange { min: 5.0, max: 30.0 })
            .with_reading(Field::TargetTemperature, WireValue::Temperature(19.0))
    }

    #[tokio::test]
    async fn test_entity_attributes() {
        let h = start(thermostat());

        assert_eq!(h.entity.entity_id().as_str(), "climate.velbus_2a_1");
        assert_eq!(h.entity.unique_id(), "2A-1");
        assert_eq!(h.entity.name(), "Bedroom");
        assert_eq!(h.entity.temperature_unit(), TemperatureUnit::Celsius);
        assert_eq!(h.entity.min_temp(), 5.0);
        assert_eq!(h.entity.max_temp(), 30.0);
        assert_eq!(h.entity.supported_modes(), vec![HvacMode::Heat, HvacMode::Cool]);
        assert_eq!(h.entity.supported_presets(), vec!["comfort", "home", "away", "eco"]);
    }

    #[tokio::test]
    async fn test_set_temperature_updates_target() {
        let h = start(thermostat());

        h.entity.set_temperature(Some(21.5)).await.unwrap();

        assert_eq!(h.entity.target_value(Field::TargetTemperature), Some(Value::Temperature(21.5)));
        assert_eq!(h.channel.sent(), vec![(Field::TargetTemperature, WireValue::Temperature(21.5))]);
        assert_eq!(h.sink.notified(), vec![h.entity.entity_id().clone()]);
    }

    #[tokio::test]
    async fn test_same_value_is_sent_again() {
        let h = start(thermostat());

        h.entity.set_temperature(Some(19.0)).await.unwrap();
        h.entity.set_temperature(Some(19.0)).await.unwrap();

        assert_eq!(h.channel.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_set_leaves_target_unchanged() {
        let h = start(thermostat());
        h.channel.fail_next(TransportError::Timeout);

        let err = h.entity.set_temperature(Some(24.0)).await.unwrap_err();

        assert!(matches!(err.current_context(), AdapterError::Transport(_)));
        assert!(err.current_context().is_retryable());
        assert_eq!(h.entity.target_value(Field::TargetTemperature), Some(Value::Temperature(19.0)));
        assert!(h.sink.notified().is_empty());
    }

    #[tokio::test]
    async fn test_missing_temperature_is_a_no_op() {
        let h = start(thermostat());

        h.entity.set_target(Field::TargetTemperature, None).await.unwrap();
        h.entity.set_hvac_mode(None).await.unwrap();

        assert!(h.channel.sent().is_empty());
        assert_eq!(h.entity.target_temperature(), Some(19.0));
    }

    #[tokio::test]
    async fn test_validation_rejects_before_sending() {
        let h = start(thermostat());

        let err = h.entity.set_temperature(Some(31.0)).await.unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::OutOfRangeValue { .. }));
        assert!(!err.current_context().is_retryable());

        let err = h.entity.set_temperature(Some(f32::NAN)).await.unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::OutOfRangeValue { .. }));

        let err = h.entity.set_hvac_mode(Some(HvacMode::Auto)).await.unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::InvalidMode(_)));

        let err = h.entity.set_preset_mode("party").await.unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::InvalidPreset(_)));

        let err = h
            .entity
            .set_target(Field::CurrentTemperature, Some(Value::Temperature(20.0)))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::ReadOnlyField(_)));

        let err = h
            .entity
            .set_target(Field::Preset, Some(Value::Temperature(20.0)))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::ValueMismatch(Field::Preset)));

        assert!(h.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_capability() {
        let h = start(thermostat().with_capabilities(Capabilities {
            target_temperature: true,
            preset: false,
            mode: true,
        }));

        let err = h.entity.set_preset_mode("eco").await.unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::Unsupported(Field::Preset)));
        assert!(h.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_preset_sends_device_code() {
        let h = start(thermostat());

        h.entity.set_preset_mode("away").await.unwrap();

        assert_eq!(h.channel.sent(), vec![(Field::Preset, WireValue::PresetCode(3))]);
        assert_eq!(h.entity.preset_mode().as_deref(), Some("away"));
        assert_eq!(h.entity.supported_presets(), vec!["comfort", "home", "away", "eco"]);
    }

    #[tokio::test]
    async fn test_mode_follows_push_reports() {
        let h = start(thermostat());
        let view = h.entity.state_view();

        h.channel.push(Field::Mode, Some(WireValue::CoolMode(true)));
        assert!(wait_for_state(view, |s| s.hvac_mode == Some(HvacMode::Cool)).await);
        assert_eq!(h.entity.current_value(Field::Mode), Some(Value::Mode(HvacMode::Cool)));

        h.channel.push(Field::Mode, Some(WireValue::CoolMode(false)));
        assert!(wait_for_state(view, |s| s.hvac_mode == Some(HvacMode::Heat)).await);

        h.channel.push(Field::Mode, None);
        assert!(wait_for_state(view, |s| s.hvac_mode.is_none()).await);
        assert_eq!(h.entity.hvac_mode(), None);
    }

    #[tokio::test]
    async fn test_concurrent_sets_keep_submission_order() {
        let h = start(thermostat().with_latency(Duration::from_millis(20)));

        let (first, second) = tokio::join!(
            h.entity.set_temperature(Some(20.0)),
            h.entity.set_temperature(Some(22.0)),
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(
            h.channel.sent(),
            vec![
                (Field::TargetTemperature, WireValue::Temperature(20.0)),
                (Field::TargetTemperature, WireValue::Temperature(22.0)),
            ]
        );
        assert_eq!(h.channel.max_in_flight(), 1);
        assert_eq!(h.entity.target_temperature(), Some(22.0));
    }

    #[tokio::test]
    async fn test_abandoned_set_still_lands() {
        let h = start(thermostat().with_latency(Duration::from_millis(50)));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            h.entity.set_temperature(Some(23.0)),
        )
        .await;
        assert!(abandoned.is_err());

        assert!(wait_for_state(h.entity.state_view(), |s| s.target_temperature == Some(23.0)).await);
        assert_eq!(h.channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_named_calls() {
        let h = start(thermostat());

        h.entity.set_target_named("hvac_mode", Some("cool")).await.unwrap();
        h.entity.set_target_named("temperature", Some("22.5")).await.unwrap();
        h.entity.set_target_named("preset", None).await.unwrap();

        assert_eq!(h.entity.hvac_mode(), Some(HvacMode::Cool));
        assert_eq!(h.entity.target_temperature(), Some(22.5));

        let err = h.entity.set_target_named("hvac_mode", Some("turbo")).await.unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::InvalidMode(_)));

        let err = h.entity.set_target_named("humidity", Some("40")).await.unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::UnknownField(_)));

        let err = h.entity.set_target_named("temperature", Some("warm")).await.unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::ValueMismatch(_)));
    }

    #[tokio::test]
    async fn test_target_value_of_read_only_field() {
        let h = start(thermostat().with_reading(Field::CurrentTemperature, WireValue::Temperature(18.5)));

        assert_eq!(h.entity.current_value(Field::CurrentTemperature), Some(Value::Temperature(18.5)));
        assert_eq!(h.entity.target_value(Field::CurrentTemperature), None);
        assert_eq!(h.entity.current_temperature(), Some(18.5));
    }

    #[tokio::test]
    async fn test_stopped_dispatcher() {
        let h = start(thermostat());
        h.cancel_token.cancel();
        // Let the worker observe the cancellation and drop its queue
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = h.entity.set_temperature(Some(21.0)).await.unwrap_err();
        assert!(matches!(err.current_context(), AdapterError::DispatcherStopped));
    }
}

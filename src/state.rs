use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::channel::Field;
use crate::registry::HvacMode;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Temperature(f32),
    Mode(HvacMode),
    Preset(String),
}

/// Last-known-good snapshot of one channel. `None` means not reported yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClimateState {
    pub current_temperature: Option<f32>,
    pub target_temperature: Option<f32>,
    pub hvac_mode: Option<HvacMode>,
    pub preset_mode: Option<String>,
}

impl ClimateState {
    pub fn get(&self, field: Field) -> Option<Value> {
        match field {
            Field::CurrentTemperature => self.current_temperature.map(Value::Temperature),
            Field::TargetTemperature => self.target_temperature.map(Value::Temperature),
            Field::Mode => self.hvac_mode.map(Value::Mode),
            Field::Preset => self.preset_mode.clone().map(Value::Preset),
        }
    }

    /// Returns false when `value` does not fit `field`; the snapshot is left alone then.
    pub fn set(&mut self, field: Field, value: Option<Value>) -> bool {
        match (field, value) {
            (Field::CurrentTemperature, None) => self.current_temperature = None,
            (Field::CurrentTemperature, Some(Value::Temperature(t))) => {
                self.current_temperature = Some(t)
            }
            (Field::TargetTemperature, None) => self.target_temperature = None,
            (Field::TargetTemperature, Some(Value::Temperature(t))) => {
                self.target_temperature = Some(t)
            }
            (Field::Mode, None) => self.hvac_mode = None,
            (Field::Mode, Some(Value::Mode(mode))) => self.hvac_mode = Some(mode),
            (Field::Preset, None) => self.preset_mode = None,
            (Field::Preset, Some(Value::Preset(name))) => self.preset_mode = Some(name),
            _ => return false,
        }
        true
    }
}

/// Write half of a channel's state cache. Owned by the channel's dispatcher.
#[derive(Debug)]
pub struct StateCache {
    tx: watch::Sender<ClimateState>,
}

/// Read half of a channel's state cache. Reads never block and never touch the bus.
#[derive(Debug, Clone)]
pub struct StateView {
    rx: watch::Receiver<ClimateState>,
}

impl StateCache {
    pub fn new(initial: ClimateState) -> (StateCache, StateView) {
        let (tx, rx) = watch::channel(initial);
        (StateCache { tx }, StateView { rx })
    }

    pub fn write(&self, field: Field, value: Option<Value>) -> bool {
        let mut accepted = false;
        self.tx.send_if_modified(|state| {
            let before = state.get(field);
            accepted = state.set(field, value);
            accepted && state.get(field) != before
        });
        accepted
    }

    pub fn view(&self) -> StateView {
        StateView {
            rx: self.tx.subscribe(),
        }
    }
}

impl StateView {
    pub fn read(&self, field: Field) -> Option<Value> {
        self.rx.borrow().get(field)
    }

    pub fn snapshot(&self) -> ClimateState {
        self.rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ClimateState> {
        self.rx.clone()
    }

    pub fn changes(&self) -> WatchStream<ClimateState> {
        WatchStream::from_changes(self.rx.clone())
    }
}

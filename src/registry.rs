use core::borrow::Borrow;
use core::fmt::{Debug, Display, Formatter};
use core::str::FromStr;
use error_stack::{Report, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::channel::{Field, WireValue};
use crate::error::{AdapterError, RegistryError};
use crate::state::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

impl FromStr for HvacMode {
    type Err = AdapterError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s {
            "off" => Ok(HvacMode::Off),
            "heat" => Ok(HvacMode::Heat),
            "cool" => Ok(HvacMode::Cool),
            "heat_cool" => Ok(HvacMode::HeatCool),
            "auto" => Ok(HvacMode::Auto),
            "dry" => Ok(HvacMode::Dry),
            "fan_only" => Ok(HvacMode::FanOnly),
            _ => Err(AdapterError::InvalidMode(String::from(s))),
        }
    }
}

impl Display for HvacMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HvacMode::Off => write!(f, "off"),
            HvacMode::Heat => write!(f, "heat"),
            HvacMode::Cool => write!(f, "cool"),
            HvacMode::HeatCool => write!(f, "heat_cool"),
            HvacMode::Auto => write!(f, "auto"),
            HvacMode::Dry => write!(f, "dry"),
            HvacMode::FanOnly => write!(f, "fan_only"),
        }
    }
}

/// Bijective mapping between symbolic names and device wire values.
#[derive(Debug, Clone)]
pub struct SymbolMap<S, W> {
    entries: Vec<(S, W)>,
}

impl<S, W> SymbolMap<S, W>
where
    S: Eq + Display,
    W: Copy + Eq + Debug,
{
    pub fn new(entries: impl IntoIterator<Item = (S, W)>) -> Result<Self, RegistryError> {
        let mut map = SymbolMap { entries: Vec::new() };

        for (symbol, wire) in entries {
            if map.entries.iter().any(|(s, _)| *s == symbol) {
                return Err(RegistryError::DuplicateSymbol(symbol.to_string()).into());
            }
            if map.entries.iter().any(|(_, w)| *w == wire) {
                return Err(RegistryError::DuplicateWire(format!("{:?}", wire)).into());
            }
            map.entries.push((symbol, wire));
        }

        for (symbol, wire) in &map.entries {
            if map.to_symbol(*wire) != Some(symbol) {
                return Err(RegistryError::RoundTrip(symbol.to_string()).into());
            }
        }

        Ok(map)
    }

    pub fn to_symbol(&self, wire: W) -> Option<&S> {
        self.entries.iter().find(|(_, w)| *w == wire).map(|(s, _)| s)
    }

    pub fn to_wire<Q>(&self, symbol: &Q) -> Option<W>
    where
        S: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.entries
            .iter()
            .find(|(s, _)| s.borrow() == symbol)
            .map(|(_, w)| *w)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &S> {
        self.entries.iter().map(|(s, _)| s)
    }

    pub fn wires(&self) -> impl Iterator<Item = W> + '_ {
        self.entries.iter().map(|(_, w)| *w)
    }
}

/// HVAC modes a channel supports, keyed by the device's `cool_mode` flag.
#[derive(Debug, Clone)]
pub struct ModeRegistry {
    map: SymbolMap<HvacMode, bool>,
}

impl ModeRegistry {
    pub fn new(entries: impl IntoIterator<Item = (HvacMode, bool)>) -> Result<Self, RegistryError> {
        Ok(ModeRegistry {
            map: SymbolMap::new(entries)?,
        })
    }

    pub fn velbus() -> Self {
        ModeRegistry {
            map: SymbolMap {
                entries: vec![(HvacMode::Heat, false), (HvacMode::Cool, true)],
            },
        }
    }

    pub fn to_symbol(&self, cool_mode: bool) -> Option<HvacMode> {
        self.map.to_symbol(cool_mode).copied()
    }

    pub fn to_wire(&self, mode: HvacMode) -> Result<bool, AdapterError> {
        self.map
            .to_wire(&mode)
            .ok_or_else(|| Report::new(AdapterError::InvalidMode(mode.to_string())))
    }

    pub fn modes(&self) -> Vec<HvacMode> {
        self.map.symbols().copied().collect()
    }
}

#[derive(Debug, Clone)]
pub struct PresetRegistry {
    map: SymbolMap<String, u8>,
}

impl PresetRegistry {
    pub fn new<N: Into<String>>(entries: impl IntoIterator<Item = (N, u8)>) -> Result<Self, RegistryError> {
        Ok(PresetRegistry {
            map: SymbolMap::new(entries.into_iter().map(|(name, code)| (name.into(), code)))?,
        })
    }

    pub fn to_symbol(&self, code: u8) -> Option<&str> {
        self.map.to_symbol(code).map(String::as_str)
    }

    pub fn to_wire(&self, name: &str) -> Result<u8, AdapterError> {
        self.map
            .to_wire(name)
            .ok_or_else(|| Report::new(AdapterError::InvalidPreset(String::from(name))))
    }

    pub fn names(&self) -> Vec<String> {
        self.map.symbols().cloned().collect()
    }
}

/// Translates between symbolic field values and what goes over the bus.
#[derive(Debug, Clone)]
pub struct ClimateRegistry {
    pub modes: ModeRegistry,
    pub presets: PresetRegistry,
}

impl ClimateRegistry {
    pub fn new(modes: ModeRegistry, presets: PresetRegistry) -> Self {
        ClimateRegistry { modes, presets }
    }

    /// Unknown or mismatched wire values read as absent.
    pub fn decode(&self, field: Field, wire: Option<WireValue>) -> Option<Value> {
        let wire = wire?;

        let value = match (field, wire) {
            (Field::CurrentTemperature | Field::TargetTemperature, WireValue::Temperature(t)) => {
                Some(Value::Temperature(t))
            }
            (Field::Mode, WireValue::CoolMode(cool_mode)) => {
                self.modes.to_symbol(cool_mode).map(Value::Mode)
            }
            (Field::Preset, WireValue::PresetCode(code)) => self
                .presets
                .to_symbol(code)
                .map(|name| Value::Preset(name.to_string())),
            _ => None,
        };

        if value.is_none() {
            warn!("Unknown wire value {:?} reported for {}", wire, field);
        }
        value
    }

    /// Range checks are the caller's business, this only maps symbols.
    pub fn encode(&self, field: Field, value: &Value) -> Result<WireValue, AdapterError> {
        match (field, value) {
            (Field::TargetTemperature, Value::Temperature(t)) => Ok(WireValue::Temperature(*t)),
            (Field::Mode, Value::Mode(mode)) => Ok(WireValue::CoolMode(self.modes.to_wire(*mode)?)),
            (Field::Preset, Value::Preset(name)) => {
                Ok(WireValue::PresetCode(self.presets.to_wire(name)?))
            }
            (Field::CurrentTemperature, _) => Err(AdapterError::ReadOnlyField(field).into()),
            _ => Err(AdapterError::ValueMismatch(field).into()),
        }
    }
}

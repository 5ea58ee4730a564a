//! Per-profile settings schema.
//!
//! Declares numeric bounds for migration clamping and the configuration
//! parameter (index, size, encoding) each setting is written to.

use crate::device::{Settings, Value};
use crate::migration::range::{TenthsCodec, round_to_tenth};
use std::collections::BTreeMap;

/// How a setting value becomes a raw configuration parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    /// Numeric view of the value, rounded
    Identity,
    /// Multiplied by a factor, rounded
    Scaled(f64),
    /// Boolean stored inverted (`true` -> 0)
    Inverted,
    /// Signed tenths layout
    Tenths(TenthsCodec),
    /// Duration whose unit is chosen by another setting; minutes add 1000
    Duration { unit_key: String },
    /// Tenths value replaced by a sentinel while a checkbox setting is off
    Switchable {
        codec: TenthsCodec,
        enabled_key: String,
        disabled_raw: i64,
    },
}

impl Encoding {
    /// Raw parameter value, `None` when the value has no numeric view.
    pub fn encode(&self, value: &Value, settings: &Settings) -> Option<i64> {
        match self {
            Encoding::Identity => value.as_f64().map(|v| v.round() as i64),
            Encoding::Scaled(factor) => value.as_f64().map(|v| (v * factor).round() as i64),
            Encoding::Inverted => value.as_bool().map(|v| if v { 0 } else { 1 }),
            Encoding::Tenths(codec) => value.as_f64().map(|v| codec.encode(v)),
            Encoding::Duration { unit_key } => {
                let duration = value.as_f64()?.round() as i64;
                let minutes = settings
                    .get(unit_key)
                    .and_then(Value::as_str)
                    .is_some_and(|unit| unit == "min");
                Some(if minutes { duration + 1000 } else { duration })
            }
            Encoding::Switchable {
                codec,
                enabled_key,
                disabled_raw,
            } => {
                let enabled = settings
                    .get(enabled_key)
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                if enabled {
                    value.as_f64().map(|v| codec.encode(v))
                } else {
                    Some(*disabled_raw)
                }
            }
        }
    }

    /// Other setting the encoded value depends on.
    pub fn depends_on(&self) -> Option<&str> {
        match self {
            Encoding::Duration { unit_key } => Some(unit_key),
            Encoding::Switchable { enabled_key, .. } => Some(enabled_key),
            _ => None,
        }
    }
}

/// Configuration parameter a setting is written to.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRef {
    pub index: u16,
    pub size: u8,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SettingSpec {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub parameter: Option<ParameterRef>,
}

impl SettingSpec {
    /// Numeric setting with inclusive bounds.
    pub fn number(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Default::default()
        }
    }

    /// Setting without numeric bounds (checkbox, dropdown).
    pub fn choice() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Written verbatim to a configuration parameter.
    pub fn parameter(self, index: u16, size: u8) -> Self {
        self.encoded_parameter(index, size, Encoding::Identity)
    }

    pub fn encoded_parameter(mut self, index: u16, size: u8, encoding: Encoding) -> Self {
        self.parameter = Some(ParameterRef {
            index,
            size,
            encoding,
        });
        self
    }

    /// Clamp a numeric value to the bounds; tenth-step settings are rounded
    /// to one decimal. Non-numeric values pass through.
    pub fn clamp(&self, value: Value) -> Value {
        let Value::Number(mut n) = value else {
            return value;
        };
        if let Some(min) = self.min
            && n < min
        {
            n = min;
        }
        if let Some(max) = self.max
            && n > max
        {
            n = max;
        }
        if self.step == Some(0.1) && n.fract() != 0.0 {
            n = round_to_tenth(n);
        }
        Value::Number(n)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsSchema {
    specs: BTreeMap<String, SettingSpec>,
}

impl SettingsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, spec: SettingSpec) -> Self {
        self.specs.insert(key.to_string(), spec);
        self
    }

    /// Merge another schema in; entries of `other` win.
    pub fn merge(mut self, other: SettingsSchema) -> Self {
        self.specs.extend(other.specs);
        self
    }

    pub fn get(&self, key: &str) -> Option<&SettingSpec> {
        self.specs.get(key)
    }

    pub fn parameter(&self, key: &str) -> Option<&ParameterRef> {
        self.get(key).and_then(|spec| spec.parameter.as_ref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_and_round() {
        let spec = SettingSpec::number(-10.0, 10.0).step(0.1);
        assert_eq!(spec.clamp(Value::Number(12.0)), Value::Number(10.0));
        assert_eq!(spec.clamp(Value::Number(-11.5)), Value::Number(-10.0));
        assert_eq!(spec.clamp(Value::Number(2.345)), Value::Number(2.3));
        assert_eq!(spec.clamp(Value::Number(3.0)), Value::Number(3.0));
        assert_eq!(spec.clamp(Value::from("x")), Value::from("x"));

        let whole = SettingSpec::number(0.0, 100.0);
        assert_eq!(whole.clamp(Value::Number(2.345)), Value::Number(2.345));
    }

    #[test]
    fn test_encodings() {
        let settings = Settings::from([("sceneUnit".to_string(), Value::from("min"))]);
        assert_eq!(Encoding::Identity.encode(&Value::from("3"), &settings), Some(3));
        assert_eq!(Encoding::Scaled(100.0).encode(&Value::from(0.5), &settings), Some(50));
        assert_eq!(Encoding::Inverted.encode(&Value::from(true), &settings), Some(0));
        assert_eq!(
            Encoding::Tenths(TenthsCodec::TEMPERATURE_OFFSET).encode(&Value::from(-1.0), &settings),
            Some(1010)
        );
        let duration = Encoding::Duration {
            unit_key: "sceneUnit".to_string(),
        };
        assert_eq!(duration.encode(&Value::from(5.0), &settings), Some(1005));
        assert_eq!(duration.encode(&Value::from(5.0), &Settings::new()), Some(5));
        assert_eq!(duration.depends_on(), Some("sceneUnit"));
    }

    #[test]
    fn test_switchable_encoding() {
        let antifreeze = Encoding::Switchable {
            codec: TenthsCodec::ANTIFREEZE,
            enabled_key: "antifreezeEnabled".to_string(),
            disabled_raw: 255,
        };
        let off = Settings::from([("antifreezeEnabled".to_string(), Value::Bool(false))]);
        assert_eq!(antifreeze.encode(&Value::from(5.0), &off), Some(255));
        assert_eq!(antifreeze.encode(&Value::from(5.0), &Settings::new()), Some(50));
    }
}

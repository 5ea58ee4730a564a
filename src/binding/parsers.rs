//! Default report and set parsers per (capability, command class).

use super::{ParserContext, Parsed, ReportParser, SetOutcome, SetParser};
use crate::device::{Capability, Value};
use crate::error::BridgeError;
use crate::migration::range::round_to_tenth;
use crate::zwave::{Command, CommandClass, MeterScale, Report, SensorType};
use std::sync::Arc;

/// Sensor-multilevel value meaning "no probe connected".
pub const NO_SENSOR_READING: f64 = -999.9;

/// Multilevel level (0..=99, 255 = previous) as a 0..=1 fraction.
pub fn level_to_fraction(level: u8) -> f64 {
    if level == 255 {
        1.0
    } else {
        f64::from(level.min(99)) / 99.0
    }
}

pub fn fraction_to_level(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 99.0).round() as u8
}

/// Sensor-binary value text decoded to a boolean.
pub fn sensor_binary_active(sensor_value: &str) -> bool {
    sensor_value == "detected an event"
}

/// Notification event text decoded to a boolean.
pub fn notification_active(event: &str) -> bool {
    event != "Event inactive"
}

fn meter_scale(capability: Capability) -> Option<MeterScale> {
    match capability {
        Capability::MeterPower => Some(MeterScale::KilowattHours),
        Capability::MeasurePower => Some(MeterScale::Watts),
        Capability::MeasureVoltage => Some(MeterScale::Volts),
        Capability::MeasureCurrent => Some(MeterScale::Amperes),
        _ => None,
    }
}

/// Temperature in Celsius; Fahrenheit readings are converted.
pub fn parse_temperature(report: &Report) -> Option<f64> {
    let Report::SensorMultilevel {
        sensor: SensorType::AirTemperature,
        scale,
        value,
    } = report
    else {
        return None;
    };
    if (*value - NO_SENSOR_READING).abs() < f64::EPSILON {
        return None;
    }
    if *scale == 1 {
        Some(round_to_tenth((value - 32.0) * 5.0 / 9.0))
    } else {
        Some(*value)
    }
}

/// Report parser used when a binding does not supply one.
pub fn default_report_parser(capability: Capability, command_class: CommandClass) -> ReportParser {
    Arc::new(move |report: &Report, _ctx: &ParserContext| {
        let value = match (capability, report) {
            (Capability::Onoff, Report::SwitchBinary { value }) => Some(Value::Bool(*value)),
            (Capability::Onoff, Report::SwitchMultilevel { level }) => Some(Value::Bool(*level > 0)),
            (Capability::Onoff, Report::Basic { value }) => Some(Value::Bool(*value > 0)),
            (
                Capability::Dim | Capability::WindowcoveringsSet | Capability::WindowcoveringsTiltSet,
                Report::SwitchMultilevel { level },
            ) => Some(Value::Number(level_to_fraction(*level))),
            (_, Report::Meter { scale, value }) if meter_scale(capability) == Some(*scale) => {
                Some(Value::Number(*value))
            }
            (Capability::MeasureTemperature, report) => parse_temperature(report).map(Value::Number),
            (Capability::TargetTemperature, Report::ThermostatSetpoint { value }) => {
                Some(Value::Number(*value))
            }
            (Capability::AlarmContact, Report::SensorBinary { sensor_value }) => {
                Some(Value::Bool(sensor_binary_active(sensor_value)))
            }
            (Capability::AlarmContact, Report::Notification { event }) => {
                Some(Value::Bool(notification_active(event)))
            }
            _ => None,
        };
        if value.is_none() {
            log::trace!(
                "[Binding] {} ignores {:?} on {}",
                capability,
                report,
                command_class
            );
        }
        Parsed::from(value)
    })
}

/// Set parser used when a binding does not supply one; `None` for
/// read-only capabilities.
pub fn default_set_parser(capability: Capability, command_class: CommandClass) -> Option<SetParser> {
    let parser: SetParser = match (capability, command_class) {
        (Capability::Onoff, CommandClass::SwitchBinary) => Arc::new(|value: &Value, _ctx: &ParserContext| {
            Ok(SetOutcome::command(Command::SwitchBinarySet {
                on: expect_bool(value)?,
            }))
        }),
        (Capability::Onoff, CommandClass::SwitchMultilevel) => Arc::new(|value: &Value, _ctx: &ParserContext| {
            Ok(SetOutcome::command(Command::SwitchMultilevelSet {
                level: if expect_bool(value)? { 255 } else { 0 },
                duration_ms: None,
            }))
        }),
        (Capability::Onoff, CommandClass::Basic) => Arc::new(|value: &Value, _ctx: &ParserContext| {
            Ok(SetOutcome::command(Command::Basic {
                value: if expect_bool(value)? { 255 } else { 0 },
            }))
        }),
        (
            Capability::Dim | Capability::WindowcoveringsSet | Capability::WindowcoveringsTiltSet,
            CommandClass::SwitchMultilevel,
        ) => Arc::new(|value: &Value, _ctx: &ParserContext| {
            Ok(SetOutcome::command(Command::SwitchMultilevelSet {
                level: fraction_to_level(expect_number(value)?),
                duration_ms: None,
            }))
        }),
        (Capability::TargetTemperature, CommandClass::ThermostatSetpoint) => {
            Arc::new(|value: &Value, _ctx: &ParserContext| {
                Ok(SetOutcome::command(Command::ThermostatSetpointSet {
                    value: expect_number(value)?,
                }))
            })
        }
        _ => return None,
    };
    Some(parser)
}

pub fn expect_bool(value: &Value) -> crate::error::Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| BridgeError::InvalidSetting(format!("expected a boolean, got {value}")))
}

pub fn expect_number(value: &Value) -> crate::error::Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| BridgeError::InvalidSetting(format!("expected a number, got {value}")))
}

//! Decoded inbound reports, outbound commands and status requests.

use super::command_class::CommandClass;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Single color channel of the switch-color command class.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColorComponentId {
    White,
    Red,
    Green,
    Blue,
}

impl ColorComponentId {
    pub const ALL: [ColorComponentId; 4] = [Self::White, Self::Red, Self::Green, Self::Blue];

    /// Component id on the wire.
    pub fn id(self) -> u8 {
        match self {
            Self::White => 0,
            Self::Red => 2,
            Self::Green => 3,
            Self::Blue => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::White),
            2 => Some(Self::Red),
            3 => Some(Self::Green),
            4 => Some(Self::Blue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterScale {
    KilowattHours,
    Watts,
    Volts,
    Amperes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    AirTemperature,
    #[serde(other)]
    Other,
}

/// Thermostat mode as seen by the device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
pub enum ThermostatMode {
    Off,
    Heat,
    Cool,
}

/// Value returned by a configuration get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationValue {
    pub index: u16,
    pub size: u8,
    pub value: i64,
}

impl ConfigurationValue {
    /// Least significant byte of the parameter value.
    pub fn first_byte(&self) -> u8 {
        (self.value & 0xFF) as u8
    }
}

/// Decoded inbound report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Report {
    Basic {
        value: u8,
    },
    SwitchBinary {
        value: bool,
    },
    SwitchMultilevel {
        level: u8,
    },
    SwitchColor {
        component: ColorComponentId,
        value: u8,
    },
    Meter {
        scale: MeterScale,
        value: f64,
    },
    SensorMultilevel {
        sensor: SensorType,
        /// 0 = Celsius, 1 = Fahrenheit for temperature readings
        #[serde(default)]
        scale: u8,
        value: f64,
    },
    /// Sensor value text, e.g. "detected an event" or "idle"
    SensorBinary {
        sensor_value: String,
    },
    /// Parsed notification event text, e.g. "Event inactive"
    Notification {
        event: String,
    },
    Configuration {
        index: u16,
        value: i64,
    },
    ThermostatMode {
        mode: ThermostatMode,
    },
    ThermostatSetpoint {
        value: f64,
    },
}

impl Report {
    pub fn command_class(&self) -> CommandClass {
        match self {
            Self::Basic { .. } => CommandClass::Basic,
            Self::SwitchBinary { .. } => CommandClass::SwitchBinary,
            Self::SwitchMultilevel { .. } => CommandClass::SwitchMultilevel,
            Self::SwitchColor { .. } => CommandClass::SwitchColor,
            Self::Meter { .. } => CommandClass::Meter,
            Self::SensorMultilevel { .. } => CommandClass::SensorMultilevel,
            Self::SensorBinary { .. } => CommandClass::SensorBinary,
            Self::Notification { .. } => CommandClass::Notification,
            Self::Configuration { .. } => CommandClass::Configuration,
            Self::ThermostatMode { .. } => CommandClass::ThermostatMode,
            Self::ThermostatSetpoint { .. } => CommandClass::ThermostatSetpoint,
        }
    }

    /// Report type name used when subscribing to the transport.
    pub fn name(&self) -> &'static str {
        report_name(self.command_class())
    }
}

/// Report type name for a command class.
pub fn report_name(command_class: CommandClass) -> &'static str {
    match command_class {
        CommandClass::Basic => "BASIC_REPORT",
        CommandClass::SwitchBinary => "SWITCH_BINARY_REPORT",
        CommandClass::SwitchMultilevel => "SWITCH_MULTILEVEL_REPORT",
        CommandClass::SwitchColor => "SWITCH_COLOR_REPORT",
        CommandClass::SensorBinary => "SENSOR_BINARY_REPORT",
        CommandClass::SensorMultilevel => "SENSOR_MULTILEVEL_REPORT",
        CommandClass::Notification => "NOTIFICATION_REPORT",
        CommandClass::Meter => "METER_REPORT",
        CommandClass::Configuration => "CONFIGURATION_REPORT",
        CommandClass::Association => "ASSOCIATION_REPORT",
        CommandClass::MultiChannel => "MULTI_CHANNEL_CAPABILITY_REPORT",
        CommandClass::MultiChannelAssociation => "MULTI_CHANNEL_ASSOCIATION_REPORT",
        CommandClass::ThermostatMode => "THERMOSTAT_MODE_REPORT",
        CommandClass::ThermostatSetpoint => "THERMOSTAT_SETPOINT_REPORT",
    }
}

/// Outbound command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Basic {
        value: u8,
    },
    SwitchBinarySet {
        on: bool,
    },
    SwitchMultilevelSet {
        level: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    SwitchColorSet {
        white: u8,
        red: u8,
        green: u8,
        blue: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    MeterReset,
    ThermostatModeSet {
        mode: ThermostatMode,
    },
    ThermostatSetpointSet {
        value: f64,
    },
    AssociationRemove {
        group: u8,
        node_ids: Vec<u8>,
    },
    MultiChannelAssociationSet {
        group: u8,
        node_id: u8,
        endpoint: u8,
    },
}

impl Command {
    pub fn command_class(&self) -> CommandClass {
        match self {
            Self::Basic { .. } => CommandClass::Basic,
            Self::SwitchBinarySet { .. } => CommandClass::SwitchBinary,
            Self::SwitchMultilevelSet { .. } => CommandClass::SwitchMultilevel,
            Self::SwitchColorSet { .. } => CommandClass::SwitchColor,
            Self::MeterReset => CommandClass::Meter,
            Self::ThermostatModeSet { .. } => CommandClass::ThermostatMode,
            Self::ThermostatSetpointSet { .. } => CommandClass::ThermostatSetpoint,
            Self::AssociationRemove { .. } => CommandClass::Association,
            Self::MultiChannelAssociationSet { .. } => CommandClass::MultiChannelAssociation,
        }
    }
}

/// Status query answered with a [`Report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    SwitchColorGet { component: ColorComponentId },
    SwitchMultilevelGet,
    ThermostatModeGet,
}

impl Request {
    pub fn command_class(&self) -> CommandClass {
        match self {
            Self::SwitchColorGet { .. } => CommandClass::SwitchColor,
            Self::SwitchMultilevelGet => CommandClass::SwitchMultilevel,
            Self::ThermostatModeGet => CommandClass::ThermostatMode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_component_ids() {
        for component in ColorComponentId::ALL {
            assert_eq!(ColorComponentId::from_id(component.id()), Some(component));
        }
        assert_eq!(ColorComponentId::from_id(1), None);
    }

    #[test]
    fn test_report_json_shape() {
        let report: Report =
            serde_json::from_str(r#"{"type":"switch_color","component":"red","value":12}"#)
                .unwrap();
        assert_eq!(
            report,
            Report::SwitchColor {
                component: ColorComponentId::Red,
                value: 12
            }
        );
        assert_eq!(report.name(), "SWITCH_COLOR_REPORT");
    }
}

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Command classes the capability layer binds against.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandClass {
    Basic,
    SwitchBinary,
    SwitchMultilevel,
    SwitchColor,
    SensorBinary,
    SensorMultilevel,
    Notification,
    Meter,
    Configuration,
    Association,
    MultiChannel,
    MultiChannelAssociation,
    ThermostatMode,
    ThermostatSetpoint,
}

/// Generic device class advertised by a multi-channel endpoint.
///
/// Fixed at pairing time; the topology resolver classifies endpoints by it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceClassGeneric {
    SwitchBinary,
    SwitchMultilevel,
    SensorBinary,
    SensorMultilevel,
    SensorNotification,
    Thermostat,
    Meter,
    /// Any class the capability layer has no use for
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_command_class_names() {
        assert_eq!(CommandClass::SwitchBinary.to_string(), "SWITCH_BINARY");
        assert_eq!(
            CommandClass::from_str("MULTI_CHANNEL_ASSOCIATION").unwrap(),
            CommandClass::MultiChannelAssociation
        );
    }

    #[test]
    fn test_unknown_device_class_deserializes_as_other() {
        let class: DeviceClassGeneric = serde_json::from_str("\"av_control_point\"").unwrap();
        assert_eq!(class, DeviceClassGeneric::Other);
        let class: DeviceClassGeneric = serde_json::from_str("\"sensor_notification\"").unwrap();
        assert_eq!(class, DeviceClassGeneric::SensorNotification);
    }
}

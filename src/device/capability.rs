use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Hub capability identifiers.
///
/// Closed vocabulary: a record can only declare capabilities listed here.
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
pub enum Capability {
    Onoff,
    Dim,
    MeasurePower,
    MeterPower,
    MeasureVoltage,
    MeasureCurrent,
    MeasureTemperature,
    TargetTemperature,
    LightHue,
    LightSaturation,
    LightTemperature,
    LightMode,
    AllOn,
    AllOff,
    WindowcoveringsSet,
    WindowcoveringsTiltSet,
    AlarmContact,
    /// Thermostat mode reduced to `off`/`auto`
    #[serde(rename = "offAutoThermostatMode")]
    #[strum(serialize = "offAutoThermostatMode")]
    OffAutoThermostatMode,
    /// Legacy thermostat mode capability replaced by [`Capability::OffAutoThermostatMode`]
    CustomThermostatMode,
    /// Legacy boolean meter reset toggle
    ResetMeter,
    /// Legacy boolean calibration toggle
    Calibration,
    #[serde(rename = "button.reset_meter")]
    #[strum(serialize = "button.reset_meter")]
    ButtonResetMeter,
    #[serde(rename = "button.calibration")]
    #[strum(serialize = "button.calibration")]
    ButtonCalibration,
}

impl Capability {
    /// Capabilities combined by the RGBW aggregator into one color command.
    pub const LIGHT: [Capability; 6] = [
        Self::Onoff,
        Self::Dim,
        Self::LightHue,
        Self::LightSaturation,
        Self::LightTemperature,
        Self::LightMode,
    ];

    /// Maintenance actions are write-only buttons, never bound to a report.
    pub fn is_maintenance_action(self) -> bool {
        matches!(self, Self::ButtonResetMeter | Self::ButtonCalibration)
    }
}

//! Flush heat and cool thermostat (ZMNHID).
//!
//! The device mode (off/heat/cool) is exposed as `offAutoThermostatMode`
//! with values `off` and `auto`; `auto` means the working mode chosen by
//! parameter 59 (or overridden by input 3). The working mode is cached in
//! the store and refreshed from every heat/cool report.

use super::{
    DeviceProfile, MIN_POWER_REPORTING_INTERVAL_SECS, ProfileTraits, metered_settings,
};
use crate::binding::{BindOptions, Effect, ParserContext, Parsed, SetOutcome};
use crate::device::session::Registration;
use crate::device::{Capability, Settings, Value};
use crate::error::{BridgeError, Result};
use crate::flow::{OFF_AUTO_THERMOSTAT_MODE_CHANGED, token};
use crate::input::InputConfig;
use crate::migration::MigrationMap;
use crate::migration::range::TenthsCodec;
use crate::settings::{Encoding, SettingSpec, SettingsSchema};
use crate::zwave::{
    Command, CommandClass, DeviceClassGeneric, Report, Request, ThermostatMode,
    configuration_get_with_retry,
};
use async_trait::async_trait;
use log::{info, warn};
use std::str::FromStr;

pub const ID: &str = "ZMNHID";

/// Store key of the cached working mode (`Heat` or `Cool`).
pub const WORKING_MODE_STORE_KEY: &str = "thermostatMode";
/// Setting mirroring the working mode (`"0"` heat, `"1"` cool).
pub const THERMOSTAT_MODE_SETTING: &str = "thermostatMode";
pub const THERMOSTAT_MODE_PARAMETER: u16 = 59;
pub const ANTIFREEZE_DISABLED: i64 = 255;

pub const MODE_OFF: &str = "off";
pub const MODE_AUTO: &str = "auto";

#[derive(Debug, Default, Clone, Copy)]
pub struct FlushThermostat;

#[async_trait]
impl DeviceProfile for FlushThermostat {
    fn id(&self) -> &'static str {
        ID
    }

    fn traits(&self) -> ProfileTraits {
        ProfileTraits {
            metered: true,
            thermostat: true,
            min_power_reporting_interval: Some(MIN_POWER_REPORTING_INTERVAL_SECS),
            ..Default::default()
        }
    }

    fn settings_schema(&self) -> SettingsSchema {
        metered_settings()
            .with("functionalityInput3", SettingSpec::choice().parameter(4, 1))
            .with("enableInput1", SettingSpec::choice().parameter(100, 1))
            .with("enableInput2", SettingSpec::choice().parameter(101, 1))
            .with("enableInput3", SettingSpec::choice().parameter(102, 1))
            .with(
                "temperatureHysteresisOn",
                SettingSpec::number(-25.5, 25.5).step(0.1).encoded_parameter(
                    43,
                    2,
                    Encoding::Tenths(TenthsCodec::HYSTERESIS),
                ),
            )
            .with(
                "temperatureHysteresisOff",
                SettingSpec::number(-25.5, 25.5).step(0.1).encoded_parameter(
                    44,
                    2,
                    Encoding::Tenths(TenthsCodec::HYSTERESIS),
                ),
            )
            .with("antifreezeEnabled", SettingSpec::choice())
            .with(
                "antifreeze",
                SettingSpec::number(-12.6, 12.7).step(0.1).encoded_parameter(
                    45,
                    2,
                    Encoding::Switchable {
                        codec: TenthsCodec::ANTIFREEZE,
                        enabled_key: "antifreezeEnabled".to_string(),
                        disabled_raw: ANTIFREEZE_DISABLED,
                    },
                ),
            )
            .with(
                THERMOSTAT_MODE_SETTING,
                SettingSpec::choice().parameter(THERMOSTAT_MODE_PARAMETER, 1),
            )
            .with(
                "tooLowTemperatureLimit",
                SettingSpec::number(-15.0, 15.0).step(0.1).encoded_parameter(
                    60,
                    2,
                    Encoding::Tenths(TenthsCodec::TOO_LOW_LIMIT),
                ),
            )
            .with(
                "tooHighTemperatureLimit",
                SettingSpec::number(0.0, 100.0)
                    .step(0.1)
                    .encoded_parameter(61, 2, Encoding::Scaled(10.0)),
            )
    }

    fn migration_map(&self) -> MigrationMap {
        MigrationMap::new()
            .decoded(
                "temperatureHysteresisOn",
                "temperature_hysteresis_on",
                TenthsCodec::HYSTERESIS,
            )
            .decoded(
                "temperatureHysteresisOff",
                "temperature_hysteresis_off",
                TenthsCodec::HYSTERESIS,
            )
            .decoded("antifreeze", "antifreeze", TenthsCodec::ANTIFREEZE)
            .with("antifreezeEnabled", |legacy: &Settings| {
                legacy
                    .get("antifreeze")
                    .and_then(Value::as_f64)
                    .map(|raw| Value::Bool(raw != ANTIFREEZE_DISABLED as f64))
            })
            .decoded(
                "tooLowTemperatureLimit",
                "too_low_temperature_limit",
                TenthsCodec::TOO_LOW_LIMIT,
            )
            .scaled("tooHighTemperatureLimit", "too_high_temperature_limit", 0.1)
    }

    fn input_configs(&self) -> Vec<InputConfig> {
        vec![
            InputConfig::gated(1, 100),
            InputConfig::gated(2, 101),
            InputConfig::gated(3, 102),
        ]
    }

    fn root_device_class(&self) -> Option<DeviceClassGeneric> {
        Some(DeviceClassGeneric::Thermostat)
    }

    fn start_requests(&self) -> Vec<(Capability, Request)> {
        vec![(Capability::OffAutoThermostatMode, Request::ThermostatModeGet)]
    }

    async fn register_capabilities(&self, registration: &mut Registration<'_>) -> Result<()> {
        registration
            .ensure_capability(Capability::ButtonResetMeter)
            .await;

        match working_mode(registration).await {
            Some(mode) => info!("[Thermostat] Working mode {}", mode),
            None => warn!("[Thermostat] Working mode unknown"),
        }

        registration.bind(Capability::MeterPower, CommandClass::Meter, BindOptions::new());
        registration.bind(Capability::MeasurePower, CommandClass::Meter, BindOptions::new());
        registration.bind(
            Capability::TargetTemperature,
            CommandClass::ThermostatSetpoint,
            BindOptions::new(),
        );
        registration.bind(
            Capability::OffAutoThermostatMode,
            CommandClass::ThermostatMode,
            BindOptions::new()
                .report_parser(report_thermostat_mode)
                .set_parser(set_thermostat_mode),
        );
        Ok(())
    }
}

/// Cached working mode, read from parameter 59 on first use.
async fn working_mode(registration: &Registration<'_>) -> Option<ThermostatMode> {
    let record = registration.record();
    if let Some(mode) = cached_working_mode(record.store_value(WORKING_MODE_STORE_KEY).as_ref()) {
        return Some(mode);
    }

    let config = registration.config();
    let value = configuration_get_with_retry(
        registration.node(),
        THERMOSTAT_MODE_PARAMETER,
        config.transport.configuration_get_attempts,
        config.transport.timeout(),
    )
    .await
    .map_err(|e| warn!("[Thermostat] {}", e))
    .ok()?;

    let mode = if value.first_byte() != 0 {
        ThermostatMode::Cool
    } else {
        ThermostatMode::Heat
    };
    for effect in working_mode_effects(mode) {
        let result = match effect {
            Effect::Setting(key, value) => record.set_settings(Settings::from([(key, value)])).await,
            Effect::Store(key, value) => record.set_store_value(&key, value).await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!("[Thermostat] Failed to cache working mode: {}", e);
        }
    }
    Some(mode)
}

fn cached_working_mode(value: Option<&Value>) -> Option<ThermostatMode> {
    value
        .and_then(Value::as_str)
        .and_then(|text| ThermostatMode::from_str(text).ok())
        .filter(|mode| *mode != ThermostatMode::Off)
}

/// Setting and store updates recording a working mode.
fn working_mode_effects(mode: ThermostatMode) -> Vec<Effect> {
    let setting = if mode == ThermostatMode::Cool { "1" } else { "0" };
    vec![
        Effect::Setting(THERMOSTAT_MODE_SETTING.to_string(), Value::from(setting)),
        Effect::Store(WORKING_MODE_STORE_KEY.to_string(), Value::from(mode.as_ref())),
    ]
}

/// Device mode to `off`/`auto`; heat and cool also update the working mode
/// since input 3 may override it. Fires the mode flow on a change.
fn report_thermostat_mode(report: &Report, ctx: &ParserContext) -> Parsed {
    let Report::ThermostatMode { mode } = report else {
        return Parsed::ignore();
    };
    let (value, mut effects) = match mode {
        ThermostatMode::Off => (MODE_OFF, Vec::new()),
        ThermostatMode::Heat | ThermostatMode::Cool => (MODE_AUTO, working_mode_effects(*mode)),
    };
    if let Some(previous) = &ctx.previous
        && previous.as_str() != Some(value)
    {
        effects.push(Effect::Flow {
            flow_id: OFF_AUTO_THERMOSTAT_MODE_CHANGED.to_string(),
            tokens: Settings::new(),
            state: token("mode", value),
        });
    }
    Parsed {
        value: Some(Value::from(value)),
        effects,
    }
}

fn set_thermostat_mode(value: &Value, ctx: &ParserContext) -> Result<SetOutcome> {
    let mode = match value.as_str() {
        Some(MODE_OFF) => ThermostatMode::Off,
        Some(MODE_AUTO) => cached_working_mode(
            ctx.record.store_value(WORKING_MODE_STORE_KEY).as_ref(),
        )
        .ok_or_else(|| BridgeError::Unsupported("thermostat_working_mode_unknown".to_string()))?,
        _ => {
            return Err(BridgeError::InvalidSetting(format!(
                "unknown thermostat mode {value}"
            )));
        }
    };
    Ok(SetOutcome::command(Command::ThermostatModeSet { mode }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::device::session::DeviceSession;
    use crate::device::{DeviceRecord, MemoryDeviceRecord};
    use crate::flow::RecordingFlowSink;
    use crate::settings::SettingsChange;
    use crate::simulation::SimulatedNode;
    use crate::zwave::{MultiChannelNode, Node};
    use std::sync::Arc;

    fn thermostat_node() -> Node {
        Node::new(21)
            .with_command_class(CommandClass::MultiChannelAssociation)
            .with_endpoint(
                1,
                MultiChannelNode::new(DeviceClassGeneric::Thermostat)
                    .with_command_class(CommandClass::ThermostatMode)
                    .with_command_class(CommandClass::ThermostatSetpoint)
                    .with_command_class(CommandClass::Meter),
            )
            .with_endpoint(
                2,
                MultiChannelNode::new(DeviceClassGeneric::SensorBinary)
                    .with_command_class(CommandClass::SensorBinary),
            )
    }

    fn thermostat_record() -> Arc<MemoryDeviceRecord> {
        Arc::new(
            MemoryDeviceRecord::new()
                .with_capabilities(&[
                    Capability::OffAutoThermostatMode,
                    Capability::TargetTemperature,
                    Capability::MeasurePower,
                ])
                .with_capability_value(Capability::OffAutoThermostatMode, MODE_OFF),
        )
    }

    async fn start(
        sim: Arc<SimulatedNode>,
        record: Arc<MemoryDeviceRecord>,
        flows: Arc<RecordingFlowSink>,
    ) -> DeviceSession {
        DeviceSession::initialize(sim, record, flows, Box::new(FlushThermostat), Config::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_working_mode_read_from_parameter() {
        let sim = Arc::new(
            SimulatedNode::new(thermostat_node())
                .with_parameter(THERMOSTAT_MODE_PARAMETER, 1, 1)
                .with_thermostat_mode(ThermostatMode::Off),
        );
        let record = thermostat_record();
        let flows = Arc::new(RecordingFlowSink::new());
        let _session = start(sim.clone(), record.clone(), flows.clone()).await;

        assert_eq!(record.store_value(WORKING_MODE_STORE_KEY), Some(Value::from("Cool")));
        assert_eq!(record.setting(THERMOSTAT_MODE_SETTING), Some(Value::from("1")));
        // The root device endpoint is the thermostat endpoint
        assert_eq!(sim.requests(), vec![(Some(1), Request::ThermostatModeGet)]);
        assert!(flows.events().is_empty());
    }

    #[tokio::test]
    async fn test_mode_change_fires_flow_with_state() {
        let sim = Arc::new(
            SimulatedNode::new(thermostat_node()).with_thermostat_mode(ThermostatMode::Off),
        );
        let record = Arc::new(
            MemoryDeviceRecord::new()
                .with_capabilities(&[Capability::OffAutoThermostatMode])
                .with_capability_value(Capability::OffAutoThermostatMode, MODE_OFF)
                .with_store_value(WORKING_MODE_STORE_KEY, "Heat"),
        );
        let flows = Arc::new(RecordingFlowSink::new());
        let mut session = start(sim.clone(), record.clone(), flows.clone()).await;

        session.set_thermostat_mode(MODE_AUTO).await.unwrap();
        assert!(
            sim.sent_commands().contains(&(
                Some(1),
                Command::ThermostatModeSet {
                    mode: ThermostatMode::Heat
                }
            ))
        );
        assert_eq!(
            record.capability_value(Capability::OffAutoThermostatMode),
            Some(Value::from(MODE_AUTO))
        );

        let events = flows.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].flow_id, OFF_AUTO_THERMOSTAT_MODE_CHANGED);
        assert!(events[0].tokens.is_empty());
        assert_eq!(events[0].state.get("mode"), Some(&Value::from(MODE_AUTO)));

        // Input 3 switched the device to cooling
        session
            .handle_report(
                Some(1),
                Report::ThermostatMode {
                    mode: ThermostatMode::Cool,
                },
            )
            .await;
        assert_eq!(record.store_value(WORKING_MODE_STORE_KEY), Some(Value::from("Cool")));
        assert_eq!(flows.events().len(), 1);
    }

    #[tokio::test]
    async fn test_disabling_antifreeze_writes_sentinel() {
        let sim = Arc::new(SimulatedNode::new(thermostat_node()));
        let record = thermostat_record();
        let mut session = start(sim.clone(), record, Arc::new(RecordingFlowSink::new())).await;

        let change = SettingsChange::new(
            Settings::new(),
            Settings::from([
                ("antifreezeEnabled".to_string(), Value::Bool(false)),
                ("antifreeze".to_string(), Value::from(5.0)),
                ("temperatureHysteresisOn".to_string(), Value::from(-0.5)),
            ]),
            vec![
                "antifreezeEnabled".to_string(),
                "temperatureHysteresisOn".to_string(),
            ],
        );
        session.on_settings(change).await.unwrap();

        let sets = sim.configuration_sets();
        assert!(sets.contains(&(45, 2, ANTIFREEZE_DISABLED)));
        assert!(sets.contains(&(43, 2, 1005)));
    }

    #[tokio::test]
    async fn test_toggling_antifreeze_alone_uses_stored_temperature() {
        let sim = Arc::new(SimulatedNode::new(thermostat_node()));
        let record = thermostat_record();
        let mut session =
            start(sim.clone(), record.clone(), Arc::new(RecordingFlowSink::new())).await;
        record
            .set_settings(Settings::from([
                ("antifreezeEnabled".to_string(), Value::Bool(true)),
                ("antifreeze".to_string(), Value::from(5.0)),
            ]))
            .await
            .unwrap();
        let before = sim.configuration_sets().len();

        let change = SettingsChange::new(
            record.settings(),
            Settings::from([("antifreezeEnabled".to_string(), Value::Bool(false))]),
            vec!["antifreezeEnabled".to_string()],
        );
        session.on_settings(change).await.unwrap();
        assert_eq!(
            sim.configuration_sets()[before..],
            [(45, 2, ANTIFREEZE_DISABLED)]
        );
    }

    #[test]
    fn test_set_parser_uses_cached_working_mode() {
        let record = MemoryDeviceRecord::new().with_store_value(WORKING_MODE_STORE_KEY, "Cool");
        let ctx = ParserContext::new(&record, None);
        assert_eq!(
            set_thermostat_mode(&Value::from(MODE_AUTO), &ctx).unwrap().command,
            Some(Command::ThermostatModeSet {
                mode: ThermostatMode::Cool
            })
        );
        assert_eq!(
            set_thermostat_mode(&Value::from(MODE_OFF), &ctx).unwrap().command,
            Some(Command::ThermostatModeSet {
                mode: ThermostatMode::Off
            })
        );
        assert!(set_thermostat_mode(&Value::from("heat"), &ctx).is_err());
    }
}

//! Legacy settings migration.
//!
//! A [`MigrationMap`] associates a current settings key with a function that
//! computes its value from the legacy (flat) settings. Functions only read
//! other keys of the legacy snapshot, which keeps a migration run a pure
//! function of its input.

use super::range::TenthsCodec;
use crate::device::{Settings, Value};
use crate::error::{BridgeError, Result};
use crate::settings::SettingsSchema;
use std::collections::BTreeMap;

/// Legacy key holding the packed all-on/all-off parameter.
pub const LEGACY_ALL_ON_ALL_OFF: &str = "deactivate_ALL_ON_ALL_OFF";
pub const ALL_ON: &str = "allOn";
pub const ALL_OFF: &str = "allOff";

pub type MigrationFn = Box<dyn Fn(&Settings) -> Option<Value> + Send + Sync>;

/// Current settings key to migration function.
#[derive(Default)]
pub struct MigrationMap {
    entries: BTreeMap<String, MigrationFn>,
}

impl MigrationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom migration. Returning `None` keeps the current value.
    pub fn with<F>(mut self, key: &str, migrate: F) -> Self
    where
        F: Fn(&Settings) -> Option<Value> + Send + Sync + 'static,
    {
        self.entries.insert(key.to_string(), Box::new(migrate));
        self
    }

    /// Copy a legacy value as is.
    pub fn rename(self, key: &str, legacy: &str) -> Self {
        let legacy = legacy.to_string();
        self.with(key, move |settings| settings.get(&legacy).cloned())
    }

    /// Legacy numeric value multiplied by `factor`.
    pub fn scaled(self, key: &str, legacy: &str, factor: f64) -> Self {
        let legacy = legacy.to_string();
        self.with(key, move |settings| {
            settings
                .get(&legacy)
                .and_then(Value::as_f64)
                .map(|v| Value::Number(v * factor))
        })
    }

    /// Legacy boolean inverted.
    pub fn inverted(self, key: &str, legacy: &str) -> Self {
        let legacy = legacy.to_string();
        self.with(key, move |settings| {
            settings
                .get(&legacy)
                .and_then(Value::as_bool)
                .map(|v| Value::Bool(!v))
        })
    }

    /// Legacy raw parameter decoded through a tenths layout.
    pub fn decoded(self, key: &str, legacy: &str, codec: TenthsCodec) -> Self {
        let legacy = legacy.to_string();
        self.with(key, move |settings| {
            settings
                .get(&legacy)
                .and_then(Value::as_f64)
                .and_then(|raw| codec.decode(raw))
                .map(Value::Number)
        })
    }

    /// Overlay `other` on top of this map; its entries win on collision.
    pub fn overlay(mut self, other: MigrationMap) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Migrated value for `key`, `None` when there is no entry or the
    /// legacy value is missing or undecodable.
    pub fn apply(&self, key: &str, legacy: &Settings) -> Option<Value> {
        self.entries.get(key).and_then(|migrate| migrate(legacy))
    }
}

/// Legacy keys shared by every device family.
pub fn generic_migration_map() -> MigrationMap {
    MigrationMap::new()
        .rename("powerReportingThreshold", "power_report_on_power_change")
        .rename("switchTypeInput1", "input_1_type")
        .rename("switchTypeInput2", "input_2_type")
        .rename("switchTypeInput3", "input_3_type")
        .rename("contactTypeInput2", "input_2_contact_type")
        .rename("contactTypeInput3", "input_3_contact_type")
        .rename("autoOn", "automatic_turning_on_output_after_set_time")
        .rename("autoOff", "automatic_turning_off_output_after_set_time")
        .inverted("restoreStatus", "state_of_device_after_power_failure")
        .rename("powerReportingInterval", "power_report_by_time_interval")
        .rename("maximumDimValue", "maximum_dimming_value")
        .rename("minimumDimValue", "minimum_dimming_value")
        .scaled("dimDuration", "dimming_time_soft_on_off", 0.01)
        .rename("dimDurationKeyPressed", "dimming_time_when_key_pressed")
        .decoded(
            "temperatureSensorOffset",
            "temperature_sensor_offset",
            TenthsCodec::TEMPERATURE_OFFSET,
        )
        .scaled(
            "temperatureSensorReportingThreshold",
            "digital_temperature_sensor_reporting",
            0.1,
        )
}

/// Compute the migrated settings object.
///
/// Every key of `current` is either recomputed through `map` or kept. Numeric
/// results are clamped to the schema bounds afterwards.
pub fn migrate_settings(current: &Settings, map: &MigrationMap, schema: &SettingsSchema) -> Settings {
    current
        .iter()
        .map(|(key, value)| {
            let migrated = map.apply(key, current).unwrap_or_else(|| value.clone());
            let migrated = match schema.get(key) {
                Some(spec) => spec.clamp(migrated),
                None => migrated,
            };
            (key.clone(), migrated)
        })
        .collect()
}

/// Decode the packed all-on/all-off parameter into `(allOn, allOff)`.
pub fn decode_all_on_all_off(raw: &Value) -> Result<(bool, bool)> {
    let decoded = match raw.as_f64() {
        Some(v) if v == 255.0 => Some((true, true)),
        Some(v) if v == 0.0 => Some((false, false)),
        Some(v) if v == 1.0 => Some((false, true)),
        Some(v) if v == 2.0 => Some((true, false)),
        _ => None,
    };
    decoded.ok_or_else(|| BridgeError::MigrationDecode {
        key: LEGACY_ALL_ON_ALL_OFF.to_string(),
        value: raw.to_string(),
    })
}

/// Pack `(allOn, allOff)` back into the device parameter.
pub fn encode_all_on_all_off(all_on: bool, all_off: bool) -> i64 {
    match (all_on, all_off) {
        (true, true) => 255,
        (true, false) => 2,
        (false, true) => 1,
        (false, false) => 0,
    }
}

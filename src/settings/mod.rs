//! Settings change handling.
//!
//! A change is validated as a whole first, then planned into configuration
//! parameter writes. Nothing is written when validation fails.

pub mod schema;

pub use schema::{Encoding, ParameterRef, SettingSpec, SettingsSchema};

use crate::device::{Settings, Value};
use crate::error::{BridgeError, Result};
use crate::migration::{ALL_OFF, ALL_ON, encode_all_on_all_off};
use crate::zwave::ZwaveNode;
use log::{info, warn};

/// Returned to the hub when a changed setting only applies after re-pairing.
pub const REPAIR_MESSAGE: &str =
    "Re-pair the device to apply the changed input or mode configuration.";

pub const MAXIMUM_DIM_VALUE: &str = "maximumDimValue";
pub const MINIMUM_DIM_VALUE: &str = "minimumDimValue";
pub const POWER_REPORTING_INTERVAL: &str = "powerReportingInterval";

/// One settings update as delivered by the hub.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsChange {
    pub old: Settings,
    pub new: Settings,
    pub changed: Vec<String>,
}

impl SettingsChange {
    pub fn new(old: Settings, new: Settings, changed: Vec<String>) -> Self {
        Self { old, new, changed }
    }

    pub fn is_changed(&self, key: &str) -> bool {
        self.changed.iter().any(|k| k == key)
    }

    /// New value of `key`, else the value it had before the change.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.new.get(key).or_else(|| self.old.get(key))
    }

    /// Settings as they stand after the change.
    pub fn merged(&self) -> Settings {
        let mut settings = self.old.clone();
        settings.extend(self.new.iter().map(|(k, v)| (k.clone(), v.clone())));
        settings
    }
}

/// Raw configuration parameter write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterWrite {
    pub index: u16,
    pub size: u8,
    pub value: i64,
}

/// Reject a maximum dim level below the minimum.
pub fn validate_dim_bounds(change: &SettingsChange) -> Result<()> {
    if !change.is_changed(MAXIMUM_DIM_VALUE) && !change.is_changed(MINIMUM_DIM_VALUE) {
        return Ok(());
    }
    let max = change.value(MAXIMUM_DIM_VALUE).and_then(Value::as_f64);
    let min = change.value(MINIMUM_DIM_VALUE).and_then(Value::as_f64);
    if let (Some(max), Some(min)) = (max, min)
        && max < min
    {
        return Err(BridgeError::InvalidSetting(
            "max dim level cannot be lower than min dim level".to_string(),
        ));
    }
    Ok(())
}

/// Reject a nonzero power reporting interval below `minimum_secs`.
pub fn validate_power_reporting_interval(change: &SettingsChange, minimum_secs: f64) -> Result<()> {
    if !change.is_changed(POWER_REPORTING_INTERVAL) {
        return Ok(());
    }
    match change.value(POWER_REPORTING_INTERVAL).and_then(Value::as_f64) {
        Some(interval) if interval != 0.0 && interval < minimum_secs => {
            Err(BridgeError::InvalidSetting(format!(
                "power reporting interval must be 0 or at least {minimum_secs} seconds"
            )))
        }
        _ => Ok(()),
    }
}

/// Parameter writes for a validated change.
///
/// `allOn`/`allOff` are packed into one parameter when the profile declares
/// one. A setting whose encoding depends on a changed setting is rewritten
/// too, even when it did not change itself.
pub fn plan_parameter_writes(
    change: &SettingsChange,
    schema: &SettingsSchema,
    all_on_all_off: Option<(u16, u8)>,
) -> Vec<ParameterWrite> {
    let mut writes = Vec::new();
    let settings = change.merged();

    if let Some((index, size)) = all_on_all_off
        && (change.is_changed(ALL_ON) || change.is_changed(ALL_OFF))
    {
        let flag = |key: &str| change.value(key).and_then(Value::as_bool).unwrap_or(false);
        writes.push(ParameterWrite {
            index,
            size,
            value: encode_all_on_all_off(flag(ALL_ON), flag(ALL_OFF)),
        });
    }

    for key in schema.keys() {
        if key == ALL_ON || key == ALL_OFF {
            continue;
        }
        let Some(parameter) = schema.parameter(key) else {
            continue;
        };
        let dependency_changed = parameter
            .encoding
            .depends_on()
            .is_some_and(|dependency| change.is_changed(dependency));
        if !change.is_changed(key) && !dependency_changed {
            continue;
        }
        let Some(value) = change.value(key) else {
            continue;
        };
        match parameter.encoding.encode(value, &settings) {
            Some(raw) => writes.push(ParameterWrite {
                index: parameter.index,
                size: parameter.size,
                value: raw,
            }),
            None => warn!("[Settings] Cannot encode {} = {}, skipping", key, value),
        }
    }

    writes
}

/// Whether any changed key only takes effect after re-pairing.
pub fn requires_repair(change: &SettingsChange, repair_keys: &[&str]) -> bool {
    repair_keys.iter().any(|key| change.is_changed(key))
}

/// Send planned writes in order, stopping at the first failure.
pub async fn write_parameters(node: &dyn ZwaveNode, writes: &[ParameterWrite]) -> Result<()> {
    for write in writes {
        node.configuration_set(write.index, write.size, write.value)
            .await?;
        info!(
            "[Settings] Parameter {} set to {}",
            write.index, write.value
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::range::TenthsCodec;

    fn change(new: &[(&str, Value)], changed: &[&str]) -> SettingsChange {
        SettingsChange::new(
            Settings::new(),
            new.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            changed.iter().map(|k| k.to_string()).collect(),
        )
    }

    #[test]
    fn test_dim_bounds() {
        let bad = change(
            &[(MAXIMUM_DIM_VALUE, Value::from(10.0)), (MINIMUM_DIM_VALUE, Value::from(20.0))],
            &[MAXIMUM_DIM_VALUE],
        );
        assert!(matches!(
            validate_dim_bounds(&bad),
            Err(BridgeError::InvalidSetting(msg)) if msg.contains("max dim level")
        ));

        let good = change(
            &[(MAXIMUM_DIM_VALUE, Value::from(90.0)), (MINIMUM_DIM_VALUE, Value::from(20.0))],
            &[MINIMUM_DIM_VALUE],
        );
        assert!(validate_dim_bounds(&good).is_ok());
    }

    #[test]
    fn test_power_reporting_floor() {
        let too_short = change(&[(POWER_REPORTING_INTERVAL, Value::from(10.0))], &[POWER_REPORTING_INTERVAL]);
        assert!(validate_power_reporting_interval(&too_short, 30.0).is_err());
        let disabled = change(&[(POWER_REPORTING_INTERVAL, Value::from(0.0))], &[POWER_REPORTING_INTERVAL]);
        assert!(validate_power_reporting_interval(&disabled, 30.0).is_ok());
    }

    #[test]
    fn test_plan_packs_all_on_all_off() {
        let schema = SettingsSchema::new()
            .with(ALL_ON, SettingSpec::choice())
            .with(ALL_OFF, SettingSpec::choice())
            .with("autoOff", SettingSpec::number(0.0, 32535.0).parameter(11, 2));
        let change = change(
            &[
                (ALL_ON, Value::Bool(true)),
                (ALL_OFF, Value::Bool(false)),
                ("autoOff", Value::from(30.0)),
            ],
            &[ALL_ON, ALL_OFF],
        );

        let writes = plan_parameter_writes(&change, &schema, Some((10, 2)));
        assert_eq!(writes, vec![ParameterWrite { index: 10, size: 2, value: 2 }]);
    }

    #[test]
    fn test_plan_rewrites_dependent_setting() {
        let schema = SettingsSchema::new()
            .with("antifreezeEnabled", SettingSpec::choice())
            .with(
                "antifreeze",
                SettingSpec::number(0.0, 12.6).encoded_parameter(
                    60,
                    2,
                    Encoding::Switchable {
                        codec: TenthsCodec::ANTIFREEZE,
                        enabled_key: "antifreezeEnabled".to_string(),
                        disabled_raw: 255,
                    },
                ),
            );
        let change = change(
            &[("antifreezeEnabled", Value::Bool(false)), ("antifreeze", Value::from(5.0))],
            &["antifreezeEnabled"],
        );

        let writes = plan_parameter_writes(&change, &schema, None);
        assert_eq!(writes, vec![ParameterWrite { index: 60, size: 2, value: 255 }]);
    }

    fn partial_change(old: &[(&str, Value)], new: &[(&str, Value)], changed: &[&str]) -> SettingsChange {
        let settings = |pairs: &[(&str, Value)]| -> Settings {
            pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
        };
        SettingsChange::new(
            settings(old),
            settings(new),
            changed.iter().map(|k| k.to_string()).collect(),
        )
    }

    #[test]
    fn test_dim_bounds_checks_unchanged_bound() {
        let lowered_max = partial_change(
            &[(MINIMUM_DIM_VALUE, Value::from(50.0)), (MAXIMUM_DIM_VALUE, Value::from(99.0))],
            &[(MAXIMUM_DIM_VALUE, Value::from(10.0))],
            &[MAXIMUM_DIM_VALUE],
        );
        assert!(validate_dim_bounds(&lowered_max).is_err());

        let raised_min = partial_change(
            &[(MINIMUM_DIM_VALUE, Value::from(1.0)), (MAXIMUM_DIM_VALUE, Value::from(60.0))],
            &[(MINIMUM_DIM_VALUE, Value::from(40.0))],
            &[MINIMUM_DIM_VALUE],
        );
        assert!(validate_dim_bounds(&raised_min).is_ok());
    }

    #[test]
    fn test_plan_uses_previous_values_of_unchanged_keys() {
        let schema = SettingsSchema::new()
            .with("antifreezeEnabled", SettingSpec::choice())
            .with(
                "antifreeze",
                SettingSpec::number(0.0, 12.6).encoded_parameter(
                    45,
                    2,
                    Encoding::Switchable {
                        codec: TenthsCodec::ANTIFREEZE,
                        enabled_key: "antifreezeEnabled".to_string(),
                        disabled_raw: 255,
                    },
                ),
            )
            .with("sceneUnit", SettingSpec::choice())
            .with(
                "sceneDuration",
                SettingSpec::number(1.0, 127.0).encoded_parameter(
                    4,
                    2,
                    Encoding::Duration {
                        unit_key: "sceneUnit".to_string(),
                    },
                ),
            );

        let disabled = partial_change(
            &[("antifreezeEnabled", Value::Bool(true)), ("antifreeze", Value::from(5.0))],
            &[("antifreezeEnabled", Value::Bool(false))],
            &["antifreezeEnabled"],
        );
        assert_eq!(
            plan_parameter_writes(&disabled, &schema, None),
            vec![ParameterWrite { index: 45, size: 2, value: 255 }]
        );

        let duration_only = partial_change(
            &[("sceneUnit", Value::from("min")), ("sceneDuration", Value::from(2.0))],
            &[("sceneDuration", Value::from(5.0))],
            &["sceneDuration"],
        );
        assert_eq!(
            plan_parameter_writes(&duration_only, &schema, None),
            vec![ParameterWrite { index: 4, size: 2, value: 1005 }]
        );
    }

    #[test]
    fn test_all_on_all_off_keeps_unchanged_flag() {
        let change = partial_change(
            &[(ALL_ON, Value::Bool(true)), (ALL_OFF, Value::Bool(false))],
            &[(ALL_OFF, Value::Bool(true))],
            &[ALL_OFF],
        );
        let writes = plan_parameter_writes(&change, &SettingsSchema::new(), Some((10, 2)));
        assert_eq!(writes, vec![ParameterWrite { index: 10, size: 2, value: 255 }]);
    }

    #[test]
    fn test_repair_keys() {
        let change = change(&[("enableInput2", Value::Bool(true))], &["enableInput2"]);
        assert!(requires_repair(&change, &["enableInput2", "workingMode"]));
        assert!(!requires_repair(&change, &["workingMode"]));
    }
}

//! One-time migration of legacy settings and capabilities.
//!
//! Both steps are gated by the `migratedSettings` store flag. The flag is
//! read before and written after the run, so a crash in between simply
//! reruns the migration; both steps are idempotent for that reason.

pub mod capabilities;
pub mod range;
pub mod settings;

pub use capabilities::{
    CapabilityMigrationReport, CapabilityRule, RuleAction, RuleCondition, apply_capability_rules,
    base_capability_rules,
};
pub use settings::{
    ALL_OFF, ALL_ON, LEGACY_ALL_ON_ALL_OFF, MigrationMap, decode_all_on_all_off,
    encode_all_on_all_off, generic_migration_map, migrate_settings,
};

use crate::device::{DeviceRecord, Settings, Value};
use crate::settings::SettingsSchema;
use crate::zwave::Node;
use log::{debug, error, info, warn};

/// Store flag marking a completed migration.
pub const MIGRATED_SETTINGS_FLAG: &str = "migratedSettings";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    AlreadyMigrated,
    Migrated {
        settings_written: bool,
        capabilities: CapabilityMigrationReport,
    },
}

/// Run settings then capability migration unless the record is flagged.
///
/// Storage failures are logged; they never abort device initialization.
pub async fn run_migrations(
    record: &dyn DeviceRecord,
    node: &Node,
    map: &MigrationMap,
    schema: &SettingsSchema,
    rules: &[CapabilityRule],
) -> MigrationOutcome {
    let migrated = record
        .store_value(MIGRATED_SETTINGS_FLAG)
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if migrated {
        debug!("[Migration] Already migrated, skipping");
        return MigrationOutcome::AlreadyMigrated;
    }

    let legacy = record.settings();
    let new_settings = migrate_settings(&legacy, map, schema);
    let settings_written = match record.set_settings(new_settings).await {
        Ok(()) => {
            info!("[Migration] Migrated {} settings", legacy.len());
            true
        }
        Err(e) => {
            error!("[Migration] Failed to write migrated settings: {}", e);
            false
        }
    };

    migrate_all_on_all_off(record, &legacy).await;

    let capabilities = apply_capability_rules(record, node, rules).await;

    if let Err(e) = record
        .set_store_value(MIGRATED_SETTINGS_FLAG, Value::Bool(true))
        .await
    {
        warn!("[Migration] Failed to persist migration flag: {}", e);
    }

    MigrationOutcome::Migrated {
        settings_written,
        capabilities,
    }
}

async fn migrate_all_on_all_off(record: &dyn DeviceRecord, legacy: &Settings) {
    let Some(raw) = legacy.get(LEGACY_ALL_ON_ALL_OFF) else {
        return;
    };
    match decode_all_on_all_off(raw) {
        Ok((all_on, all_off)) => {
            let settings = Settings::from([
                (ALL_ON.to_string(), Value::Bool(all_on)),
                (ALL_OFF.to_string(), Value::Bool(all_off)),
            ]);
            if let Err(e) = record.set_settings(settings).await {
                error!("[Migration] Failed to write all on/all off settings: {}", e);
            }
        }
        Err(e) => error!("[Migration] {}", e),
    }
}

//! Declarative capability migration.

use crate::device::{Capability, DeviceRecord};
use crate::zwave::{CommandClass, Node};
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Add,
    Remove,
}

/// Node shape a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCondition {
    Always,
    /// Root of a device split into independent sub-endpoints
    HasSubEndpoints,
    /// Plain node, or the view of a single sub-endpoint
    NoSubEndpoints,
    Supports(CommandClass),
    Lacks(CommandClass),
}

impl RuleCondition {
    pub fn holds(self, node: &Node) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::HasSubEndpoints => node.has_sub_endpoints(),
            RuleCondition::NoSubEndpoints => !node.has_sub_endpoints(),
            RuleCondition::Supports(cc) => node.supports(cc),
            RuleCondition::Lacks(cc) => !node.supports(cc),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRule {
    pub capability: Capability,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl CapabilityRule {
    pub fn add(capability: Capability) -> Self {
        Self {
            capability,
            action: RuleAction::Add,
            condition: RuleCondition::Always,
        }
    }

    pub fn remove(capability: Capability) -> Self {
        Self {
            capability,
            action: RuleAction::Remove,
            condition: RuleCondition::Always,
        }
    }

    pub fn when(mut self, condition: RuleCondition) -> Self {
        self.condition = condition;
        self
    }
}

/// Legacy capabilities dropped from every profile.
pub fn base_capability_rules() -> Vec<CapabilityRule> {
    vec![
        CapabilityRule::remove(Capability::ResetMeter),
        CapabilityRule::remove(Capability::Calibration),
    ]
}

/// What a rule run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityMigrationReport {
    pub added: Vec<Capability>,
    pub removed: Vec<Capability>,
    pub failed: Vec<Capability>,
}

/// Apply rules in order against the record.
///
/// Rules check presence first, so applying the same list twice is a no-op
/// the second time. A failing rule is logged and the remaining rules still
/// run.
pub async fn apply_capability_rules(
    record: &dyn DeviceRecord,
    node: &Node,
    rules: &[CapabilityRule],
) -> CapabilityMigrationReport {
    let mut report = CapabilityMigrationReport::default();

    for rule in rules {
        if !rule.condition.holds(node) {
            continue;
        }
        let present = record.has_capability(rule.capability);
        let result = match rule.action {
            RuleAction::Add if !present => Some(record.add_capability(rule.capability).await),
            RuleAction::Remove if present => Some(record.remove_capability(rule.capability).await),
            _ => None,
        };

        match result {
            Some(Ok(())) => {
                info!("[Migration] {:?} capability {}", rule.action, rule.capability);
                match rule.action {
                    RuleAction::Add => report.added.push(rule.capability),
                    RuleAction::Remove => report.removed.push(rule.capability),
                }
            }
            Some(Err(e)) => {
                warn!(
                    "[Migration] Failed to {:?} capability {}: {}",
                    rule.action, rule.capability, e
                );
                report.failed.push(rule.capability);
            }
            None => {}
        }
    }

    report
}

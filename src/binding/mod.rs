//! Capability binding layer.
//!
//! Binds a hub capability to a command class on one endpoint, with a report
//! parser (report -> capability value) and an optional set parser
//! (capability value -> command). Parsers are pure: side effects such as
//! caching a value in the store or firing a flow are returned as
//! [`Effect`]s and applied by the device session.

pub mod parsers;

use crate::device::{Capability, DeviceRecord, Settings, Value};
use crate::error::{BridgeError, Result};
use crate::zwave::message::report_name;
use crate::zwave::{Command, CommandClass, Report, ZwaveNode};
use log::{debug, warn};
use std::sync::Arc;

/// Side effect requested by a parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Capability(Capability, Value),
    Store(String, Value),
    Setting(String, Value),
    Flow {
        flow_id: String,
        tokens: Settings,
        state: Settings,
    },
}

/// Read-only view handed to parsers.
pub struct ParserContext<'a> {
    pub record: &'a dyn DeviceRecord,
    /// For reports, the value the binding last parsed (seeded from the
    /// record); for writes, the current capability value
    pub previous: Option<Value>,
}

impl<'a> ParserContext<'a> {
    pub fn new(record: &'a dyn DeviceRecord, previous: Option<Value>) -> Self {
        Self { record, previous }
    }
}

/// Result of a report parser. `value = None` leaves the capability untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parsed {
    pub value: Option<Value>,
    pub effects: Vec<Effect>,
}

impl Parsed {
    pub fn ignore() -> Self {
        Self::default()
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

impl From<Option<Value>> for Parsed {
    fn from(value: Option<Value>) -> Self {
        Self {
            value,
            effects: Vec::new(),
        }
    }
}

/// Result of a set parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOutcome {
    /// Command to send; `None` when the write only has side effects
    pub command: Option<Command>,
    pub effects: Vec<Effect>,
}

impl SetOutcome {
    pub fn command(command: Command) -> Self {
        Self {
            command: Some(command),
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

pub type ReportParser = Arc<dyn Fn(&Report, &ParserContext) -> Parsed + Send + Sync>;
pub type SetParser = Arc<dyn Fn(&Value, &ParserContext) -> Result<SetOutcome> + Send + Sync>;

/// Endpoint a binding addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// The registry's default endpoint (root device endpoint)
    #[default]
    Default,
    Root,
    Endpoint(u8),
}

#[derive(Clone, Default)]
pub struct BindOptions {
    pub target: Target,
    pub report_parser: Option<ReportParser>,
    pub set_parser: Option<SetParser>,
    /// Device is unavailable when the command class is missing
    pub mandatory: bool,
}

impl BindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, endpoint: Option<u8>) -> Self {
        self.target = match endpoint {
            Some(index) => Target::Endpoint(index),
            None => Target::Root,
        };
        self
    }

    pub fn root(mut self) -> Self {
        self.target = Target::Root;
        self
    }

    pub fn report_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&Report, &ParserContext) -> Parsed + Send + Sync + 'static,
    {
        self.report_parser = Some(Arc::new(parser));
        self
    }

    pub fn set_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&Value, &ParserContext) -> Result<SetOutcome> + Send + Sync + 'static,
    {
        self.set_parser = Some(Arc::new(parser));
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// One live binding.
#[derive(Clone)]
pub struct Binding {
    pub capability: Capability,
    pub command_class: CommandClass,
    pub endpoint: Option<u8>,
    report_parser: ReportParser,
    set_parser: Option<SetParser>,
    last_reported: Option<Value>,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("capability", &self.capability)
            .field("command_class", &self.command_class)
            .field("endpoint", &self.endpoint)
            .field("settable", &self.set_parser.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Bound { endpoint: Option<u8> },
    /// Capability not declared on the record
    Skipped,
    MissingCommandClass { endpoint: Option<u8>, mandatory: bool },
}

/// Capability bindings of one device session.
pub struct BindingRegistry {
    default_endpoint: Option<u8>,
    bindings: Vec<Binding>,
}

impl BindingRegistry {
    pub fn new(default_endpoint: Option<u8>) -> Self {
        Self {
            default_endpoint,
            bindings: Vec::new(),
        }
    }

    pub fn default_endpoint(&self) -> Option<u8> {
        self.default_endpoint
    }

    /// Bind a capability unless the record does not declare it.
    ///
    /// On success the transport is asked to forward the command class
    /// reports of the endpoint.
    pub fn bind(
        &mut self,
        record: &dyn DeviceRecord,
        node: &dyn ZwaveNode,
        capability: Capability,
        command_class: CommandClass,
        options: BindOptions,
    ) -> BindOutcome {
        if !record.has_capability(capability) {
            debug!("[Binding] {} not declared, skipping", capability);
            return BindOutcome::Skipped;
        }

        let endpoint = match options.target {
            Target::Default => self.default_endpoint,
            Target::Root => None,
            Target::Endpoint(index) => Some(index),
        };
        if !node.node().endpoint_supports(endpoint, command_class) {
            warn!(
                "[Binding] {} unavailable: {} missing on endpoint {:?}",
                capability, command_class, endpoint
            );
            return BindOutcome::MissingCommandClass {
                endpoint,
                mandatory: options.mandatory,
            };
        }

        node.register_report_listener(endpoint, command_class, report_name(command_class));
        let report_parser = options
            .report_parser
            .unwrap_or_else(|| parsers::default_report_parser(capability, command_class));
        let set_parser = options
            .set_parser
            .or_else(|| parsers::default_set_parser(capability, command_class));

        debug!(
            "[Binding] {} -> {} on endpoint {:?}",
            capability, command_class, endpoint
        );
        self.bindings.push(Binding {
            capability,
            command_class,
            endpoint,
            report_parser,
            set_parser,
            last_reported: record.capability_value(capability),
        });
        BindOutcome::Bound { endpoint }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn is_bound(&self, capability: Capability) -> bool {
        self.bindings.iter().any(|b| b.capability == capability)
    }

    /// Endpoint of the first binding of a capability.
    pub fn endpoint_of(&self, capability: Capability) -> Option<Option<u8>> {
        self.bindings
            .iter()
            .find(|b| b.capability == capability)
            .map(|b| b.endpoint)
    }

    /// Run every binding matching the report's endpoint and command class.
    pub fn parse_report(
        &mut self,
        endpoint: Option<u8>,
        report: &Report,
        record: &dyn DeviceRecord,
    ) -> Vec<(Capability, Parsed)> {
        let command_class = report.command_class();
        self.bindings
            .iter_mut()
            .filter(|b| b.endpoint == endpoint && b.command_class == command_class)
            .map(|b| {
                let ctx = ParserContext::new(record, b.last_reported.take());
                let parsed = (b.report_parser)(report, &ctx);
                b.last_reported = parsed.value.clone().or(ctx.previous);
                (b.capability, parsed)
            })
            .collect()
    }

    /// Translate a capability write into a command for its endpoint.
    ///
    /// The first settable binding of the capability wins.
    pub fn build_set(
        &self,
        capability: Capability,
        value: &Value,
        record: &dyn DeviceRecord,
    ) -> Result<(Option<u8>, SetOutcome)> {
        let binding = self
            .bindings
            .iter()
            .find(|b| b.capability == capability && b.set_parser.is_some())
            .ok_or_else(|| BridgeError::Unsupported(format!("{capability} is not settable")))?;
        let Some(set_parser) = binding.set_parser.as_ref() else {
            return Err(BridgeError::Unsupported(format!("{capability} is not settable")));
        };
        let ctx = ParserContext::new(record, record.capability_value(capability));
        Ok((binding.endpoint, set_parser(value, &ctx)?))
    }
}

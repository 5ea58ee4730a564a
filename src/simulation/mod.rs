//! Simulated Z-Wave node for development and testing.
//!
//! Answers configuration gets and status requests from scripted values and
//! records everything the capability layer sends, so tests and the demo
//! binary can assert on the exact command stream.

use crate::error::{BridgeError, Result};
use crate::zwave::{
    ColorComponentId, Command, CommandClass, ConfigurationValue, Node, Report, Request,
    ThermostatMode, ZwaveNode,
};
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;

/// One registered report listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRegistration {
    pub endpoint: Option<u8>,
    pub command_class: CommandClass,
    pub report: &'static str,
}

#[derive(Debug, Default)]
struct DeviceState {
    parameters: BTreeMap<u16, ConfigurationValue>,
    colors: BTreeMap<ColorComponentId, u8>,
    level: u8,
    thermostat_mode: Option<ThermostatMode>,
}

#[derive(Debug, Default)]
struct Journal {
    sent: Vec<(Option<u8>, Command)>,
    requests: Vec<(Option<u8>, Request)>,
    configuration_sets: Vec<(u16, u8, i64)>,
    configuration_gets: BTreeMap<u16, u32>,
    listeners: Vec<ListenerRegistration>,
}

pub struct SimulatedNode {
    node: Node,
    state: RwLock<DeviceState>,
    journal: Mutex<Journal>,
    /// Remaining forced failures per configuration parameter
    get_failures: Mutex<BTreeMap<u16, u32>>,
    failing_commands: RwLock<Vec<CommandClass>>,
}

impl SimulatedNode {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            state: RwLock::new(DeviceState::default()),
            journal: Mutex::new(Journal::default()),
            get_failures: Mutex::new(BTreeMap::new()),
            failing_commands: RwLock::new(Vec::new()),
        }
    }

    pub fn with_parameter(self, index: u16, size: u8, value: i64) -> Self {
        self.state
            .write()
            .parameters
            .insert(index, ConfigurationValue { index, size, value });
        self
    }

    pub fn with_color(self, component: ColorComponentId, value: u8) -> Self {
        self.state.write().colors.insert(component, value);
        self
    }

    pub fn with_level(self, level: u8) -> Self {
        self.state.write().level = level;
        self
    }

    pub fn with_thermostat_mode(self, mode: ThermostatMode) -> Self {
        self.state.write().thermostat_mode = Some(mode);
        self
    }

    /// Make the next `times` gets of a parameter fail.
    pub fn fail_configuration_get(&self, index: u16, times: u32) {
        self.get_failures.lock().insert(index, times);
    }

    /// Make every command of a command class fail.
    pub fn fail_commands(&self, command_class: CommandClass) {
        self.failing_commands.write().push(command_class);
    }

    pub fn configuration_get_calls(&self, index: u16) -> u32 {
        self.journal
            .lock()
            .configuration_gets
            .get(&index)
            .copied()
            .unwrap_or(0)
    }

    pub fn parameter(&self, index: u16) -> Option<i64> {
        self.state.read().parameters.get(&index).map(|p| p.value)
    }

    pub fn sent_commands(&self) -> Vec<(Option<u8>, Command)> {
        self.journal.lock().sent.clone()
    }

    pub fn requests(&self) -> Vec<(Option<u8>, Request)> {
        self.journal.lock().requests.clone()
    }

    pub fn configuration_sets(&self) -> Vec<(u16, u8, i64)> {
        self.journal.lock().configuration_sets.clone()
    }

    pub fn listeners(&self) -> Vec<ListenerRegistration> {
        self.journal.lock().listeners.clone()
    }

    /// Mirror a command into the simulated device state.
    fn apply(&self, command: &Command) {
        let mut state = self.state.write();
        match command {
            Command::SwitchMultilevelSet { level, .. } => state.level = *level,
            Command::SwitchBinarySet { on } => state.level = if *on { 99 } else { 0 },
            Command::SwitchColorSet {
                white,
                red,
                green,
                blue,
                ..
            } => {
                state.colors.insert(ColorComponentId::White, *white);
                state.colors.insert(ColorComponentId::Red, *red);
                state.colors.insert(ColorComponentId::Green, *green);
                state.colors.insert(ColorComponentId::Blue, *blue);
            }
            Command::ThermostatModeSet { mode } => state.thermostat_mode = Some(*mode),
            _ => {}
        }
    }
}

#[async_trait]
impl ZwaveNode for SimulatedNode {
    fn node(&self) -> &Node {
        &self.node
    }

    async fn configuration_get(&self, index: u16) -> Result<ConfigurationValue> {
        *self
            .journal
            .lock()
            .configuration_gets
            .entry(index)
            .or_insert(0) += 1;

        {
            let mut failures = self.get_failures.lock();
            if let Some(remaining) = failures.get_mut(&index)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(BridgeError::Transport(format!(
                    "no response to configuration get {index}"
                )));
            }
        }

        self.state
            .read()
            .parameters
            .get(&index)
            .copied()
            .ok_or_else(|| BridgeError::Transport(format!("unknown configuration parameter {index}")))
    }

    async fn configuration_set(&self, index: u16, size: u8, value: i64) -> Result<()> {
        info!("[Sim] Configuration set {} = {} ({} bytes)", index, value, size);
        self.journal.lock().configuration_sets.push((index, size, value));
        self.state
            .write()
            .parameters
            .insert(index, ConfigurationValue { index, size, value });
        Ok(())
    }

    async fn send_command(&self, endpoint: Option<u8>, command: Command) -> Result<()> {
        if self
            .failing_commands
            .read()
            .contains(&command.command_class())
        {
            return Err(BridgeError::Transport(format!(
                "{} rejected",
                command.command_class()
            )));
        }
        debug!("[Sim] Endpoint {:?} <- {:?}", endpoint, command);
        self.apply(&command);
        self.journal.lock().sent.push((endpoint, command));
        Ok(())
    }

    async fn request(&self, endpoint: Option<u8>, request: Request) -> Result<Report> {
        self.journal.lock().requests.push((endpoint, request));
        let state = self.state.read();
        match request {
            Request::SwitchColorGet { component } => Ok(Report::SwitchColor {
                component,
                value: state.colors.get(&component).copied().unwrap_or(0),
            }),
            Request::SwitchMultilevelGet => Ok(Report::SwitchMultilevel { level: state.level }),
            Request::ThermostatModeGet => state
                .thermostat_mode
                .map(|mode| Report::ThermostatMode { mode })
                .ok_or_else(|| BridgeError::Transport("thermostat mode not supported".to_string())),
        }
    }

    fn register_report_listener(
        &self,
        endpoint: Option<u8>,
        command_class: CommandClass,
        report: &'static str,
    ) {
        debug!("[Sim] Listening for {} on {:?}", report, endpoint);
        self.journal.lock().listeners.push(ListenerRegistration {
            endpoint,
            command_class,
            report,
        });
    }
}

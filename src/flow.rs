//! Outbound automation events.
//!
//! The hub's flow engine is an external collaborator. The capability layer
//! only emits named triggers with tokens and state through [`FlowSink`].

use crate::device::{Settings, Value};
use crate::error::Result;
use async_trait::async_trait;
use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;

/// Thermostat mode capability changed.
pub const OFF_AUTO_THERMOSTAT_MODE_CHANGED: &str = "offAutoThermostatModeChanged";

#[async_trait]
pub trait FlowSink: Send + Sync + 'static {
    async fn trigger(&self, flow_id: &str, tokens: Settings, state: Settings) -> Result<()>;
}

/// Sink that only logs.
#[derive(Debug, Default)]
pub struct LoggingFlowSink;

#[async_trait]
impl FlowSink for LoggingFlowSink {
    async fn trigger(&self, flow_id: &str, tokens: Settings, _state: Settings) -> Result<()> {
        info!("[Flow] Triggered {} {:?}", flow_id, tokens);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEvent {
    pub flow_id: String,
    pub tokens: Settings,
    pub state: Settings,
}

/// Sink that keeps every trigger in memory.
#[derive(Debug, Default)]
pub struct RecordingFlowSink {
    events: Mutex<Vec<FlowEvent>>,
}

impl RecordingFlowSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FlowEvent> {
        self.events.lock().clone()
    }

    pub fn flow_ids(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.flow_id.clone()).collect()
    }
}

#[async_trait]
impl FlowSink for RecordingFlowSink {
    async fn trigger(&self, flow_id: &str, tokens: Settings, state: Settings) -> Result<()> {
        info!("[Flow] Triggered {}", flow_id);
        self.events.lock().push(FlowEvent {
            flow_id: flow_id.to_string(),
            tokens,
            state,
        });
        Ok(())
    }
}

/// Fire a trigger; failures are logged and dropped.
pub async fn trigger_flow(sink: &dyn FlowSink, flow_id: &str, tokens: Settings, state: Settings) {
    if let Err(e) = sink.trigger(flow_id, tokens, state).await {
        warn!("[Flow] Failed to trigger {}: {}", flow_id, e);
    }
}

/// Single-token map.
pub fn token(name: &str, value: impl Into<Value>) -> Settings {
    Settings::from([(name.to_string(), value.into())])
}

/// Trigger names of one digital input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowTriggers {
    pub on: String,
    pub off: String,
    pub toggle: String,
}

impl FlowTriggers {
    /// `inputOneTurnedOn`, `inputOneTurnedOff`, `inputOneToggled` and so on.
    pub fn for_input(input_id: u8) -> Self {
        let name = match input_id {
            1 => "One",
            2 => "Two",
            3 => "Three",
            4 => "Four",
            _ => "Unknown",
        };
        Self {
            on: format!("input{name}TurnedOn"),
            off: format!("input{name}TurnedOff"),
            toggle: format!("input{name}Toggled"),
        }
    }
}

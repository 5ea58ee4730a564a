//! Async driver around [`RgbwAggregator`].
//!
//! One task per light owns the aggregator. Hub writes and color reports
//! arrive over a channel and are coalesced into debounce windows that
//! restart on every new event. A window is handled to completion (command
//! sent, capabilities updated) before the next event is read, so two
//! windows never overlap.

use super::aggregator::{LightCommand, LightState, LightWrite, ReportDecision, RgbwAggregator};
use super::color::Rgbw;
use crate::binding::parsers::{fraction_to_level, level_to_fraction};
use crate::device::{Capability, DeviceRecord, Value};
use crate::error::{BridgeError, Result};
use crate::zwave::{ColorComponentId, Command, Report, Request, ZwaveNode};
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// Input of the light task.
#[derive(Debug, Clone, PartialEq)]
pub enum LightEvent {
    /// Hub write to one light capability
    Write(Capability, Value),
    /// Single-channel color report from the device
    Report(ColorComponentId, u8),
}

/// Sender side of a running light task.
#[derive(Clone)]
pub struct LightHandle {
    tx: mpsc::Sender<LightEvent>,
}

impl LightHandle {
    pub async fn write(&self, capability: Capability, value: Value) -> Result<()> {
        self.send(LightEvent::Write(capability, value)).await
    }

    pub async fn report(&self, component: ColorComponentId, value: u8) -> Result<()> {
        self.send(LightEvent::Report(component, value)).await
    }

    async fn send(&self, event: LightEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| BridgeError::ChannelClosed("light task stopped".to_string()))
    }
}

pub struct LightController {
    aggregator: RgbwAggregator,
    node: Arc<dyn ZwaveNode>,
    record: Arc<dyn DeviceRecord>,
    endpoint: Option<u8>,
    write_window: Duration,
    report_window: Duration,
    fetch_on_start: bool,
}

impl LightController {
    pub fn new(
        node: Arc<dyn ZwaveNode>,
        record: Arc<dyn DeviceRecord>,
        endpoint: Option<u8>,
    ) -> Self {
        Self {
            aggregator: RgbwAggregator::new(),
            node,
            record,
            endpoint,
            write_window: Duration::from_millis(500),
            report_window: Duration::from_millis(500),
            fetch_on_start: true,
        }
    }

    pub fn with_windows(mut self, write_window: Duration, report_window: Duration) -> Self {
        self.write_window = write_window;
        self.report_window = report_window;
        self
    }

    /// Skip reading the current color from the device when the task starts.
    pub fn without_initial_fetch(mut self) -> Self {
        self.fetch_on_start = false;
        self
    }

    /// Spawn the light task.
    pub fn start(self) -> (LightHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(async move {
            self.run(rx).await;
        });
        (LightHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<LightEvent>) {
        if self.fetch_on_start
            && let Err(e) = self.fetch_initial_state().await
        {
            warn!("[RGBW] Failed to read initial light state: {}", e);
        }

        let mut write = LightWrite::default();
        let mut write_deadline: Option<Instant> = None;
        let mut reports: Vec<(ColorComponentId, u8)> = Vec::new();
        let mut report_deadline: Option<Instant> = None;

        loop {
            let next = write_deadline.into_iter().chain(report_deadline).min();
            tokio::select! {
                event = rx.recv() => match event {
                    Some(LightEvent::Write(capability, value)) => {
                        if write.set(capability, &value) {
                            write_deadline = Some(Instant::now() + self.write_window);
                        } else {
                            warn!("[RGBW] Ignoring write {} = {}", capability, value);
                        }
                    }
                    Some(LightEvent::Report(component, value)) => {
                        reports.push((component, value));
                        report_deadline = Some(Instant::now() + self.report_window);
                    }
                    None => break,
                },
                _ = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                    let now = Instant::now();
                    if write_deadline.is_some_and(|d| d <= now) {
                        write_deadline = None;
                        let batch = std::mem::take(&mut write);
                        self.flush_write(batch).await;
                    }
                    if report_deadline.is_some_and(|d| d <= now) {
                        report_deadline = None;
                        let batch = std::mem::take(&mut reports);
                        self.flush_reports(batch).await;
                    }
                }
            }
        }

        if !write.is_empty() {
            self.flush_write(write).await;
        }
        debug!("[RGBW] Light task stopped");
    }

    async fn flush_write(&mut self, write: LightWrite) {
        let current = LightState::from_record(self.record.as_ref());
        let plan = self.aggregator.handle_write(&write, &current);
        debug!("[RGBW] Write {:?} planned as {:?}", write, plan.command);

        if let Some(command) = plan.command {
            let command = match command {
                LightCommand::DimOnly { dim } => Command::SwitchMultilevelSet {
                    level: fraction_to_level(dim),
                    duration_ms: None,
                },
                LightCommand::Off => Command::SwitchMultilevelSet {
                    level: 0,
                    duration_ms: None,
                },
                LightCommand::SetColor(rgbw) => rgbw.to_command(None),
            };
            if let Err(e) = self.node.send_command(self.endpoint, command).await {
                warn!("[RGBW] Failed to send light command: {}", e);
                return;
            }
        }

        let merged = write.merged_over(&current);
        let mut updates = Vec::new();
        if write.onoff.is_some() {
            updates.push((Capability::Onoff, Value::Bool(merged.onoff)));
        }
        if write.dim.is_some() {
            updates.push((Capability::Dim, Value::Number(merged.dim)));
        }
        if write.hue.is_some() {
            updates.push((Capability::LightHue, Value::Number(merged.hue)));
        }
        if write.saturation.is_some() {
            updates.push((Capability::LightSaturation, Value::Number(merged.saturation)));
        }
        if write.temperature.is_some() {
            updates.push((Capability::LightTemperature, Value::Number(merged.temperature)));
        }
        if write.mode.is_some() {
            updates.push((Capability::LightMode, Value::from(merged.mode.as_ref())));
        }
        updates.extend(plan.updates);
        self.apply_updates(updates).await;
    }

    async fn flush_reports(&mut self, reports: Vec<(ColorComponentId, u8)>) {
        let current = LightState::from_record(self.record.as_ref());
        match self.aggregator.handle_reports(&reports, &current) {
            ReportDecision::Ignore => {
                debug!("[RGBW] Ignoring echo of local off command");
            }
            ReportDecision::Apply(updates) => self.apply_updates(updates).await,
            ReportDecision::Refresh { missing } => {
                debug!("[RGBW] Reports incomplete, missing {:?}; refreshing", missing);
                let (colors, dim) = tokio::join!(self.fetch_colors(), self.refresh_dim());
                match colors {
                    Ok(rgbw) => {
                        let dim = dim.unwrap_or(current.dim);
                        let current = LightState::from_record(self.record.as_ref());
                        let updates = self.aggregator.handle_refreshed(rgbw, dim, &current);
                        self.apply_updates(updates).await;
                    }
                    Err(e) => warn!("[RGBW] Failed to refresh color channels: {}", e),
                }
            }
        }
    }

    /// Read dim and all four channels, then derive the capabilities.
    async fn fetch_initial_state(&mut self) -> Result<()> {
        let dim = self.refresh_dim().await.unwrap_or(0.0);
        self.apply_updates(vec![(Capability::Onoff, Value::Bool(dim > 0.0))])
            .await;
        let rgbw = self.fetch_colors().await?;
        let current = LightState::from_record(self.record.as_ref());
        let updates = self.aggregator.handle_refreshed(rgbw, dim, &current);
        self.apply_updates(updates).await;
        info!("[RGBW] Initial state: {:?} at dim {:.2}", rgbw, dim);
        Ok(())
    }

    /// Query the dim level and store it on the record.
    async fn refresh_dim(&self) -> Option<f64> {
        match self
            .node
            .request(self.endpoint, Request::SwitchMultilevelGet)
            .await
        {
            Ok(Report::SwitchMultilevel { level }) => {
                let dim = level_to_fraction(level);
                if let Err(e) = self
                    .record
                    .set_capability_value(Capability::Dim, Value::Number(dim))
                    .await
                {
                    warn!("[RGBW] Failed to store refreshed dim: {}", e);
                }
                Some(dim)
            }
            Ok(other) => {
                warn!("[RGBW] Unexpected reply to dim refresh: {:?}", other);
                None
            }
            Err(e) => {
                warn!("[RGBW] Dim refresh failed: {}", e);
                None
            }
        }
    }

    /// Query all four channels concurrently.
    async fn fetch_colors(&self) -> Result<Rgbw> {
        let requests = ColorComponentId::ALL.map(|component| {
            self.node
                .request(self.endpoint, Request::SwitchColorGet { component })
        });
        let mut rgbw = Rgbw::default();
        for (component, reply) in ColorComponentId::ALL.into_iter().zip(join_all(requests).await) {
            match reply? {
                Report::SwitchColor { value, .. } => rgbw.set_channel(component, f64::from(value)),
                other => {
                    return Err(BridgeError::Transport(format!(
                        "unexpected reply to {component} get: {other:?}"
                    )));
                }
            }
        }
        Ok(rgbw)
    }

    async fn apply_updates(&self, updates: Vec<(Capability, Value)>) {
        for (capability, value) in updates {
            if !self.record.has_capability(capability) {
                continue;
            }
            if let Err(e) = self.record.set_capability_value(capability, value).await {
                warn!("[RGBW] Failed to update {}: {}", capability, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDeviceRecord;
    use crate::simulation::SimulatedNode;
    use crate::zwave::Node;

    fn light_record() -> Arc<MemoryDeviceRecord> {
        Arc::new(
            MemoryDeviceRecord::new()
                .with_capabilities(&Capability::LIGHT)
                .with_capability_value(Capability::Onoff, true)
                .with_capability_value(Capability::Dim, 1.0)
                .with_capability_value(Capability::LightHue, 0.0)
                .with_capability_value(Capability::LightSaturation, 1.0)
                .with_capability_value(Capability::LightMode, "color"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_in_one_window_become_one_command() {
        let sim = Arc::new(SimulatedNode::new(Node::new(8)));
        let record = light_record();
        let (light, _task) = LightController::new(sim.clone(), record.clone(), None)
            .without_initial_fetch()
            .start();

        light.write(Capability::LightHue, Value::from(1.0 / 3.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        light.write(Capability::Dim, Value::from(0.5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        let sent = sim.sent_commands();
        assert_eq!(sent.len(), 1, "{sent:?}");
        let Command::SwitchColorSet { red, green, .. } = sent[0].1 else {
            panic!("expected a color set, got {:?}", sent[0]);
        };
        assert_eq!((red, green), (0, 128));
        assert_eq!(record.capability_value(Capability::Dim), Some(Value::Number(0.5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_reports_trigger_refresh() {
        let sim = Arc::new(
            SimulatedNode::new(Node::new(8))
                .with_color(ColorComponentId::Red, 0)
                .with_color(ColorComponentId::Green, 0)
                .with_color(ColorComponentId::Blue, 120)
                .with_color(ColorComponentId::White, 0)
                .with_level(99),
        );
        let record = light_record();
        let (light, _task) = LightController::new(sim.clone(), record.clone(), None)
            .without_initial_fetch()
            .start();

        light.report(ColorComponentId::Blue, 120).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        // Four channel gets plus one dim refresh
        assert_eq!(sim.requests().len(), 5);
        let hue = record
            .capability_value(Capability::LightHue)
            .and_then(|v| v.as_f64())
            .unwrap();
        assert!((hue - 2.0 / 3.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_fetch_reads_device_state() {
        let sim = Arc::new(
            SimulatedNode::new(Node::new(8))
                .with_color(ColorComponentId::White, 200)
                .with_level(0),
        );
        let record = light_record();
        let (_light, _task) = LightController::new(sim.clone(), record.clone(), None).start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(record.capability_value(Capability::Onoff), Some(Value::Bool(true)));
        assert_eq!(
            record.capability_value(Capability::LightMode),
            Some(Value::from("temperature"))
        );
    }
}

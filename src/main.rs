//! Replays hub and device events against a simulated node.
//!
//! Loads a device fixture (profile, node graph, record snapshot and device
//! state), initializes a session, feeds it the events file and prints the
//! resulting record and command stream as JSON.

use clap::Parser;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use zwave_capability_bridge::config::{Config, load_dotenv};
use zwave_capability_bridge::device::{
    Capability, DeviceRecord, DeviceSession, MemoryDeviceRecord, RecordSnapshot, Settings, Value,
};
use zwave_capability_bridge::error::Result;
use zwave_capability_bridge::flow::{FlowEvent, RecordingFlowSink};
use zwave_capability_bridge::profiles::profile_by_id;
use zwave_capability_bridge::settings::SettingsChange;
use zwave_capability_bridge::simulation::SimulatedNode;
use zwave_capability_bridge::zwave::{
    ColorComponentId, Command, ConfigurationValue, Node, Report, ThermostatMode,
};

#[derive(Parser, Debug)]
#[command(name = "zwave-capability-bridge", version, about)]
struct Args {
    /// Device fixture (JSON)
    #[arg(long, env = "ZWAVE_FIXTURE")]
    fixture: PathBuf,

    /// Events to replay (JSON array)
    #[arg(long, env = "ZWAVE_EVENTS")]
    events: Option<PathBuf>,

    /// Overrides the profile named in the fixture
    #[arg(long, env = "ZWAVE_PROFILE")]
    profile: Option<String>,

    /// Time to let debounce windows and timers run out before printing
    #[arg(long, env = "ZWAVE_SETTLE_MS", default_value_t = 1000)]
    settle_ms: u64,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    profile: String,
    node: Node,
    #[serde(default)]
    record: RecordSnapshot,
    #[serde(default)]
    parameters: Vec<ConfigurationValue>,
    #[serde(default)]
    colors: Vec<(ColorComponentId, u8)>,
    #[serde(default)]
    level: u8,
    #[serde(default)]
    thermostat_mode: Option<ThermostatMode>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayEvent {
    Report {
        #[serde(default)]
        endpoint: Option<u8>,
        report: Report,
    },
    Write {
        capability: Capability,
        value: Value,
    },
    Settings {
        new: Settings,
        changed: Vec<String>,
    },
    Action {
        action: Action,
    },
    Wait {
        ms: u64,
    },
}

/// User-triggered device actions.
#[derive(Debug, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
enum Action {
    ResetMeter {
        #[serde(default)]
        endpoint: Option<u8>,
    },
    AllOn,
    AllOff,
    Calibrate,
    ThermostatMode {
        mode: String,
    },
}

#[derive(Debug, Serialize)]
struct Outcome {
    record: RecordSnapshot,
    sent: Vec<(Option<u8>, Command)>,
    configuration_sets: Vec<(u16, u8, i64)>,
    flows: Vec<FlowEvent>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn main() {
    load_dotenv();
    init_logger();
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(args)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::from_env();
    let fixture: Fixture = read_json(&args.fixture)?;
    let events: Vec<ReplayEvent> = match &args.events {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let profile = profile_by_id(args.profile.as_deref().unwrap_or(&fixture.profile))?;
    info!("Replaying {} events on a {} device", events.len(), profile.id());

    let mut sim = SimulatedNode::new(fixture.node).with_level(fixture.level);
    for parameter in fixture.parameters {
        sim = sim.with_parameter(parameter.index, parameter.size, parameter.value);
    }
    for (component, value) in fixture.colors {
        sim = sim.with_color(component, value);
    }
    if let Some(mode) = fixture.thermostat_mode {
        sim = sim.with_thermostat_mode(mode);
    }
    let sim = Arc::new(sim);
    let record = Arc::new(MemoryDeviceRecord::from_snapshot(fixture.record));
    let flows = Arc::new(RecordingFlowSink::new());

    let mut session =
        DeviceSession::initialize(sim.clone(), record.clone(), flows.clone(), profile, config)
            .await?;

    for event in events {
        replay(&mut session, record.as_ref(), event).await;
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(args.settle_ms)) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, printing current state"),
    }
    session.shutdown().await;

    let outcome = Outcome {
        record: record.snapshot(),
        sent: sim.sent_commands(),
        configuration_sets: sim.configuration_sets(),
        flows: flows.events(),
    };
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn replay(session: &mut DeviceSession, record: &dyn DeviceRecord, event: ReplayEvent) {
    let result = match event {
        ReplayEvent::Report { endpoint, report } => {
            session.handle_report(endpoint, report).await;
            Ok(())
        }
        ReplayEvent::Write { capability, value } => session.set_capability(capability, value).await,
        ReplayEvent::Settings { new, changed } => {
            let change = SettingsChange::new(record.settings(), new, changed);
            session.on_settings(change).await.map(|message| {
                if let Some(message) = message {
                    info!("{}", message);
                }
            })
        }
        ReplayEvent::Action { action } => match action {
            Action::ResetMeter { endpoint } => session.reset_meter(endpoint).await,
            Action::AllOn => session.turn_all_on().await,
            Action::AllOff => session.turn_all_off().await,
            Action::Calibrate => session.calibrate().await,
            Action::ThermostatMode { mode } => session.set_thermostat_mode(&mode).await,
        },
        ReplayEvent::Wait { ms } => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!("Event rejected: {}", e);
    }
}

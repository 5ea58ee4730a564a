//! Flush shutter (ZMNHOD).
//!
//! Position and tilt are served by the first and second window covering
//! endpoints. Calibration is started by writing parameter 78 and reset to
//! idle after a fixed delay; re-triggering a running calibration restarts
//! it.

use super::{DeviceProfile, ProfileTraits, metered_settings};
use crate::binding::{BindOptions, Effect};
use crate::device::session::Registration;
use crate::device::{Capability, DeviceRecord, Value};
use crate::error::Result;
use crate::settings::{Encoding, SettingSpec, SettingsChange, SettingsSchema};
use crate::topology::EndpointPurpose;
use crate::zwave::{CommandClass, ZwaveNode};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const ID: &str = "ZMNHOD";

pub const CALIBRATION_PARAMETER: (u16, u8) = (78, 1);
pub const INVERT_DIRECTION: &str = "invertWindowCoveringsDirection";
pub const INVERT_TILT_DIRECTION: &str = "invertWindowCoveringsTiltDirection";

#[derive(Debug, Default, Clone, Copy)]
pub struct FlushShutter;

#[async_trait]
impl DeviceProfile for FlushShutter {
    fn id(&self) -> &'static str {
        ID
    }

    fn traits(&self) -> ProfileTraits {
        ProfileTraits {
            metered: true,
            shutter: true,
            ..Default::default()
        }
    }

    fn settings_schema(&self) -> SettingsSchema {
        metered_settings()
            .with("operatingMode", SettingSpec::choice().parameter(71, 1))
            .with(
                "slatsTiltingTime",
                SettingSpec::number(0.0, 327.67)
                    .encoded_parameter(72, 2, Encoding::Scaled(100.0)),
            )
            .with(
                "motorMovingTime",
                SettingSpec::number(0.0, 3276.7)
                    .step(0.1)
                    .encoded_parameter(74, 2, Encoding::Scaled(10.0)),
            )
            .with(
                "motorOperationDetection",
                SettingSpec::number(0.0, 12.7).encoded_parameter(76, 1, Encoding::Scaled(10.0)),
            )
            .with(
                "powerReportDelayTime",
                SettingSpec::number(0.0, 12.7).encoded_parameter(85, 1, Encoding::Scaled(10.0)),
            )
            .with(
                "delayBetweenMotorMovement",
                SettingSpec::number(0.0, 12.7).encoded_parameter(90, 1, Encoding::Scaled(10.0)),
            )
            .with(
                "motorOffDelayLimitSwitch",
                SettingSpec::number(0.0, 12.7).encoded_parameter(91, 1, Encoding::Scaled(10.0)),
            )
            .with(INVERT_DIRECTION, SettingSpec::choice())
            .with(INVERT_TILT_DIRECTION, SettingSpec::choice())
    }

    fn repair_keys(&self) -> Vec<&'static str> {
        vec![
            "enableInput1",
            "enableInput2",
            "enableInput3",
            "functionalityInput3",
            "operatingMode",
        ]
    }

    /// Flipping a direction setting mirrors the current position.
    fn settings_effects(&self, change: &SettingsChange, record: &dyn DeviceRecord) -> Vec<Effect> {
        [
            (INVERT_DIRECTION, Capability::WindowcoveringsSet),
            (INVERT_TILT_DIRECTION, Capability::WindowcoveringsTiltSet),
        ]
        .into_iter()
        .filter(|(key, _)| change.is_changed(key))
        .filter_map(|(_, capability)| {
            let position = record.capability_value(capability)?.as_f64()?;
            Some(Effect::Capability(capability, Value::Number(1.0 - position)))
        })
        .collect()
    }

    async fn register_capabilities(&self, registration: &mut Registration<'_>) -> Result<()> {
        registration
            .ensure_capability(Capability::ButtonResetMeter)
            .await;
        registration
            .ensure_capability(Capability::ButtonCalibration)
            .await;

        registration.bind(
            Capability::MeterPower,
            CommandClass::Meter,
            BindOptions::new().root(),
        );
        registration.bind(
            Capability::MeasurePower,
            CommandClass::Meter,
            BindOptions::new().root(),
        );

        if !registration.topology().is_multi_channel() {
            registration
                .remove_capability(Capability::WindowcoveringsTiltSet)
                .await;
            registration.bind(
                Capability::WindowcoveringsSet,
                CommandClass::SwitchMultilevel,
                BindOptions::new().root().mandatory(),
            );
            return Ok(());
        }

        let axes = registration
            .topology()
            .endpoints(EndpointPurpose::WindowCovering);
        registration.bind(
            Capability::WindowcoveringsSet,
            CommandClass::SwitchMultilevel,
            BindOptions::new().endpoint(axes.first().copied()).mandatory(),
        );
        match axes.get(1) {
            Some(tilt) => {
                registration.bind(
                    Capability::WindowcoveringsTiltSet,
                    CommandClass::SwitchMultilevel,
                    BindOptions::new().endpoint(Some(*tilt)),
                );
            }
            None => {
                debug!("[Shutter] No tilt endpoint");
                registration
                    .remove_capability(Capability::WindowcoveringsTiltSet)
                    .await;
            }
        }
        Ok(())
    }
}

/// Calibration run: parameter 78 set to 1, then back to 0 after
/// `reset_after` unless re-triggered.
#[derive(Clone)]
pub struct ShutterCalibration {
    node: Arc<dyn ZwaveNode>,
    reset_after: Duration,
    restart_delay: Duration,
    pending: Arc<Mutex<Option<CancellationToken>>>,
}

impl ShutterCalibration {
    pub fn new(node: Arc<dyn ZwaveNode>, reset_after: Duration, restart_delay: Duration) -> Self {
        Self {
            node,
            reset_after,
            restart_delay,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether a reset is scheduled.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    pub async fn trigger(&self) -> Result<()> {
        let (index, size) = CALIBRATION_PARAMETER;

        let running = self.pending.lock().take();
        if let Some(token) = running
            && !token.is_cancelled()
        {
            info!("[Shutter] Restarting calibration");
            token.cancel();
            self.node.configuration_set(index, size, 0).await?;
            tokio::time::sleep(self.restart_delay).await;
        }

        self.node.configuration_set(index, size, 1).await?;
        info!("[Shutter] Calibration started");

        let token = CancellationToken::new();
        *self.pending.lock() = Some(token.clone());

        let node = self.node.clone();
        let reset_after = self.reset_after;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("[Shutter] Calibration reset superseded");
                }
                _ = tokio::time::sleep(reset_after) => {
                    token.cancel();
                    match node.configuration_set(index, size, 0).await {
                        Ok(()) => info!("[Shutter] Calibration reset"),
                        Err(e) => warn!("[Shutter] Failed to reset calibration: {}", e),
                    }
                }
            }
        });
        Ok(())
    }
}

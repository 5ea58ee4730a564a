//! Multi-capability aggregator for the RGBW dimmer.
//!
//! The hub sees six independent light capabilities; the device takes one
//! four-channel color command plus a separate dim level. [`RgbwAggregator`]
//! turns a coalesced batch of capability writes into exactly one device
//! command, and a debounced set of channel reports back into capability
//! values. It does no I/O: the controller feeds it and executes its plans.
//!
//! The cached [`ColorComponentState`] holds the color at full value plus
//! the last nonzero dim level, so switching off and on restores the color
//! without the rounding of the hub's capability store.

use super::color::{
    LightMode, PartialRgbw, Rgbw, blue_to_temperature, hue_saturation_to_rgb,
    rgb_to_hue_saturation, temperature_to_blue,
};
use crate::device::{Capability, DeviceRecord, Value};
use crate::zwave::ColorComponentId;

/// Current light capability values as stored by the hub.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightState {
    pub onoff: bool,
    pub dim: f64,
    pub hue: f64,
    pub saturation: f64,
    pub temperature: f64,
    pub mode: LightMode,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            onoff: false,
            dim: 0.0,
            hue: 0.0,
            saturation: 0.0,
            temperature: 0.0,
            mode: LightMode::Color,
        }
    }
}

impl LightState {
    /// Read the light capabilities from a record; missing values default.
    pub fn from_record(record: &dyn DeviceRecord) -> Self {
        let defaults = Self::default();
        let number = |capability, default| {
            record
                .capability_value(capability)
                .and_then(|v| v.as_f64())
                .unwrap_or(default)
        };
        Self {
            onoff: record
                .capability_value(Capability::Onoff)
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.onoff),
            dim: number(Capability::Dim, defaults.dim),
            hue: number(Capability::LightHue, defaults.hue),
            saturation: number(Capability::LightSaturation, defaults.saturation),
            temperature: number(Capability::LightTemperature, defaults.temperature),
            mode: record
                .capability_value(Capability::LightMode)
                .and_then(|v| v.as_str().and_then(|s| s.parse().ok()))
                .unwrap_or(defaults.mode),
        }
    }
}

/// Coalesced batch of hub writes to the light capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightWrite {
    pub onoff: Option<bool>,
    pub dim: Option<f64>,
    pub hue: Option<f64>,
    pub saturation: Option<f64>,
    pub temperature: Option<f64>,
    pub mode: Option<LightMode>,
}

impl LightWrite {
    /// Record one capability write. Returns false for capabilities or
    /// values the aggregator does not handle.
    pub fn set(&mut self, capability: Capability, value: &Value) -> bool {
        match capability {
            Capability::Onoff => value.as_bool().map(|v| self.onoff = Some(v)).is_some(),
            Capability::Dim => value.as_f64().map(|v| self.dim = Some(v)).is_some(),
            Capability::LightHue => value.as_f64().map(|v| self.hue = Some(v)).is_some(),
            Capability::LightSaturation => {
                value.as_f64().map(|v| self.saturation = Some(v)).is_some()
            }
            Capability::LightTemperature => {
                value.as_f64().map(|v| self.temperature = Some(v)).is_some()
            }
            Capability::LightMode => value
                .as_str()
                .and_then(|s| s.parse().ok())
                .map(|mode| self.mode = Some(mode))
                .is_some(),
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_dim_only(&self) -> bool {
        self.dim.is_some()
            && self.onoff.is_none()
            && !self.has_color_change()
    }

    pub fn has_color_change(&self) -> bool {
        self.hue.is_some()
            || self.saturation.is_some()
            || self.temperature.is_some()
            || self.mode.is_some()
    }

    /// Complete desired state: this batch over the current values.
    pub fn merged_over(&self, current: &LightState) -> LightState {
        LightState {
            onoff: self.onoff.unwrap_or(current.onoff),
            dim: self.dim.unwrap_or(current.dim),
            hue: self.hue.unwrap_or(current.hue),
            saturation: self.saturation.unwrap_or(current.saturation),
            temperature: self.temperature.unwrap_or(current.temperature),
            mode: self.mode.unwrap_or(current.mode),
        }
    }
}

/// Color kept across power transitions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorComponentState {
    /// Channels at full value (dim 1.0)
    pub components: Option<Rgbw>,
    /// Last nonzero dim level
    pub dim: Option<f64>,
}

/// Device command chosen for one write batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightCommand {
    /// Multilevel set of the dim level only
    DimOnly { dim: f64 },
    /// Hard off, not a zero color set
    Off,
    /// Four-channel color set, already scaled by dim
    SetColor(Rgbw),
}

/// Result of a write batch: what to send and what to reflect to the hub.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WritePlan {
    pub command: Option<LightCommand>,
    pub updates: Vec<(Capability, Value)>,
}

/// What to do with a debounced set of color reports.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportDecision {
    /// Echo of a locally issued off or dim command
    Ignore,
    /// Some channels are missing; query them and the dim level
    Refresh { missing: Vec<ColorComponentId> },
    Apply(Vec<(Capability, Value)>),
}

#[derive(Debug, Default)]
pub struct RgbwAggregator {
    state: ColorComponentState,
    color_changed_while_off: bool,
    ignore_next_report: bool,
}

impl RgbwAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ColorComponentState {
        &self.state
    }

    pub fn color_changed_while_off(&self) -> bool {
        self.color_changed_while_off
    }

    pub fn ignore_next_report(&self) -> bool {
        self.ignore_next_report
    }

    /// Turn one coalesced write batch into a device command.
    pub fn handle_write(&mut self, write: &LightWrite, current: &LightState) -> WritePlan {
        let merged = write.merged_over(current);
        let computed = full_value_components(&merged);
        let positive_dim = write.dim.filter(|d| *d > 0.0);

        if write.is_dim_only() && !self.color_changed_while_off {
            if let Some(dim) = positive_dim {
                self.state.dim = Some(dim);
            }
            self.ignore_next_report = true;
            let mut updates = Vec::new();
            if merged.dim > 0.0 && !current.onoff {
                updates.push((Capability::Onoff, Value::Bool(true)));
            } else if merged.dim == 0.0 && current.onoff {
                updates.push((Capability::Onoff, Value::Bool(false)));
            }
            return WritePlan {
                command: Some(LightCommand::DimOnly { dim: merged.dim }),
                updates,
            };
        }

        if !merged.onoff && positive_dim.is_none() {
            if write.has_color_change() {
                self.state.components = Some(computed);
                self.color_changed_while_off = true;
            }
            if !current.onoff && write.has_color_change() {
                return WritePlan::default();
            }
            self.ignore_next_report = true;
            return WritePlan {
                command: Some(LightCommand::Off),
                updates: Vec::new(),
            };
        }

        let mut updates = Vec::new();
        let turning_on = !current.onoff && (merged.onoff || positive_dim.is_some());

        let (full, dim) = if turning_on {
            let dim = positive_dim.or(self.state.dim).unwrap_or(1.0);
            let full = match self.state.components {
                Some(cached) if !write.has_color_change() => cached,
                _ => computed,
            };
            updates.push((Capability::Dim, Value::Number(dim)));
            (full, dim)
        } else {
            (computed, merged.dim)
        };

        if dim > 0.0 {
            self.state.dim = Some(dim);
        }
        if !full.is_zero() {
            self.state.components = Some(full);
        }
        self.color_changed_while_off = false;

        let sent = full.scaled(dim).rounded();
        let dark = match merged.mode {
            LightMode::Color => sent.red == 0.0 && sent.green == 0.0 && sent.blue == 0.0,
            LightMode::Temperature => sent.white == 0.0 && sent.blue == 0.0,
        };
        if dark {
            updates.push((Capability::Onoff, Value::Bool(false)));
        } else if dim > 0.0 && !merged.onoff {
            updates.push((Capability::Onoff, Value::Bool(true)));
        }

        WritePlan {
            command: Some(LightCommand::SetColor(sent)),
            updates,
        }
    }

    /// Combine the channel reports of one debounce window.
    pub fn handle_reports(
        &mut self,
        reports: &[(ColorComponentId, u8)],
        current: &LightState,
    ) -> ReportDecision {
        let partial = PartialRgbw::from_reports(reports);
        let Some(rgbw) = partial.complete() else {
            return ReportDecision::Refresh {
                missing: partial.missing(),
            };
        };

        let ignore = self.ignore_next_report;
        self.ignore_next_report = false;
        if ignore && rgbw.is_zero() {
            return ReportDecision::Ignore;
        }
        ReportDecision::Apply(self.apply_physical(rgbw, current.dim, current.onoff))
    }

    /// Channel values and dim level fetched explicitly from the device.
    pub fn handle_refreshed(
        &mut self,
        rgbw: Rgbw,
        dim: f64,
        current: &LightState,
    ) -> Vec<(Capability, Value)> {
        self.ignore_next_report = false;
        self.apply_physical(rgbw, dim, current.onoff)
    }

    fn apply_physical(&mut self, rgbw: Rgbw, dim: f64, onoff: bool) -> Vec<(Capability, Value)> {
        if !rgbw.is_zero() && dim > 0.0 {
            self.state.components = Some(rgbw.scaled(1.0 / dim));
            self.state.dim = Some(dim);
            self.color_changed_while_off = false;
        }
        derive_capabilities(&rgbw, dim, onoff)
    }
}

/// Channels at full value for the desired state.
fn full_value_components(state: &LightState) -> Rgbw {
    match state.mode {
        LightMode::Color => {
            let (red, green, blue) = hue_saturation_to_rgb(state.hue, state.saturation);
            Rgbw::new(0.0, red, green, blue)
        }
        LightMode::Temperature => {
            Rgbw::new(255.0, 0.0, 0.0, temperature_to_blue(state.temperature))
        }
    }
}

/// Capability values implied by physical channel values.
pub fn derive_capabilities(rgbw: &Rgbw, dim: f64, onoff: bool) -> Vec<(Capability, Value)> {
    if rgbw.is_zero() {
        return vec![(Capability::Onoff, Value::Bool(false))];
    }

    let mut updates = Vec::new();
    if !onoff {
        updates.push((Capability::Onoff, Value::Bool(true)));
    }

    let color = rgbw.red > 0.0 || rgbw.green > 0.0 || (rgbw.blue > 0.0 && rgbw.white == 0.0);
    if color {
        updates.push((Capability::LightMode, Value::from(LightMode::Color.as_ref())));
    } else if rgbw.white > 0.0 {
        updates.push((
            Capability::LightMode,
            Value::from(LightMode::Temperature.as_ref()),
        ));
    }

    // Hue, saturation and temperature follow the channels in either mode
    let (hue, saturation) = rgb_to_hue_saturation(rgbw.red, rgbw.green, rgbw.blue);
    let temperature = if dim == 0.0 {
        0.0
    } else {
        blue_to_temperature(rgbw.blue / dim)
    };
    updates.push((Capability::LightHue, Value::Number(hue)));
    updates.push((Capability::LightSaturation, Value::Number(saturation)));
    updates.push((Capability::LightTemperature, Value::Number(temperature)));
    updates
}

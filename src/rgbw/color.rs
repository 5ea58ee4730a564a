//! Channel math for the RGBW dimmer.

use crate::migration::range::map_value_range;
use crate::zwave::{ColorComponentId, Command};
use palette::{FromColor, Hsv, Srgb};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Channel intensities, each 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgbw {
    pub white: f64,
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Rgbw {
    pub fn new(white: f64, red: f64, green: f64, blue: f64) -> Self {
        Self {
            white,
            red,
            green,
            blue,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.white == 0.0 && self.red == 0.0 && self.green == 0.0 && self.blue == 0.0
    }

    /// Every channel multiplied by `factor`, clamped to 0..=255.
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |v: f64| (v * factor).clamp(0.0, 255.0);
        Self {
            white: scale(self.white),
            red: scale(self.red),
            green: scale(self.green),
            blue: scale(self.blue),
        }
    }

    pub fn rounded(&self) -> Self {
        Self {
            white: self.white.round(),
            red: self.red.round(),
            green: self.green.round(),
            blue: self.blue.round(),
        }
    }

    pub fn channel(&self, component: ColorComponentId) -> f64 {
        match component {
            ColorComponentId::White => self.white,
            ColorComponentId::Red => self.red,
            ColorComponentId::Green => self.green,
            ColorComponentId::Blue => self.blue,
        }
    }

    pub fn set_channel(&mut self, component: ColorComponentId, value: f64) {
        match component {
            ColorComponentId::White => self.white = value,
            ColorComponentId::Red => self.red = value,
            ColorComponentId::Green => self.green = value,
            ColorComponentId::Blue => self.blue = value,
        }
    }

    /// Switch-color set command with the channels rounded to bytes.
    pub fn to_command(&self, duration_ms: Option<u64>) -> Command {
        let byte = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        Command::SwitchColorSet {
            white: byte(self.white),
            red: byte(self.red),
            green: byte(self.green),
            blue: byte(self.blue),
            duration_ms,
        }
    }
}

/// Channel set assembled from single-channel reports.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartialRgbw {
    pub white: Option<f64>,
    pub red: Option<f64>,
    pub green: Option<f64>,
    pub blue: Option<f64>,
}

impl PartialRgbw {
    /// Later reports for the same channel replace earlier ones.
    pub fn from_reports(reports: &[(ColorComponentId, u8)]) -> Self {
        let mut partial = Self::default();
        for (component, value) in reports {
            let value = Some(f64::from(*value));
            match component {
                ColorComponentId::White => partial.white = value,
                ColorComponentId::Red => partial.red = value,
                ColorComponentId::Green => partial.green = value,
                ColorComponentId::Blue => partial.blue = value,
            }
        }
        partial
    }

    pub fn complete(&self) -> Option<Rgbw> {
        Some(Rgbw {
            white: self.white?,
            red: self.red?,
            green: self.green?,
            blue: self.blue?,
        })
    }

    pub fn missing(&self) -> Vec<ColorComponentId> {
        ColorComponentId::ALL
            .into_iter()
            .filter(|component| match component {
                ColorComponentId::White => self.white.is_none(),
                ColorComponentId::Red => self.red.is_none(),
                ColorComponentId::Green => self.green.is_none(),
                ColorComponentId::Blue => self.blue.is_none(),
            })
            .collect()
    }
}

/// Which channels the light is driven with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LightMode {
    #[default]
    Color,
    Temperature,
}

/// RGB at full value for hue and saturation in 0..=1.
pub fn hue_saturation_to_rgb(hue: f64, saturation: f64) -> (f64, f64, f64) {
    let hsv: Hsv = Hsv::new(
        (hue.clamp(0.0, 1.0) * 360.0) as f32,
        saturation.clamp(0.0, 1.0) as f32,
        1.0,
    );
    let rgb: Srgb = Srgb::from_color(hsv);
    (
        f64::from(rgb.red) * 255.0,
        f64::from(rgb.green) * 255.0,
        f64::from(rgb.blue) * 255.0,
    )
}

/// Hue and saturation in 0..=1 for RGB channels in 0..=255.
pub fn rgb_to_hue_saturation(red: f64, green: f64, blue: f64) -> (f64, f64) {
    let rgb: Srgb = Srgb::new(
        (red / 255.0) as f32,
        (green / 255.0) as f32,
        (blue / 255.0) as f32,
    );
    let hsv: Hsv = Hsv::from_color(rgb);
    let hue = f64::from(hsv.hue.into_positive_degrees()) / 360.0;
    (hue % 1.0, f64::from(hsv.saturation))
}

/// Blue channel for a color temperature fraction (0 = cold, 1 = warm).
pub fn temperature_to_blue(temperature: f64) -> f64 {
    (1.0 - temperature.clamp(0.0, 1.0)) * 255.0
}

/// Color temperature fraction for an undimmed blue channel.
pub fn blue_to_temperature(blue: f64) -> f64 {
    map_value_range(0.0, 255.0, 1.0, 0.0, blue)
}

//! Linear range mapping and the signed tenths codec built on it.
//!
//! Many configuration parameters store a signed temperature in tenths, with
//! negative values moved to a separate raw range (e.g. 1001..1100 meaning
//! -0.1..-10.0). [`TenthsCodec`] describes one such layout; the breakpoints
//! differ per parameter and per device family.

/// Map `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Either range may be descending. `value` is clamped to the input range
/// first. A degenerate input range yields `out_min`.
pub fn map_value_range(in_min: f64, in_max: f64, out_min: f64, out_max: f64, value: f64) -> f64 {
    if in_max == in_min {
        return out_min;
    }
    let (low, high) = if in_min <= in_max {
        (in_min, in_max)
    } else {
        (in_max, in_min)
    };
    let value = value.clamp(low, high);
    out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
}

/// Round to one decimal place.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Layout of a signed value stored in tenths.
///
/// Non-negative values are stored as `value * 10` up to `positive_raw_max`;
/// negative values map linearly from `-0.1..=-negative_magnitude_max` onto
/// `negative_raw.0..=negative_raw.1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TenthsCodec {
    pub positive_raw_max: f64,
    pub negative_raw: (f64, f64),
    pub negative_magnitude_max: f64,
    /// Raw value meaning exactly zero, if zero has its own encoding
    pub zero_sentinel: Option<f64>,
}

impl TenthsCodec {
    /// Temperature sensor offset: 1..100 is 0.1..10.0, 1001..1100 is
    /// -0.1..-10.0, 32536 means no offset.
    pub const TEMPERATURE_OFFSET: TenthsCodec = TenthsCodec {
        positive_raw_max: 100.0,
        negative_raw: (1001.0, 1100.0),
        negative_magnitude_max: 10.0,
        zero_sentinel: Some(32536.0),
    };

    /// Thermostat hysteresis on two-byte parameters.
    pub const HYSTERESIS: TenthsCodec = TenthsCodec {
        positive_raw_max: 255.0,
        negative_raw: (1001.0, 1255.0),
        negative_magnitude_max: 25.5,
        zero_sentinel: None,
    };

    /// Thermostat hysteresis packed into one byte.
    pub const HYSTERESIS_BYTE: TenthsCodec = TenthsCodec {
        positive_raw_max: 127.0,
        negative_raw: (128.0, 255.0),
        negative_magnitude_max: 12.7,
        zero_sentinel: None,
    };

    pub const ANTIFREEZE: TenthsCodec = TenthsCodec {
        positive_raw_max: 127.0,
        negative_raw: (1001.0, 1126.0),
        negative_magnitude_max: 12.6,
        zero_sentinel: None,
    };

    /// "Temperature too low" limit.
    pub const TOO_LOW_LIMIT: TenthsCodec = TenthsCodec {
        positive_raw_max: 150.0,
        negative_raw: (1001.0, 1150.0),
        negative_magnitude_max: 15.0,
        zero_sentinel: None,
    };

    /// Raw parameter value for `value`, rounded to an integer.
    pub fn encode(&self, value: f64) -> i64 {
        if value == 0.0
            && let Some(sentinel) = self.zero_sentinel
        {
            return sentinel as i64;
        }
        let raw = if value >= 0.0 {
            value * 10.0
        } else {
            map_value_range(
                -0.1,
                -self.negative_magnitude_max,
                self.negative_raw.0,
                self.negative_raw.1,
                value,
            )
        };
        raw.round() as i64
    }

    /// Value for a raw parameter, `None` when the raw value is outside
    /// every range of the layout.
    pub fn decode(&self, raw: f64) -> Option<f64> {
        if self.zero_sentinel == Some(raw) {
            return Some(0.0);
        }
        if (0.0..=self.positive_raw_max).contains(&raw) {
            return Some(raw / 10.0);
        }
        let (start, end) = self.negative_raw;
        if (start..=end).contains(&raw) {
            return Some(-map_value_range(
                start,
                end,
                0.1,
                self.negative_magnitude_max,
                raw,
            ));
        }
        None
    }
}

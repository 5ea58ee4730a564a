use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// `KEY=value` pairs of a dotenv file. Comments and lines without `=` are
/// ignored; one layer of matching quotes is removed from values.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), unquote(value.trim())))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|quote| {
            value
                .strip_prefix(*quote)
                .and_then(|inner| inner.strip_suffix(*quote))
        })
        .unwrap_or(value)
}

/// Export `.env` entries from the working directory. Variables already set
/// in the environment are left alone.
pub fn load_dotenv() {
    let content = match fs::read_to_string(".env") {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!("[Config] Cannot read .env: {}", e);
            return;
        }
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var_os(key).is_none() {
            // SAFETY: called from main before the tokio runtime spawns worker threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub timing: TimingConfig,
    pub transport: TransportConfig,
}

/// Debounce windows and timers of the device session.
///
/// The defaults match what paired hardware has been observed to need;
/// they are tunables, not protocol constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Coalescing window for single-channel color reports
    pub color_report_debounce_ms: u64,
    /// Coalescing window for hub writes to the light capabilities
    pub capability_write_debounce_ms: u64,
    /// Shutter calibration flag is cleared after this long
    pub calibration_reset_secs: u64,
    /// Pause between clearing a pending calibration and starting a new one
    pub calibration_restart_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Attempts for a configuration get before the value is treated as unknown
    pub configuration_get_attempts: u32,
    /// Upper bound for a single transport call
    pub timeout_ms: u64,
}

impl TimingConfig {
    pub fn color_report_debounce(&self) -> Duration {
        Duration::from_millis(self.color_report_debounce_ms)
    }

    pub fn capability_write_debounce(&self) -> Duration {
        Duration::from_millis(self.capability_write_debounce_ms)
    }

    pub fn calibration_reset(&self) -> Duration {
        Duration::from_secs(self.calibration_reset_secs)
    }

    pub fn calibration_restart_delay(&self) -> Duration {
        Duration::from_millis(self.calibration_restart_delay_ms)
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timing: TimingConfig {
                color_report_debounce_ms: 500,
                capability_write_debounce_ms: 500,
                calibration_reset_secs: 90,
                calibration_restart_delay_ms: 500,
            },
            transport: TransportConfig {
                configuration_get_attempts: 3,
                timeout_ms: 10_000,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("ZWAVE_COLOR_REPORT_DEBOUNCE_MS")
            && let Ok(v) = ms.parse()
        {
            config.timing.color_report_debounce_ms = v;
        }
        if let Ok(ms) = std::env::var("ZWAVE_CAPABILITY_WRITE_DEBOUNCE_MS")
            && let Ok(v) = ms.parse()
        {
            config.timing.capability_write_debounce_ms = v;
        }
        if let Ok(secs) = std::env::var("ZWAVE_CALIBRATION_RESET_SECS")
            && let Ok(v) = secs.parse()
        {
            config.timing.calibration_reset_secs = v;
        }
        if let Ok(ms) = std::env::var("ZWAVE_CALIBRATION_RESTART_DELAY_MS")
            && let Ok(v) = ms.parse()
        {
            config.timing.calibration_restart_delay_ms = v;
        }

        // Transport
        if let Ok(attempts) = std::env::var("ZWAVE_CONFIGURATION_GET_ATTEMPTS")
            && let Ok(v) = attempts.parse::<u32>()
        {
            config.transport.configuration_get_attempts = v.max(1);
        }
        if let Ok(ms) = std::env::var("ZWAVE_TRANSPORT_TIMEOUT_MS")
            && let Ok(v) = ms.parse()
        {
            config.transport.timeout_ms = v;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = Config::default();
        assert_eq!(config.timing.color_report_debounce(), Duration::from_millis(500));
        assert_eq!(config.timing.capability_write_debounce(), Duration::from_millis(500));
        assert_eq!(config.timing.calibration_reset(), Duration::from_secs(90));
        assert_eq!(config.transport.configuration_get_attempts, 3);
    }

    #[test]
    fn test_parse_dotenv() {
        let content = "# timings\nZWAVE_SETTLE_MS=250\n\nZWAVE_FIXTURE = \"demos/flush relay.json\"\nQUOTE='\nBROKEN LINE\n=orphan\n";
        assert_eq!(
            parse_dotenv(content),
            vec![
                ("ZWAVE_SETTLE_MS", "250"),
                ("ZWAVE_FIXTURE", "demos/flush relay.json"),
                ("QUOTE", "'"),
            ]
        );
    }
}

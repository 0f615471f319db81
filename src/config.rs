//! Monitor configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::record::{FieldLimits, MAX_STORED_LEN};

/// Runtime options of the monitor, separated from the CLI parsing concerns.
///
/// Loadable from a JSON file; keys that are left out keep their default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Dashboard redraws per second.
    pub refresh_hz: f64,
    /// Longest source file name kept in a slot (at most 255 bytes).
    pub max_file_len: usize,
    /// Longest call-site text kept in a slot (at most 255 bytes).
    pub max_call_site_len: usize,
    /// Run every send-family call as its synchronous counterpart.
    pub force_synchronous_sends: bool,
    /// Clear the display before each frame.
    pub clear_screen: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 4.0,
            max_file_len: MAX_STORED_LEN,
            max_call_site_len: MAX_STORED_LEN,
            force_synchronous_sends: false,
            clear_screen: true,
        }
    }
}

impl MonitorConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let buf = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: MonitorConfig = serde_json::from_str(&buf)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.refresh_hz.is_finite() || self.refresh_hz <= 0.0 {
            bail!(
                "refresh rate must be a positive number of frames per second, got {}",
                self.refresh_hz
            );
        }
        if Duration::try_from_secs_f64(1.0 / self.refresh_hz).is_err() {
            bail!(
                "refresh rate {} is too low, the time between frames does not fit a duration",
                self.refresh_hz
            );
        }
        if self.max_file_len > MAX_STORED_LEN {
            bail!(
                "max_file_len {} exceeds the {} bytes a slot can hold",
                self.max_file_len,
                MAX_STORED_LEN
            );
        }
        if self.max_call_site_len > MAX_STORED_LEN {
            bail!(
                "max_call_site_len {} exceeds the {} bytes a slot can hold",
                self.max_call_site_len,
                MAX_STORED_LEN
            );
        }
        Ok(())
    }

    /// Time between two frames.
    pub fn refresh_interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(1.0 / self.refresh_hz)
            .with_context(|| format!("invalid refresh rate {}", self.refresh_hz))
    }

    pub fn limits(&self) -> FieldLimits {
        FieldLimits {
            max_file_len: self.max_file_len,
            max_call_site_len: self.max_call_site_len,
        }
    }
}

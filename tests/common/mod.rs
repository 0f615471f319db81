//! Common test utilities for rankwatch integration tests.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rankwatch::MonitorConfig;

/// A `Write` sink that can be handed to the monitor and read back from the test.
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Rows of the most recent complete frame.
    pub fn last_rows(&self) -> Vec<Row> {
        frames(&self.text())
            .last()
            .map(|frame| parse_rows(frame))
            .unwrap_or_default()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One parsed dashboard row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub rank: usize,
    pub what: String,
    pub place: String,
    pub status: String,
    pub when: String,
}

/// Split captured output into frames, each starting at its `Runtime:` line.
pub fn frames(text: &str) -> Vec<String> {
    text.split("Runtime: ")
        .skip(1)
        .map(|f| format!("Runtime: {}", f))
        .collect()
}

pub fn parse_rows(frame: &str) -> Vec<Row> {
    frame
        .lines()
        .filter(|line| line.starts_with("| ") && !line.starts_with("| Who"))
        .filter_map(|line| {
            let cells: Vec<&str> = line.split('|').map(str::trim).collect();
            if cells.len() != 6 {
                return None;
            }
            let (status, when) = cells[4].split_once(' ')?;
            Some(Row {
                rank: cells[1].parse().ok()?,
                what: cells[2].to_string(),
                place: cells[3].to_string(),
                status: status.to_string(),
                when: when.trim().to_string(),
            })
        })
        .collect()
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Fast redraws, no terminal control sequences.
pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        refresh_hz: 100.0,
        clear_screen: false,
        ..MonitorConfig::default()
    }
}

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Host configuration loading.
//!
//! The host config is optional; every field has a default and command-line
//! flags override whatever the file says.
//!
//! The expected YAML structure is:
//! ```yaml
//! commands: tables/sensors.json   # relative to this file's directory
//! sink_capacity: 256
//! max_timers: 4096
//! run_ms: 5000
//! serial:
//!   path: /dev/ttyUSB0
//!   baud_rate: 9600
//!   unit_id: 1
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::io::rtu::SerialSettings;
use crate::sink::DEFAULT_SINK_CAPACITY;
use crate::timer::DEFAULT_MAX_PENDING_TIMERS;

/// How long the binary drives the timer when nothing else is said.
pub const DEFAULT_RUN_MS: u64 = 5_000;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Mirrors the file layout.  Kept private; callers use [`HostConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostConfigFile {
    commands: Option<PathBuf>,
    serial: Option<SerialSettings>,
    sink_capacity: Option<usize>,
    max_timers: Option<usize>,
    run_ms: Option<u64>,
}

// ── HostConfig ────────────────────────────────────────────────────────────────

/// Resolved host settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Path of the JSON command table.
    pub commands: Option<PathBuf>,
    /// RTU link; `None` runs without a serial consumer.
    pub serial: Option<SerialSettings>,
    /// Frames retained per endpoint/pipe buffer.
    pub sink_capacity: usize,
    /// Upper bound on pending timers.
    pub max_timers: usize,
    pub run_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            commands: None,
            serial: None,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            max_timers: DEFAULT_MAX_PENDING_TIMERS,
            run_ms: DEFAULT_RUN_MS,
        }
    }
}

impl HostConfig {
    /// Parse the YAML file at `path`.
    ///
    /// A relative `commands` path is resolved against the directory holding
    /// the config file.  An empty file yields the defaults.
    ///
    /// # Errors
    /// The file cannot be read, is not valid YAML, has unknown keys, or sets
    /// `max_timers` to zero.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading host configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        if let (Some(commands), Some(base)) = (config.commands.as_mut(), path.parent()) {
            if commands.is_relative() {
                *commands = base.join(&*commands);
            }
        }

        debug!(
            commands = ?config.commands,
            serial = ?config.serial.as_ref().map(|s| &s.path),
            sink_capacity = config.sink_capacity,
            max_timers = config.max_timers,
            run_ms = config.run_ms,
            "host configuration loaded"
        );
        Ok(config)
    }

    /// Parse YAML text.  Relative paths are kept as written.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: HostConfigFile = if content.trim().is_empty() {
            warn!("Empty host configuration, using defaults");
            HostConfigFile::default()
        } else {
            serde_yaml::from_str(content)?
        };

        let defaults = Self::default();
        let config = Self {
            commands: file.commands,
            serial: file.serial,
            sink_capacity: file.sink_capacity.unwrap_or(defaults.sink_capacity),
            max_timers: file.max_timers.unwrap_or(defaults.max_timers),
            run_ms: file.run_ms.unwrap_or(defaults.run_ms),
        };

        if config.max_timers == 0 {
            bail!("max_timers must be at least 1");
        }
        if config.sink_capacity == 0 {
            warn!("sink_capacity is 0: every frame will be dropped at the sink");
        }
        Ok(config)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

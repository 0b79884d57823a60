/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Command specification table.
//!
//! The table is the ground truth for what the generator polls and how often.
//! It is parsed once from a JSON payload and never mutated afterwards:
//!
//! ```json
//! [
//!   { "id": "getTemperature", "reg_offset": 3, "reg_len": 1, "interval": 1000 },
//!   { "id": "getHumit",       "reg_offset": 5, "reg_len": 1, "interval": 2000 }
//! ]
//! ```
//!
//! `interval` is in milliseconds.  `0`, `null` or a missing field means
//! "fire once, immediately, never re-arm".

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::generator::ConfigError;

/// Longest accepted `interval` (about 49.7 days).  Keeps every re-armed due
/// time far away from the end of the millisecond clock.
pub const MAX_INTERVAL_MS: u64 = u32::MAX as u64;

// ── Private JSON deserialization types ────────────────────────────────────────

/// One row as it appears on the wire.
///
/// Numeric fields are read as `i64` so that out-of-range values (negative
/// lengths, offsets past `u16::MAX`) surface as precise [`ConfigError`]
/// variants instead of a generic serde message.
#[derive(Debug, Deserialize)]
struct RawCommandSpec {
    id: String,
    reg_offset: i64,
    reg_len: i64,
    #[serde(default)]
    interval: Option<i64>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// How often a command fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fire once with zero delay and never re-arm.
    Once,
    /// Fire every `n` milliseconds, first firing `n` ms after `run()`.
    Every(u64),
}

impl Schedule {
    fn from_interval(interval: Option<u64>) -> Self {
        match interval {
            None | Some(0) => Schedule::Once,
            Some(ms) => Schedule::Every(ms),
        }
    }

    /// Interval in milliseconds, `0` for [`Schedule::Once`].
    pub fn interval_ms(&self) -> u64 {
        match self {
            Schedule::Once => 0,
            Schedule::Every(ms) => *ms,
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, Schedule::Every(_))
    }
}

/// One periodic register-poll request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Identifier, unique within its table.
    pub id: String,

    /// Device register address of the first register to read.
    pub reg_offset: u16,

    /// Number of registers to read.  Never zero.
    pub reg_len: u16,

    pub schedule: Schedule,
}

impl CommandSpec {
    /// Build a spec directly, applying the same validation as the JSON path.
    pub fn new(
        id: impl Into<String>,
        reg_offset: u16,
        reg_len: u16,
        interval_ms: u64,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ConfigError::EmptyId { index: None });
        }
        if reg_len == 0 {
            return Err(ConfigError::InvalidRegLen { id, value: 0 });
        }
        if interval_ms > MAX_INTERVAL_MS {
            return Err(ConfigError::InvalidInterval {
                id,
                value: i64::try_from(interval_ms).unwrap_or(i64::MAX),
            });
        }
        Ok(Self {
            id,
            reg_offset,
            reg_len,
            schedule: Schedule::from_interval(Some(interval_ms)),
        })
    }

    pub fn interval_ms(&self) -> u64 {
        self.schedule.interval_ms()
    }
}

// ── CommandTable ──────────────────────────────────────────────────────────────

/// Immutable, ordered list of [`CommandSpec`]s.
///
/// Order matters: it is the tie-break order for entries that fall due in the
/// same millisecond.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTable {
    specs: Vec<CommandSpec>,
}

impl CommandTable {
    /// Parse and validate a JSON command table.
    ///
    /// # Errors
    /// * [`ConfigError::Parse`] – not a JSON array of objects, a required field
    ///   is missing, or a field has the wrong type.
    /// * [`ConfigError::EmptyId`] / [`ConfigError::DuplicateId`]
    /// * [`ConfigError::InvalidRegOffset`] / [`ConfigError::InvalidRegLen`]
    /// * [`ConfigError::InvalidInterval`]
    pub fn from_json(payload: &str) -> Result<Self, ConfigError> {
        let raw: Vec<RawCommandSpec> = serde_json::from_str(payload)?;
        Self::from_raw(raw)
    }

    /// Build a table from already-validated specs.  Duplicate ids are still
    /// rejected.
    pub fn from_specs(specs: Vec<CommandSpec>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.id.as_str()) {
                return Err(ConfigError::DuplicateId {
                    id: spec.id.clone(),
                });
            }
        }
        Ok(Self { specs })
    }

    /// Read a whole JSON file and parse it as a command table.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading command table from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open command table: {}", path.display()))?;

        let table = Self::from_json(&content)
            .with_context(|| format!("Invalid command table: {}", path.display()))?;

        info!("Loaded {} command(s)", table.len());
        Ok(table)
    }

    fn from_raw(raw: Vec<RawCommandSpec>) -> Result<Self, ConfigError> {
        let mut specs = Vec::with_capacity(raw.len());
        let mut seen: HashSet<String> = HashSet::new();

        for (index, row) in raw.into_iter().enumerate() {
            if row.id.is_empty() {
                return Err(ConfigError::EmptyId { index: Some(index) });
            }
            if !seen.insert(row.id.clone()) {
                return Err(ConfigError::DuplicateId { id: row.id });
            }

            let reg_offset = u16::try_from(row.reg_offset).map_err(|_| {
                ConfigError::InvalidRegOffset {
                    id: row.id.clone(),
                    value: row.reg_offset,
                }
            })?;

            let reg_len = match u16::try_from(row.reg_len) {
                Ok(len) if len > 0 => len,
                _ => {
                    return Err(ConfigError::InvalidRegLen {
                        id: row.id,
                        value: row.reg_len,
                    })
                }
            };

            let interval = match row.interval {
                None => None,
                Some(ms) if (0..=MAX_INTERVAL_MS as i64).contains(&ms) => Some(ms as u64),
                Some(ms) => {
                    return Err(ConfigError::InvalidInterval {
                        id: row.id,
                        value: ms,
                    })
                }
            };

            let spec = CommandSpec {
                id: row.id,
                reg_offset,
                reg_len,
                schedule: Schedule::from_interval(interval),
            };
            debug!(
                id = %spec.id,
                reg_offset = spec.reg_offset,
                reg_len = spec.reg_len,
                interval_ms = spec.interval_ms(),
                "command spec"
            );
            specs.push(spec);
        }

        Ok(Self { specs })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Specs in table-insertion order.
    pub fn specs(&self) -> &[CommandSpec] {
        &self.specs
    }

    pub fn get(&self, id: &str) -> Option<&CommandSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommandSpec> {
        self.specs.iter()
    }
}

impl<'a> IntoIterator for &'a CommandTable {
    type Item = &'a CommandSpec;
    type IntoIter = std::slice::Iter<'a, CommandSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

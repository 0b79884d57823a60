/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the command generator.
//!
//! Two enums model the two failure layers the caller can see:
//!
//! * [`ConfigError`]: the command table is unusable.  Fatal: no generator is
//!   produced and no timer is ever armed.
//! * [`AttachError`]: a sink attachment was refused.  Only that call fails;
//!   the generator stays usable.
//!
//! Per-firing failures (a timer that cannot be re-armed) have no error type.
//! They terminate the one affected entry and show up in
//! [`GeneratorStats::terminated`](super::GeneratorStats::terminated).

use thiserror::Error;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Why a command table was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The payload is not a JSON array of command objects, a required field
    /// is missing, or a field has the wrong type.
    #[error("malformed command table: {0}")]
    Parse(#[from] serde_json::Error),

    /// A command has an empty `id`.  `index` is the table row when the
    /// command came from a table.
    #[error(
        "command{} has an empty id",
        .index.map(|i| format!(" at index {i}")).unwrap_or_default()
    )]
    EmptyId { index: Option<usize> },

    /// Two rows share the same `id`; frames could not be attributed.
    #[error("duplicate command id '{id}'")]
    DuplicateId { id: String },

    /// `reg_offset` is negative or above 65535.
    #[error("command '{id}': reg_offset {value} is outside 0..=65535")]
    InvalidRegOffset { id: String, value: i64 },

    /// `reg_len` is zero, negative, or above 65535.
    #[error("command '{id}': reg_len {value} must be between 1 and 65535")]
    InvalidRegLen { id: String, value: i64 },

    /// `interval` is negative or longer than
    /// [`MAX_INTERVAL_MS`](crate::command::MAX_INTERVAL_MS).
    #[error("command '{id}': interval {value}ms is outside 0..={}ms", crate::command::MAX_INTERVAL_MS)]
    InvalidInterval { id: String, value: i64 },
}

// ── Attachment ────────────────────────────────────────────────────────────────

/// Why a sink could not be attached.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttachError {
    /// The output has already been moved into a pipe.
    #[error("output is already piped; a pipe takes exclusive ownership")]
    AlreadyPiped,
}

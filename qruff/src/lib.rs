/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! qruff – periodic Modbus command generator and transport pipeline
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── command     – JSON command table, validation
//! ├── frame       – CommandFrame and its PDU/ADU bytes
//! ├── timer/      – cooperative timer queue + tokio real-time driver
//! ├── generator/  – CommandGenerator, schedule entries, error types
//! ├── sink/       – Endpoint (fan-out) and Pipe (exclusive relay)
//! ├── io/         – async fs / dns / RTU serial link
//! └── config/     – YAML host configuration
//! ```
//!
//! Everything on the frame path is single-threaded (`Rc`/`RefCell`) and
//! runs inside timer callbacks; only the `io` collaborators await.

pub mod command;
pub mod config;
pub mod frame;
pub mod generator;
pub mod io;
pub mod sink;
pub mod timer;

pub use command::{CommandSpec, CommandTable, Schedule};
pub use frame::CommandFrame;
pub use generator::{AttachError, CommandGenerator, ConfigError, EntryState, GeneratorStats};
pub use sink::{Endpoint, Pipe, PipeMonitor, Sink};
pub use timer::{TimerError, TimerHandle, TimerQueue, TimerService};

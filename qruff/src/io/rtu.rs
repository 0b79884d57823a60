/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Modbus RTU serial link.
//!
//! [`RtuLink`] turns a [`CommandFrame`] into a *read holding registers*
//! request on a serial port.  [`forward_frames`] is the consumer end of a
//! pipe: it drains an `mpsc` channel and polls the link once per frame.
//!
//! ```text
//! generator ─► Pipe ─forward_to─► mpsc ─► forward_frames ─► RegisterLink
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_modbus::client::{rtu, Context};
use tokio_modbus::prelude::*;
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};
use tracing::{debug, info, trace, warn};

use crate::frame::CommandFrame;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LinkError {
    /// Settings that no serial port accepts (e.g. 9 data bits).
    #[error("invalid serial settings: {message}")]
    InvalidSettings { message: String },

    #[error("cannot open serial port '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("comm error: {message}")]
    Comm { message: String },

    /// The device answered with a Modbus exception.
    #[error("modbus exception: {message}")]
    Exception { message: String },
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    #[default]
    None,
    Even,
    Odd,
}

/// Serial line and Modbus addressing.
///
/// Only `path` is required in a config file; the rest default to 9600 8N1,
/// unit 1, 1000 ms response timeout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SerialSettings {
    pub path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Modbus slave / unit id.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    #[serde(default)]
    pub parity: SerialParity,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_unit_id() -> u8 {
    1
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

impl SerialSettings {
    pub fn new(path: impl Into<String>, baud_rate: u32, unit_id: u8) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            unit_id,
            parity: SerialParity::None,
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Build the port description without opening anything.
    ///
    /// # Errors
    /// [`LinkError::InvalidSettings`] for an empty path, zero baud rate, or
    /// unsupported data/stop bits.
    pub fn port_builder(&self) -> Result<tokio_serial::SerialPortBuilder, LinkError> {
        if self.path.trim().is_empty() {
            return Err(LinkError::InvalidSettings {
                message: "empty serial port path".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(LinkError::InvalidSettings {
                message: "baud rate must be positive".to_string(),
            });
        }
        Ok(tokio_serial::new(&self.path, self.baud_rate)
            .parity(map_parity(self.parity))
            .data_bits(map_data_bits(self.data_bits)?)
            .stop_bits(map_stop_bits(self.stop_bits)?))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn map_parity(parity: SerialParity) -> Parity {
    match parity {
        SerialParity::None => Parity::None,
        SerialParity::Even => Parity::Even,
        SerialParity::Odd => Parity::Odd,
    }
}

fn map_data_bits(bits: u8) -> Result<DataBits, LinkError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(LinkError::InvalidSettings {
            message: format!("unsupported data bits: {other}"),
        }),
    }
}

fn map_stop_bits(bits: u8) -> Result<StopBits, LinkError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(LinkError::InvalidSettings {
            message: format!("unsupported stop bits: {other}"),
        }),
    }
}

// ── Link abstraction ──────────────────────────────────────────────────────────

pub type PollFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u16>, LinkError>> + 'a>>;

/// Something that can answer a frame with register values.
pub trait RegisterLink {
    fn poll<'a>(&'a mut self, frame: &'a CommandFrame) -> PollFuture<'a>;
}

// ── RtuLink ───────────────────────────────────────────────────────────────────

/// An open serial port bound to one Modbus unit.
pub struct RtuLink {
    ctx: Context,
    settings: SerialSettings,
}

impl RtuLink {
    /// Open the port described by `settings`.
    pub fn open(settings: SerialSettings) -> Result<Self, LinkError> {
        let builder = settings.port_builder()?;
        let port = SerialStream::open(&builder).map_err(|source| LinkError::Open {
            path: settings.path.clone(),
            source,
        })?;

        let ctx = rtu::attach_slave(port, Slave(settings.unit_id));
        info!(
            path = %settings.path,
            baud_rate = settings.baud_rate,
            unit_id = settings.unit_id,
            "RTU link open"
        );
        Ok(Self { ctx, settings })
    }

    /// Issue one read-holding-registers request for `frame`'s range.
    pub async fn read_frame(&mut self, frame: &CommandFrame) -> Result<Vec<u16>, LinkError> {
        trace!(adu = ?frame.to_adu(self.settings.unit_id), "RTU request");
        let request = self
            .ctx
            .read_holding_registers(frame.reg_offset, frame.reg_len);

        match tokio::time::timeout(self.settings.timeout(), request).await {
            Ok(response) => response
                .map_err(|e| LinkError::Comm {
                    message: e.to_string(),
                })?
                .map_err(|e| LinkError::Exception {
                    message: e.to_string(),
                }),
            Err(_) => Err(LinkError::Timeout {
                timeout_ms: self.settings.timeout_ms,
            }),
        }
    }
}

impl RegisterLink for RtuLink {
    fn poll<'a>(&'a mut self, frame: &'a CommandFrame) -> PollFuture<'a> {
        Box::pin(self.read_frame(frame))
    }
}

impl fmt::Debug for RtuLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtuLink")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ── Forwarder ─────────────────────────────────────────────────────────────────

/// Outcome of a [`forward_frames`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub polled: u64,
    pub failed: u64,
}

/// Poll `link` once per frame received on `rx` until the channel closes.
///
/// A failed poll is logged and counted; it never stops the loop.
pub async fn forward_frames<L: RegisterLink>(
    link: &mut L,
    mut rx: mpsc::Receiver<CommandFrame>,
) -> ForwardStats {
    let mut stats = ForwardStats::default();
    while let Some(frame) = rx.recv().await {
        stats.polled += 1;
        match link.poll(&frame).await {
            Ok(registers) => {
                debug!(
                    id = %frame.id,
                    sequence = frame.sequence,
                    registers = ?registers,
                    "registers read"
                );
            }
            Err(e) => {
                stats.failed += 1;
                warn!(id = %frame.id, sequence = frame.sequence, error = %e, "RTU poll failed");
            }
        }
    }
    info!(polled = stats.polled, failed = stats.failed, "frame forwarder finished");
    stats
}

// ── Tests ─────────────────────────────────────────────────────────────────────

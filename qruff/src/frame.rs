/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Generated command frames and their byte framing.
//!
//! ```text
//! CommandSpec ──(generator firing)──► CommandFrame ──(sink)──► RTU link
//!                                       id, range, sequence, timestamp
//! ```
//!
//! A frame is immutable once produced.  The link layer turns it into a
//! read-holding-registers request; [`CommandFrame::to_pdu`] /
//! [`CommandFrame::to_adu`] give the request bytes without the RTU CRC,
//! which the serial transport appends.

use std::fmt;

/// Modbus function code for "read holding registers".
pub const READ_HOLDING_REGISTERS: u8 = 0x03;

/// One generated, sequenced poll request ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Id of the [`CommandSpec`](crate::command::CommandSpec) that produced it.
    pub id: String,
    pub reg_offset: u16,
    pub reg_len: u16,
    /// Per-entry counter, starting at 1 on every `run()`.
    pub sequence: u64,
    /// Logical timer clock (ms since the timer started) at the scheduled fire
    /// time.
    pub timestamp_ms: u64,
}

impl CommandFrame {
    /// Request PDU: function code, start address (BE), quantity (BE).
    pub fn to_pdu(&self) -> [u8; 5] {
        let [addr_hi, addr_lo] = self.reg_offset.to_be_bytes();
        let [len_hi, len_lo] = self.reg_len.to_be_bytes();
        [READ_HOLDING_REGISTERS, addr_hi, addr_lo, len_hi, len_lo]
    }

    /// Request ADU without CRC: unit id followed by the PDU.
    pub fn to_adu(&self, unit_id: u8) -> Vec<u8> {
        let mut adu = Vec::with_capacity(6);
        adu.push(unit_id);
        adu.extend_from_slice(&self.to_pdu());
        adu
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>8}ms] {} #{} offset=0x{:04x} len={}",
            self.timestamp_ms, self.id, self.sequence, self.reg_offset, self.reg_len
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Asynchronous collaborators.
//!
//! These run on the tokio runtime next to the cooperative timer and never
//! touch generator state directly.  The only bridge is a
//! [`Pipe`](crate::sink::Pipe) forwarding into an `mpsc` channel that
//! [`rtu::forward_frames`] drains.
//!
//! | Module | Operation | Error |
//! |---|---|---|
//! | [`fs`] | whole-file read | [`fs::IoError`] |
//! | [`dns`] | host name → JSON address records | [`dns::ResolutionError`] |
//! | [`rtu`] | serial Modbus RTU link, frame forwarder | [`rtu::LinkError`] |

pub mod dns;
pub mod fs;
pub mod rtu;

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Single-consumer relay sink.
//!
//! A [`Pipe`] is move-only: attaching it to a generator, or chaining it
//! behind another pipe, transfers it.  The only way to keep looking at a
//! pipe after it has been moved is a [`PipeMonitor`] taken beforehand.
//!
//! ```text
//! generator ──► Pipe ──► (buffer)                 unchained: frames accumulate
//! generator ──► Pipe ──► Pipe / Endpoint          chained: straight relay
//! generator ──► Pipe ──► mpsc::Sender             async consumer (RTU link)
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use super::{FrameBuffer, Sink};
use crate::frame::CommandFrame;
use crate::generator::AttachError;

#[derive(Debug)]
enum Downstream {
    Sink(Sink),
    Channel(mpsc::Sender<CommandFrame>),
}

#[derive(Debug)]
struct PipeState {
    buffer: FrameBuffer,
    downstream: Option<Downstream>,
    relayed: u64,
    forward_dropped: u64,
}

/// Exclusive, single-upstream, single-downstream relay.
#[derive(Debug)]
pub struct Pipe {
    state: Rc<RefCell<PipeState>>,
}

/// Read-only view of a [`Pipe`] that survives the pipe being moved.
#[derive(Debug, Clone)]
pub struct PipeMonitor {
    state: Rc<RefCell<PipeState>>,
}

impl Pipe {
    pub fn new() -> Self {
        Self::with_capacity(super::DEFAULT_SINK_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(PipeState {
                buffer: FrameBuffer::with_capacity(capacity),
                downstream: None,
                relayed: 0,
                forward_dropped: 0,
            })),
        }
    }

    /// Take a read-only view before handing the pipe away.
    pub fn monitor(&self) -> PipeMonitor {
        PipeMonitor {
            state: Rc::clone(&self.state),
        }
    }

    /// Chain `sink` behind this pipe.
    ///
    /// Frames already buffered are moved onward in order; from then on this
    /// pipe's own buffer no longer accumulates.
    ///
    /// # Errors
    /// [`AttachError::AlreadyPiped`] if a downstream is already attached.
    pub fn pipe_to(&self, sink: impl Into<Sink>) -> Result<(), AttachError> {
        let sink = sink.into();
        let mut st = self.state.borrow_mut();
        if st.downstream.is_some() {
            return Err(AttachError::AlreadyPiped);
        }
        debug!(downstream = sink.kind(), backlog = st.buffer.len(), "pipe chained");
        for frame in st.buffer.drain() {
            sink.deliver(frame);
        }
        st.downstream = Some(Downstream::Sink(sink));
        Ok(())
    }

    /// Forward frames into an async channel.
    ///
    /// Sending never waits: a full or closed channel counts the frame as
    /// dropped.
    ///
    /// # Errors
    /// [`AttachError::AlreadyPiped`] if a downstream is already attached.
    pub fn forward_to(&self, tx: mpsc::Sender<CommandFrame>) -> Result<(), AttachError> {
        let mut st = self.state.borrow_mut();
        if st.downstream.is_some() {
            return Err(AttachError::AlreadyPiped);
        }
        debug!(backlog = st.buffer.len(), "pipe forwarding to channel");
        let backlog = st.buffer.drain();
        st.downstream = Some(Downstream::Channel(tx));
        for frame in backlog {
            Self::relay(&mut st, frame);
        }
        Ok(())
    }

    pub fn is_chained(&self) -> bool {
        self.state.borrow().downstream.is_some()
    }

    /// Frames that passed through and are still buffered here (none once
    /// chained).
    pub fn show(&self) -> String {
        self.state.borrow().buffer.show()
    }

    pub(crate) fn deliver(&self, frame: CommandFrame) {
        let mut st = self.state.borrow_mut();
        Self::relay(&mut st, frame);
    }

    fn relay(st: &mut PipeState, frame: CommandFrame) {
        st.relayed += 1;
        match &st.downstream {
            None => {
                trace!(id = %frame.id, sequence = frame.sequence, "pipe buffered frame");
                st.buffer.push(frame);
            }
            Some(Downstream::Sink(sink)) => sink.deliver(frame),
            Some(Downstream::Channel(tx)) => match tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    st.forward_dropped += 1;
                    warn!(id = %frame.id, sequence = frame.sequence, "pipe channel full, frame dropped");
                }
                Err(TrySendError::Closed(frame)) => {
                    st.forward_dropped += 1;
                    debug!(id = %frame.id, sequence = frame.sequence, "pipe channel closed, frame dropped");
                }
            },
        }
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}

/// Dropping the pipe releases its downstream: a forwarding channel sees end
/// of stream even while monitors are still alive.
impl Drop for Pipe {
    fn drop(&mut self) {
        if let Ok(mut st) = self.state.try_borrow_mut() {
            if st.downstream.take().is_some() {
                trace!("pipe dropped, downstream released");
            }
        }
    }
}

impl PipeMonitor {
    /// Frames buffered in the pipe itself (empty once chained).
    pub fn show(&self) -> String {
        self.state.borrow().buffer.show()
    }

    pub fn frames(&self) -> Vec<CommandFrame> {
        self.state.borrow().buffer.snapshot()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().buffer.is_empty()
    }

    /// Frames that have passed into the pipe.
    pub fn relayed(&self) -> u64 {
        self.state.borrow().relayed
    }

    /// Frames lost to buffer eviction or a full/closed channel.
    pub fn dropped(&self) -> u64 {
        let st = self.state.borrow();
        st.buffer.dropped() + st.forward_dropped
    }

    pub fn is_chained(&self) -> bool {
        self.state.borrow().downstream.is_some()
    }
}

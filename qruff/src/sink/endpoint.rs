/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Shared, observable frame sink.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::FrameBuffer;
use crate::frame::CommandFrame;

/// Fan-out capable sink.
///
/// Cloning an `Endpoint` clones the handle, not the buffer: every clone sees
/// the same frames.  Any number of generators may feed one endpoint, and one
/// generator may feed any number of endpoints.
#[derive(Debug, Clone)]
pub struct Endpoint {
    buffer: Rc<RefCell<FrameBuffer>>,
}

impl Endpoint {
    pub fn new() -> Self {
        Self::from_buffer(FrameBuffer::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_buffer(FrameBuffer::with_capacity(capacity))
    }

    fn from_buffer(buffer: FrameBuffer) -> Self {
        Self {
            buffer: Rc::new(RefCell::new(buffer)),
        }
    }

    pub(crate) fn deliver(&self, frame: CommandFrame) {
        trace!(id = %frame.id, sequence = frame.sequence, "endpoint <- frame");
        self.buffer.borrow_mut().push(frame);
    }

    /// Render the buffered frames for diagnostics.  Non-destructive.
    pub fn show(&self) -> String {
        self.buffer.borrow().show()
    }

    /// Copy of the buffered frames, oldest first.
    pub fn frames(&self) -> Vec<CommandFrame> {
        self.buffer.borrow().snapshot()
    }

    /// Remove and return the buffered frames.
    pub fn take_frames(&self) -> Vec<CommandFrame> {
        self.buffer.borrow_mut().drain()
    }

    pub fn len(&self) -> usize {
        self.buffer.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.borrow().is_empty()
    }

    pub fn received(&self) -> u64 {
        self.buffer.borrow().received()
    }

    pub fn dropped(&self) -> u64 {
        self.buffer.borrow().dropped()
    }

    pub fn clear(&self) {
        self.buffer.borrow_mut().clear();
    }

    /// `true` if both handles refer to the same buffer.
    pub fn same_as(&self, other: &Endpoint) -> bool {
        Rc::ptr_eq(&self.buffer, &other.buffer)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

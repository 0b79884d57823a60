/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Transport sinks: where generated frames go.
//!
//! Two flavours that differ in how the generator's output is shared:
//!
//! | Sink | Handle | Attachment | Consumers |
//! |---|---|---|---|
//! | [`Endpoint`] | `Clone` (shared) | each attached endpoint receives its own copy of every frame | any number (fan-out / fan-in) |
//! | [`Pipe`] | move-only | generator's output is relinquished to the pipe | exactly one |
//!
//! Delivery is fire-and-forget.  No sink ever blocks or signals backpressure;
//! a full buffer evicts its oldest frame and counts it as dropped.

pub mod endpoint;
pub mod pipe;

pub use endpoint::Endpoint;
pub use pipe::{Pipe, PipeMonitor};

use std::collections::VecDeque;

use crate::frame::CommandFrame;

/// Default bound on buffered frames per sink.  Also the RTU forwarder's
/// channel depth.
pub const DEFAULT_SINK_CAPACITY: usize = 256;

// ── Sink ──────────────────────────────────────────────────────────────────────

/// A consumer of [`CommandFrame`]s.
#[derive(Debug)]
pub enum Sink {
    /// Shared, observable buffer.  Attaching clones the handle.
    Endpoint(Endpoint),
    /// Exclusive relay.  Attaching moves the pipe.
    Pipe(Pipe),
}

impl Sink {
    pub(crate) fn deliver(&self, frame: CommandFrame) {
        match self {
            Sink::Endpoint(endpoint) => endpoint.deliver(frame),
            Sink::Pipe(pipe) => pipe.deliver(frame),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Sink::Endpoint(_) => "endpoint",
            Sink::Pipe(_) => "pipe",
        }
    }
}

impl From<Endpoint> for Sink {
    fn from(endpoint: Endpoint) -> Self {
        Sink::Endpoint(endpoint)
    }
}

impl From<Pipe> for Sink {
    fn from(pipe: Pipe) -> Self {
        Sink::Pipe(pipe)
    }
}

// ── FrameBuffer ───────────────────────────────────────────────────────────────

/// Bounded FIFO of frames that evicts the oldest entry when full.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    frames: VecDeque<CommandFrame>,
    capacity: usize,
    received: u64,
    dropped: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SINK_CAPACITY)
    }

    /// A zero capacity buffer counts every frame as dropped.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.min(DEFAULT_SINK_CAPACITY)),
            capacity,
            received: 0,
            dropped: 0,
        }
    }

    pub fn push(&mut self, frame: CommandFrame) {
        self.received += 1;
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
            self.dropped += 1;
        }
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames ever pushed, including ones later evicted.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Frames evicted because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandFrame> {
        self.frames.iter()
    }

    /// Copy of the buffered frames, oldest first.
    pub fn snapshot(&self) -> Vec<CommandFrame> {
        self.frames.iter().cloned().collect()
    }

    /// Remove and return the buffered frames, oldest first.
    pub fn drain(&mut self) -> Vec<CommandFrame> {
        self.frames.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// One line per buffered frame, oldest first.
    pub fn show(&self) -> String {
        let mut out = String::new();
        for frame in &self.frames {
            out.push_str(&frame.to_string());
            out.push('\n');
        }
        out
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn frame(id: &str, sequence: u64) -> CommandFrame {
        CommandFrame {
            id: id.to_string(),
            reg_offset: 3,
            reg_len: 1,
            sequence,
            timestamp_ms: sequence * 100,
        }
    }

    #[test]
    fn buffer_keeps_frames_in_order() {
        let mut buf = FrameBuffer::with_capacity(4);
        for seq in 1..=3 {
            buf.push(frame("t", seq));
        }
        let seqs: Vec<u64> = buf.iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(buf.dropped(), 0);
    }

    #[test]
    fn full_buffer_evicts_oldest_and_counts_drop() {
        let mut buf = FrameBuffer::with_capacity(2);
        for seq in 1..=5 {
            buf.push(frame("t", seq));
        }
        let seqs: Vec<u64> = buf.iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![4, 5]);
        assert_eq!(buf.dropped(), 3);
        assert_eq!(buf.received(), 5);
    }

    #[test]
    fn zero_capacity_drops_everything() {
        let mut buf = FrameBuffer::with_capacity(0);
        assert_eq!(buf.capacity(), 0);
        buf.push(frame("t", 1));
        assert!(buf.is_empty());
        assert_eq!(buf.dropped(), 1);
    }

    #[test]
    fn show_renders_one_line_per_frame_without_consuming() {
        let mut buf = FrameBuffer::new();
        buf.push(frame("a", 1));
        buf.push(frame("b", 1));
        let shown = buf.show();
        assert_eq!(shown.lines().count(), 2);
        assert!(shown.lines().next().unwrap().contains(" a #1"));
        assert_eq!(buf.len(), 2, "show() must not consume");
    }

    #[test]
    fn drain_empties_buffer() {
        let mut buf = FrameBuffer::new();
        assert_eq!(buf.capacity(), DEFAULT_SINK_CAPACITY);
        buf.push(frame("a", 1));
        assert_eq!(buf.drain().len(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn sink_kind_names_variant() {
        assert_eq!(Sink::from(Endpoint::new()).kind(), "endpoint");
        assert_eq!(Sink::from(Pipe::new()).kind(), "pipe");
    }
}

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Command generator.
//!
//! [`CommandGenerator`] owns a [`CommandTable`] and, once [`run`] is called,
//! one timer per table row.  Every firing produces a [`CommandFrame`] and
//! hands it to whatever sinks are attached at that moment.
//!
//! # Scheduling model
//!
//! | Topic | Behaviour |
//! |---|---|
//! | Periodic rows | re-armed on every firing (one pending timer per row, never a backlog) |
//! | Drift | next due time = previous *scheduled* time + interval, not completion time |
//! | One-shot rows (`interval` 0 / absent) | fire once with zero delay, never re-armed |
//! | Same-millisecond ties | table-insertion order (row index is the timer rank) |
//! | Re-arm failure | that row alone is terminated and counted; the others keep polling |
//! | `stop()` | cancels every pending timer; the next `run()` restarts sequences at 1 |
//! | Attaching mid-run | allowed; takes effect at each row's next firing |
//!
//! All state lives behind one `RefCell` and is only touched from the
//! cooperative timer context, so the public API takes `&self`.  That also
//! lets a host timer callback call [`stop`] on a shared generator.
//!
//! # Example
//! ```rust
//! use std::rc::Rc;
//! use qruff::generator::CommandGenerator;
//! use qruff::sink::Endpoint;
//! use qruff::timer::TimerQueue;
//!
//! let timer = Rc::new(TimerQueue::new());
//! let generator = CommandGenerator::new(
//!     r#"[{"id": "t", "reg_offset": 3, "reg_len": 1, "interval": 100}]"#,
//!     timer.clone(),
//! )
//! .unwrap();
//!
//! let endpoint = Endpoint::new();
//! generator.attach_endpoint(&endpoint);
//! generator.run();
//!
//! timer.advance_to(350);
//! let seqs: Vec<u64> = endpoint.frames().iter().map(|f| f.sequence).collect();
//! assert_eq!(seqs, vec![1, 2, 3]);
//! ```
//!
//! [`run`]: CommandGenerator::run
//! [`stop`]: CommandGenerator::stop

pub mod error;

pub use error::{AttachError, ConfigError};

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug, info, trace, warn};

use crate::command::{CommandSpec, CommandTable, Schedule};
use crate::frame::CommandFrame;
use crate::sink::{Endpoint, Pipe, Sink};
use crate::timer::{TimerError, TimerHandle, TimerService};

// ── Public observation types ──────────────────────────────────────────────────

/// Lifecycle of one table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Not running (never started, or stopped).
    Idle,
    /// A timer is pending for this row.
    Armed,
    /// One-shot row that has fired.
    Done,
    /// The timer could not be (re-)armed; the row no longer fires until the
    /// next `stop()` / `run()` cycle.
    Terminated,
}

/// Counters accumulated over the generator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Frames produced.
    pub fired: u64,
    /// Frame hand-offs to sinks (one frame to two endpoints counts twice).
    pub delivered: u64,
    /// Frames produced while no sink was attached.
    pub unrouted: u64,
    /// Rows terminated because their timer could not be armed.
    pub terminated: u64,
    /// `true` between `run()` and `stop()`.
    pub running: bool,
}

// ── Internal state ────────────────────────────────────────────────────────────

/// Runtime pairing of one [`CommandSpec`] with its timer.
#[derive(Debug)]
struct ScheduleEntry {
    spec: CommandSpec,
    sequence: u64,
    next_due_ms: u64,
    handle: Option<TimerHandle>,
    state: EntryState,
}

impl ScheduleEntry {
    fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            sequence: 0,
            next_due_ms: 0,
            handle: None,
            state: EntryState::Idle,
        }
    }
}

struct GeneratorState {
    timer: Rc<dyn TimerService>,
    entries: Vec<ScheduleEntry>,
    endpoints: Vec<Endpoint>,
    pipe: Option<Pipe>,
    running: bool,
    /// Bumped on every run/stop so a stale callback can never act.
    epoch: u64,
    stats: GeneratorStats,
}

impl GeneratorState {
    /// Hand `frame` to every attached sink.
    fn route(&mut self, frame: CommandFrame) {
        let mut handoffs = 0u64;
        for endpoint in &self.endpoints {
            endpoint.deliver(frame.clone());
            handoffs += 1;
        }
        match &self.pipe {
            Some(pipe) => {
                pipe.deliver(frame);
                handoffs += 1;
            }
            None if handoffs == 0 => {
                trace!(id = %frame.id, sequence = frame.sequence, "no sink attached, frame dropped");
                self.stats.unrouted += 1;
            }
            None => {}
        }
        self.stats.delivered += handoffs;
    }

    fn terminate(&mut self, index: usize, err: &TimerError) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.handle = None;
            entry.state = EntryState::Terminated;
            self.stats.terminated += 1;
            warn!(
                id = %entry.spec.id,
                sequence = entry.sequence,
                error = %err,
                "cannot arm timer, command entry terminated"
            );
        }
    }
}

/// Arm row `index` for `from_ms + interval_ms`.  A due time past the end of
/// the clock is refused rather than clamped.
fn arm_after(
    weak: &Weak<RefCell<GeneratorState>>,
    st: &mut GeneratorState,
    index: usize,
    from_ms: u64,
    interval_ms: u64,
) -> Result<(), TimerError> {
    let due_ms = from_ms
        .checked_add(interval_ms)
        .ok_or(TimerError::DeadlineOverflow {
            now_ms: from_ms,
            delay_ms: interval_ms,
        })?;
    arm_entry(weak, st, index, due_ms)
}

/// Arm the timer for row `index` to fire at logical time `due_ms`.
fn arm_entry(
    weak: &Weak<RefCell<GeneratorState>>,
    st: &mut GeneratorState,
    index: usize,
    due_ms: u64,
) -> Result<(), TimerError> {
    let epoch = st.epoch;
    let delay_ms = due_ms.saturating_sub(st.timer.now_ms());
    let callback_state = weak.clone();

    let handle = st.timer.schedule_ranked(
        delay_ms,
        index,
        Box::new(move || fire(&callback_state, index, epoch, due_ms)),
    )?;

    if let Some(entry) = st.entries.get_mut(index) {
        entry.handle = Some(handle);
        entry.next_due_ms = due_ms;
        entry.state = EntryState::Armed;
    }
    Ok(())
}

/// Timer callback body for row `index`.
fn fire(weak: &Weak<RefCell<GeneratorState>>, index: usize, epoch: u64, due_ms: u64) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let mut st = shared.borrow_mut();
    if !st.running || st.epoch != epoch {
        trace!(index, epoch, "stale generator timer ignored");
        return;
    }

    let Some(entry) = st.entries.get_mut(index) else {
        return;
    };
    entry.handle = None;
    entry.sequence += 1;
    let frame = CommandFrame {
        id: entry.spec.id.clone(),
        reg_offset: entry.spec.reg_offset,
        reg_len: entry.spec.reg_len,
        sequence: entry.sequence,
        timestamp_ms: due_ms,
    };
    let schedule = entry.spec.schedule;

    trace!(id = %frame.id, sequence = frame.sequence, due_ms, "command fired");
    st.stats.fired += 1;
    st.route(frame);

    match schedule {
        Schedule::Once => {
            if let Some(entry) = st.entries.get_mut(index) {
                entry.state = EntryState::Done;
            }
        }
        Schedule::Every(interval_ms) => {
            if let Err(err) = arm_after(weak, &mut st, index, due_ms, interval_ms) {
                st.terminate(index, &err);
            }
        }
    }
}

// ── CommandGenerator ──────────────────────────────────────────────────────────

/// Turns a [`CommandTable`] into a self-scheduling stream of frames.
pub struct CommandGenerator {
    shared: Rc<RefCell<GeneratorState>>,
}

impl CommandGenerator {
    /// Parse `table_json` and build a generator bound to `timer`.
    ///
    /// # Errors
    /// Any [`ConfigError`]; in that case nothing is scheduled.
    pub fn new(table_json: &str, timer: Rc<dyn TimerService>) -> Result<Self, ConfigError> {
        let table = CommandTable::from_json(table_json)?;
        Ok(Self::from_table(table, timer))
    }

    /// Build a generator from an already-validated table.
    pub fn from_table(table: CommandTable, timer: Rc<dyn TimerService>) -> Self {
        let entries = table.iter().cloned().map(ScheduleEntry::new).collect();
        debug!(commands = table.len(), "command generator created");
        Self {
            shared: Rc::new(RefCell::new(GeneratorState {
                timer,
                entries,
                endpoints: Vec::new(),
                pipe: None,
                running: false,
                epoch: 0,
                stats: GeneratorStats::default(),
            })),
        }
    }

    // ── Sink attachment ───────────────────────────────────────────────────────

    /// Attach either sink flavour.
    ///
    /// # Errors
    /// [`AttachError::AlreadyPiped`] for a second pipe.
    pub fn attach(&self, sink: impl Into<Sink>) -> Result<(), AttachError> {
        match sink.into() {
            Sink::Endpoint(endpoint) => {
                self.attach_endpoint(&endpoint);
                Ok(())
            }
            Sink::Pipe(pipe) => self.attach_pipe(pipe),
        }
    }

    /// Add an observer.  Each attached endpoint gets its own copy of every
    /// frame; attaching the same endpoint twice delivers twice.
    pub fn attach_endpoint(&self, endpoint: &Endpoint) {
        let mut st = self.shared.borrow_mut();
        st.endpoints.push(endpoint.clone());
        debug!(endpoints = st.endpoints.len(), running = st.running, "endpoint attached");
    }

    /// Relinquish the output to `pipe`.
    ///
    /// # Errors
    /// [`AttachError::AlreadyPiped`] if a pipe is already attached.  The
    /// rejected pipe is dropped; the generator keeps running unchanged.
    pub fn attach_pipe(&self, pipe: Pipe) -> Result<(), AttachError> {
        let mut st = self.shared.borrow_mut();
        if st.pipe.is_some() {
            warn!("pipe attach rejected: output already piped");
            return Err(AttachError::AlreadyPiped);
        }
        st.pipe = Some(pipe);
        debug!(running = st.running, "output piped");
        Ok(())
    }

    /// Remove every attachment of `endpoint` (matched by shared buffer).
    /// Returns `false` if it was not attached.
    pub fn detach_endpoint(&self, endpoint: &Endpoint) -> bool {
        let mut st = self.shared.borrow_mut();
        let before = st.endpoints.len();
        st.endpoints.retain(|e| !e.same_as(endpoint));
        let removed = before - st.endpoints.len();
        debug!(removed, endpoints = st.endpoints.len(), "endpoint detached");
        removed > 0
    }

    pub fn is_piped(&self) -> bool {
        self.shared.borrow().pipe.is_some()
    }

    pub fn endpoint_count(&self) -> usize {
        self.shared.borrow().endpoints.len()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Arm one timer per row and return immediately.  No-op if already
    /// running.
    ///
    /// Returns the number of rows armed.  A row whose timer cannot be armed is
    /// terminated on the spot without affecting the others.
    pub fn run(&self) -> usize {
        let weak = Rc::downgrade(&self.shared);
        let mut st = self.shared.borrow_mut();
        if st.running {
            debug!("run() called while already running, ignored");
            return 0;
        }
        st.running = true;
        st.epoch += 1;

        let now_ms = st.timer.now_ms();
        let mut armed = 0usize;
        for index in 0..st.entries.len() {
            let interval_ms = st.entries[index].spec.interval_ms();
            match arm_after(&weak, &mut st, index, now_ms, interval_ms) {
                Ok(()) => armed += 1,
                Err(err) => st.terminate(index, &err),
            }
        }

        info!(
            commands = st.entries.len(),
            armed,
            now_ms,
            "command generator running"
        );
        armed
    }

    /// Cancel every pending timer.  Frames already delivered stay delivered;
    /// no further frame is produced.  Sequence counters are reset.
    pub fn stop(&self) {
        let (timer, handles) = {
            let mut st = self.shared.borrow_mut();
            if !st.running {
                return;
            }
            st.running = false;
            st.epoch += 1;

            let mut handles = Vec::new();
            for entry in st.entries.iter_mut() {
                if let Some(handle) = entry.handle.take() {
                    handles.push(handle);
                }
                entry.sequence = 0;
                entry.state = EntryState::Idle;
            }
            (Rc::clone(&st.timer), handles)
        };

        let cancelled = handles.iter().filter(|h| timer.cancel(**h)).count();
        info!(cancelled, "command generator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.borrow().running
    }

    // ── Observation ───────────────────────────────────────────────────────────

    pub fn stats(&self) -> GeneratorStats {
        let st = self.shared.borrow();
        GeneratorStats {
            running: st.running,
            ..st.stats
        }
    }

    pub fn entry_state(&self, id: &str) -> Option<EntryState> {
        self.with_entry(id, |e| e.state)
    }

    /// Sequence number of the last frame produced for `id` in this run.
    pub fn last_sequence(&self, id: &str) -> Option<u64> {
        self.with_entry(id, |e| e.sequence)
    }

    /// Logical due time of the pending firing for `id`, if armed.
    pub fn next_due_ms(&self, id: &str) -> Option<u64> {
        self.with_entry(id, |e| e.handle.map(|_| e.next_due_ms))
            .flatten()
    }

    /// The command specs this generator polls, in table order.
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.shared
            .borrow()
            .entries
            .iter()
            .map(|e| e.spec.clone())
            .collect()
    }

    fn with_entry<T>(&self, id: &str, f: impl FnOnce(&ScheduleEntry) -> T) -> Option<T> {
        self.shared
            .borrow()
            .entries
            .iter()
            .find(|e| e.spec.id == id)
            .map(f)
    }
}

impl Drop for CommandGenerator {
    fn drop(&mut self) {
        // try_borrow: never panic in drop
        if self.shared.try_borrow().is_ok() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for CommandGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.shared.try_borrow() {
            Ok(st) => f
                .debug_struct("CommandGenerator")
                .field("entries", &st.entries)
                .field("endpoints", &st.endpoints.len())
                .field("piped", &st.pipe.is_some())
                .field("running", &st.running)
                .finish(),
            Err(_) => f.write_str("CommandGenerator { <firing> }"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::command::MAX_INTERVAL_MS;
    use crate::timer::{TimerCallback, TimerQueue};

    // ── Test helpers ──────────────────────────────────────────────────────────

    fn generator(json: &str) -> (Rc<TimerQueue>, CommandGenerator) {
        let timer = Rc::new(TimerQueue::new());
        let generator = CommandGenerator::new(json, timer.clone()).unwrap();
        (timer, generator)
    }

    fn seqs(frames: &[CommandFrame], id: &str) -> Vec<u64> {
        frames
            .iter()
            .filter(|f| f.id == id)
            .map(|f| f.sequence)
            .collect()
    }

    /// Timer that refuses to arm a given rank after it has armed it
    /// `allowed` times.
    struct RefusingTimer {
        inner: TimerQueue,
        rank: usize,
        allowed: Cell<usize>,
    }

    impl TimerService for RefusingTimer {
        fn now_ms(&self) -> u64 {
            self.inner.now_ms()
        }

        fn schedule_ranked(
            &self,
            delay_ms: u64,
            rank: usize,
            callback: TimerCallback,
        ) -> Result<TimerHandle, TimerError> {
            if rank == self.rank {
                if self.allowed.get() == 0 {
                    return Err(TimerError::Exhausted { capacity: 0 });
                }
                self.allowed.set(self.allowed.get() - 1);
            }
            self.inner.schedule_ranked(delay_ms, rank, callback)
        }

        fn cancel(&self, handle: TimerHandle) -> bool {
            self.inner.cancel(handle)
        }
    }

    const ONE_AT_100: &str = r#"[{"id": "t", "reg_offset": 3, "reg_len": 1, "interval": 100}]"#;

    // ── construction ──────────────────────────────────────────────────────────

    #[test]
    fn malformed_table_produces_no_generator() {
        let timer = Rc::new(TimerQueue::new());
        let zero_len = CommandGenerator::new(
            r#"[{"id": "t", "reg_offset": 3, "reg_len": 0, "interval": 100}]"#,
            timer.clone(),
        );
        assert!(matches!(zero_len, Err(ConfigError::InvalidRegLen { .. })));

        let no_id =
            CommandGenerator::new(r#"[{"reg_offset": 3, "reg_len": 1}]"#, timer.clone());
        assert!(matches!(no_id, Err(ConfigError::Parse(_))));

        assert!(timer.is_idle(), "no schedule entry may be armed");
    }

    #[test]
    fn nothing_fires_before_run() {
        let (timer, gen) = generator(ONE_AT_100);
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        timer.advance_to(1_000);
        assert!(ep.is_empty());
        assert_eq!(gen.entry_state("t"), Some(EntryState::Idle));
    }

    // ── firing ────────────────────────────────────────────────────────────────

    #[test]
    fn three_frames_after_350ms() {
        let (timer, gen) = generator(ONE_AT_100);
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        assert_eq!(gen.run(), 1);

        timer.advance_to(350);

        let frames = ep.frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(seqs(&frames, "t"), vec![1, 2, 3]);
        for f in &frames {
            assert_eq!(f.reg_offset, 3);
            assert_eq!(f.reg_len, 1);
        }
        let stamps: Vec<u64> = frames.iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(stamps, vec![100, 200, 300]);
        assert_eq!(gen.next_due_ms("t"), Some(400));
    }

    #[test]
    fn frame_count_tracks_elapsed_over_interval() {
        let (timer, gen) = generator(
            r#"[
                {"id": "getTemperature", "reg_offset": 3, "reg_len": 1, "interval": 1000},
                {"id": "getHumit", "reg_offset": 5, "reg_len": 1, "interval": 2000}
            ]"#,
        );
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        gen.run();

        timer.advance_to(10_500);

        let frames = ep.frames();
        assert_eq!(seqs(&frames, "getTemperature"), (1..=10).collect::<Vec<_>>());
        assert_eq!(seqs(&frames, "getHumit"), (1..=5).collect::<Vec<_>>());
    }

    #[test]
    fn sequences_are_gapless_when_driven_in_small_steps() {
        let (timer, gen) = generator(ONE_AT_100);
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        gen.run();
        for t in (0..=2_000).step_by(7) {
            timer.advance_to(t);
        }
        timer.advance_to(2_000);
        assert_eq!(seqs(&ep.frames(), "t"), (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn late_advance_keeps_schedule_anchored() {
        // a single big jump fires the overdue periods with their scheduled
        // timestamps, then continues on the initial grid
        let (timer, gen) = generator(ONE_AT_100);
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        gen.run();

        timer.advance_to(330);
        timer.advance_to(400);

        let stamps: Vec<u64> = ep.frames().iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(stamps, vec![100, 200, 300, 400]);
    }

    #[test]
    fn zero_interval_fires_exactly_once() {
        let (timer, gen) = generator(r#"[{"id": "once", "reg_offset": 1, "reg_len": 2, "interval": 0}]"#);
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        gen.run();

        timer.advance_to(0);
        assert_eq!(ep.len(), 1);
        assert_eq!(ep.frames()[0].timestamp_ms, 0);

        timer.advance_to(10_000);
        assert_eq!(ep.len(), 1);
        assert_eq!(gen.entry_state("once"), Some(EntryState::Done));
        assert!(timer.is_idle());
    }

    #[test]
    fn same_due_time_fires_in_table_order_every_run() {
        let json = r#"[
            {"id": "slow", "reg_offset": 0, "reg_len": 1, "interval": 200},
            {"id": "fast", "reg_offset": 1, "reg_len": 1, "interval": 100}
        ]"#;

        let mut runs = Vec::new();
        for _ in 0..3 {
            let (timer, gen) = generator(json);
            let ep = Endpoint::new();
            gen.attach_endpoint(&ep);
            gen.run();
            timer.advance_to(400);
            let order: Vec<(u64, String)> = ep
                .frames()
                .into_iter()
                .map(|f| (f.timestamp_ms, f.id))
                .collect();
            runs.push(order);
        }

        let expected: Vec<(u64, String)> = vec![
            (100, "fast".into()),
            (200, "slow".into()),
            (200, "fast".into()),
            (300, "fast".into()),
            (400, "slow".into()),
            (400, "fast".into()),
        ];
        for run in runs {
            assert_eq!(run, expected);
        }
    }

    #[test]
    fn frames_without_sink_are_counted_as_unrouted() {
        let (timer, gen) = generator(ONE_AT_100);
        gen.run();
        timer.advance_to(250);
        let stats = gen.stats();
        assert_eq!(stats.fired, 2);
        assert_eq!(stats.unrouted, 2);
        assert_eq!(stats.delivered, 0);
    }

    // ── run / stop ────────────────────────────────────────────────────────────

    #[test]
    fn run_is_idempotent() {
        let (timer, gen) = generator(ONE_AT_100);
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        assert_eq!(gen.run(), 1);
        assert_eq!(gen.run(), 0);
        assert_eq!(timer.pending_count(), 1);

        timer.advance_to(100);
        assert_eq!(ep.len(), 1);
    }

    #[test]
    fn stop_prevents_all_later_frames() {
        let (timer, gen) = generator(ONE_AT_100);
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        gen.run();
        timer.advance_to(250);
        gen.stop();
        let stop_ms = timer.now_ms();

        timer.advance_to(100_000);

        assert_eq!(ep.len(), 2);
        assert!(ep.frames().iter().all(|f| f.timestamp_ms <= stop_ms));
        assert!(timer.is_idle());
        assert_eq!(gen.entry_state("t"), Some(EntryState::Idle));
        assert!(!gen.stats().running);
    }

    #[test]
    fn stop_from_a_host_timer_callback() {
        let timer = Rc::new(TimerQueue::new());
        let gen = Rc::new(CommandGenerator::new(ONE_AT_100, timer.clone()).unwrap());
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        gen.run();

        let g = Rc::clone(&gen);
        timer.set_timeout(250, move || g.stop()).unwrap();
        timer.advance_to(1_000);

        assert_eq!(seqs(&ep.frames(), "t"), vec![1, 2]);
    }

    #[test]
    fn restart_after_stop_begins_at_sequence_one() {
        let (timer, gen) = generator(ONE_AT_100);
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        gen.run();
        timer.advance_to(200);
        assert_eq!(gen.last_sequence("t"), Some(2));
        gen.stop();
        assert_eq!(gen.last_sequence("t"), Some(0));
        assert_eq!(gen.last_sequence("missing"), None);
        ep.clear();

        gen.run();
        timer.advance_to(400);
        let frames = ep.frames();
        assert_eq!(seqs(&frames, "t"), vec![1, 2]);
        assert_eq!(frames[0].timestamp_ms, 300);
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let (_timer, gen) = generator(ONE_AT_100);
        gen.stop();
        assert!(!gen.is_running());
    }

    #[test]
    fn dropping_generator_cancels_timers() {
        let (timer, gen) = generator(ONE_AT_100);
        gen.run();
        assert_eq!(timer.pending_count(), 1);
        drop(gen);
        assert!(timer.is_idle());
    }

    // ── attachment ────────────────────────────────────────────────────────────

    #[test]
    fn second_pipe_is_rejected_and_generator_keeps_working() {
        let (timer, gen) = generator(ONE_AT_100);
        let first = Pipe::new();
        let first_mon = first.monitor();
        gen.attach_pipe(first).unwrap();
        assert!(gen.is_piped());

        assert_eq!(gen.attach_pipe(Pipe::new()), Err(AttachError::AlreadyPiped));
        assert_eq!(gen.attach(Pipe::new()), Err(AttachError::AlreadyPiped));

        gen.run();
        timer.advance_to(200);
        assert_eq!(first_mon.relayed(), 2);
        assert_eq!(seqs(&first_mon.frames(), "t"), vec![1, 2]);
    }

    #[test]
    fn two_endpoints_receive_identical_frames() {
        let (timer, gen) = generator(ONE_AT_100);
        let a = Endpoint::new();
        let b = Endpoint::new();
        gen.attach_endpoint(&a);
        gen.attach(b.clone()).unwrap();
        assert_eq!(gen.endpoint_count(), 2);

        gen.run();
        timer.advance_to(300);

        assert_eq!(a.len(), 3);
        assert_eq!(a.frames(), b.frames());
        assert_eq!(gen.stats().delivered, 6);
    }

    #[test]
    fn endpoint_and_pipe_together() {
        let (timer, gen) = generator(ONE_AT_100);
        let ep = Endpoint::new();
        let pipe = Pipe::new();
        let mon = pipe.monitor();
        gen.attach_endpoint(&ep);
        gen.attach_pipe(pipe).unwrap();

        gen.run();
        timer.advance_to(100);
        assert_eq!(ep.len(), 1);
        assert_eq!(mon.len(), 1);
    }

    #[test]
    fn mid_run_attach_takes_effect_on_next_firing() {
        let (timer, gen) = generator(ONE_AT_100);
        gen.run();
        timer.advance_to(150);

        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        timer.advance_to(350);

        assert_eq!(seqs(&ep.frames(), "t"), vec![2, 3]);
        assert_eq!(gen.stats().unrouted, 1);
    }

    #[test]
    fn shared_endpoint_collects_from_two_generators() {
        let timer = Rc::new(TimerQueue::new());
        let a = CommandGenerator::new(
            r#"[{"id": "a", "reg_offset": 0, "reg_len": 1, "interval": 100}]"#,
            timer.clone(),
        )
        .unwrap();
        let b = CommandGenerator::new(
            r#"[{"id": "b", "reg_offset": 0, "reg_len": 1, "interval": 100}]"#,
            timer.clone(),
        )
        .unwrap();
        let ep = Endpoint::new();
        a.attach_endpoint(&ep);
        b.attach_endpoint(&ep);
        a.run();
        b.run();
        timer.advance_to(100);
        assert_eq!(ep.len(), 2);
    }

    #[test]
    fn detached_endpoint_stops_receiving() {
        let (timer, gen) = generator(ONE_AT_100);
        let kept = Endpoint::new();
        let dropped = Endpoint::new();
        gen.attach_endpoint(&kept);
        gen.attach_endpoint(&dropped);
        gen.attach_endpoint(&dropped.clone());
        gen.run();
        timer.advance_to(100);
        assert_eq!(dropped.len(), 2);

        assert!(gen.detach_endpoint(&dropped));
        assert!(!gen.detach_endpoint(&dropped));
        assert_eq!(gen.endpoint_count(), 1);

        timer.advance_to(300);
        assert_eq!(dropped.len(), 2);
        assert_eq!(seqs(&kept.frames(), "t"), vec![1, 2, 3]);
    }

    // ── failure isolation ─────────────────────────────────────────────────────

    #[test]
    fn longest_interval_fires_once_near_clock_end_then_terminates() {
        let json = format!(
            r#"[{{"id": "slow", "reg_offset": 0, "reg_len": 1, "interval": {MAX_INTERVAL_MS}}}]"#
        );
        let (timer, gen) = generator(&json);
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        timer.advance_to(u64::MAX - MAX_INTERVAL_MS - 150);
        gen.run();

        // must return: the next due time is past the clock end
        timer.advance_to(u64::MAX);

        assert_eq!(seqs(&ep.frames(), "slow"), vec![1]);
        assert_eq!(ep.frames()[0].timestamp_ms, u64::MAX - 150);
        assert_eq!(gen.entry_state("slow"), Some(EntryState::Terminated));
        assert_eq!(gen.stats().terminated, 1);
        assert!(timer.is_idle());
    }

    #[test]
    fn run_with_clock_at_end_terminates_instead_of_clamping() {
        let (timer, gen) = generator(ONE_AT_100);
        timer.advance_to(u64::MAX - 10);
        assert_eq!(gen.run(), 0);
        assert_eq!(gen.entry_state("t"), Some(EntryState::Terminated));
        assert!(timer.is_idle());
    }

    #[test]
    fn rearm_failure_terminates_only_that_entry() {
        let timer = Rc::new(RefusingTimer {
            inner: TimerQueue::new(),
            rank: 1,
            allowed: Cell::new(2),
        });
        let gen = CommandGenerator::new(
            r#"[
                {"id": "healthy", "reg_offset": 0, "reg_len": 1, "interval": 100},
                {"id": "flaky", "reg_offset": 1, "reg_len": 1, "interval": 100}
            ]"#,
            timer.clone(),
        )
        .unwrap();
        let ep = Endpoint::new();
        gen.attach_endpoint(&ep);
        gen.run();

        timer.inner.advance_to(1_000);

        let frames = ep.frames();
        // flaky: armed at run() and re-armed once, then refused
        assert_eq!(seqs(&frames, "flaky"), vec![1, 2]);
        assert_eq!(seqs(&frames, "healthy"), (1..=10).collect::<Vec<_>>());
        assert_eq!(gen.entry_state("flaky"), Some(EntryState::Terminated));
        assert_eq!(gen.entry_state("healthy"), Some(EntryState::Armed));
        assert_eq!(gen.stats().terminated, 1);
    }

    #[test]
    fn arm_failure_at_run_is_isolated() {
        let timer = Rc::new(RefusingTimer {
            inner: TimerQueue::new(),
            rank: 0,
            allowed: Cell::new(0),
        });
        let gen = CommandGenerator::new(
            r#"[
                {"id": "refused", "reg_offset": 0, "reg_len": 1, "interval": 100},
                {"id": "ok", "reg_offset": 1, "reg_len": 1, "interval": 100}
            ]"#,
            timer.clone(),
        )
        .unwrap();
        assert_eq!(gen.run(), 1);
        assert_eq!(gen.entry_state("refused"), Some(EntryState::Terminated));
        assert_eq!(gen.entry_state("ok"), Some(EntryState::Armed));
    }

    #[test]
    fn shutdown_timer_terminates_entries_silently() {
        let (timer, gen) = generator(ONE_AT_100);
        timer.shutdown();
        assert_eq!(gen.run(), 0);
        assert_eq!(gen.stats().terminated, 1);
        assert!(gen.is_running());
    }
}

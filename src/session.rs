//! Session lifecycle and network cadence
//!
//! Tracks which room the engine is in, when the next push or pull is due,
//! which calls are in flight, and the connection state surfaced to the host.
//! Holds no world data.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::net::SessionId;

/// Connection state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No snapshot pulled yet
    Connecting,
    /// Snapshots are arriving
    Active,
    /// Too many consecutive pull or join failures; pulls keep retrying
    Disconnected,
    /// Player left; nothing more is sent
    Ended,
}

/// A state change the host should hear about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Fixed-interval timer driven by the caller's clock
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    interval_ms: f64,
    last_ms: Option<f64>,
}

impl Cadence {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms: interval_ms.max(0.0),
            last_ms: None,
        }
    }

    /// True if never fired or a full interval has passed
    pub fn due(&self, now_ms: f64) -> bool {
        match self.last_ms {
            None => true,
            Some(last) => now_ms - last >= self.interval_ms,
        }
    }

    pub fn mark(&mut self, now_ms: f64) {
        self.last_ms = Some(now_ms);
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }
}

/// Room membership plus push/pull bookkeeping
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    id: Option<SessionId>,
    push: Cadence,
    pull: Cadence,
    push_in_flight: bool,
    pull_in_flight: bool,
    join_in_flight: bool,
    failures: u32,
    max_failures: u32,
    next_seq: u64,
    last_applied_seq: Option<u64>,
    started_ms: Option<f64>,
}

impl Session {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: SessionState::Connecting,
            id: None,
            push: Cadence::new(config.push_interval_ms),
            pull: Cadence::new(config.pull_interval_ms),
            push_in_flight: false,
            pull_in_flight: false,
            join_in_flight: false,
            failures: 0,
            max_failures: config.max_pull_failures.max(1),
            next_seq: 0,
            last_applied_seq: None,
            started_ms: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }

    /// Consecutive pull/join failures since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Sequence number the next pull (or join) will carry
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn pull_in_flight(&self) -> bool {
        self.pull_in_flight
    }

    pub fn push_in_flight(&self) -> bool {
        self.push_in_flight
    }

    pub fn join_in_flight(&self) -> bool {
        self.join_in_flight
    }

    /// Pushes and notifications go out only while joined and connected
    pub fn can_send(&self) -> bool {
        self.id.is_some()
            && matches!(self.state, SessionState::Connecting | SessionState::Active)
    }

    pub fn join_due(&self, now_ms: f64) -> bool {
        self.id.is_none() && !self.is_ended() && !self.join_in_flight && self.pull.due(now_ms)
    }

    pub fn pull_due(&self, now_ms: f64) -> bool {
        self.id.is_some() && !self.is_ended() && !self.pull_in_flight && self.pull.due(now_ms)
    }

    pub fn push_due(&self, now_ms: f64) -> bool {
        self.can_send() && !self.push_in_flight && self.push.due(now_ms)
    }

    /// Seconds since the room was joined
    pub fn elapsed_secs(&self, now_ms: f64) -> f64 {
        self.started_ms
            .map(|start| ((now_ms - start) / 1000.0).max(0.0))
            .unwrap_or(0.0)
    }

    fn issue_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn enter(&mut self, to: SessionState) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        Some(Transition { from, to })
    }

    fn record_failure(&mut self) -> Option<Transition> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.max_failures
            && matches!(self.state, SessionState::Connecting | SessionState::Active)
        {
            self.enter(SessionState::Disconnected)
        } else {
            None
        }
    }

    /// Join attempts share the pull cadence; returns the sequence number
    /// the join snapshot carries
    pub fn begin_join(&mut self, now_ms: f64) -> u64 {
        self.join_in_flight = true;
        self.pull.mark(now_ms);
        self.issue_seq()
    }

    pub fn joined(&mut self, id: SessionId, now_ms: f64) {
        self.join_in_flight = false;
        self.failures = 0;
        if self.is_ended() {
            return;
        }
        self.id = Some(id);
        self.started_ms.get_or_insert(now_ms);
    }

    pub fn join_failed(&mut self) -> Option<Transition> {
        self.join_in_flight = false;
        self.record_failure()
    }

    /// Returns the sequence number of the issued pull
    pub fn begin_pull(&mut self, now_ms: f64) -> u64 {
        self.pull_in_flight = true;
        self.pull.mark(now_ms);
        self.issue_seq()
    }

    /// Whether a snapshot with `seq` is newer than anything applied so far
    pub fn accepts(&self, seq: u64) -> bool {
        self.last_applied_seq.is_none_or(|last| seq > last)
    }

    /// Mark a snapshot as applied. The join snapshot does not activate the
    /// session; only a pulled one does.
    pub fn applied(&mut self, seq: u64) {
        self.last_applied_seq = Some(self.last_applied_seq.map_or(seq, |last| last.max(seq)));
    }

    pub fn pull_succeeded(&mut self) -> Option<Transition> {
        self.pull_in_flight = false;
        self.failures = 0;
        match self.state {
            SessionState::Connecting | SessionState::Disconnected => {
                self.enter(SessionState::Active)
            }
            SessionState::Active | SessionState::Ended => None,
        }
    }

    pub fn pull_failed(&mut self) -> Option<Transition> {
        self.pull_in_flight = false;
        if self.is_ended() {
            return None;
        }
        self.record_failure()
    }

    pub fn begin_push(&mut self, now_ms: f64) {
        self.push_in_flight = true;
        self.push.mark(now_ms);
    }

    pub fn push_done(&mut self) {
        self.push_in_flight = false;
    }

    /// Leave for good. Returns the session id if a leave call should be sent.
    pub fn end(&mut self) -> (Option<Transition>, Option<SessionId>) {
        if self.is_ended() {
            return (None, None);
        }
        let id = self.id.clone();
        (self.enter(SessionState::Ended), id)
    }
}

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::events::{Event, EventSink};

/// Observable session state.
///
/// `Sending` and `Receiving` refine `Running`. When both apply the aggregate
/// reports `Sending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    NotCreated,
    Stopped,
    Running,
    Sending,
    Receiving,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::NotCreated => "not created",
            SessionState::Stopped => "stopped",
            SessionState::Running => "running",
            SessionState::Sending => "sending",
            SessionState::Receiving => "receiving",
        };
        f.write_str(name)
    }
}

/// Lifecycle part of the state, without the sub-flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    NotCreated = 0,
    Stopped = 1,
    Running = 2,
}

/// Full state: lifecycle plus the sending flag and per-channel receive flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub core: CoreState,
    /// Channel of the send in flight.
    pub sending: Option<u8>,
    /// Bit `c` is set while channel `c` is receiving a frame.
    pub receiving: u8,
    pub channel_count: u8,
}

impl Status {
    pub const fn new() -> Self {
        Self {
            core: CoreState::NotCreated,
            sending: None,
            receiving: 0,
            channel_count: 0,
        }
    }

    pub fn aggregate(&self) -> SessionState {
        match self.core {
            CoreState::NotCreated => SessionState::NotCreated,
            CoreState::Stopped => SessionState::Stopped,
            CoreState::Running if self.sending.is_some() => SessionState::Sending,
            CoreState::Running if self.receiving != 0 => SessionState::Receiving,
            CoreState::Running => SessionState::Running,
        }
    }

    /// State as seen from one channel. Caller checks the index.
    pub fn channel(&self, channel: u8) -> SessionState {
        match self.core {
            CoreState::NotCreated => SessionState::NotCreated,
            CoreState::Stopped => SessionState::Stopped,
            CoreState::Running if self.sending == Some(channel) => SessionState::Sending,
            CoreState::Running if self.receiving & (1 << channel) != 0 => SessionState::Receiving,
            CoreState::Running => SessionState::Running,
        }
    }

    // Layout: bits 0-1 core, bit 3 sending, bits 4-7 sending channel,
    // bits 8-15 receive mask, bits 16-23 channel count.
    fn pack(&self) -> u32 {
        let mut bits = self.core as u32;
        if let Some(channel) = self.sending {
            bits |= 1 << 3;
            bits |= (channel as u32 & 0x0F) << 4;
        }
        bits |= (self.receiving as u32) << 8;
        bits |= (self.channel_count as u32) << 16;
        bits
    }

    fn unpack(bits: u32) -> Self {
        let core = match bits & 0x3 {
            1 => CoreState::Stopped,
            2 => CoreState::Running,
            _ => CoreState::NotCreated,
        };
        let sending = if bits & (1 << 3) != 0 {
            Some(((bits >> 4) & 0x0F) as u8)
        } else {
            None
        };
        Self {
            core,
            sending,
            receiving: ((bits >> 8) & 0xFF) as u8,
            channel_count: ((bits >> 16) & 0xFF) as u8,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-free copy of the last committed [`Status`].
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU32);

impl StatusCell {
    pub fn load(&self) -> Status {
        Status::unpack(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: Status) {
        self.0.store(status.pack(), Ordering::Release);
    }
}

/// Bounded event queue that also keeps the status in step with the events.
///
/// Every event that flips the aggregate state is preceded by the matching
/// `StateChanged`.
#[derive(Debug)]
pub struct Outbox {
    queue: VecDeque<Event>,
    limit: usize,
    status: Status,
}

impl Outbox {
    pub fn with_capacity(limit: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(limit),
            limit,
            status: Status::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Move to a new lifecycle state. Leaving `Running` clears the sub-flags.
    pub fn set_core(&mut self, core: CoreState, channel_count: u8) {
        let before = self.status.aggregate();
        self.status.core = core;
        self.status.channel_count = channel_count;
        if core != CoreState::Running {
            self.status.sending = None;
            self.status.receiving = 0;
        }
        self.note_change(before);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events that can still be queued before `push` starts dropping.
    pub fn free_slots(&self) -> usize {
        self.limit.saturating_sub(self.queue.len())
    }

    fn note_change(&mut self, before: SessionState) {
        let after = self.status.aggregate();
        if before != after {
            self.push(Event::StateChanged {
                old: before,
                new: after,
            });
        }
    }

    fn push(&mut self, event: Event) {
        if self.queue.len() >= self.limit {
            log::warn!("event queue full, dropping {:?}", event);
            return;
        }
        self.queue.push_back(event);
    }
}

impl EventSink for Outbox {
    fn emit(&mut self, event: Event) {
        let before = self.status.aggregate();
        match event {
            Event::Sending { channel, .. } => self.status.sending = Some(channel),
            Event::Sent { .. } => self.status.sending = None,
            Event::Receiving { channel } => self.status.receiving |= 1 << channel,
            Event::Received { channel, .. } => self.status.receiving &= !(1 << channel),
            Event::StateChanged { .. } => {}
        }
        self.note_change(before);
        self.push(event);
    }
}

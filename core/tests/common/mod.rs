#![allow(dead_code)]

use parking_lot::Mutex;
use tonelink_core::{ConfigProfile, Notifier, Session, SessionState};

/// Small, fast profile: 16 kHz, 20 ms symbols.
pub fn fast_profile(channels: u8) -> ConfigProfile {
    ConfigProfile::builder("fast")
        .sample_rates(16_000, 16_000)
        .symbol_duration(0.02)
        .tone_spacing(100.0)
        .channel_spacing(2_000.0)
        .channel_count(channels)
        .build()
        .expect("fast profile is valid")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    State(SessionState, SessionState),
    Sending(Vec<u8>, u8),
    Sent(Vec<u8>, u8),
    Receiving(u8),
    Received(Option<Vec<u8>>, u8),
}

/// Notifier that keeps every callback in order.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<Recorded>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn state_changes(&self) -> Vec<(SessionState, SessionState)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::State(old, new) => Some((old, new)),
                _ => None,
            })
            .collect()
    }

    pub fn received(&self) -> Vec<(Option<Vec<u8>>, u8)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::Received(payload, channel) => Some((payload, channel)),
                _ => None,
            })
            .collect()
    }

    pub fn count_sent(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Recorded::Sent(..)))
            .count()
    }
}

impl Notifier for Recorder {
    fn on_state_changed(&self, old: SessionState, new: SessionState) {
        self.events.lock().push(Recorded::State(old, new));
    }

    fn on_sending(&self, payload: &[u8], channel: u8) {
        self.events.lock().push(Recorded::Sending(payload.to_vec(), channel));
    }

    fn on_sent(&self, payload: &[u8], channel: u8) {
        self.events.lock().push(Recorded::Sent(payload.to_vec(), channel));
    }

    fn on_receiving(&self, channel: u8) {
        self.events.lock().push(Recorded::Receiving(channel));
    }

    fn on_received(&self, payload: Option<&[u8]>, channel: u8) {
        self.events
            .lock()
            .push(Recorded::Received(payload.map(<[u8]>::to_vec), channel));
    }
}

/// Drive `session` full duplex with its own output fed back as the next
/// call's input, for `samples` samples in chunks of `chunk`.
pub fn run_self_loop(session: &Session, chunk: usize, samples: usize) {
    let mut input = vec![0.0f32; chunk];
    let mut output = vec![0.0f32; chunk];
    let mut processed = 0;
    while processed < samples {
        session.process(&input, &mut output).expect("process failed");
        std::mem::swap(&mut input, &mut output);
        processed += chunk;
    }
}

/// Samples a send of `len` bytes occupies at `sample_rate`.
pub fn send_samples(session: &Session, len: usize, sample_rate: u32) -> usize {
    let seconds = session
        .duration_for_payload_length(len)
        .expect("valid length");
    (seconds * sample_rate as f32).round() as usize
}

use crate::codec::Payload;
use crate::state::SessionState;

/// Something the application should hear about.
///
/// Events are produced inside the engine and delivered to the [`Notifier`]
/// once the engine lock has been released.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    StateChanged { old: SessionState, new: SessionState },
    Sending { payload: Payload, channel: u8 },
    Sent { payload: Payload, channel: u8 },
    Receiving { channel: u8 },
    /// `None` means a frame arrived but could not be decoded.
    Received { payload: Option<Payload>, channel: u8 },
}

impl Event {
    pub fn dispatch(&self, notifier: &dyn Notifier) {
        match self {
            Event::StateChanged { old, new } => notifier.on_state_changed(*old, *new),
            Event::Sending { payload, channel } => notifier.on_sending(payload, *channel),
            Event::Sent { payload, channel } => notifier.on_sent(payload, *channel),
            Event::Receiving { channel } => notifier.on_receiving(*channel),
            Event::Received { payload, channel } => {
                notifier.on_received(payload.as_ref().map(|p| p.as_bytes()), *channel)
            }
        }
    }
}

/// Destination for events raised during processing.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

/// Application callbacks.
///
/// Called from whichever thread drove the session call that produced the
/// event, often the audio thread, so implementations should return quickly.
/// Calling back into the session from a callback is allowed.
pub trait Notifier: Send + Sync {
    fn on_state_changed(&self, _old: SessionState, _new: SessionState) {}

    fn on_sending(&self, _payload: &[u8], _channel: u8) {}

    fn on_sent(&self, _payload: &[u8], _channel: u8) {}

    fn on_receiving(&self, _channel: u8) {}

    fn on_received(&self, _payload: Option<&[u8]>, _channel: u8) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {}

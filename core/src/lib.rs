//! Acoustic data modem for short binary payloads
//!
//! Bytes go out as multi-tone FSK through a speaker and come back in through a
//! microphone. Everything runs on a streaming sample interface: the audio
//! callback hands fixed-size buffers to a [`Session`], which modulates queued
//! payloads into the output and demodulates whatever arrives on the input.

pub mod codec;
pub mod demodulator;
pub mod error;
pub mod events;
pub mod framing;
pub mod fsk;
pub mod modulator;
pub mod profile;
pub mod sample;
pub mod session;
pub mod state;
pub mod symbol_redundancy;
pub mod sync;

mod bridge;

pub use codec::{Frame, Payload, PayloadCodec};
pub use demodulator::{Demodulator, FeedOptions};
pub use error::{AudioModemError, Result};
pub use events::{Event, EventSink, NoopNotifier, Notifier};
pub use modulator::Modulator;
pub use profile::{ConfigProfile, ConfigProfileBuilder, ConfigProvider, ModulationParams};
pub use sample::Sample;
pub use session::{payload_to_hex, Session};
pub use state::SessionState;
pub use symbol_redundancy::SymbolRedundancyMode;

/// Largest payload any profile may carry. The frame header stores the length in one byte.
pub const PAYLOAD_CAPACITY: usize = 255;

/// Upper bound on logical channels per profile.
pub const MAX_CHANNELS: u8 = 8;

/// A comfortable processing buffer size for hosts that let the caller choose.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Accepted sample-rate range in Hz (the Nyquist check against the profile comes on top).
pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

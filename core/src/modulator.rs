use crate::codec::{Frame, Payload};
use crate::fsk::{self, TONES_PER_CHANNEL};
use crate::profile::ConfigProfile;

/// Streams one frame as audio, a chunk at a time.
///
/// Holds the frame and a cursor. Every sample is computed from its absolute
/// position in the transmission, so chunk boundaries never show in the output.
#[derive(Debug, Clone)]
pub struct Modulator {
    frame: Frame,
    channel: u8,
    symbol_samples: usize,
    taper: usize,
    omegas: [f32; TONES_PER_CHANNEL],
    amplitude: f32,
    cursor: usize,
    total: usize,
}

impl Modulator {
    /// Prepare `frame` for transmission on `channel` at `sample_rate`.
    pub fn begin(frame: Frame, channel: u8, profile: &ConfigProfile, sample_rate: u32) -> Self {
        let modulation = profile.modulation();
        let symbol_samples = fsk::symbol_samples(modulation.symbol_duration, sample_rate).max(1);
        let total = frame.len() * symbol_samples;
        Self {
            omegas: profile.tone_plan().omegas(channel, sample_rate as f32, 1.0),
            taper: fsk::taper_length(symbol_samples),
            amplitude: modulation.amplitude,
            channel,
            symbol_samples,
            cursor: 0,
            total,
            frame,
        }
    }

    /// Write the next `buffer.len()` samples and return how many came from the
    /// frame. Once the frame is exhausted the rest of the buffer is silence.
    pub fn fill(&mut self, buffer: &mut [f32]) -> usize {
        let written = buffer.len().min(self.remaining_samples());
        for (offset, sample) in buffer[..written].iter_mut().enumerate() {
            *sample = self.sample_at(self.cursor + offset);
        }
        buffer[written..].fill(0.0);
        self.cursor += written;
        written
    }

    pub fn is_active(&self) -> bool {
        self.cursor < self.total
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn payload(&self) -> &Payload {
        self.frame.payload()
    }

    pub fn total_samples(&self) -> usize {
        self.total
    }

    pub fn remaining_samples(&self) -> usize {
        self.total - self.cursor
    }

    fn sample_at(&self, position: usize) -> f32 {
        let symbol = self.frame.symbols()[position / self.symbol_samples];
        let n = position % self.symbol_samples;
        let envelope = fsk::taper_gain(n, self.symbol_samples, self.taper);
        self.amplitude * envelope * (self.omegas[symbol as usize] * n as f32).sin()
    }
}

use std::f32::consts::PI;

// Tone layout shared by the modulator and demodulator
//
// Every logical channel owns a band of 18 tones:
// - tones 0..16 carry one data nibble each
// - tone 16 (marker A) and tone 17 (marker B) open every frame
//
// frequency = base + channel * channel_spacing + tone * tone_spacing
//
// Exactly one tone sounds per symbol period. Symbols are shaped with a
// raised-cosine envelope so consecutive symbols join without clicks.

/// Distinct data symbol values (one nibble).
pub const DATA_TONES: usize = 16;

/// Tones per channel band, data tones plus the two markers.
pub const TONES_PER_CHANNEL: usize = DATA_TONES + 2;

pub const MARKER_A: u8 = DATA_TONES as u8;
pub const MARKER_B: u8 = DATA_TONES as u8 + 1;

/// Symbols prefixed to every frame.
pub const MARKER_SYMBOLS: [u8; 2] = [MARKER_A, MARKER_B];

/// Apply a smooth envelope to reduce spectral splatter near symbol edges.
const EDGE_TAPER_RATIO: f32 = 0.08; // 8% of the symbol on each side

/// Ensure we always have a minimum attack/decay regardless of speed.
const MIN_TAPER_SAMPLES: usize = 16;

/// Where each tone of each channel sits in the spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TonePlan {
    pub base_frequency: f32,
    pub tone_spacing: f32,
    pub channel_spacing: f32,
}

impl TonePlan {
    /// Frequency in Hz of `tone` on `channel`
    pub fn frequency(&self, channel: u8, tone: u8) -> f32 {
        self.base_frequency
            + channel as f32 * self.channel_spacing
            + tone as f32 * self.tone_spacing
    }

    /// Highest frequency emitted by a profile with `channel_count` channels.
    pub fn highest_frequency(&self, channel_count: u8) -> f32 {
        self.frequency(
            channel_count.saturating_sub(1),
            (TONES_PER_CHANNEL - 1) as u8,
        )
    }

    /// Angular frequency per sample of every tone of `channel`.
    ///
    /// `correction` scales every frequency: with `c` the tones are expected at
    /// `f * c`, which compensates a transmitter whose tones come out `c` times
    /// too high.
    pub fn omegas(&self, channel: u8, sample_rate: f32, correction: f32) -> [f32; TONES_PER_CHANNEL] {
        let mut omegas = [0.0f32; TONES_PER_CHANNEL];
        for (tone, omega) in omegas.iter_mut().enumerate() {
            let freq = self.frequency(channel, tone as u8) * correction;
            *omega = 2.0 * PI * freq / sample_rate;
        }
        omegas
    }
}

/// Samples in one symbol period.
pub fn symbol_samples(symbol_duration: f32, sample_rate: u32) -> usize {
    (symbol_duration * sample_rate as f32).round() as usize
}

pub fn taper_length(symbol_samples: usize) -> usize {
    let mut taper = ((symbol_samples as f32) * EDGE_TAPER_RATIO).round() as usize;
    if taper < MIN_TAPER_SAMPLES {
        taper = MIN_TAPER_SAMPLES;
    }
    let half_symbol = symbol_samples / 2;
    if taper > half_symbol {
        taper = half_symbol;
    }
    taper
}

/// Raised-cosine envelope value at position `n` of a symbol.
pub fn taper_gain(n: usize, symbol_samples: usize, taper: usize) -> f32 {
    if taper == 0 || n >= symbol_samples {
        return if n < symbol_samples { 1.0 } else { 0.0 };
    }
    let from_edge = n.min(symbol_samples - 1 - n);
    if from_edge >= taper {
        return 1.0;
    }
    // Smoothly increase from 0 to 1 using a sine-squared profile
    let progress = from_edge as f32 / taper as f32;
    (PI * progress / 2.0).sin().powi(2)
}

/// Goertzel power of `samples` at angular frequency `omega`.
///
/// A full-scale sine of amplitude `a` spanning `n` samples yields roughly
/// `(a * n / 2)^2`.
pub fn goertzel_power<I>(samples: I, omega: f32) -> f32
where
    I: IntoIterator<Item = f32>,
{
    let coeff = 2.0 * omega.cos();
    let mut q1 = 0.0f32;
    let mut q2 = 0.0f32;

    for sample in samples {
        let q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }

    let real = q1 - q2 * omega.cos();
    let imag = q2 * omega.sin();
    real * real + imag * imag
}

/// Mean square level of the tone behind a Goertzel `power` measured over `len` samples.
///
/// A sine of amplitude `a` comes out at `a^2 / 2`.
pub fn tone_level(power: f32, len: usize) -> f32 {
    let len = len.max(1) as f32;
    2.0 * power / (len * len)
}

/// Index and power of the strongest entry.
pub fn strongest(powers: &[f32]) -> (u8, f32) {
    powers
        .iter()
        .copied()
        .enumerate()
        .fold((0u8, f32::MIN), |best, (idx, power)| {
            if power > best.1 {
                (idx as u8, power)
            } else {
                best
            }
        })
}

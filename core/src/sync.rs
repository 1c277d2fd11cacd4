use crate::fsk::{goertzel_power, tone_level};

// ============================================================================
// FRAME SYNCHRONIZATION
// ============================================================================
// A frame opens with marker A followed by marker B, one symbol each.
//
// While idle, a channel measures its tones over the last symbol-length window
// every quarter symbol. Once A dominates the band, the tracker follows
// its power until it drops; the best window is then refined sample by sample.
// The caller confirms the lock by reading marker B one symbol later.

/// Share of the channel's in-band power marker A must hold before tracking starts.
pub const MARKER_DOMINANCE: f32 = 0.5;

/// Marker tones quieter than this RMS level are never considered.
pub const MIN_SIGNAL_RMS: f32 = 1e-3;

/// Rolling sample history addressed by absolute sample index.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    buffer: Vec<f32>,
    written: u64,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            written: 0,
        }
    }

    pub fn push(&mut self, sample: f32) {
        let idx = (self.written % self.buffer.len() as u64) as usize;
        self.buffer[idx] = sample;
        self.written += 1;
    }

    /// Absolute index of the next sample to arrive.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Whether `[start, start + len)` is still held.
    pub fn contains(&self, start: u64, len: usize) -> bool {
        let end = start + len as u64;
        end <= self.written && start + self.buffer.len() as u64 >= self.written
    }

    /// Iterate `[start, start + len)`. The range must be held.
    pub fn window(&self, start: u64, len: usize) -> impl Iterator<Item = f32> + '_ {
        let cap = self.buffer.len();
        let first = (start % cap as u64) as usize;
        let head_len = len.min(cap - first);
        self.buffer[first..first + head_len]
            .iter()
            .chain(self.buffer[..len - head_len].iter())
            .copied()
    }

    pub fn power(&self, start: u64, len: usize, omega: f32) -> f32 {
        goertzel_power(self.window(start, len), omega)
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.written = 0;
    }
}

/// Follows the marker A power while a channel is idle.
#[derive(Debug, Clone, Default)]
pub struct MarkerTracker {
    best: Option<(u64, f32)>,
}

impl MarkerTracker {
    /// Feed the measurement of the window starting at `start`: the marker
    /// power and the summed power of every tone in the channel band.
    ///
    /// Returns the start of the strongest window once the power has passed its peak.
    pub fn observe(&mut self, start: u64, power: f32, band_power: f32, len: usize) -> Option<u64> {
        let dominant = is_marker_window(power, band_power, len);
        match self.best {
            None if dominant => {
                self.best = Some((start, power));
                None
            }
            None => None,
            Some((_, best_power)) if power >= best_power => {
                self.best = Some((start, power));
                None
            }
            Some((best_start, _)) => {
                self.best = None;
                Some(best_start)
            }
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.best.is_some()
    }

    pub fn reset(&mut self) {
        self.best = None;
    }
}

/// Whether a window is mostly marker tone and loud enough to matter.
///
/// Only the channel's own band counts, so traffic on other channels does not
/// dilute the marker.
pub fn is_marker_window(power: f32, band_power: f32, len: usize) -> bool {
    let loud = tone_level(power, len) >= MIN_SIGNAL_RMS * MIN_SIGNAL_RMS;
    loud && band_power > 0.0 && power / band_power > MARKER_DOMINANCE
}

/// Find the window start within `coarse ± radius` where the tone is strongest.
///
/// A strided pass narrows the range, then a sample-exact pass settles it.
/// Candidates whose window is not fully held are skipped.
pub fn refine_alignment(
    history: &SampleHistory,
    coarse: u64,
    radius: usize,
    len: usize,
    omega: f32,
) -> u64 {
    let stride = (radius / 16).max(1);
    let lo = coarse.saturating_sub(radius as u64);
    let hi = coarse + radius as u64;

    let best = strongest_offset(history, lo, hi, stride, len, omega).unwrap_or(coarse);
    let lo = best.saturating_sub(stride as u64).max(lo);
    let hi = (best + stride as u64).min(hi);
    strongest_offset(history, lo, hi, 1, len, omega).unwrap_or(best)
}

fn strongest_offset(
    history: &SampleHistory,
    lo: u64,
    hi: u64,
    stride: usize,
    len: usize,
    omega: f32,
) -> Option<u64> {
    let mut best: Option<(u64, f32)> = None;
    let mut start = lo;
    while start <= hi {
        if history.contains(start, len) {
            let power = history.power(start, len, omega);
            if best.map_or(true, |(_, p)| power > p) {
                best = Some((start, power));
            }
        }
        start += stride as u64;
    }
    best.map(|(start, _)| start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(len: usize, omega: f32) -> Vec<f32> {
        (0..len).map(|n| 0.5 * (omega * n as f32).sin()).collect()
    }

    #[test]
    fn test_history_wraps_and_windows() {
        let mut history = SampleHistory::new(8);
        for i in 0..13 {
            history.push(i as f32);
        }
        assert_eq!(history.written(), 13);
        assert!(history.contains(5, 8));
        assert!(!history.contains(4, 8));
        assert!(!history.contains(10, 4));
        let window: Vec<f32> = history.window(6, 5).collect();
        assert_eq!(window, vec![6.0, 7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_tracker_waits_for_dominance_and_peak() {
        let mut tracker = MarkerTracker::default();
        // Data tone in the band: marker holds a small share
        assert_eq!(tracker.observe(0, 10.0, 1_000.0, 100), None);
        assert!(!tracker.is_tracking());
        // Rising marker
        assert_eq!(tracker.observe(25, 600.0, 1_000.0, 100), None);
        assert_eq!(tracker.observe(50, 900.0, 1_000.0, 100), None);
        // Falling: the previous window was the peak
        assert_eq!(tracker.observe(75, 400.0, 1_000.0, 100), Some(50));
        assert!(!tracker.is_tracking());
    }

    #[test]
    fn test_silence_never_tracks() {
        let mut tracker = MarkerTracker::default();
        assert_eq!(tracker.observe(0, 0.0, 0.0, 100), None);
        // Pure marker, but far below the level floor
        assert!(!is_marker_window(1e-9, 1e-9, 100));
        assert!(is_marker_window(900.0, 1_000.0, 100));
    }

    #[test]
    fn test_refine_finds_exact_tone_start() {
        let len = 256;
        let omega = 2.0 * PI * 16.0 / len as f32;
        let offset = 301u64;

        let mut history = SampleHistory::new(4 * len);
        for _ in 0..offset {
            history.push(0.0);
        }
        for s in tone(len, omega) {
            history.push(s);
        }
        for _ in 0..len {
            history.push(0.0);
        }

        let found = refine_alignment(&history, offset + 40, 64, len, omega);
        assert_eq!(found, offset);
        let found = refine_alignment(&history, offset - 60, 64, len, omega);
        assert_eq!(found, offset);
    }
}

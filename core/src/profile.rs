use std::fmt;

use crate::codec::PayloadCodec;
use crate::error::{AudioModemError, Result};
use crate::fsk::{self, TonePlan, MARKER_SYMBOLS, TONES_PER_CHANNEL};
use crate::symbol_redundancy::SymbolRedundancyMode;

/// Fewest samples a symbol may span at any sample rate a profile accepts.
const MIN_SYMBOL_SAMPLES: usize = 64;

/// Signal parameters of a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulationParams {
    /// Length of one symbol in seconds
    pub symbol_duration: f32,
    /// Frequency of tone 0 on channel 0 in Hz
    pub base_frequency: f32,
    /// Distance between adjacent tones of a channel in Hz
    pub tone_spacing: f32,
    /// Distance between the bands of adjacent channels in Hz
    pub channel_spacing: f32,
    /// Peak output level in `0.0..=1.0`
    pub amplitude: f32,
    pub redundancy: SymbolRedundancyMode,
}

impl Default for ModulationParams {
    fn default() -> Self {
        Self {
            symbol_duration: 0.04,
            base_frequency: 1000.0,
            tone_spacing: 50.0,
            channel_spacing: 1000.0,
            amplitude: 0.7,
            redundancy: SymbolRedundancyMode::Parity,
        }
    }
}

impl ModulationParams {
    pub fn tone_plan(&self) -> TonePlan {
        TonePlan {
            base_frequency: self.base_frequency,
            tone_spacing: self.tone_spacing,
            channel_spacing: self.channel_spacing,
        }
    }
}

/// Immutable transmission profile.
///
/// Built once through [`ConfigProfile::builder`] or a preset, then shared
/// read-only by the codec, modulator and demodulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigProfile {
    name: String,
    version: u32,
    max_payload_bytes: usize,
    channel_count: u8,
    sample_rate_in: u32,
    sample_rate_out: u32,
    modulation: ModulationParams,
}

impl ConfigProfile {
    pub fn builder(name: impl Into<String>) -> ConfigProfileBuilder {
        ConfigProfileBuilder::new(name)
    }

    /// Single channel, 32 bytes max, 44.1 kHz both ways.
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            version: 1,
            max_payload_bytes: 32,
            channel_count: 1,
            sample_rate_in: 44_100,
            sample_rate_out: 44_100,
            modulation: ModulationParams::default(),
        }
    }

    /// The standard signal spread over `channels` adjacent bands.
    pub fn multi_channel(channels: u8) -> Result<Self> {
        Self::builder(format!("multi-channel-{}", channels))
            .channel_count(channels)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    pub fn channel_count(&self) -> u8 {
        self.channel_count
    }

    pub fn sample_rate_in(&self) -> u32 {
        self.sample_rate_in
    }

    pub fn sample_rate_out(&self) -> u32 {
        self.sample_rate_out
    }

    pub fn modulation(&self) -> &ModulationParams {
        &self.modulation
    }

    pub fn tone_plan(&self) -> TonePlan {
        self.modulation.tone_plan()
    }

    pub fn codec(&self) -> PayloadCodec {
        PayloadCodec::new(self.max_payload_bytes, self.modulation.redundancy)
    }

    /// Highest tone frequency any channel of this profile emits.
    pub fn highest_frequency(&self) -> f32 {
        self.tone_plan().highest_frequency(self.channel_count)
    }

    /// Seconds of audio needed to send a payload of `length` bytes.
    ///
    /// Not validated against the payload limits and monotonic in `length`.
    pub fn duration_for_length(&self, length: usize) -> f32 {
        let symbols = MARKER_SYMBOLS.len() + self.codec().data_symbols_for(length);
        symbols as f32 * self.modulation.symbol_duration
    }

    /// Whether this profile can run at `sample_rate`.
    pub fn check_sample_rate(&self, sample_rate: u32) -> Result<()> {
        let in_range = (crate::MIN_SAMPLE_RATE..=crate::MAX_SAMPLE_RATE).contains(&sample_rate);
        let above_nyquist = sample_rate as f32 > 2.0 * self.highest_frequency();
        let long_enough =
            fsk::symbol_samples(self.modulation.symbol_duration, sample_rate) >= MIN_SYMBOL_SAMPLES;
        if in_range && above_nyquist && long_enough {
            Ok(())
        } else {
            Err(AudioModemError::InvalidSampleRate(sample_rate))
        }
    }
}

impl fmt::Display for ConfigProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" config v{} [max {} bytes in {:.2}s]",
            self.name,
            self.version,
            self.max_payload_bytes,
            self.duration_for_length(self.max_payload_bytes)
        )
    }
}

/// Builder for custom profiles. Starts from the standard parameters.
#[derive(Debug, Clone)]
pub struct ConfigProfileBuilder {
    profile: ConfigProfile,
}

impl ConfigProfileBuilder {
    fn new(name: impl Into<String>) -> Self {
        let mut profile = ConfigProfile::standard();
        profile.name = name.into();
        Self { profile }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.profile.version = version;
        self
    }

    pub fn max_payload_bytes(mut self, max: usize) -> Self {
        self.profile.max_payload_bytes = max;
        self
    }

    pub fn channel_count(mut self, count: u8) -> Self {
        self.profile.channel_count = count;
        self
    }

    pub fn sample_rates(mut self, input: u32, output: u32) -> Self {
        self.profile.sample_rate_in = input;
        self.profile.sample_rate_out = output;
        self
    }

    pub fn symbol_duration(mut self, seconds: f32) -> Self {
        self.profile.modulation.symbol_duration = seconds;
        self
    }

    pub fn base_frequency(mut self, hz: f32) -> Self {
        self.profile.modulation.base_frequency = hz;
        self
    }

    pub fn tone_spacing(mut self, hz: f32) -> Self {
        self.profile.modulation.tone_spacing = hz;
        self
    }

    pub fn channel_spacing(mut self, hz: f32) -> Self {
        self.profile.modulation.channel_spacing = hz;
        self
    }

    pub fn amplitude(mut self, amplitude: f32) -> Self {
        self.profile.modulation.amplitude = amplitude;
        self
    }

    pub fn redundancy(mut self, mode: SymbolRedundancyMode) -> Self {
        self.profile.modulation.redundancy = mode;
        self
    }

    pub fn modulation(mut self, params: ModulationParams) -> Self {
        self.profile.modulation = params;
        self
    }

    pub fn build(self) -> Result<ConfigProfile> {
        let profile = self.profile;
        let m = &profile.modulation;

        if profile.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if profile.max_payload_bytes == 0 || profile.max_payload_bytes > crate::PAYLOAD_CAPACITY {
            return Err(invalid(format!(
                "max payload must be within 1..={} bytes",
                crate::PAYLOAD_CAPACITY
            )));
        }
        if profile.channel_count == 0 || profile.channel_count > crate::MAX_CHANNELS {
            return Err(invalid(format!(
                "channel count must be within 1..={}",
                crate::MAX_CHANNELS
            )));
        }
        if !(m.symbol_duration.is_finite() && m.symbol_duration > 0.0) {
            return Err(invalid("symbol duration must be positive"));
        }
        if !(m.base_frequency.is_finite() && m.base_frequency > 0.0) {
            return Err(invalid("base frequency must be positive"));
        }
        // Tones closer than one cycle per symbol are not separable.
        if !(m.tone_spacing.is_finite() && m.tone_spacing * m.symbol_duration >= 1.0 - 1e-3) {
            return Err(invalid("tone spacing must be at least 1 / symbol duration"));
        }
        if profile.channel_count > 1
            && m.channel_spacing < m.tone_spacing * TONES_PER_CHANNEL as f32
        {
            return Err(invalid("channel bands overlap"));
        }
        if !(m.amplitude > 0.0 && m.amplitude <= 1.0) {
            return Err(invalid("amplitude must be within (0, 1]"));
        }
        for rate in [profile.sample_rate_in, profile.sample_rate_out] {
            profile.check_sample_rate(rate).map_err(|_| {
                invalid(format!(
                    "sample rate {} Hz cannot carry tones up to {:.0} Hz",
                    rate,
                    profile.highest_frequency()
                ))
            })?;
        }

        Ok(profile)
    }
}

fn invalid(reason: impl Into<String>) -> AudioModemError {
    AudioModemError::InvalidConfig(reason.into())
}

/// Turns an opaque config descriptor into a validated profile.
///
/// Implementations own parsing, licensing and signature checks and report
/// failures with the config error variants (`MissingConfig`, `InvalidConfig`,
/// `ExpiredConfig`, ...).
pub trait ConfigProvider {
    fn load(&self, descriptor: &str) -> Result<ConfigProfile>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_profile() {
        let profile = ConfigProfile::standard();
        assert_eq!(profile.max_payload_bytes(), 32);
        assert_eq!(profile.channel_count(), 1);
        assert_eq!(profile.sample_rate_out(), 44_100);
        // 32 bytes + 3 overhead + 1 pad = 18 groups of 6 symbols, plus 2 markers
        assert!((profile.duration_for_length(32) - 4.4).abs() < 1e-4);
        assert_eq!(
            profile.to_string(),
            "\"standard\" config v1 [max 32 bytes in 4.40s]"
        );
    }

    #[test]
    fn test_standard_profile_passes_its_own_validation() {
        let rebuilt = ConfigProfile::builder("standard").build().unwrap();
        assert_eq!(rebuilt, ConfigProfile::standard());
    }

    #[test]
    fn test_multi_channel_profile() {
        let profile = ConfigProfile::multi_channel(4).unwrap();
        assert_eq!(profile.channel_count(), 4);
        assert_eq!(profile.highest_frequency(), 4850.0);
        assert!(ConfigProfile::multi_channel(0).is_err());
        assert!(ConfigProfile::multi_channel(crate::MAX_CHANNELS + 1).is_err());
    }

    #[test]
    fn test_builder_rejects_bad_parameters() {
        let cases = [
            ConfigProfile::builder("").build(),
            ConfigProfile::builder("x").max_payload_bytes(0).build(),
            ConfigProfile::builder("x").max_payload_bytes(300).build(),
            ConfigProfile::builder("x").symbol_duration(0.0).build(),
            ConfigProfile::builder("x").tone_spacing(10.0).build(),
            ConfigProfile::builder("x").amplitude(1.5).build(),
            ConfigProfile::builder("x")
                .channel_count(2)
                .channel_spacing(200.0)
                .build(),
            ConfigProfile::builder("x").sample_rates(44_100, 2_000).build(),
        ];
        for (idx, case) in cases.iter().enumerate() {
            assert!(
                matches!(case, Err(AudioModemError::InvalidConfig(_))),
                "case {} accepted: {:?}",
                idx,
                case
            );
        }
    }

    #[test]
    fn test_sample_rate_checks() {
        let profile = ConfigProfile::multi_channel(8).unwrap();
        // Highest tone sits at 8850 Hz
        assert!(profile.check_sample_rate(16_000).is_err());
        assert!(profile.check_sample_rate(22_050).is_ok());
        assert!(profile.check_sample_rate(192_000).is_ok());
        assert_eq!(
            profile.check_sample_rate(384_000),
            Err(AudioModemError::InvalidSampleRate(384_000))
        );
    }

    #[test]
    fn test_duration_is_monotonic() {
        let profile = ConfigProfile::standard();
        let mut last = 0.0;
        for len in 0..=profile.max_payload_bytes() + 10 {
            let duration = profile.duration_for_length(len);
            assert!(duration >= last);
            last = duration;
        }
    }
}

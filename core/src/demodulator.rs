use crate::codec::PayloadCodec;
use crate::events::{Event, EventSink};
use crate::fsk::{self, TonePlan, MARKER_A, MARKER_B, TONES_PER_CHANNEL};
use crate::profile::ConfigProfile;
use crate::sync::{self, MarkerTracker, SampleHistory};

/// Per-call knobs for [`Demodulator::feed`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedOptions {
    /// Channel whose input is replaced by silence for this call.
    pub muted_channel: Option<u8>,
    pub frequency_correction: f32,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            muted_channel: None,
            frequency_correction: 1.0,
        }
    }
}

/// Receives frames on every channel of a profile at once.
///
/// Input arrives in chunks of any size; each channel keeps its own history and
/// clock, so chunking never changes what is detected. Completed frames are
/// decoded on the spot and reported through the [`EventSink`].
#[derive(Debug)]
pub struct Demodulator {
    channels: Vec<ChannelReceiver>,
    codec: PayloadCodec,
    plan: TonePlan,
    sample_rate: f32,
    symbol_samples: usize,
    hop: usize,
    correction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Searching,
    /// Marker A located; `next` is where marker B should start.
    Confirming { next: u64 },
    /// Committed to a frame; `next` is the start of the next data symbol.
    Receiving { next: u64 },
}

#[derive(Debug)]
struct ChannelReceiver {
    channel: u8,
    history: SampleHistory,
    tracker: MarkerTracker,
    phase: Phase,
    since_hop: usize,
    omegas: [f32; TONES_PER_CHANNEL],
    symbols: Vec<u8>,
    expected: Option<usize>,
}

impl Demodulator {
    pub fn new(profile: &ConfigProfile, sample_rate: u32) -> Self {
        let symbol_samples =
            fsk::symbol_samples(profile.modulation().symbol_duration, sample_rate).max(4);
        let codec = profile.codec();
        let plan = profile.tone_plan();
        let channels = (0..profile.channel_count())
            .map(|channel| ChannelReceiver {
                channel,
                history: SampleHistory::new(2 * symbol_samples),
                tracker: MarkerTracker::default(),
                phase: Phase::Searching,
                since_hop: 0,
                omegas: plan.omegas(channel, sample_rate as f32, 1.0),
                symbols: Vec::with_capacity(codec.max_data_symbols()),
                expected: None,
            })
            .collect();

        Self {
            channels,
            codec,
            plan,
            sample_rate: sample_rate as f32,
            symbol_samples,
            hop: symbol_samples / 4,
            correction: 1.0,
        }
    }

    /// Consume one chunk of input.
    pub fn feed<S: EventSink>(&mut self, samples: &[f32], options: FeedOptions, events: &mut S) {
        if options.frequency_correction != self.correction {
            self.correction = options.frequency_correction;
            for rx in &mut self.channels {
                rx.omegas = self.plan.omegas(rx.channel, self.sample_rate, self.correction);
            }
        }

        let ctx = Context {
            codec: &self.codec,
            window: self.symbol_samples,
            hop: self.hop,
        };
        // Sample-major so events across channels come out in time order.
        for &sample in samples {
            for rx in &mut self.channels {
                let muted = options.muted_channel == Some(rx.channel);
                rx.push(if muted { 0.0 } else { sample }, &ctx, events);
            }
        }
    }

    pub fn is_receiving(&self, channel: u8) -> bool {
        self.channels
            .get(channel as usize)
            .map_or(false, |rx| matches!(rx.phase, Phase::Receiving { .. }))
    }

    /// Drop every partial frame and all history.
    pub fn reset(&mut self) {
        for rx in &mut self.channels {
            rx.history.clear();
            rx.abandon();
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

struct Context<'a> {
    codec: &'a PayloadCodec,
    window: usize,
    hop: usize,
}

impl ChannelReceiver {
    fn push<S: EventSink>(&mut self, sample: f32, ctx: &Context<'_>, events: &mut S) {
        self.history.push(sample);
        let now = self.history.written();

        match self.phase {
            Phase::Searching => {
                self.since_hop += 1;
                if self.since_hop >= ctx.hop {
                    self.since_hop = 0;
                    self.search(ctx);
                }
            }
            Phase::Confirming { next } if now == next + ctx.window as u64 => {
                if self.read_symbol(next, ctx.window) == MARKER_B {
                    log::debug!("channel {}: frame start confirmed", self.channel);
                    self.phase = Phase::Receiving {
                        next: next + ctx.window as u64,
                    };
                    events.emit(Event::Receiving {
                        channel: self.channel,
                    });
                } else {
                    self.abandon();
                }
            }
            Phase::Receiving { next } if now == next + ctx.window as u64 => {
                let symbol = self.read_symbol(next, ctx.window);
                self.symbols.push(symbol);
                self.phase = Phase::Receiving {
                    next: next + ctx.window as u64,
                };
                self.after_symbol(ctx, events);
            }
            _ => {}
        }
    }

    fn search(&mut self, ctx: &Context<'_>) {
        let window = ctx.window;
        let now = self.history.written();
        if now < window as u64 {
            return;
        }
        let start = now - window as u64;
        let powers = self.band_powers(start, window);
        let power = powers[MARKER_A as usize];
        let band_power: f32 = powers.iter().sum();

        if let Some(coarse) = self.tracker.observe(start, power, band_power, window) {
            let omega = self.omegas[MARKER_A as usize];
            let aligned = sync::refine_alignment(&self.history, coarse, ctx.hop, window, omega);
            log::debug!(
                "channel {}: marker at sample {} (coarse {})",
                self.channel,
                aligned,
                coarse
            );
            self.phase = Phase::Confirming {
                next: aligned + window as u64,
            };
        }
    }

    fn band_powers(&self, start: u64, window: usize) -> [f32; TONES_PER_CHANNEL] {
        let mut powers = [0.0f32; TONES_PER_CHANNEL];
        for (power, &omega) in powers.iter_mut().zip(self.omegas.iter()) {
            *power = self.history.power(start, window, omega);
        }
        powers
    }

    fn read_symbol(&self, start: u64, window: usize) -> u8 {
        fsk::strongest(&self.band_powers(start, window)).0
    }

    fn after_symbol<S: EventSink>(&mut self, ctx: &Context<'_>, events: &mut S) {
        if self.expected.is_none() && self.symbols.len() == ctx.codec.header_symbols() {
            match ctx.codec.expected_data_symbols(&self.symbols) {
                Ok(expected) => self.expected = Some(expected),
                Err(err) => {
                    log::debug!("channel {}: unusable frame header: {}", self.channel, err);
                    self.finish(None, events);
                    return;
                }
            }
        }

        if self.expected == Some(self.symbols.len()) {
            let payload = match ctx.codec.decode(&self.symbols) {
                Ok(payload) => {
                    log::debug!("channel {}: received {} bytes", self.channel, payload.len());
                    Some(payload)
                }
                Err(err) => {
                    log::debug!("channel {}: decode failed: {}", self.channel, err);
                    None
                }
            };
            self.finish(payload, events);
        }
    }

    fn finish<S: EventSink>(&mut self, payload: Option<crate::codec::Payload>, events: &mut S) {
        events.emit(Event::Received {
            payload,
            channel: self.channel,
        });
        self.abandon();
    }

    fn abandon(&mut self) {
        self.phase = Phase::Searching;
        self.tracker.reset();
        self.symbols.clear();
        self.expected = None;
        self.since_hop = 0;
    }
}

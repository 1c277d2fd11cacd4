use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use rand::Rng;

use crate::codec::PayloadCodec;
use crate::demodulator::Demodulator;
use crate::error::{AudioModemError, Result};
use crate::events::{Event, EventSink, NoopNotifier, Notifier};
use crate::modulator::Modulator;
use crate::profile::{ConfigProfile, ConfigProvider};
use crate::state::{CoreState, Outbox, SessionState, StatusCell};

/// Events that can wait for dispatch at once. Far more than a single call produces.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// One modem instance.
///
/// Shared between the audio thread, which drives the `process*` entry points,
/// and any number of control threads. All methods take `&self`.
///
/// Control calls take the engine lock briefly. Processing only ever tries the
/// lock and plays silence when it is busy. State queries, volume, frequency
/// correction and muting go through atomics and never lock.
pub struct Session {
    pub(crate) engine: Mutex<Engine>,
    pub(crate) status: StatusCell,
    pub(crate) controls: Controls,
    notifier: Arc<dyn Notifier>,
    /// Held while events are handed to the notifier, so callbacks from
    /// different threads never interleave.
    delivery: ReentrantMutex<()>,
}

pub(crate) struct Engine {
    pub(crate) profile: Option<Arc<ConfigProfile>>,
    pub(crate) codec: Option<PayloadCodec>,
    pub(crate) sample_rate_in: u32,
    pub(crate) sample_rate_out: u32,
    pub(crate) transmission_channel: u8,
    pub(crate) modulator: Option<Modulator>,
    pub(crate) demodulator: Option<Demodulator>,
    pub(crate) outbox: Outbox,
}

impl Engine {
    fn new() -> Self {
        Self {
            profile: None,
            codec: None,
            sample_rate_in: 0,
            sample_rate_out: 0,
            transmission_channel: 0,
            modulator: None,
            demodulator: None,
            outbox: Outbox::with_capacity(EVENT_QUEUE_CAPACITY),
        }
    }

    fn core(&self) -> CoreState {
        self.outbox.status().core
    }

    fn profile(&self) -> Result<&Arc<ConfigProfile>> {
        self.profile.as_ref().ok_or(AudioModemError::NotInitialised)
    }

    fn codec(&self) -> Result<PayloadCodec> {
        self.codec.ok_or(AudioModemError::NotInitialised)
    }

    pub(crate) fn channel_count(&self) -> u8 {
        self.profile.as_ref().map_or(0, |p| p.channel_count())
    }

    /// Common guard for sample-rate setters.
    fn check_rate_change(&self, sample_rate: u32) -> Result<()> {
        let profile = self.profile()?;
        if self.core() == CoreState::Running {
            return Err(AudioModemError::AlreadyRunning);
        }
        profile.check_sample_rate(sample_rate)
    }
}

/// Settings read by the audio thread without locking.
pub(crate) struct Controls {
    volume: AtomicF32,
    frequency_correction: AtomicF32,
    listen_to_self: AtomicBool,
    paused: AtomicBool,
}

impl Controls {
    fn new() -> Self {
        Self {
            volume: AtomicF32::new(1.0),
            frequency_correction: AtomicF32::new(1.0),
            listen_to_self: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    pub(crate) fn volume(&self) -> f32 {
        self.volume.load()
    }

    pub(crate) fn frequency_correction(&self) -> f32 {
        self.frequency_correction.load()
    }

    pub(crate) fn listen_to_self(&self) -> bool {
        self.listen_to_self.load(Ordering::Relaxed)
    }

    pub(crate) fn paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Arc::new(NoopNotifier))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("volume", &self.volume())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session with no config. Events go to `notifier`.
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            engine: Mutex::new(Engine::new()),
            status: StatusCell::default(),
            controls: Controls::new(),
            notifier,
            delivery: ReentrantMutex::new(()),
        }
    }

    /// Run a control operation under the engine lock, then deliver its events.
    fn control<T>(&self, op: impl FnOnce(&mut Engine) -> Result<T>) -> Result<T> {
        let result = {
            let mut engine = self.engine.lock();
            let result = op(&mut engine);
            self.status.store(engine.outbox.status());
            result
        };
        self.dispatch_pending(true);
        result
    }

    /// Hand queued events to the notifier, one at a time and without holding
    /// the engine lock, so callbacks may call back into the session.
    ///
    /// Events reach the notifier in queue order whichever thread delivers
    /// them. A callback that calls back in delivers the events it caused
    /// before returning. Without `blocking`, a thread that finds delivery
    /// under way elsewhere leaves its events to that thread.
    pub(crate) fn dispatch_pending(&self, blocking: bool) {
        loop {
            {
                let _delivery = if blocking {
                    self.delivery.lock()
                } else {
                    match self.delivery.try_lock() {
                        Some(guard) => guard,
                        None => return,
                    }
                };
                while let Some(event) = self.next_event(blocking) {
                    event.dispatch(self.notifier.as_ref());
                }
            }
            // Someone may have queued and backed off while we were delivering.
            if !self.has_pending(blocking) {
                return;
            }
        }
    }

    fn next_event(&self, blocking: bool) -> Option<Event> {
        if blocking {
            self.engine.lock().outbox.pop()
        } else {
            self.engine.try_lock()?.outbox.pop()
        }
    }

    fn has_pending(&self, blocking: bool) -> bool {
        if blocking {
            !self.engine.lock().outbox.is_empty()
        } else {
            self.engine
                .try_lock()
                .is_some_and(|engine| !engine.outbox.is_empty())
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Install a profile. Only allowed while not running.
    ///
    /// Sample rates fall back to the profile defaults, and the transmission
    /// channel to 0 if the new profile has fewer channels.
    pub fn set_config(&self, profile: ConfigProfile) -> Result<()> {
        self.control(|engine| {
            if engine.core() == CoreState::Running {
                return Err(AudioModemError::AlreadyRunning);
            }

            let channel_count = profile.channel_count();
            if engine.transmission_channel >= channel_count {
                engine.transmission_channel = 0;
            }
            engine.sample_rate_in = profile.sample_rate_in();
            engine.sample_rate_out = profile.sample_rate_out();
            engine.codec = Some(profile.codec());
            log::debug!("installing config {}", profile);
            engine.profile = Some(Arc::new(profile));
            engine.outbox.set_core(CoreState::Stopped, channel_count);
            Ok(())
        })
    }

    /// Load a profile through `provider` and install it.
    ///
    /// A provider error leaves the session untouched.
    pub fn set_config_from<P>(&self, provider: &P, descriptor: &str) -> Result<()>
    where
        P: ConfigProvider + ?Sized,
    {
        let profile = provider.load(descriptor).map_err(|err| {
            log::warn!("config rejected: {}", err);
            err
        })?;
        self.set_config(profile)
    }

    /// The installed profile, if any.
    pub fn profile(&self) -> Option<Arc<ConfigProfile>> {
        self.engine.lock().profile.clone()
    }

    /// Short human-readable description of the session.
    pub fn info(&self) -> String {
        match self.profile() {
            Some(profile) => format!("tonelink {}", profile),
            None => "tonelink (no config)".to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn start(&self) -> Result<()> {
        self.control(|engine| {
            let profile = Arc::clone(engine.profile()?);
            if engine.core() == CoreState::Running {
                return Err(AudioModemError::AlreadyRunning);
            }

            engine.modulator = None;
            engine.demodulator = Some(Demodulator::new(&profile, engine.sample_rate_in));
            self.controls.paused.store(false, Ordering::Release);
            engine.outbox.set_core(CoreState::Running, profile.channel_count());
            log::debug!(
                "started at {} Hz in / {} Hz out",
                engine.sample_rate_in,
                engine.sample_rate_out
            );
            Ok(())
        })
    }

    /// Stop processing. Any send or receive in flight is dropped without notification.
    pub fn stop(&self) -> Result<()> {
        self.control(|engine| {
            match engine.core() {
                CoreState::NotCreated => return Err(AudioModemError::NotRunning),
                CoreState::Stopped => return Err(AudioModemError::AlreadyStopped),
                CoreState::Running => {}
            }

            if engine.modulator.take().is_some() {
                log::debug!("stop abandoned a send in flight");
            }
            engine.demodulator = None;
            self.controls.paused.store(false, Ordering::Release);
            let channel_count = engine.channel_count();
            engine.outbox.set_core(CoreState::Stopped, channel_count);
            Ok(())
        })
    }

    /// Suspend or resume processing without losing send or receive progress.
    ///
    /// While paused, output is silence and input is ignored.
    pub fn pause(&self, paused: bool) -> Result<()> {
        self.control(|engine| match engine.core() {
            CoreState::NotCreated => Err(AudioModemError::NotInitialised),
            CoreState::Stopped => Err(AudioModemError::NotRunning),
            CoreState::Running => {
                self.controls.paused.store(paused, Ordering::Release);
                Ok(())
            }
        })
    }

    pub fn is_paused(&self) -> bool {
        self.controls.paused()
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Queue `payload` for transmission on the current transmission channel.
    ///
    /// `on_sending` fires right away; the audio follows through the output
    /// side of the `process*` calls and `on_sent` fires once it has all been
    /// written.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.control(|engine| {
            let profile = Arc::clone(engine.profile()?);
            if engine.core() != CoreState::Running {
                return Err(AudioModemError::NotRunning);
            }
            if engine.modulator.is_some() {
                return Err(AudioModemError::AlreadySending);
            }

            let frame = engine.codec()?.encode(payload)?;
            let channel = engine.transmission_channel;
            let payload = *frame.payload();
            let modulator = Modulator::begin(frame, channel, &profile, engine.sample_rate_out);
            log::debug!(
                "sending {} bytes on channel {} ({} samples)",
                payload.len(),
                channel,
                modulator.total_samples()
            );
            engine.modulator = Some(modulator);
            engine.outbox.emit(Event::Sending { payload, channel });
            Ok(())
        })
    }

    pub fn transmission_channel(&self) -> Result<u8> {
        let engine = self.engine.lock();
        engine.profile()?;
        Ok(engine.transmission_channel)
    }

    /// Pick the channel for the next send. A send in flight keeps its channel.
    pub fn set_transmission_channel(&self, channel: u8) -> Result<()> {
        self.control(|engine| {
            let count = engine.profile()?.channel_count();
            if channel >= count {
                return Err(AudioModemError::ChannelNotSupported { channel, count });
            }
            engine.transmission_channel = channel;
            Ok(())
        })
    }

    pub fn channel_count(&self) -> Result<u8> {
        Ok(self.engine.lock().profile()?.channel_count())
    }

    // ------------------------------------------------------------------
    // Live settings
    // ------------------------------------------------------------------

    pub fn volume(&self) -> f32 {
        self.controls.volume()
    }

    /// Output gain in `0.0..=1.0`, applied from the next processed sample.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(AudioModemError::InvalidVolume(volume.into()));
        }
        self.controls.volume.store(volume);
        Ok(())
    }

    pub fn frequency_correction(&self) -> f32 {
        self.controls.frequency_correction()
    }

    /// Scale factor for the expected tone frequencies, in `0.5..=1.5`.
    pub fn set_frequency_correction(&self, correction: f32) -> Result<()> {
        if !(0.5..=1.5).contains(&correction) {
            return Err(AudioModemError::InvalidFrequencyCorrection(correction.into()));
        }
        self.controls.frequency_correction.store(correction);
        Ok(())
    }

    pub fn listen_to_self(&self) -> bool {
        self.controls.listen_to_self()
    }

    /// When off (the default), the transmission channel ignores its input
    /// while a send is in flight, so the session never decodes its own signal.
    pub fn set_listen_to_self(&self, enabled: bool) {
        self.controls.listen_to_self.store(enabled, Ordering::Relaxed);
    }

    /// Inverse view of [`Session::listen_to_self`].
    pub fn auto_mute(&self) -> bool {
        !self.listen_to_self()
    }

    pub fn set_auto_mute(&self, enabled: bool) {
        self.set_listen_to_self(!enabled);
    }

    pub fn input_sample_rate(&self) -> Result<u32> {
        let engine = self.engine.lock();
        engine.profile()?;
        Ok(engine.sample_rate_in)
    }

    pub fn set_input_sample_rate(&self, sample_rate: u32) -> Result<()> {
        self.control(|engine| {
            engine.check_rate_change(sample_rate)?;
            engine.sample_rate_in = sample_rate;
            Ok(())
        })
    }

    pub fn output_sample_rate(&self) -> Result<u32> {
        let engine = self.engine.lock();
        engine.profile()?;
        Ok(engine.sample_rate_out)
    }

    pub fn set_output_sample_rate(&self, sample_rate: u32) -> Result<()> {
        self.control(|engine| {
            engine.check_rate_change(sample_rate)?;
            engine.sample_rate_out = sample_rate;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Payload helpers
    // ------------------------------------------------------------------

    pub fn max_payload_length(&self) -> Result<usize> {
        Ok(self.engine.lock().codec()?.max_payload_bytes())
    }

    /// Seconds of audio a payload of `length` bytes takes to send.
    pub fn duration_for_payload_length(&self, length: usize) -> Result<f32> {
        let engine = self.engine.lock();
        let profile = engine.profile()?;
        check_length(length, profile.max_payload_bytes())?;
        Ok(profile.duration_for_length(length))
    }

    /// Whether `payload` could be sent with the current config.
    pub fn is_valid(&self, payload: &[u8]) -> Result<()> {
        let codec = self.engine.lock().codec()?;
        codec.validate(payload)
    }

    /// A zeroed payload of `length` bytes.
    pub fn new_payload(&self, length: usize) -> Result<Vec<u8>> {
        let max = self.max_payload_length()?;
        check_length(length, max)?;
        Ok(vec![0; length])
    }

    /// Random bytes to send. A `length` of 0 also picks a random length.
    pub fn random_payload(&self, length: usize) -> Result<Vec<u8>> {
        let max = self.max_payload_length()?;
        if length > max {
            return Err(AudioModemError::PayloadTooLong { len: length, max });
        }

        let mut rng = rand::thread_rng();
        let length = if length == 0 {
            rng.gen_range(1..=max)
        } else {
            length
        };
        let mut payload = vec![0u8; length];
        rng.fill(payload.as_mut_slice());
        Ok(payload)
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Aggregate state. `Sending` wins over `Receiving`.
    pub fn state(&self) -> SessionState {
        self.status.load().aggregate()
    }

    pub fn state_for_channel(&self, channel: u8) -> Result<SessionState> {
        let status = self.status.load();
        if status.core == CoreState::NotCreated {
            return Ok(SessionState::NotCreated);
        }
        if channel >= status.channel_count {
            return Err(AudioModemError::InvalidChannel(channel));
        }
        Ok(status.channel(channel))
    }
}

fn check_length(length: usize, max: usize) -> Result<()> {
    if length == 0 {
        return Err(AudioModemError::PayloadTooShort);
    }
    if length > max {
        return Err(AudioModemError::PayloadTooLong { len: length, max });
    }
    Ok(())
}

/// Lowercase hex rendering of a payload.
pub fn payload_to_hex(payload: &[u8]) -> String {
    hex::encode(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_to_hex() {
        assert_eq!(payload_to_hex(&[0x00, 0xab, 0x7f]), "00ab7f");
        assert_eq!(payload_to_hex(&[]), "");
    }

    #[test]
    fn test_session_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Session>();
    }

    #[test]
    fn test_fresh_session() {
        let session = Session::default();
        assert_eq!(session.state(), SessionState::NotCreated);
        assert_eq!(session.info(), "tonelink (no config)");
        assert_eq!(session.start(), Err(AudioModemError::NotInitialised));
        assert_eq!(session.stop(), Err(AudioModemError::NotRunning));
        assert_eq!(session.send(&[1]), Err(AudioModemError::NotInitialised));
        assert_eq!(session.max_payload_length(), Err(AudioModemError::NotInitialised));
        assert_eq!(session.state_for_channel(0), Ok(SessionState::NotCreated));
    }

    #[test]
    fn test_info_describes_profile() {
        let session = Session::default();
        session.set_config(ConfigProfile::standard()).unwrap();
        assert_eq!(
            session.info(),
            "tonelink \"standard\" config v1 [max 32 bytes in 4.40s]"
        );
    }

    #[test]
    fn test_settings_validation() {
        let session = Session::default();
        assert!(session.set_volume(0.5).is_ok());
        assert_eq!(session.volume(), 0.5);
        assert!(matches!(
            session.set_volume(1.01),
            Err(AudioModemError::InvalidVolume(_))
        ));
        assert!(session.set_volume(f32::NAN).is_err());
        assert_eq!(session.volume(), 0.5);

        assert!(session.set_frequency_correction(1.5).is_ok());
        assert!(session.set_frequency_correction(0.49).is_err());
        assert_eq!(session.frequency_correction(), 1.5);

        assert!(session.auto_mute());
        session.set_auto_mute(false);
        assert!(session.listen_to_self());
    }

    #[test]
    fn test_random_payload_lengths() {
        let session = Session::default();
        session.set_config(ConfigProfile::standard()).unwrap();
        for _ in 0..50 {
            let payload = session.random_payload(0).unwrap();
            assert!((1..=32).contains(&payload.len()));
        }
        assert_eq!(session.random_payload(7).unwrap().len(), 7);
        assert!(matches!(
            session.random_payload(33),
            Err(AudioModemError::PayloadTooLong { len: 33, max: 32 })
        ));
    }

    #[test]
    fn test_payload_helpers() {
        let session = Session::default();
        session.set_config(ConfigProfile::standard()).unwrap();
        assert_eq!(session.new_payload(3).unwrap(), vec![0, 0, 0]);
        assert_eq!(session.new_payload(0), Err(AudioModemError::PayloadTooShort));
        assert_eq!(
            session.duration_for_payload_length(0),
            Err(AudioModemError::PayloadTooShort)
        );
        assert!(session.duration_for_payload_length(33).is_err());
        let d = session.duration_for_payload_length(32).unwrap();
        assert!((d - 4.4).abs() < 1e-4);
        assert_eq!(session.is_valid(&[]), Err(AudioModemError::PayloadEmptyMessage));
        assert!(session.is_valid(&[0xff; 32]).is_ok());
    }

    #[test]
    fn test_sample_rate_rules() {
        let session = Session::default();
        assert_eq!(
            session.set_input_sample_rate(48_000),
            Err(AudioModemError::NotInitialised)
        );
        session.set_config(ConfigProfile::standard()).unwrap();
        session.set_input_sample_rate(48_000).unwrap();
        assert_eq!(session.input_sample_rate(), Ok(48_000));
        assert_eq!(
            session.set_output_sample_rate(3_000),
            Err(AudioModemError::InvalidSampleRate(3_000))
        );

        session.start().unwrap();
        assert_eq!(
            session.set_output_sample_rate(48_000),
            Err(AudioModemError::AlreadyRunning)
        );
        session.stop().unwrap();

        // A new config restores the profile rates
        session.set_config(ConfigProfile::standard()).unwrap();
        assert_eq!(session.input_sample_rate(), Ok(44_100));
    }

    #[test]
    fn test_transmission_channel_rules() {
        let session = Session::default();
        session.set_config(ConfigProfile::multi_channel(3).unwrap()).unwrap();
        assert_eq!(session.channel_count(), Ok(3));
        session.set_transmission_channel(2).unwrap();
        assert_eq!(session.transmission_channel(), Ok(2));
        assert_eq!(
            session.set_transmission_channel(3),
            Err(AudioModemError::ChannelNotSupported { channel: 3, count: 3 })
        );

        // Shrinking the channel count pulls the transmission channel back to 0
        session.set_config(ConfigProfile::standard()).unwrap();
        assert_eq!(session.transmission_channel(), Ok(0));
        assert_eq!(
            session.state_for_channel(1),
            Err(AudioModemError::InvalidChannel(1))
        );
    }

    #[test]
    fn test_pause_requires_running() {
        let session = Session::default();
        assert_eq!(session.pause(true), Err(AudioModemError::NotInitialised));
        session.set_config(ConfigProfile::standard()).unwrap();
        assert_eq!(session.pause(true), Err(AudioModemError::NotRunning));
        session.start().unwrap();
        session.pause(true).unwrap();
        assert!(session.is_paused());
        session.stop().unwrap();
        assert!(!session.is_paused());
    }
}

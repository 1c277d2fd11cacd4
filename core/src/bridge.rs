//! Streaming entry points for the audio callback.

use crate::demodulator::FeedOptions;
use crate::error::{AudioModemError, Result};
use crate::events::{Event, EventSink};
use crate::modulator::Modulator;
use crate::sample::Sample;
use crate::session::{Controls, Engine, Session};
use crate::state::CoreState;

/// Samples converted per pass through the stack scratch buffer.
const BLOCK_SAMPLES: usize = 256;

impl Session {
    /// Full duplex: demodulate `input` and fill `output`. Both must have the same length.
    pub fn process(&self, input: &[f32], output: &mut [f32]) -> Result<()> {
        self.process_buffers(Some(input), Some(output), input.len())
    }

    pub fn process_input(&self, input: &[f32]) -> Result<()> {
        self.process_buffers::<f32>(Some(input), None, input.len())
    }

    pub fn process_output(&self, output: &mut [f32]) -> Result<()> {
        let length = output.len();
        self.process_buffers(None, Some(output), length)
    }

    /// 16-bit PCM variant of [`Session::process`].
    pub fn process_shorts(&self, input: &[i16], output: &mut [i16]) -> Result<()> {
        self.process_buffers(Some(input), Some(output), input.len())
    }

    pub fn process_shorts_input(&self, input: &[i16]) -> Result<()> {
        self.process_buffers::<i16>(Some(input), None, input.len())
    }

    pub fn process_shorts_output(&self, output: &mut [i16]) -> Result<()> {
        let length = output.len();
        self.process_buffers(None, Some(output), length)
    }

    /// Process `length` samples in any supported format.
    ///
    /// A missing side is simply not processed, but at least one must be given
    /// and every given buffer must hold exactly `length` samples. The output is
    /// always left in a defined state: silence unless a send is in flight.
    ///
    /// Never blocks and never allocates. If a control call holds the engine,
    /// the output stays silent and the input chunk is dropped. Long chunks
    /// hand queued events to the notifier between blocks, so any number of
    /// frames can complete in one call.
    pub fn process_buffers<S: Sample>(
        &self,
        input: Option<&[S]>,
        mut output: Option<&mut [S]>,
        length: usize,
    ) -> Result<()> {
        if let Some(out) = output.as_deref_mut() {
            out.fill(S::SILENCE);
        }
        if input.is_none() && output.is_none() {
            return Err(AudioModemError::NullBuffer);
        }
        for actual in [input.map(<[S]>::len), output.as_deref().map(<[S]>::len)]
            .into_iter()
            .flatten()
        {
            if actual != length {
                return Err(AudioModemError::InvalidLength {
                    expected: length,
                    actual,
                });
            }
        }
        if length == 0 {
            return Ok(());
        }

        match self.status.load().core {
            CoreState::NotCreated => return Err(AudioModemError::NotInitialised),
            CoreState::Stopped => return Err(AudioModemError::NotRunning),
            CoreState::Running => {}
        }
        if self.controls.paused() {
            return Ok(());
        }

        let Some(mut engine) = self.engine.try_lock() else {
            return Ok(());
        };
        // A stop may have slipped in between the snapshot and the lock.
        if engine.outbox.status().core != CoreState::Running {
            return Err(AudioModemError::NotRunning);
        }

        let volume = self.controls.volume();
        let options = feed_options(&engine, &self.controls);
        let headroom = block_headroom(engine.channel_count());
        let mut scratch = [0.0f32; BLOCK_SAMPLES];
        let mut offset = 0;
        while offset < length {
            if engine.outbox.free_slots() < headroom {
                self.status.store(engine.outbox.status());
                drop(engine);
                self.dispatch_pending(false);

                engine = match self.engine.try_lock() {
                    Some(engine) => engine,
                    None => return Ok(()),
                };
                if engine.outbox.status().core != CoreState::Running {
                    return Err(AudioModemError::NotRunning);
                }
                if engine.outbox.free_slots() < headroom {
                    // Another thread is still delivering; the rest of the call is dropped.
                    log::debug!("event queue busy, dropping {} samples", length - offset);
                    break;
                }
            }

            let n = BLOCK_SAMPLES.min(length - offset);
            let block = offset..offset + n;
            render_block(
                &mut engine,
                input.map(|input| &input[block.clone()]),
                output.as_deref_mut().map(|out| &mut out[block]),
                &mut scratch[..n],
                options,
                volume,
            );
            offset += n;
        }
        self.status.store(engine.outbox.status());
        drop(engine);

        self.dispatch_pending(false);
        Ok(())
    }
}

/// Queue slots one block may fill: every channel ends one frame and starts
/// the next, and the send in flight ends. Each of those also changes state.
///
/// A block is shorter than the shortest frame, so no channel does more.
fn block_headroom(channel_count: u8) -> usize {
    4 * channel_count as usize + 3
}

/// Decided once per call: the own channel stays muted until the call ends
/// even if the send finishes halfway.
fn feed_options(engine: &Engine, controls: &Controls) -> FeedOptions {
    let muted_channel = if controls.listen_to_self() {
        None
    } else {
        engine.modulator.as_ref().map(Modulator::channel)
    };
    FeedOptions {
        muted_channel,
        frequency_correction: controls.frequency_correction(),
    }
}

fn render_block<S: Sample>(
    engine: &mut Engine,
    input: Option<&[S]>,
    output: Option<&mut [S]>,
    scratch: &mut [f32],
    options: FeedOptions,
    volume: f32,
) {
    if let Some(out) = output {
        render_output(engine, scratch, out, volume);
    }

    if let Some(input) = input {
        for (dst, &src) in scratch.iter_mut().zip(input) {
            *dst = src.to_f32();
        }
        if let Some(demodulator) = engine.demodulator.as_mut() {
            demodulator.feed(scratch, options, &mut engine.outbox);
        }
    }
}

fn render_output<S: Sample>(engine: &mut Engine, scratch: &mut [f32], out: &mut [S], volume: f32) {
    let Some(modulator) = engine.modulator.as_mut() else {
        return;
    };

    let written = modulator.fill(scratch);
    for (dst, &src) in out[..written].iter_mut().zip(scratch.iter()) {
        *dst = S::from_f32(src * volume);
    }

    if !modulator.is_active() {
        let payload = *modulator.payload();
        let channel = modulator.channel();
        engine.modulator = None;
        log::debug!("sent {} bytes on channel {}", payload.len(), channel);
        engine.outbox.emit(Event::Sent { payload, channel });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ConfigProfile;
    use crate::state::SessionState;

    fn running_session() -> Session {
        let session = Session::default();
        session.set_config(ConfigProfile::standard()).unwrap();
        session.start().unwrap();
        session
    }

    #[test]
    fn test_argument_checks() {
        let session = running_session();
        assert_eq!(
            session.process_buffers::<f32>(None, None, 10),
            Err(AudioModemError::NullBuffer)
        );

        let input = [0.0f32; 10];
        let mut output = [0.5f32; 12];
        assert_eq!(
            session.process(&input, &mut output),
            Err(AudioModemError::InvalidLength {
                expected: 10,
                actual: 12
            })
        );
        // Output is silenced even when the call is rejected
        assert!(output.iter().all(|&s| s == 0.0));

        assert_eq!(session.process_input(&[]), Ok(()));
    }

    #[test]
    fn test_not_running_gives_silence() {
        let session = Session::default();
        session.set_config(ConfigProfile::standard()).unwrap();
        let mut output = [7i16; 64];
        assert_eq!(
            session.process_shorts_output(&mut output),
            Err(AudioModemError::NotRunning)
        );
        assert!(output.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_idle_output_is_silent() {
        let session = running_session();
        let mut output = [1.0f32; 512];
        session.process_output(&mut output).unwrap();
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_send_runs_to_completion_through_output() {
        let session = running_session();
        session.send(&[1, 2, 3]).unwrap();
        assert_eq!(session.state(), SessionState::Sending);

        let total = (session.duration_for_payload_length(3).unwrap() * 44_100.0).round() as usize;
        let mut produced = 0;
        let mut output = [0i16; 1000];
        while session.state() == SessionState::Sending {
            session.process_shorts_output(&mut output).unwrap();
            produced += output.len();
            assert!(produced <= total + output.len());
        }
        assert!(produced >= total);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn test_volume_scales_output() {
        let loud = running_session();
        let quiet = running_session();
        quiet.set_volume(0.25).unwrap();
        loud.send(b"v").unwrap();
        quiet.send(b"v").unwrap();

        let mut a = vec![0.0f32; 4096];
        let mut b = vec![0.0f32; 4096];
        loud.process_output(&mut a).unwrap();
        quiet.process_output(&mut b).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x * 0.25 - y).abs() < 1e-6);
        }
        assert!(a.iter().any(|s| s.abs() > 0.5));
    }

    #[test]
    fn test_pause_holds_the_cursor() {
        let session = running_session();
        session.send(b"p").unwrap();
        let mut before = vec![0.0f32; 300];
        session.process_output(&mut before).unwrap();

        session.pause(true).unwrap();
        let mut paused = vec![1.0f32; 300];
        session.process_output(&mut paused).unwrap();
        assert!(paused.iter().all(|&s| s == 0.0));
        assert_eq!(session.state(), SessionState::Sending);

        session.pause(false).unwrap();
        let mut after = vec![0.0f32; 300];
        session.process_output(&mut after).unwrap();

        let reference = running_session();
        reference.send(b"p").unwrap();
        let mut expected = vec![0.0f32; 600];
        reference.process_output(&mut expected).unwrap();
        assert_eq!(&expected[..300], &before[..]);
        assert_eq!(&expected[300..], &after[..]);
    }

    #[test]
    fn test_contended_lock_yields_silence() {
        let session = running_session();
        session.send(b"busy").unwrap();
        let guard = session.engine.lock();
        let mut output = [1.0f32; 128];
        assert_eq!(session.process_output(&mut output), Ok(()));
        assert!(output.iter().all(|&s| s == 0.0));
        drop(guard);
    }
}

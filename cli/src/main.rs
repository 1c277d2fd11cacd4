mod config;
mod error;
mod wav;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tonelink_core::{payload_to_hex, ConfigProfile, Notifier, Session, DEFAULT_BUFFER_SIZE};

use config::{Base64JsonProvider, ProfileDocument};
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "tonelink", version)]
#[command(about = "Acoustic data modem: short payloads in and out of audio")]
struct Cli {
    /// Config descriptor (base64 JSON); the standard profile is used without one
    #[arg(long, global = true, value_name = "DESCRIPTOR")]
    config: Option<String>,

    /// Reject descriptors issued for another project
    #[arg(long, global = true)]
    project: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modulate a payload into a WAV file
    Send {
        /// Payload text, or hex digits with --hex
        payload: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Treat the payload as hex
        #[arg(long)]
        hex: bool,

        /// Transmission channel
        #[arg(short, long, default_value_t = 0)]
        channel: u8,

        /// Output gain in 0.0..=1.0
        #[arg(long, default_value_t = 1.0)]
        volume: f32,

        /// Output sample rate (defaults to the profile's)
        #[arg(long)]
        sample_rate: Option<u32>,
    },

    /// Demodulate every payload found in a WAV file
    Receive {
        /// Input WAV file (int or float PCM, any channel count)
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Frequency correction factor in 0.5..=1.5
        #[arg(long, default_value_t = 1.0)]
        correction: f32,

        /// One JSON object per payload instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print a random payload as hex
    Random {
        /// Payload length; 0 picks a random length too
        #[arg(short, long, default_value_t = 0)]
        length: usize,
    },

    /// Describe the active profile
    Info,

    /// Send a random payload to ourselves through a simulated loop
    Loopback {
        /// Payload length; 0 picks a random length too
        #[arg(short, long, default_value_t = 0)]
        length: usize,

        #[arg(short, long, default_value_t = 0)]
        channel: u8,
    },
}

/// What the CLI needs to hear back from a session.
#[derive(Debug)]
enum Report {
    Sent,
    Received { payload: Option<Vec<u8>>, channel: u8 },
}

/// Forwards session callbacks to the command loop.
struct Forwarder(Sender<Report>);

impl Notifier for Forwarder {
    fn on_sent(&self, _payload: &[u8], _channel: u8) {
        let _ = self.0.send(Report::Sent);
    }

    fn on_receiving(&self, channel: u8) {
        log::debug!("receiving on channel {}", channel);
    }

    fn on_received(&self, payload: Option<&[u8]>, channel: u8) {
        let _ = self.0.send(Report::Received {
            payload: payload.map(<[u8]>::to_vec),
            channel,
        });
    }
}

#[derive(Serialize)]
struct ReceivedLine {
    channel: u8,
    /// Lowercase hex, or null when the frame failed its integrity check
    payload: Option<String>,
    text: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn run(cli: Cli) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let session = Session::new(Arc::new(Forwarder(tx)));
    configure(&session, cli.config.as_deref(), cli.project)?;

    match cli.command {
        Commands::Send {
            payload,
            output,
            hex,
            channel,
            volume,
            sample_rate,
        } => {
            let payload = if hex {
                parse_hex(&payload)?
            } else {
                payload.into_bytes()
            };
            send_command(&session, &rx, &payload, &output, channel, volume, sample_rate)
        }
        Commands::Receive {
            input,
            correction,
            json,
        } => receive_command(&session, &rx, &input, correction, json),
        Commands::Random { length } => {
            println!("{}", payload_to_hex(&session.random_payload(length)?));
            Ok(())
        }
        Commands::Info => info_command(&session),
        Commands::Loopback { length, channel } => loopback_command(&session, &rx, length, channel),
    }
}

fn configure(session: &Session, descriptor: Option<&str>, project: Option<String>) -> Result<()> {
    match descriptor {
        Some(descriptor) => {
            let provider = match project {
                Some(project) => Base64JsonProvider::for_project(project),
                None => Base64JsonProvider::new(),
            };
            session.set_config_from(&provider, descriptor)?;
        }
        None => session.set_config(ConfigProfile::standard())?,
    }
    log::debug!("{}", session.info());
    Ok(())
}

fn send_command(
    session: &Session,
    reports: &Receiver<Report>,
    payload: &[u8],
    output: &Path,
    channel: u8,
    volume: f32,
    sample_rate: Option<u32>,
) -> Result<()> {
    if let Some(rate) = sample_rate {
        session.set_output_sample_rate(rate)?;
    }
    session.set_transmission_channel(channel)?;
    session.set_volume(volume)?;
    session.start()?;
    session.send(payload)?;

    let rate = session.output_sample_rate()?;
    let mut writer = wav::create_mono(output, rate)?;
    let mut buffer = vec![0i16; DEFAULT_BUFFER_SIZE];
    let mut written = 0usize;
    loop {
        session.process_shorts_output(&mut buffer)?;
        for &sample in &buffer {
            writer.write_sample(sample)?;
        }
        written += buffer.len();
        if reports.try_iter().any(|report| matches!(report, Report::Sent)) {
            break;
        }
    }
    writer.finalize()?;
    session.stop()?;

    println!(
        "Sent {} bytes on channel {}: {} samples at {} Hz to {}",
        payload.len(),
        channel,
        written,
        rate,
        output.display()
    );
    Ok(())
}

fn receive_command(
    session: &Session,
    reports: &Receiver<Report>,
    input: &Path,
    correction: f32,
    json: bool,
) -> Result<()> {
    let (samples, rate) = wav::read_mono(input)?;
    session.set_input_sample_rate(rate)?;
    session.set_frequency_correction(correction)?;
    session.start()?;

    for chunk in samples.chunks(DEFAULT_BUFFER_SIZE) {
        session.process_input(chunk)?;
    }
    session.stop()?;

    let mut found = 0;
    for report in reports.try_iter() {
        let Report::Received { payload, channel } = report else {
            continue;
        };
        found += 1;
        if json {
            let line = ReceivedLine {
                channel,
                payload: payload.as_deref().map(payload_to_hex),
                text: payload.and_then(|bytes| String::from_utf8(bytes).ok()),
            };
            println!("{}", serde_json::to_string(&line)?);
        } else {
            match payload {
                Some(bytes) => println!(
                    "Decoded {} bytes on channel {}: {} {:?}",
                    bytes.len(),
                    channel,
                    payload_to_hex(&bytes),
                    String::from_utf8_lossy(&bytes)
                ),
                None => println!("Frame on channel {} failed to decode", channel),
            }
        }
    }
    log::info!("{} frame(s) in {} samples", found, samples.len());
    Ok(())
}

fn info_command(session: &Session) -> Result<()> {
    let Some(profile) = session.profile() else {
        return Err(tonelink_core::AudioModemError::NotInitialised.into());
    };
    println!("{}", session.info());
    println!("channels:     {}", profile.channel_count());
    println!(
        "sample rate:  {} Hz in / {} Hz out",
        profile.sample_rate_in(),
        profile.sample_rate_out()
    );
    let modulation = profile.modulation();
    println!(
        "tones:        {} Hz + {} Hz steps, {} Hz per channel, {} ms symbols",
        modulation.base_frequency,
        modulation.tone_spacing,
        modulation.channel_spacing,
        modulation.symbol_duration * 1000.0
    );
    println!("redundancy:   {}", modulation.redundancy.name());

    let max = session.max_payload_length()?;
    let mut lengths = vec![1, 8, 16, max];
    lengths.retain(|&len| len <= max);
    lengths.dedup();
    for len in lengths {
        println!(
            "  {:>3} bytes -> {:.2}s",
            len,
            session.duration_for_payload_length(len)?
        );
    }
    println!(
        "descriptor:   {}",
        ProfileDocument::from_profile(&profile).encode()?
    );
    Ok(())
}

fn loopback_command(
    session: &Session,
    reports: &Receiver<Report>,
    length: usize,
    channel: u8,
) -> Result<()> {
    let payload = session.random_payload(length)?;
    session.set_transmission_channel(channel)?;
    session.set_listen_to_self(true);
    session.start()?;
    session.send(&payload)?;

    let seconds = session.duration_for_payload_length(payload.len())?;
    let rate = session.output_sample_rate()?;
    // Whole send plus a second of slack
    let budget = ((seconds + 1.0) * rate as f32) as usize;

    let mut input = vec![0.0f32; DEFAULT_BUFFER_SIZE];
    let mut output = vec![0.0f32; DEFAULT_BUFFER_SIZE];
    let mut processed = 0;
    let mut received = None;
    while processed < budget && received.is_none() {
        session.process(&input, &mut output)?;
        std::mem::swap(&mut input, &mut output);
        processed += DEFAULT_BUFFER_SIZE;

        received = reports.try_iter().find_map(|report| match report {
            Report::Received {
                payload: Some(bytes),
                channel: ch,
            } if ch == channel => Some(bytes),
            _ => None,
        });
    }
    session.stop()?;

    match received {
        Some(bytes) if bytes == payload => {
            println!(
                "Loopback ok: {} bytes on channel {} in {:.2}s ({})",
                payload.len(),
                channel,
                seconds,
                payload_to_hex(&payload)
            );
            Ok(())
        }
        _ => Err(CliError::LoopbackFailed),
    }
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&digits).map_err(|err| CliError::InvalidHex(format!("{:?}: {}", text, err)))
}

use thiserror::Error;
use tonelink_core::AudioModemError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Modem(#[from] AudioModemError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported WAV format: {0}")]
    UnsupportedWav(String),

    #[error("Invalid hex payload: {0}")]
    InvalidHex(String),

    #[error("Loopback did not return the payload")]
    LoopbackFailed,
}

pub type Result<T> = std::result::Result<T, CliError>;

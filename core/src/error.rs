use thiserror::Error;

/// Every failure the modem can report.
///
/// Each variant maps to a stable numeric code (see [`AudioModemError::code`]) so
/// that a bindings layer can hand plain integers across an FFI boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioModemError {
    // Lifecycle
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Not initialised, a config must be set first")]
    NotInitialised,

    #[error("Internal error")]
    InternalError,

    #[error("Not running")]
    NotRunning,

    #[error("Already running")]
    AlreadyRunning,

    #[error("Already stopped")]
    AlreadyStopped,

    #[error("Already sending")]
    AlreadySending,

    // Arguments
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("Missing sample buffer")]
    NullBuffer,

    #[error("Missing pointer argument")]
    NullPointer,

    #[error("Channel {channel} not supported by a {count}-channel config")]
    ChannelNotSupported { channel: u8, count: u8 },

    #[error("Invalid channel: {0}")]
    InvalidChannel(u8),

    #[error("Invalid frequency correction: {0} (expected 0.5..=1.5)")]
    InvalidFrequencyCorrection(FloatArg),

    #[error("Processing error")]
    ProcessingError,

    #[error("Invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid volume: {0} (expected 0.0..=1.0)")]
    InvalidVolume(FloatArg),

    // Config descriptor / credentials
    #[error("Invalid application key")]
    InvalidKey,

    #[error("Invalid application secret")]
    InvalidSecret,

    #[error("Invalid application credentials")]
    InvalidCredentials,

    #[error("Config signature is missing")]
    MissingSignature,

    #[error("Config signature could not be verified")]
    InvalidSignature,

    #[error("Config is missing")]
    MissingConfig,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Config has expired")]
    ExpiredConfig,

    #[error("Config was generated for a different version")]
    InvalidVersion,

    #[error("Config was generated for a different project")]
    InvalidProject,

    #[error("Config contains unknown characters")]
    InvalidConfigCharacter,

    // Payload
    #[error("Payload is empty")]
    PayloadEmptyMessage,

    #[error("Payload is invalid")]
    PayloadInvalidMessage,

    #[error("Payload contains unknown symbols")]
    PayloadUnknownSymbols,

    #[error("Payload could not be decoded")]
    PayloadDecodeFailed,

    #[error("Payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Payload too short")]
    PayloadTooShort,

    #[error("Unknown error")]
    UnknownError,

    // Host level
    #[error("Audio I/O error")]
    AudioIoError,
}

/// An `f32` carried inside an error while keeping the enum `Eq`.
///
/// The raw bits are compared, which is what a reported argument needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatArg(u32);

impl From<f32> for FloatArg {
    fn from(value: f32) -> Self {
        Self(value.to_bits())
    }
}

impl FloatArg {
    pub fn value(self) -> f32 {
        f32::from_bits(self.0)
    }
}

impl std::fmt::Display for FloatArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl AudioModemError {
    /// Stable numeric code of this error.
    pub fn code(&self) -> u32 {
        use AudioModemError::*;
        match self {
            OutOfMemory => 1,
            NotInitialised => 2,
            InternalError => 3,
            NotRunning => 6,
            AlreadyRunning => 7,
            AlreadyStopped => 8,
            AlreadySending => 9,

            InvalidSampleRate(_) => 20,
            NullBuffer => 21,
            NullPointer => 22,
            ChannelNotSupported { .. } => 23,
            InvalidFrequencyCorrection(_) => 24,
            ProcessingError => 25,
            InvalidLength { .. } => 26,
            InvalidChannel(_) => 27,

            InvalidKey => 40,
            InvalidSecret => 41,
            InvalidCredentials => 42,
            MissingSignature => 43,
            InvalidSignature => 44,
            MissingConfig => 45,
            InvalidConfig(_) => 46,
            ExpiredConfig => 47,
            InvalidVersion => 48,
            InvalidProject => 49,
            InvalidConfigCharacter => 50,

            PayloadEmptyMessage => 80,
            PayloadInvalidMessage => 81,
            PayloadUnknownSymbols => 82,
            PayloadDecodeFailed => 83,
            PayloadTooLong { .. } => 84,
            PayloadTooShort => 85,

            InvalidVolume(_) => 99,
            UnknownError => 100,

            AudioIoError => 204,
        }
    }

    /// Rebuild an error from its numeric code.
    ///
    /// Variants carrying arguments come back with neutral placeholder values.
    /// Returns `None` for `0` (success) and for codes that are not assigned.
    pub fn from_code(code: u32) -> Option<Self> {
        use AudioModemError::*;
        let err = match code {
            1 => OutOfMemory,
            2 => NotInitialised,
            3 => InternalError,
            6 => NotRunning,
            7 => AlreadyRunning,
            8 => AlreadyStopped,
            9 => AlreadySending,

            20 => InvalidSampleRate(0),
            21 => NullBuffer,
            22 => NullPointer,
            23 => ChannelNotSupported { channel: 0, count: 0 },
            24 => InvalidFrequencyCorrection(f32::NAN.into()),
            25 => ProcessingError,
            26 => InvalidLength { expected: 0, actual: 0 },
            27 => InvalidChannel(0),

            40 => InvalidKey,
            41 => InvalidSecret,
            42 => InvalidCredentials,
            43 => MissingSignature,
            44 => InvalidSignature,
            45 => MissingConfig,
            46 => InvalidConfig(String::new()),
            47 => ExpiredConfig,
            48 => InvalidVersion,
            49 => InvalidProject,
            50 => InvalidConfigCharacter,

            80 => PayloadEmptyMessage,
            81 => PayloadInvalidMessage,
            82 => PayloadUnknownSymbols,
            83 => PayloadDecodeFailed,
            84 => PayloadTooLong { len: 0, max: 0 },
            85 => PayloadTooShort,

            99 => InvalidVolume(f32::NAN.into()),
            100 => UnknownError,

            204 => AudioIoError,
            _ => return None,
        };
        Some(err)
    }

    /// Wrong-state calls: the operation is valid but not now.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            AudioModemError::NotInitialised
                | AudioModemError::NotRunning
                | AudioModemError::AlreadyRunning
                | AudioModemError::AlreadyStopped
                | AudioModemError::AlreadySending
        )
    }

    pub fn is_payload(&self) -> bool {
        (80..=85).contains(&self.code())
    }

    /// Errors produced while loading a config descriptor. They are terminal for
    /// that descriptor, the session keeps its previous state.
    pub fn is_config(&self) -> bool {
        (40..=50).contains(&self.code())
    }
}

pub type Result<T> = std::result::Result<T, AudioModemError>;

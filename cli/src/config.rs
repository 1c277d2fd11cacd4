//! Config descriptors: base64 (standard alphabet) over a JSON profile document.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, DecodeError, Engine as _};
use serde::{Deserialize, Serialize};
use tonelink_core::{
    AudioModemError, ConfigProfile, ConfigProvider, ModulationParams, Result,
    SymbolRedundancyMode,
};

/// Descriptor format this build understands.
pub const DESCRIPTOR_VERSION: u32 = 1;

/// JSON body of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileDocument {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Unix seconds after which the descriptor is rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    pub name: String,
    pub max_payload_bytes: usize,
    #[serde(default = "default_channel_count")]
    pub channel_count: u8,
    pub sample_rate_in: u32,
    pub sample_rate_out: u32,
    #[serde(default)]
    pub modulation: ModulationDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModulationDocument {
    pub symbol_duration: f32,
    pub base_frequency: f32,
    pub tone_spacing: f32,
    pub channel_spacing: f32,
    pub amplitude: f32,
    pub redundancy: String,
}

fn default_channel_count() -> u8 {
    1
}

impl Default for ModulationDocument {
    fn default() -> Self {
        ModulationParams::default().into()
    }
}

impl From<ModulationParams> for ModulationDocument {
    fn from(params: ModulationParams) -> Self {
        Self {
            symbol_duration: params.symbol_duration,
            base_frequency: params.base_frequency,
            tone_spacing: params.tone_spacing,
            channel_spacing: params.channel_spacing,
            amplitude: params.amplitude,
            redundancy: params.redundancy.name().to_string(),
        }
    }
}

impl ProfileDocument {
    pub fn from_profile(profile: &ConfigProfile) -> Self {
        Self {
            version: profile.version(),
            project: None,
            expires_at: None,
            name: profile.name().to_string(),
            max_payload_bytes: profile.max_payload_bytes(),
            channel_count: profile.channel_count(),
            sample_rate_in: profile.sample_rate_in(),
            sample_rate_out: profile.sample_rate_out(),
            modulation: (*profile.modulation()).into(),
        }
    }

    /// Serialize into a descriptor string.
    pub fn encode(&self) -> serde_json::Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    fn into_profile(self) -> Result<ConfigProfile> {
        let modulation = self.modulation;
        let redundancy: SymbolRedundancyMode = modulation.redundancy.parse()?;
        ConfigProfile::builder(self.name)
            .version(self.version)
            .max_payload_bytes(self.max_payload_bytes)
            .channel_count(self.channel_count)
            .sample_rates(self.sample_rate_in, self.sample_rate_out)
            .modulation(ModulationParams {
                symbol_duration: modulation.symbol_duration,
                base_frequency: modulation.base_frequency,
                tone_spacing: modulation.tone_spacing,
                channel_spacing: modulation.channel_spacing,
                amplitude: modulation.amplitude,
                redundancy,
            })
            .build()
    }
}

/// Loads profiles from base64 JSON descriptors.
///
/// Checks run in order: presence, encoding, JSON shape, version, project,
/// expiry, and finally the profile's own validation.
#[derive(Debug, Clone, Default)]
pub struct Base64JsonProvider {
    project: Option<String>,
    now: Option<u64>,
}

impl Base64JsonProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept descriptors that name `project` (or name none).
    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            now: None,
        }
    }

    /// Judge expiry against a fixed clock instead of the system time.
    pub fn at(mut self, unix_seconds: u64) -> Self {
        self.now = Some(unix_seconds);
        self
    }

    fn now(&self) -> u64 {
        self.now.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0)
        })
    }
}

impl ConfigProvider for Base64JsonProvider {
    fn load(&self, descriptor: &str) -> Result<ConfigProfile> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(AudioModemError::MissingConfig);
        }

        let json = STANDARD.decode(descriptor).map_err(|err| match err {
            DecodeError::InvalidByte(..) | DecodeError::InvalidLastSymbol(..) => {
                AudioModemError::InvalidConfigCharacter
            }
            other => AudioModemError::InvalidConfig(other.to_string()),
        })?;
        let document: ProfileDocument = serde_json::from_slice(&json)
            .map_err(|err| AudioModemError::InvalidConfig(err.to_string()))?;

        if document.version != DESCRIPTOR_VERSION {
            return Err(AudioModemError::InvalidVersion);
        }
        if let (Some(expected), Some(actual)) = (&self.project, &document.project) {
            if expected != actual {
                return Err(AudioModemError::InvalidProject);
            }
        }
        if document.expires_at.is_some_and(|at| at <= self.now()) {
            return Err(AudioModemError::ExpiredConfig);
        }

        log::debug!("descriptor accepted for profile {:?}", document.name);
        document.into_profile()
    }
}

//! Configuration for conference-core
//!
//! Values are read with the `config` crate from an optional file and
//! `RVOIP_CONFERENCE__<SECTION>__<KEY>` environment overrides, e.g.
//! `RVOIP_CONFERENCE__SOUND__CONFERENCE_RATE=48000`.

use serde::Deserialize;
use std::path::Path;

use crate::errors::Result;
use crate::logging::LoggingConfig;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RVOIP_CONFERENCE";

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConferenceConfig {
    pub sound: SoundConfig,
    pub misc: MiscConfig,
    pub video: VideoPolicy,
    pub logging: LoggingSection,
}

/// Audio settings used by local mixing and microphone control
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Sample rate of the local mixing session, in Hz
    pub conference_rate: u32,
    /// Microphone gain restored when the microphone is unmuted, in dB
    pub soft_mic_level_db: f32,
    /// Enable echo cancellation on the local loop-back endpoint
    pub echo_cancellation: bool,
    /// Stop sending RTP while the microphone is muted
    pub rtp_no_xmit_on_audio_mute: bool,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            conference_rate: 16000,
            soft_mic_level_db: 0.0,
            echo_cancellation: true,
            rtp_no_xmit_on_audio_mute: false,
        }
    }
}

/// Miscellaneous settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MiscConfig {
    /// Address of the conference focus used by remote conferences
    pub conference_focus_addr: String,
}

/// Video policy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VideoPolicy {
    /// Start video automatically on outgoing calls
    pub automatically_initiate: bool,
}

/// Logging settings, turned into a [`LoggingConfig`] for `setup_logging`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Level name such as `info` or `debug`
    pub level: String,
    pub file_info: bool,
    pub log_spans: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_info: false,
            log_spans: false,
        }
    }
}

impl LoggingSection {
    pub fn to_logging_config(&self) -> Result<LoggingConfig> {
        let mut config = LoggingConfig::from_level_str(&self.level)?;
        config.file_info = self.file_info;
        config.log_spans = self.log_spans;
        Ok(config)
    }
}

impl ConferenceConfig {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let config: ConferenceConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment overrides only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Reject values the mixer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.sound.conference_rate == 0 {
            return Err(crate::errors::ConferenceError::config(
                "sound.conference_rate must be non-zero",
            ));
        }
        self.logging.to_logging_config()?;
        Ok(())
    }

    pub fn logging_config(&self) -> Result<LoggingConfig> {
        self.logging.to_logging_config()
    }

    pub fn with_conference_rate(mut self, rate: u32) -> Self {
        self.sound.conference_rate = rate;
        self
    }

    pub fn with_focus_address(mut self, addr: impl Into<String>) -> Self {
        self.misc.conference_focus_addr = addr.into();
        self
    }

    pub fn with_video_auto_initiate(mut self, enabled: bool) -> Self {
        self.video.automatically_initiate = enabled;
        self
    }
}

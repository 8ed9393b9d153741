//! Conference creation parameters

use crate::config::ConferenceConfig;

/// Immutable snapshot of the settings a conference is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConferenceParams {
    video_enabled: bool,
}

impl ConferenceParams {
    /// Derive parameters from the configured video policy
    pub fn from_config(config: &ConferenceConfig) -> Self {
        Self {
            video_enabled: config.video.automatically_initiate,
        }
    }

    /// Enable or disable video, before the params are attached to a conference
    pub fn enable_video(&mut self, enable: bool) {
        self.video_enabled = enable;
    }

    pub fn video_requested(&self) -> bool {
        self.video_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_defaults_off() {
        assert!(!ConferenceParams::default().video_requested());
    }

    #[test]
    fn test_video_policy_seeds_params() {
        let config = ConferenceConfig::default().with_video_auto_initiate(true);
        assert!(ConferenceParams::from_config(&config).video_requested());

        let config = ConferenceConfig::default();
        assert!(!ConferenceParams::from_config(&config).video_requested());
    }

    #[test]
    fn test_clone_keeps_video() {
        let mut params = ConferenceParams::default();
        params.enable_video(true);
        let copy = params.clone();
        assert!(copy.video_requested());
    }
}

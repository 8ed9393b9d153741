//! Core identifiers and call-side types shared by the conference variants

use std::fmt;
use uuid::Uuid;

/// Lowest input volume reported when no local stream is available or the
/// microphone is muted, in dB.
pub const VOLUME_DB_LOWEST: f32 = -120.0;

/// Identifier of a call owned by the call manager
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct CallId(pub Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Identifier of a conference
///
/// Calls store this as their back-reference to the conference they belong to.
/// Resolving it against a host that no longer runs that conference yields
/// nothing, so a stale back-reference never dangles.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct ConferenceId(pub Uuid);

impl ConferenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conf-{}", self.0)
    }
}

/// Mixer endpoint handle, allocated by a mixer session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep-{}", self.0)
    }
}

/// Audio stream handle, allocated by the media engine or owned by a call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Handle of a call/transfer notification subscription held by a conference
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SubscriptionId(pub u64);

/// Call state as reported by the call manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Idle,
    IncomingReceived,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    Connected,
    StreamsRunning,
    Pausing,
    Paused,
    Resuming,
    PausedByRemote,
    Updating,
    UpdatedByRemote,
    Error,
    End,
    Released,
}

impl CallState {
    /// Active or paused: the call can be resumed, transferred or re-negotiated
    pub fn is_resumable(&self) -> bool {
        matches!(self, CallState::StreamsRunning | CallState::Paused)
    }

    /// Error or end of call
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Error | CallState::End | CallState::Released)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The subset of call parameters a conference reads and mutates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallParams {
    /// The call is (or is requested to be) mixed into a conference
    pub in_conference: bool,
    /// Video is enabled on the call
    pub has_video: bool,
}

impl CallParams {
    pub fn with_conference(mut self, in_conference: bool) -> Self {
        self.in_conference = in_conference;
        self
    }

    pub fn with_video(mut self, has_video: bool) -> Self {
        self.has_video = has_video;
        self
    }
}

/// Which conference strategy a conference object implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConferenceClass {
    /// Audio mixed on this device
    Local,
    /// Audio mixed by a remote focus
    Remote,
}

/// Handshake state of a remote conference with its focus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusState {
    NotConnectedToFocus,
    ConnectingToFocus,
    ConnectedToFocus,
}

impl fmt::Display for FocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FocusState::NotConnectedToFocus => "NotConnectedToFocus",
            FocusState::ConnectingToFocus => "ConnectingToFocus",
            FocusState::ConnectedToFocus => "ConnectedToFocus",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_state_classes() {
        assert!(CallState::StreamsRunning.is_resumable());
        assert!(CallState::Paused.is_resumable());
        assert!(!CallState::PausedByRemote.is_resumable());
        assert!(!CallState::OutgoingProgress.is_resumable());

        assert!(CallState::End.is_terminal());
        assert!(CallState::Error.is_terminal());
        assert!(!CallState::Connected.is_terminal());
    }

    #[test]
    fn test_focus_state_names() {
        assert_eq!(FocusState::NotConnectedToFocus.to_string(), "NotConnectedToFocus");
        assert_eq!(FocusState::ConnectingToFocus.to_string(), "ConnectingToFocus");
        assert_eq!(FocusState::ConnectedToFocus.to_string(), "ConnectedToFocus");
    }

    #[test]
    fn test_call_params_builders() {
        let params = CallParams::default().with_conference(true).with_video(true);
        assert!(params.in_conference);
        assert!(params.has_video);
        assert!(!params.with_video(false).has_video);
    }
}

//! Interfaces of the components a conference drives
//!
//! A conference never owns calls, SIP transactions or audio devices. It
//! reaches them through three collaborators:
//!
//! - [`CallManager`]: call state, parameters, pause/resume/terminate, invites,
//!   and the per-call conference back-reference slot
//! - [`SignalingLayer`]: SIP transfer and REFER, plus per-conference
//!   subscriptions to call- and transfer-state notifications
//! - [`MediaEngine`] / [`MixerSession`]: audio mixing sessions, loop-back
//!   streams and recorders
//!
//! All operations are non-blocking. Asynchronous outcomes come back later as
//! notifications delivered to the conference by its host.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use crate::address::SipAddress;
use crate::errors::Result;
use crate::types::{
    CallId, CallParams, CallState, ConferenceId, EndpointId, StreamId, SubscriptionId,
};

/// Call-level operations provided by the call manager
pub trait CallManager: Send {
    /// All calls currently known, in creation order
    fn calls(&self) -> Vec<CallId>;

    fn state(&self, call: CallId) -> Option<CallState>;

    fn remote_address(&self, call: CallId) -> Option<SipAddress>;

    /// Contact URI announced by the remote party, once the call is connected
    fn remote_contact(&self, call: CallId) -> Option<String>;

    /// Requested parameters
    fn params(&self, call: CallId) -> Option<CallParams>;

    /// Parameters negotiated with the remote party
    fn current_params(&self, call: CallId) -> Option<CallParams>;

    /// Replace the requested parameters without renegotiating
    fn set_params(&mut self, call: CallId, params: CallParams) -> Result<()>;

    /// Replace the requested parameters and start a renegotiation (re-INVITE)
    fn update_call(&mut self, call: CallId, params: CallParams) -> Result<()>;

    fn pause(&mut self, call: CallId) -> Result<()>;

    fn resume(&mut self, call: CallId) -> Result<()>;

    fn terminate(&mut self, call: CallId) -> Result<()>;

    /// Place an outgoing call
    fn invite(&mut self, to: &SipAddress, params: CallParams) -> Result<CallId>;

    fn has_media_streams(&self, call: CallId) -> bool;

    /// Free the call's audio/video resources and prepare fresh ones
    fn restart_media_streams(&mut self, call: CallId) -> Result<()>;

    fn audio_stream(&self, call: CallId) -> Option<StreamId>;

    fn enable_camera(&mut self, call: CallId, enabled: bool);

    /// The call currently holding the local sound devices
    fn current_call(&self) -> Option<CallId>;

    fn clear_current_call(&mut self);

    /// Sound devices are locked by a call that cannot be paused
    fn sound_resources_locked(&self) -> bool;

    /// Conference back-reference of the call
    fn conference(&self, call: CallId) -> Option<ConferenceId>;

    fn set_conference(&mut self, call: CallId, conference: Option<ConferenceId>);

    /// Flag the call's log entry as a conference call
    fn mark_conference_log(&mut self, call: CallId);
}

/// SIP signaling operations
pub trait SignalingLayer: Send {
    /// Transfer `call` to `contact` (blind REFER)
    fn transfer(&mut self, call: CallId, contact: &str) -> Result<()>;

    /// Send a REFER inside `call`'s dialog with a raw Refer-To value
    fn refer(&mut self, call: CallId, refer_to: &str) -> Result<()>;

    /// Start delivering call- and transfer-state notifications to `owner`
    fn subscribe(&mut self, owner: ConferenceId) -> SubscriptionId;

    fn unsubscribe(&mut self, subscription: SubscriptionId);
}

/// Microphone gain applied to an audio stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MicGain {
    /// Linear gain of zero
    Silent,
    Db(f32),
}

/// Audio engine: mixing sessions and stream-level controls
pub trait MediaEngine: Send {
    fn create_mixer(&mut self, sample_rate: u32) -> Result<Box<dyn MixerSession>>;

    /// Start a throwaway audio stream bound to loop-back addresses, driving the
    /// local sound devices
    fn start_loopback_stream(
        &mut self,
        profile: &TransportProfile,
        route: &LoopbackRoute,
        echo_cancellation: bool,
    ) -> Result<StreamId>;

    fn stop_stream(&mut self, stream: StreamId);

    fn set_mic_gain(&mut self, stream: StreamId, gain: MicGain);

    fn mute_rtp(&mut self, stream: StreamId, muted: bool);

    /// Measured send volume in dB, if the stream has a volume meter
    fn send_volume(&self, stream: StreamId) -> Option<f32>;
}

/// A live audio mixing session
pub trait MixerSession: Send {
    fn sample_rate(&self) -> u32;

    /// Number of member endpoints
    fn size(&self) -> usize;

    fn add_member(&mut self, endpoint: EndpointId);

    fn remove_member(&mut self, endpoint: EndpointId);

    fn mute_member(&mut self, endpoint: EndpointId, muted: bool);

    /// Wrap an audio stream into an endpoint. `remote` selects the network
    /// side of the stream, otherwise the sound-device side is used.
    fn endpoint_from_stream(&mut self, stream: StreamId, remote: bool) -> Result<EndpointId>;

    fn release_endpoint(&mut self, endpoint: EndpointId);

    fn new_recorder(&mut self) -> Result<EndpointId>;

    fn start_recorder(&mut self, endpoint: EndpointId, path: &Path) -> Result<()>;

    fn stop_recorder(&mut self, endpoint: EndpointId) -> Result<()>;

    fn destroy_endpoint(&mut self, endpoint: EndpointId);

    fn destroy(self: Box<Self>);
}

/// An RTP payload type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadType {
    pub number: u8,
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u8,
}

/// An RTP profile used to start a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportProfile {
    pub name: String,
    pub payloads: Vec<PayloadType>,
}

impl TransportProfile {
    /// Single-codec profile: linear 16-bit mono at payload number 0
    pub fn single_codec(sample_rate: u32) -> Self {
        Self {
            name: "dummy".to_string(),
            payloads: vec![PayloadType {
                number: 0,
                mime_type: "L16".to_string(),
                clock_rate: sample_rate,
                channels: 1,
            }],
        }
    }
}

/// Loop-back addressing of the local endpoint stream. The addresses are
/// never used for real traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackRoute {
    pub rtp: SocketAddr,
    pub rtcp: SocketAddr,
    /// Jitter buffer compensation in milliseconds
    pub jitter_comp_ms: u32,
}

impl Default for LoopbackRoute {
    fn default() -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            rtp: SocketAddr::new(localhost, 65000),
            rtcp: SocketAddr::new(localhost, 65001),
            jitter_comp_ms: 40,
        }
    }
}

/// Mutable access to the collaborators for the duration of one operation
pub struct CoreServices<'a> {
    pub calls: &'a mut dyn CallManager,
    pub signaling: &'a mut dyn SignalingLayer,
    pub media: &'a mut dyn MediaEngine,
}

impl<'a> CoreServices<'a> {
    pub fn new(
        calls: &'a mut dyn CallManager,
        signaling: &'a mut dyn SignalingLayer,
        media: &'a mut dyn MediaEngine,
    ) -> Self {
        Self {
            calls,
            signaling,
            media,
        }
    }
}

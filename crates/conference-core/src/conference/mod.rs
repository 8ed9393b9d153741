//! Conference capability set
//!
//! [`Conference`] is a closed set of strategies sharing one interface:
//!
//! - [`LocalConference`]: calls are mixed on this device
//! - [`RemoteConference`]: calls are relayed to a remote focus
//!
//! Every operation takes the collaborators it needs for its own duration
//! ([`CoreServices`]). Nothing is retained between calls, so a notification
//! handler can trigger further call operations without re-entering the
//! conference.

mod base;
mod local;
mod params;
mod participant;
mod remote;

pub use local::LocalConference;
pub use params::ConferenceParams;
pub use participant::Participant;
pub use remote::RemoteConference;

use std::path::Path;

use tracing::debug;

use crate::address::SipAddress;
use crate::collaborators::{CallManager, CoreServices, MediaEngine, SignalingLayer};
use crate::config::ConferenceConfig;
use crate::errors::Result;
use crate::types::{
    CallId, CallState, ConferenceClass, ConferenceId, FocusState, StreamId, SubscriptionId,
};

use self::base::ConferenceBase;

/// Outcome of a notification handled by a conference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The conference is still live
    Continue,
    /// The conference released its resources; the owner must drop it
    Finished,
}

#[derive(Debug)]
pub enum Conference {
    Local(LocalConference),
    Remote(RemoteConference),
}

impl Conference {
    pub fn new_local(
        media: &mut dyn MediaEngine,
        params: ConferenceParams,
        config: &ConferenceConfig,
    ) -> Result<Self> {
        LocalConference::new(media, params, config).map(Conference::Local)
    }

    pub fn new_remote(
        signaling: &mut dyn SignalingLayer,
        params: ConferenceParams,
        config: &ConferenceConfig,
    ) -> Self {
        Conference::Remote(RemoteConference::new(signaling, params, config))
    }

    fn base(&self) -> &ConferenceBase {
        match self {
            Conference::Local(c) => &c.base,
            Conference::Remote(c) => &c.base,
        }
    }

    fn base_mut(&mut self) -> &mut ConferenceBase {
        match self {
            Conference::Local(c) => &mut c.base,
            Conference::Remote(c) => &mut c.base,
        }
    }

    pub fn id(&self) -> ConferenceId {
        self.base().id()
    }

    pub fn class(&self) -> ConferenceClass {
        match self {
            Conference::Local(_) => ConferenceClass::Local,
            Conference::Remote(_) => ConferenceClass::Remote,
        }
    }

    pub fn is_class(&self, class: ConferenceClass) -> bool {
        self.class() == class
    }

    pub fn params(&self) -> &ConferenceParams {
        self.base().params()
    }

    pub fn as_local(&self) -> Option<&LocalConference> {
        match self {
            Conference::Local(c) => Some(c),
            Conference::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteConference> {
        match self {
            Conference::Remote(c) => Some(c),
            Conference::Local(_) => None,
        }
    }

    /// Handshake state with the focus; `None` for a local conference
    pub fn focus_state(&self) -> Option<FocusState> {
        self.as_remote().map(RemoteConference::state)
    }

    /// A local conference whose mixer has been destroyed. A remote conference
    /// lives until it is disposed.
    pub fn is_finished(&self) -> bool {
        self.as_local().is_some_and(LocalConference::is_finished)
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.as_remote().and_then(RemoteConference::subscription)
    }

    /// Admit `call`. Fails with `InvalidState` if the call already belongs
    /// to a conference.
    pub fn add_participant(&mut self, svc: &mut CoreServices<'_>, call: CallId) -> Result<()> {
        match self {
            Conference::Local(c) => c.add_participant(svc, call),
            Conference::Remote(c) => c.add_participant(svc, call),
        }
    }

    pub fn remove_participant(&mut self, svc: &mut CoreServices<'_>, call: CallId) -> Result<()> {
        match self {
            Conference::Local(c) => c.remove_participant(svc, call),
            Conference::Remote(c) => c.remove_participant(svc, call),
        }
    }

    pub fn remove_participant_by_address(
        &mut self,
        svc: &mut CoreServices<'_>,
        address: &SipAddress,
    ) -> Result<()> {
        match self {
            Conference::Local(c) => c.remove_participant_by_address(svc, address),
            Conference::Remote(c) => c.remove_participant_by_address(svc, address),
        }
    }

    pub fn terminate(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        match self {
            Conference::Local(c) => c.terminate(svc),
            Conference::Remote(c) => c.terminate(svc),
        }
    }

    /// Bring the local party into the conference
    pub fn enter(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        match self {
            Conference::Local(c) => c.enter(svc),
            Conference::Remote(c) => c.enter(svc),
        }
    }

    pub fn leave(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        match self {
            Conference::Local(c) => c.leave(svc),
            Conference::Remote(c) => c.leave(svc),
        }
    }

    /// Whether the local party is present
    pub fn is_in(&self, calls: &dyn CallManager) -> bool {
        match self {
            Conference::Local(c) => c.is_in(),
            Conference::Remote(c) => c.is_in(calls),
        }
    }

    /// Remote participants plus the local party when present
    pub fn size(&self, calls: &dyn CallManager) -> usize {
        match self {
            Conference::Local(c) => c.size(),
            Conference::Remote(c) => c.size(calls),
        }
    }

    pub fn participants(&self) -> Vec<SipAddress> {
        self.base().participants()
    }

    pub fn start_recording(&mut self, path: &Path) -> Result<()> {
        match self {
            Conference::Local(c) => c.start_recording(path),
            Conference::Remote(_) => Ok(()),
        }
    }

    pub fn stop_recording(&mut self) -> Result<()> {
        match self {
            Conference::Local(c) => c.stop_recording(),
            Conference::Remote(_) => Ok(()),
        }
    }

    pub fn mute_microphone(&mut self, media: &mut dyn MediaEngine, muted: bool) {
        self.base_mut().mute_microphone(media, muted);
    }

    pub fn microphone_is_muted(&self) -> bool {
        self.base().microphone_is_muted()
    }

    /// Measured send level of the local party, or
    /// [`VOLUME_DB_LOWEST`](crate::types::VOLUME_DB_LOWEST)
    pub fn input_volume(&self, media: &dyn MediaEngine) -> f32 {
        self.base().input_volume(media)
    }

    /// Local audio stream: the loop-back stream of a local conference, the
    /// focus call's stream of a remote one
    pub fn audio_stream(&self) -> Option<StreamId> {
        self.base().local_stream
    }

    pub fn on_call_stream_starting(
        &mut self,
        svc: &mut CoreServices<'_>,
        call: CallId,
        paused_by_remote: bool,
    ) {
        match self {
            Conference::Local(c) => c.on_call_stream_starting(svc, call, paused_by_remote),
            Conference::Remote(_) => debug!("Stream of {} starting", call),
        }
    }

    pub fn on_call_stream_stopping(&mut self, call: CallId) {
        match self {
            Conference::Local(c) => c.on_call_stream_stopping(call),
            Conference::Remote(_) => debug!("Stream of {} stopping", call),
        }
    }

    /// A call is about to be released; the conference forgets it. The
    /// owner drops the conference when [`Disposition::Finished`] comes back.
    pub fn on_call_terminating(&mut self, svc: &mut CoreServices<'_>, call: CallId) -> Disposition {
        match self {
            Conference::Local(c) => c.on_call_terminating(svc, call),
            Conference::Remote(c) => c.on_call_terminating(svc, call),
        }
    }

    pub fn on_call_state_changed(&mut self, svc: &mut CoreServices<'_>, call: CallId, state: CallState) {
        if let Conference::Remote(c) = self {
            c.on_call_state_changed(svc, call, state);
        }
    }

    pub fn on_transfer_state_changed(&mut self, call: CallId, state: CallState) {
        if let Conference::Remote(c) = self {
            c.on_transfer_state_changed(call, state);
        }
    }

    /// Release every resource the conference holds
    pub fn dispose(self, svc: &mut CoreServices<'_>) {
        match self {
            Conference::Local(c) => c.dispose(svc),
            Conference::Remote(c) => c.dispose(svc),
        }
    }
}

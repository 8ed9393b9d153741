//! Conference hosted by a remote focus
//!
//! The local party places one call to the focus. Every admitted call is
//! relayed to the focus with a SIP transfer once the focus call is connected;
//! until then it waits in `pending`. Calls whose transfer has been issued sit
//! in `transferring` until the transfer reports completion or failure.
//!
//! ```text
//!  NotConnectedToFocus --add--> ConnectingToFocus --focus connected--> ConnectedToFocus
//!          ^                            |                                    |
//!          +------ focus call ended or failed -------------------------------+
//! ```

use tracing::{debug, error, info, warn};

use crate::address::SipAddress;
use crate::collaborators::{CallManager, CoreServices, SignalingLayer};
use crate::config::ConferenceConfig;
use crate::errors::{ConferenceError, Result};
use crate::types::{CallId, CallParams, CallState, ConferenceId, FocusState, SubscriptionId};

use super::base::ConferenceBase;
use super::params::ConferenceParams;
use super::Disposition;

#[derive(Debug)]
pub struct RemoteConference {
    pub(crate) base: ConferenceBase,
    focus_address: String,
    focus_call: Option<CallId>,
    focus_contact: Option<String>,
    state: FocusState,
    pending: Vec<CallId>,
    transferring: Vec<CallId>,
    subscription: Option<SubscriptionId>,
}

impl RemoteConference {
    /// Create a conference relayed to the configured focus and subscribe to
    /// call and transfer notifications
    pub fn new(
        signaling: &mut dyn SignalingLayer,
        params: ConferenceParams,
        config: &ConferenceConfig,
    ) -> Self {
        let base = ConferenceBase::new(params, config.sound.clone());
        let subscription = signaling.subscribe(base.id());
        info!(
            "Created remote conference {} with focus '{}'",
            base.id(),
            config.misc.conference_focus_addr
        );

        Self {
            base,
            focus_address: config.misc.conference_focus_addr.clone(),
            focus_call: None,
            focus_contact: None,
            state: FocusState::NotConnectedToFocus,
            pending: Vec::new(),
            transferring: Vec::new(),
            subscription: Some(subscription),
        }
    }

    pub fn id(&self) -> ConferenceId {
        self.base.id()
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    pub fn focus_call(&self) -> Option<CallId> {
        self.focus_call
    }

    pub fn focus_contact(&self) -> Option<&str> {
        self.focus_contact.as_deref()
    }

    /// Calls waiting for the focus to connect
    pub fn pending(&self) -> &[CallId] {
        &self.pending
    }

    /// Calls whose transfer to the focus is in progress
    pub fn transferring(&self) -> &[CallId] {
        &self.transferring
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    pub fn add_participant(&mut self, svc: &mut CoreServices<'_>, call: CallId) -> Result<()> {
        self.base.ensure_unattached(&*svc.calls, call)?;
        if self.pending.contains(&call) || self.transferring.contains(&call) {
            return Err(ConferenceError::invalid_state(format!(
                "{} is already queued for the focus",
                call
            )));
        }

        match self.state {
            FocusState::NotConnectedToFocus => {
                let focus = SipAddress::parse(&self.focus_address).map_err(|_| {
                    ConferenceError::config(format!(
                        "invalid conference focus address '{}'",
                        self.focus_address
                    ))
                })?;

                self.base.add_participant(svc.calls, call)?;
                info!("Calling the conference focus ({})", focus);
                let params = CallParams::default().with_video(self.base.params().video_requested());
                let focus_call = match svc.calls.invite(&focus, params) {
                    Ok(focus_call) => focus_call,
                    Err(e) => {
                        self.base.detach_call(svc.calls, call);
                        return Err(ConferenceError::transport(format!(
                            "could not call focus {}: {}",
                            focus, e
                        )));
                    }
                };
                svc.calls.mark_conference_log(focus_call);
                self.base.local_stream = svc.calls.audio_stream(focus_call);
                self.focus_call = Some(focus_call);
                self.pending.push(call);
                self.set_state(FocusState::ConnectingToFocus);
                Ok(())
            }
            FocusState::ConnectingToFocus => {
                self.base.add_participant(svc.calls, call)?;
                self.pending.push(call);
                Ok(())
            }
            FocusState::ConnectedToFocus => {
                self.base.add_participant(svc.calls, call)?;
                if let Err(e) = self.transfer_to_focus(svc.signaling, call) {
                    self.base.detach_call(svc.calls, call);
                    return Err(e);
                }
                self.transferring.push(call);
                Ok(())
            }
        }
    }

    /// Participants are removed by address through the focus
    pub fn remove_participant(&mut self, _svc: &mut CoreServices<'_>, call: CallId) -> Result<()> {
        Err(ConferenceError::invalid_state(format!(
            "cannot remove {} by call from a remote conference, use its address",
            call
        )))
    }

    /// Ask the focus to hang up on `address` (REFER with `method=BYE`)
    pub fn remove_participant_by_address(
        &mut self,
        svc: &mut CoreServices<'_>,
        address: &SipAddress,
    ) -> Result<()> {
        match (self.state, self.focus_call) {
            (FocusState::ConnectedToFocus, Some(focus_call)) => {
                let refer_to = format!("{};method=BYE", address.uri_only());
                svc.signaling.refer(focus_call, &refer_to).map_err(|e| {
                    ConferenceError::transport(format!("REFER to remove {} failed: {}", address, e))
                })?;
                self.base.remove_by_address(svc.calls, address).map(|_| ())
            }
            (state, _) => {
                error!(
                    "Cannot remove {} from conference: bad conference state ({})",
                    address, state
                );
                Err(ConferenceError::invalid_state(format!(
                    "cannot remove participants in state {}",
                    state
                )))
            }
        }
    }

    /// Hang up the focus call; the state machine resets when its end is reported
    pub fn terminate(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        match (self.state, self.focus_call) {
            (FocusState::ConnectingToFocus | FocusState::ConnectedToFocus, Some(focus_call)) => {
                self.base.detach_call(svc.calls, focus_call);
                svc.calls.terminate(focus_call)
            }
            _ => Ok(()),
        }
    }

    pub fn enter(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        let focus_call = self.connected_focus_call("enter")?;
        match svc.calls.state(focus_call) {
            Some(CallState::StreamsRunning) => Ok(()),
            Some(CallState::Paused) => svc.calls.resume(focus_call),
            state => {
                error!("Could not join the conference: bad focus call state ({:?})", state);
                Err(ConferenceError::invalid_state(format!(
                    "focus call in state {:?} cannot be resumed",
                    state
                )))
            }
        }
    }

    pub fn leave(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        let focus_call = self.connected_focus_call("leave")?;
        match svc.calls.state(focus_call) {
            Some(CallState::Paused) => Ok(()),
            Some(CallState::StreamsRunning) => svc.calls.pause(focus_call),
            state => {
                error!("Could not leave the conference: bad focus call state ({:?})", state);
                Err(ConferenceError::invalid_state(format!(
                    "focus call in state {:?} cannot be paused",
                    state
                )))
            }
        }
    }

    pub fn is_in(&self, calls: &dyn CallManager) -> bool {
        match (self.state, self.focus_call) {
            (FocusState::ConnectedToFocus, Some(focus_call)) => {
                calls.state(focus_call) == Some(CallState::StreamsRunning)
            }
            _ => false,
        }
    }

    pub fn size(&self, calls: &dyn CallManager) -> usize {
        self.base.participant_count() + usize::from(self.is_in(calls))
    }

    /// Call-state notification for any call; only the focus call and pending
    /// calls are of interest
    pub fn on_call_state_changed(&mut self, svc: &mut CoreServices<'_>, call: CallId, state: CallState) {
        if self.focus_call == Some(call) {
            self.on_focus_call_state_changed(svc, state);
        } else if self.pending.contains(&call) {
            self.on_pending_call_state_changed(svc, call, state);
        } else if state.is_terminal() && self.transferring.contains(&call) {
            debug!("{} ended while transferring", call);
            self.transferring.retain(|c| *c != call);
        }
    }

    pub fn on_transfer_state_changed(&mut self, call: CallId, state: CallState) {
        if !self.transferring.contains(&call) {
            return;
        }
        match state {
            CallState::Connected | CallState::Error => {
                debug!("Transfer of {} finished ({})", call, state);
                self.transferring.retain(|c| *c != call);
            }
            _ => {}
        }
    }

    /// A call is being released: forget it wherever it is referenced. A call
    /// that never reached the focus takes its participant with it; one
    /// handed over to the focus leaves the participant in place.
    pub fn on_call_terminating(&mut self, svc: &mut CoreServices<'_>, call: CallId) -> Disposition {
        if self.pending.contains(&call) {
            self.base.detach_call(svc.calls, call);
            self.pending.retain(|c| *c != call);
        } else {
            self.base.release_call(svc.calls, call);
        }
        self.transferring.retain(|c| *c != call);
        Disposition::Continue
    }

    /// Terminate a connected focus and drop the notification subscription
    pub fn dispose(mut self, svc: &mut CoreServices<'_>) {
        if self.state == FocusState::ConnectedToFocus {
            if let Err(e) = self.terminate(svc) {
                warn!("Failed to terminate focus call: {}", e);
            }
        }
        if let Some(subscription) = self.subscription.take() {
            svc.signaling.unsubscribe(subscription);
        }
    }

    fn on_focus_call_state_changed(&mut self, svc: &mut CoreServices<'_>, state: CallState) {
        let Some(focus_call) = self.focus_call else {
            return;
        };

        match state {
            CallState::Connected => {
                if self.state == FocusState::ConnectedToFocus {
                    debug!("Focus call reconnected, nothing to relay");
                    return;
                }
                let contact = svc.calls.remote_contact(focus_call).unwrap_or_else(|| {
                    warn!("Focus call has no remote contact, using the focus address");
                    self.focus_address.clone()
                });
                self.focus_contact = Some(contact);
                self.set_state(FocusState::ConnectedToFocus);

                for call in std::mem::take(&mut self.pending) {
                    let resumable = svc.calls.state(call).map_or(false, |s| s.is_resumable());
                    if resumable && self.relay_pending(svc.signaling, call) {
                        continue;
                    }
                    self.pending.push(call);
                }
            }
            CallState::Error | CallState::End => {
                self.base.detach_call(svc.calls, focus_call);
                self.set_state(FocusState::NotConnectedToFocus);
                self.focus_call = None;
                self.base.local_stream = None;
                self.focus_contact = None;
                let queued: Vec<CallId> = self
                    .pending
                    .drain(..)
                    .chain(self.transferring.drain(..))
                    .collect();
                for call in queued {
                    self.base.detach_call(svc.calls, call);
                }
            }
            _ => {}
        }
    }

    fn on_pending_call_state_changed(&mut self, svc: &mut CoreServices<'_>, call: CallId, state: CallState) {
        match state {
            CallState::StreamsRunning | CallState::Paused => {
                if self.state == FocusState::ConnectedToFocus {
                    self.pending.retain(|c| *c != call);
                    if !self.relay_pending(svc.signaling, call) {
                        self.pending.push(call);
                    }
                }
            }
            CallState::Error | CallState::End => {
                self.base.detach_call(svc.calls, call);
                self.pending.retain(|c| *c != call);
            }
            _ => {}
        }
    }

    /// Transfer a call taken off `pending`; on success it moves to `transferring`
    fn relay_pending(&mut self, signaling: &mut dyn SignalingLayer, call: CallId) -> bool {
        match self.transfer_to_focus(signaling, call) {
            Ok(()) => {
                self.transferring.push(call);
                true
            }
            Err(e) => {
                warn!("Could not transfer {} to the focus: {}", call, e);
                false
            }
        }
    }

    fn transfer_to_focus(&self, signaling: &mut dyn SignalingLayer, call: CallId) -> Result<()> {
        let contact = self
            .focus_contact
            .as_deref()
            .ok_or_else(|| ConferenceError::invalid_state("focus contact unknown"))?;
        signaling
            .transfer(call, contact)
            .map_err(|e| ConferenceError::transport(format!("transfer of {} failed: {}", call, e)))
    }

    fn connected_focus_call(&self, operation: &str) -> Result<CallId> {
        match (self.state, self.focus_call) {
            (FocusState::ConnectedToFocus, Some(focus_call)) => Ok(focus_call),
            (state, _) => {
                error!("Could not {} the conference: bad conference state ({})", operation, state);
                Err(ConferenceError::invalid_state(format!(
                    "cannot {} the conference in state {}",
                    operation, state
                )))
            }
        }
    }

    fn set_state(&mut self, state: FocusState) {
        if self.state != state {
            info!("Remote conference {}: {} -> {}", self.base.id(), self.state, state);
            self.state = state;
        }
    }
}

//! Locally mixed conference
//!
//! Every attached call is bridged into a mixing session on this device. The
//! device's own microphone and speaker join through a loop-back endpoint,
//! and an optional recorder endpoint captures the mix.
//!
//! Mixer membership is always one endpoint per attached call with a running
//! stream, plus the local endpoint and the recorder when present.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::address::SipAddress;
use crate::collaborators::{
    CoreServices, LoopbackRoute, MediaEngine, MixerSession, TransportProfile,
};
use crate::config::ConferenceConfig;
use crate::errors::{ConferenceError, Result};
use crate::types::{CallId, CallState, ConferenceId, EndpointId};

use super::base::ConferenceBase;
use super::params::ConferenceParams;
use super::Disposition;

pub struct LocalConference {
    pub(crate) base: ConferenceBase,
    mixer: Option<Box<dyn MixerSession>>,
    call_endpoints: HashMap<CallId, EndpointId>,
    local_endpoint: Option<EndpointId>,
    record_endpoint: Option<EndpointId>,
    local_profile: Option<TransportProfile>,
    terminated: bool,
}

impl fmt::Debug for LocalConference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConference")
            .field("id", &self.base.id())
            .field("participants", &self.base.participant_count())
            .field("mixer_size", &self.mixer.as_ref().map(|m| m.size()))
            .field("local_endpoint", &self.local_endpoint)
            .field("record_endpoint", &self.record_endpoint)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl LocalConference {
    /// Create a conference with a fresh mixing session at the configured rate
    pub fn new(
        media: &mut dyn MediaEngine,
        params: ConferenceParams,
        config: &ConferenceConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mixer = media.create_mixer(config.sound.conference_rate)?;
        let base = ConferenceBase::new(params, config.sound.clone());
        info!(
            "Created local conference {} mixing at {} Hz",
            base.id(),
            mixer.sample_rate()
        );

        Ok(Self {
            base,
            mixer: Some(mixer),
            call_endpoints: HashMap::new(),
            local_endpoint: None,
            record_endpoint: None,
            local_profile: None,
            terminated: false,
        })
    }

    pub fn id(&self) -> ConferenceId {
        self.base.id()
    }

    /// The single-codec profile backing the local endpoint, while it exists
    pub fn local_profile(&self) -> Option<&TransportProfile> {
        self.local_profile.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.record_endpoint.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The mixer has been destroyed; the owner must drop the conference
    pub fn is_finished(&self) -> bool {
        self.mixer.is_none()
    }

    pub fn add_participant(&mut self, svc: &mut CoreServices<'_>, call: CallId) -> Result<()> {
        self.base.ensure_unattached(&*svc.calls, call)?;
        if self.mixer.is_none() {
            return Err(ConferenceError::invalid_state("conference mixer is gone"));
        }

        let current = svc
            .calls
            .current_params(call)
            .ok_or_else(|| ConferenceError::not_found(call.to_string()))?;
        if current.in_conference {
            error!("{} is already in conference", call);
            return Err(ConferenceError::invalid_state(format!(
                "{} is already in conference",
                call
            )));
        }
        if svc.calls.remote_address(call).is_none() {
            return Err(ConferenceError::not_found(format!("remote address of {}", call)));
        }

        match svc.calls.state(call) {
            Some(CallState::Paused) => {
                let params = svc
                    .calls
                    .params(call)
                    .unwrap_or(current)
                    .with_conference(true)
                    .with_video(false);
                svc.calls.set_params(call, params)?;
                svc.calls.resume(call)?;
            }
            Some(CallState::StreamsRunning) => {
                let params = current.with_conference(true).with_video(false);
                if svc.calls.has_media_streams(call) {
                    svc.calls.restart_media_streams(call)?;
                }
                if svc.calls.current_call() == Some(call) {
                    svc.calls.clear_current_call();
                }
                // the re-INVITE redraws the streams; the mixer endpoint is
                // attached when they start again
                svc.calls.update_call(call, params)?;
                if self.local_endpoint.is_none() {
                    self.add_local_endpoint(svc.media)?;
                }
            }
            state => {
                error!(
                    "{} is in state {:?}, it cannot be added to the conference",
                    call, state
                );
                return Err(ConferenceError::invalid_state(format!(
                    "{} cannot be added to the conference in state {:?}",
                    call, state
                )));
            }
        }

        let replaced = svc
            .calls
            .remote_address(call)
            .and_then(|address| self.base.find(&address).and_then(|p| p.call()))
            .filter(|previous| *previous != call);
        self.base.add_participant(svc.calls, call)?;
        if let Some(previous) = replaced {
            self.release_call_endpoint(previous);
        }
        Ok(())
    }

    pub fn remove_participant(&mut self, svc: &mut CoreServices<'_>, call: CallId) -> Result<()> {
        info!("Removing {} from conference {}", call, self.id());
        if !self.base.has_call(call) {
            return Err(ConferenceError::not_found(format!("participant for {}", call)));
        }
        if let Err(e) = self.remove_from_conference(svc, call, false) {
            error!("Error removing participant from conference: {}", e);
            return Err(e);
        }

        let remaining = self.remote_participants_count();
        let result = if remaining == 1 {
            info!("Conference size is 1: converting to plain call");
            self.convert_conference_to_call(svc)
        } else {
            debug!("Conference need not be converted, {} remote participants", remaining);
            Ok(())
        };
        self.drop_idle_recorder();
        self.destroy_if_empty();
        result
    }

    pub fn remove_participant_by_address(
        &mut self,
        svc: &mut CoreServices<'_>,
        address: &SipAddress,
    ) -> Result<()> {
        let call = self
            .base
            .find(address)
            .and_then(|p| p.call())
            .ok_or_else(|| ConferenceError::not_found(format!("participant {}", address)))?;
        self.remove_participant(svc, call)
    }

    /// Request termination of every attached call; the mixer is torn down
    /// as the terminations are reported back
    pub fn terminate(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        self.terminated = true;
        for call in svc.calls.calls() {
            let attached = svc
                .calls
                .current_params(call)
                .map_or(false, |p| p.in_conference);
            if attached {
                if let Err(e) = svc.calls.terminate(call) {
                    warn!("Failed to terminate {}: {}", call, e);
                }
            }
        }
        Ok(())
    }

    pub fn enter(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        if svc.calls.sound_resources_locked() {
            return Err(ConferenceError::resource_locked(
                "sound resources are used by another call",
            ));
        }
        if let Some(current) = svc.calls.current_call() {
            if svc.calls.conference(current) != Some(self.id()) {
                svc.calls.pause(current)?;
            }
        }
        if self.base.local_stream.is_none() {
            self.add_local_endpoint(svc.media)?;
        }
        Ok(())
    }

    pub fn leave(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        if self.is_in() {
            self.remove_local_endpoint(svc.media);
        }
        Ok(())
    }

    pub fn is_in(&self) -> bool {
        self.base.local_stream.is_some()
    }

    /// Mixer members, not counting the recorder
    pub fn size(&self) -> usize {
        match &self.mixer {
            Some(mixer) => mixer
                .size()
                .saturating_sub(usize::from(self.record_endpoint.is_some())),
            None => 0,
        }
    }

    pub fn start_recording(&mut self, path: &Path) -> Result<()> {
        let Some(mixer) = self.mixer.as_mut() else {
            warn!("start_recording(): no conference now");
            return Err(ConferenceError::invalid_state("no conference now"));
        };

        let endpoint = match self.record_endpoint {
            Some(endpoint) => endpoint,
            None => {
                let endpoint = mixer.new_recorder()?;
                mixer.add_member(endpoint);
                self.record_endpoint = Some(endpoint);
                endpoint
            }
        };
        mixer.start_recorder(endpoint, path)?;
        info!("Recording conference {} to {}", self.base.id(), path.display());
        Ok(())
    }

    pub fn stop_recording(&mut self) -> Result<()> {
        let Some(mixer) = self.mixer.as_mut() else {
            warn!("stop_recording(): no conference now");
            return Err(ConferenceError::invalid_state("no conference now"));
        };
        let Some(endpoint) = self.record_endpoint else {
            warn!("stop_recording(): no record active");
            return Err(ConferenceError::invalid_state("no record active"));
        };
        mixer.stop_recorder(endpoint)
    }

    pub fn on_call_stream_starting(
        &mut self,
        svc: &mut CoreServices<'_>,
        call: CallId,
        paused_by_remote: bool,
    ) {
        let Some(requested) = svc.calls.params(call).filter(|p| p.in_conference) else {
            debug!("Ignoring stream start of {}, not a conference call", call);
            return;
        };
        let Some(mixer) = self.mixer.as_mut() else {
            warn!("Stream of {} started after the mixer was destroyed", call);
            return;
        };

        if let Err(e) = svc.calls.set_params(call, requested.with_video(false)) {
            warn!("Could not disable video on {}: {}", call, e);
        }
        svc.calls.enable_camera(call, false);

        let Some(stream) = svc.calls.audio_stream(call) else {
            warn!("{} started without an audio stream", call);
            return;
        };
        if let Some(previous) = self.call_endpoints.remove(&call) {
            mixer.remove_member(previous);
            mixer.release_endpoint(previous);
        }
        match mixer.endpoint_from_stream(stream, true) {
            Ok(endpoint) => {
                mixer.add_member(endpoint);
                mixer.mute_member(endpoint, paused_by_remote);
                self.call_endpoints.insert(call, endpoint);
                debug!("{} mixed as {}", call, endpoint);
            }
            Err(e) => error!("Could not attach {} to the mixer: {}", call, e),
        }
    }

    pub fn on_call_stream_stopping(&mut self, call: CallId) {
        self.release_call_endpoint(call);
    }

    /// Tear down what the terminated call leaves behind. Returns
    /// [`Disposition::Finished`] once the mixer is empty and destroyed.
    ///
    /// Calls this conference does not track are ignored.
    pub fn on_call_terminating(&mut self, svc: &mut CoreServices<'_>, call: CallId) -> Disposition {
        let tracked = self.base.has_call(call)
            || self.call_endpoints.contains_key(&call)
            || svc.calls.conference(call) == Some(self.id());
        if !tracked {
            debug!("Ignoring termination of {}, not part of {}", call, self.id());
            return Disposition::Continue;
        }

        self.base.detach_call(svc.calls, call);
        self.release_call_endpoint(call);

        let remote_count = self.remote_participants_count();
        debug!("Conference {} check uninit: size={}", self.id(), self.size());

        if remote_count == 1 && !self.terminated {
            if let Err(e) = self.convert_conference_to_call(svc) {
                warn!("Could not convert conference to plain call: {}", e);
            }
        }
        if remote_count == 0 && self.local_endpoint.is_some() {
            self.remove_local_endpoint(svc.media);
        }
        self.drop_idle_recorder();
        self.destroy_if_empty()
    }

    /// Release every media resource; attached calls are terminated
    pub fn dispose(mut self, svc: &mut CoreServices<'_>) {
        if self.mixer.is_none() {
            return;
        }
        if let Err(e) = self.terminate(svc) {
            warn!("Failed to terminate conference calls: {}", e);
        }
        self.remove_local_endpoint(svc.media);
        let endpoints: Vec<CallId> = self.call_endpoints.keys().copied().collect();
        for call in endpoints {
            self.release_call_endpoint(call);
        }
        if let Some(mut mixer) = self.mixer.take() {
            if let Some(endpoint) = self.record_endpoint.take() {
                mixer.remove_member(endpoint);
                mixer.destroy_endpoint(endpoint);
            }
            mixer.destroy();
        }
    }

    fn add_local_endpoint(&mut self, media: &mut dyn MediaEngine) -> Result<()> {
        let Some(mixer) = self.mixer.as_mut() else {
            return Err(ConferenceError::invalid_state("conference mixer is gone"));
        };

        let profile = TransportProfile::single_codec(mixer.sample_rate());
        let stream = media.start_loopback_stream(
            &profile,
            &LoopbackRoute::default(),
            self.base.sound().echo_cancellation,
        )?;
        let endpoint = match mixer.endpoint_from_stream(stream, false) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                media.stop_stream(stream);
                return Err(e);
            }
        };
        mixer.add_member(endpoint);

        self.base.local_stream = Some(stream);
        self.local_endpoint = Some(endpoint);
        self.local_profile = Some(profile);
        debug!("Local endpoint {} joined conference {}", endpoint, self.base.id());
        Ok(())
    }

    fn remove_local_endpoint(&mut self, media: &mut dyn MediaEngine) {
        if let Some(endpoint) = self.local_endpoint.take() {
            if let Some(mixer) = self.mixer.as_mut() {
                mixer.remove_member(endpoint);
                mixer.release_endpoint(endpoint);
            }
            if let Some(stream) = self.base.local_stream.take() {
                media.stop_stream(stream);
            }
            self.local_profile = None;
            debug!("Local endpoint {} left conference {}", endpoint, self.base.id());
        }
    }

    /// The recorder alone keeps nothing alive
    fn drop_idle_recorder(&mut self) {
        if self.remote_participants_count() > 0 || self.is_in() {
            return;
        }
        if let Some(endpoint) = self.record_endpoint.take() {
            if let Some(mixer) = self.mixer.as_mut() {
                mixer.remove_member(endpoint);
                mixer.destroy_endpoint(endpoint);
            }
        }
    }

    fn destroy_if_empty(&mut self) -> Disposition {
        match self.mixer.take() {
            Some(mixer) if mixer.size() == 0 => {
                mixer.destroy();
                info!("Local conference {} finished", self.id());
                Disposition::Finished
            }
            Some(mixer) => {
                self.mixer = Some(mixer);
                Disposition::Continue
            }
            None => Disposition::Finished,
        }
    }

    fn release_call_endpoint(&mut self, call: CallId) {
        if let Some(endpoint) = self.call_endpoints.remove(&call) {
            if let Some(mixer) = self.mixer.as_mut() {
                mixer.remove_member(endpoint);
                mixer.release_endpoint(endpoint);
            }
        }
    }

    /// Remote members of the mix. Calls admitted whose streams have not
    /// started yet still count, so a fresh admission keeps the conference
    /// from collapsing.
    fn remote_participants_count(&self) -> usize {
        let count = self.size();
        let mixed = if count == 0 || !self.is_in() {
            count
        } else {
            count - 1
        };
        mixed.max(self.base.participant_count())
    }

    /// Detach `call`. An active removal renegotiates the call as a standalone
    /// call, otherwise it is paused.
    fn remove_from_conference(
        &mut self,
        svc: &mut CoreServices<'_>,
        call: CallId,
        active: bool,
    ) -> Result<()> {
        let current = svc
            .calls
            .current_params(call)
            .ok_or_else(|| ConferenceError::not_found(call.to_string()))?;
        let requested = svc.calls.params(call).unwrap_or(current);

        if !current.in_conference {
            if requested.in_conference {
                warn!("{} not (yet) in conference, be patient", call);
                return Err(ConferenceError::invalid_state(format!(
                    "{} is not yet in conference",
                    call
                )));
            }
            error!("{} is not in a conference", call);
            return Err(ConferenceError::invalid_state(format!(
                "{} is not in a conference",
                call
            )));
        }

        svc.calls.set_params(call, requested.with_conference(false))?;
        let participant = self.base.detach_call(svc.calls, call);
        self.release_call_endpoint(call);
        if let Some(participant) = participant {
            info!("{} will be removed from conference", participant.address());
        }

        if active {
            if self.is_in() {
                info!("Leaving conference for reconnecting with unique call");
                self.leave(svc)?;
            }
            info!("Updating call to actually remove from conference");
            svc.calls.update_call(call, current.with_conference(false))
        } else {
            info!("Pausing call to actually remove from conference");
            svc.calls.pause(call)
        }
    }

    fn convert_conference_to_call(&mut self, svc: &mut CoreServices<'_>) -> Result<()> {
        if self.remote_participants_count() != 1 {
            error!("No unique call remaining in conference");
            return Err(ConferenceError::invalid_state(
                "no unique call remaining in conference",
            ));
        }

        let id = self.id();
        let sole = svc.calls.calls().into_iter().find(|call| {
            svc.calls.conference(*call) == Some(id)
                && svc.calls.params(*call).map_or(false, |p| p.in_conference)
        });
        match sole {
            Some(call) => {
                let active_after_removed = self.is_in();
                self.remove_from_conference(svc, call, active_after_removed)
            }
            None => Ok(()),
        }
    }
}

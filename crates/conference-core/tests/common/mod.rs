//! In-memory call manager, signaling layer and media engine
//!
//! Each fake keeps its state behind an `Arc<Mutex<..>>` so a test can keep a
//! clone for inspection after handing the fake to a conference host.
//! Renegotiations (pause, resume, re-INVITE) complete immediately.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use rvoip_conference_core::{
    CallId, CallManager, CallParams, CallState, ConferenceError, ConferenceId, CoreServices,
    EndpointId, LoopbackRoute, MediaEngine, MicGain, MixerSession, Result, SignalingLayer,
    SipAddress, StreamId, SubscriptionId, TransportProfile,
};

pub const FOCUS_ADDR: &str = "sip:conference-factory@focus.example.com";
pub const FOCUS_CONTACT: &str = "sip:conf-1@10.0.0.50:5060;isfocus";

#[derive(Debug, Clone)]
pub struct FakeCall {
    pub address: SipAddress,
    pub contact: Option<String>,
    pub state: CallState,
    pub params: CallParams,
    pub current: CallParams,
    pub stream: Option<StreamId>,
    pub conference: Option<ConferenceId>,
    pub conference_log: bool,
    pub camera: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallAction {
    Invite(SipAddress, CallParams),
    Update(CallId, CallParams),
    Pause(CallId),
    Resume(CallId),
    Terminate(CallId),
    RestartStreams(CallId),
}

#[derive(Debug, Default)]
pub struct CallsState {
    pub order: Vec<CallId>,
    pub calls: HashMap<CallId, FakeCall>,
    pub current: Option<CallId>,
    pub sound_locked: bool,
    pub fail_invite: bool,
    pub actions: Vec<CallAction>,
    next_stream: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FakeCalls {
    state: Arc<Mutex<CallsState>>,
}

impl FakeCalls {
    /// Register a call with `address` in `state`
    pub fn add_call(&self, address: &str, state: CallState) -> CallId {
        let mut inner = self.state.lock();
        inner.next_stream += 1;
        let stream = StreamId(1000 + inner.next_stream);
        let id = CallId::new();
        inner.order.push(id);
        inner.calls.insert(
            id,
            FakeCall {
                address: SipAddress::parse(address).expect("valid test address"),
                contact: None,
                state,
                params: CallParams::default(),
                current: CallParams::default(),
                stream: Some(stream),
                conference: None,
                conference_log: false,
                camera: true,
            },
        );
        id
    }

    pub fn get(&self, call: CallId) -> FakeCall {
        self.state.lock().calls[&call].clone()
    }

    pub fn update(&self, call: CallId, f: impl FnOnce(&mut FakeCall)) {
        let mut inner = self.state.lock();
        if let Some(c) = inner.calls.get_mut(&call) {
            f(c);
        }
    }

    pub fn set_state(&self, call: CallId, state: CallState) {
        self.update(call, |c| c.state = state);
    }

    pub fn set_current_call(&self, call: Option<CallId>) {
        self.state.lock().current = call;
    }

    pub fn current(&self) -> Option<CallId> {
        self.state.lock().current
    }

    pub fn lock_sound(&self, locked: bool) {
        self.state.lock().sound_locked = locked;
    }

    pub fn fail_invites(&self) {
        self.state.lock().fail_invite = true;
    }

    pub fn actions(&self) -> Vec<CallAction> {
        self.state.lock().actions.clone()
    }

    pub fn invites(&self) -> Vec<(SipAddress, CallParams)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                CallAction::Invite(to, params) => Some((to, params)),
                _ => None,
            })
            .collect()
    }

    /// The most recently placed outgoing call
    pub fn last_call(&self) -> Option<CallId> {
        self.state.lock().order.last().copied()
    }

    fn with_call<T>(&self, call: CallId, f: impl FnOnce(&mut FakeCall) -> T) -> Result<T> {
        let mut inner = self.state.lock();
        inner
            .calls
            .get_mut(&call)
            .map(f)
            .ok_or_else(|| ConferenceError::not_found(call.to_string()))
    }

    fn record(&self, action: CallAction) {
        self.state.lock().actions.push(action);
    }
}

impl CallManager for FakeCalls {
    fn calls(&self) -> Vec<CallId> {
        self.state.lock().order.clone()
    }

    fn state(&self, call: CallId) -> Option<CallState> {
        self.state.lock().calls.get(&call).map(|c| c.state)
    }

    fn remote_address(&self, call: CallId) -> Option<SipAddress> {
        self.state.lock().calls.get(&call).map(|c| c.address.clone())
    }

    fn remote_contact(&self, call: CallId) -> Option<String> {
        self.state.lock().calls.get(&call).and_then(|c| c.contact.clone())
    }

    fn params(&self, call: CallId) -> Option<CallParams> {
        self.state.lock().calls.get(&call).map(|c| c.params)
    }

    fn current_params(&self, call: CallId) -> Option<CallParams> {
        self.state.lock().calls.get(&call).map(|c| c.current)
    }

    fn set_params(&mut self, call: CallId, params: CallParams) -> Result<()> {
        self.with_call(call, |c| c.params = params)
    }

    fn update_call(&mut self, call: CallId, params: CallParams) -> Result<()> {
        self.with_call(call, |c| {
            c.params = params;
            c.current = params;
        })?;
        self.record(CallAction::Update(call, params));
        Ok(())
    }

    fn pause(&mut self, call: CallId) -> Result<()> {
        self.with_call(call, |c| {
            c.state = CallState::Paused;
            c.current = c.params;
        })?;
        self.record(CallAction::Pause(call));
        Ok(())
    }

    fn resume(&mut self, call: CallId) -> Result<()> {
        self.with_call(call, |c| {
            c.state = CallState::StreamsRunning;
            c.current = c.params;
        })?;
        self.record(CallAction::Resume(call));
        Ok(())
    }

    fn terminate(&mut self, call: CallId) -> Result<()> {
        self.with_call(call, |c| c.state = CallState::End)?;
        self.record(CallAction::Terminate(call));
        Ok(())
    }

    fn invite(&mut self, to: &SipAddress, params: CallParams) -> Result<CallId> {
        if self.state.lock().fail_invite {
            return Err(ConferenceError::transport("no route to host"));
        }
        let id = self.add_call(&to.uri_only(), CallState::OutgoingInit);
        self.with_call(id, |c| {
            c.params = params;
            c.current = params;
        })?;
        self.record(CallAction::Invite(to.clone(), params));
        Ok(id)
    }

    fn has_media_streams(&self, call: CallId) -> bool {
        self.state
            .lock()
            .calls
            .get(&call)
            .map_or(false, |c| c.stream.is_some())
    }

    fn restart_media_streams(&mut self, call: CallId) -> Result<()> {
        self.with_call(call, |_| ())?;
        self.record(CallAction::RestartStreams(call));
        Ok(())
    }

    fn audio_stream(&self, call: CallId) -> Option<StreamId> {
        self.state.lock().calls.get(&call).and_then(|c| c.stream)
    }

    fn enable_camera(&mut self, call: CallId, enabled: bool) {
        self.update(call, |c| c.camera = enabled);
    }

    fn current_call(&self) -> Option<CallId> {
        self.state.lock().current
    }

    fn clear_current_call(&mut self) {
        self.state.lock().current = None;
    }

    fn sound_resources_locked(&self) -> bool {
        self.state.lock().sound_locked
    }

    fn conference(&self, call: CallId) -> Option<ConferenceId> {
        self.state.lock().calls.get(&call).and_then(|c| c.conference)
    }

    fn set_conference(&mut self, call: CallId, conference: Option<ConferenceId>) {
        self.update(call, |c| c.conference = conference);
    }

    fn mark_conference_log(&mut self, call: CallId) {
        self.update(call, |c| c.conference_log = true);
    }
}

#[derive(Debug, Default)]
pub struct SignalingState {
    pub transfers: Vec<(CallId, String)>,
    pub refers: Vec<(CallId, String)>,
    pub subscriptions: Vec<(SubscriptionId, ConferenceId)>,
    pub unsubscribed: Vec<SubscriptionId>,
    pub fail_transfer: bool,
    pub fail_refer: bool,
    next_subscription: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSignaling {
    state: Arc<Mutex<SignalingState>>,
}

impl FakeSignaling {
    pub fn transfers(&self) -> Vec<(CallId, String)> {
        self.state.lock().transfers.clone()
    }

    pub fn refers(&self) -> Vec<(CallId, String)> {
        self.state.lock().refers.clone()
    }

    pub fn subscriptions(&self) -> Vec<(SubscriptionId, ConferenceId)> {
        self.state.lock().subscriptions.clone()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.state.lock().unsubscribed.clone()
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.state.lock().fail_transfer = fail;
    }

    pub fn fail_refers(&self, fail: bool) {
        self.state.lock().fail_refer = fail;
    }
}

impl SignalingLayer for FakeSignaling {
    fn transfer(&mut self, call: CallId, contact: &str) -> Result<()> {
        let mut inner = self.state.lock();
        if inner.fail_transfer {
            return Err(ConferenceError::transport("REFER rejected"));
        }
        inner.transfers.push((call, contact.to_string()));
        Ok(())
    }

    fn refer(&mut self, call: CallId, refer_to: &str) -> Result<()> {
        let mut inner = self.state.lock();
        if inner.fail_refer {
            return Err(ConferenceError::transport("REFER rejected"));
        }
        inner.refers.push((call, refer_to.to_string()));
        Ok(())
    }

    fn subscribe(&mut self, owner: ConferenceId) -> SubscriptionId {
        let mut inner = self.state.lock();
        inner.next_subscription += 1;
        let id = SubscriptionId(inner.next_subscription);
        inner.subscriptions.push((id, owner));
        id
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        let mut inner = self.state.lock();
        inner.subscriptions.retain(|(id, _)| *id != subscription);
        inner.unsubscribed.push(subscription);
    }
}

#[derive(Debug, Default)]
pub struct MediaState {
    pub mixer_rates: Vec<u32>,
    pub members: Vec<EndpointId>,
    pub muted_members: Vec<EndpointId>,
    pub endpoint_streams: HashMap<EndpointId, (StreamId, bool)>,
    pub recorders: Vec<EndpointId>,
    pub recording_to: Option<PathBuf>,
    pub mixer_destroyed: bool,
    pub loopback_streams: Vec<StreamId>,
    pub stopped_streams: Vec<StreamId>,
    pub loopback_profiles: Vec<TransportProfile>,
    pub echo_cancellation: Vec<bool>,
    pub mic_gain: HashMap<StreamId, MicGain>,
    pub rtp_muted: HashMap<StreamId, bool>,
    pub send_volume: HashMap<StreamId, f32>,
    next_id: u64,
}

impl MediaState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeMedia {
    state: Arc<Mutex<MediaState>>,
}

impl FakeMedia {
    pub fn inspect<T>(&self, f: impl FnOnce(&MediaState) -> T) -> T {
        f(&*self.state.lock())
    }

    pub fn mixer_destroyed(&self) -> bool {
        self.state.lock().mixer_destroyed
    }

    pub fn mixer_size(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn set_send_volume(&self, stream: StreamId, volume: f32) {
        self.state.lock().send_volume.insert(stream, volume);
    }
}

impl MediaEngine for FakeMedia {
    fn create_mixer(&mut self, sample_rate: u32) -> Result<Box<dyn MixerSession>> {
        self.state.lock().mixer_rates.push(sample_rate);
        Ok(Box::new(FakeMixer {
            sample_rate,
            state: self.state.clone(),
        }))
    }

    fn start_loopback_stream(
        &mut self,
        profile: &TransportProfile,
        _route: &LoopbackRoute,
        echo_cancellation: bool,
    ) -> Result<StreamId> {
        let mut inner = self.state.lock();
        let stream = StreamId(inner.next_id());
        inner.loopback_streams.push(stream);
        inner.loopback_profiles.push(profile.clone());
        inner.echo_cancellation.push(echo_cancellation);
        Ok(stream)
    }

    fn stop_stream(&mut self, stream: StreamId) {
        self.state.lock().stopped_streams.push(stream);
    }

    fn set_mic_gain(&mut self, stream: StreamId, gain: MicGain) {
        self.state.lock().mic_gain.insert(stream, gain);
    }

    fn mute_rtp(&mut self, stream: StreamId, muted: bool) {
        self.state.lock().rtp_muted.insert(stream, muted);
    }

    fn send_volume(&self, stream: StreamId) -> Option<f32> {
        self.state.lock().send_volume.get(&stream).copied()
    }
}

pub struct FakeMixer {
    sample_rate: u32,
    state: Arc<Mutex<MediaState>>,
}

impl MixerSession for FakeMixer {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn size(&self) -> usize {
        self.state.lock().members.len()
    }

    fn add_member(&mut self, endpoint: EndpointId) {
        let mut inner = self.state.lock();
        if !inner.members.contains(&endpoint) {
            inner.members.push(endpoint);
        }
    }

    fn remove_member(&mut self, endpoint: EndpointId) {
        self.state.lock().members.retain(|e| *e != endpoint);
    }

    fn mute_member(&mut self, endpoint: EndpointId, muted: bool) {
        let mut inner = self.state.lock();
        inner.muted_members.retain(|e| *e != endpoint);
        if muted {
            inner.muted_members.push(endpoint);
        }
    }

    fn endpoint_from_stream(&mut self, stream: StreamId, remote: bool) -> Result<EndpointId> {
        let mut inner = self.state.lock();
        let endpoint = EndpointId(inner.next_id());
        inner.endpoint_streams.insert(endpoint, (stream, remote));
        Ok(endpoint)
    }

    fn release_endpoint(&mut self, endpoint: EndpointId) {
        self.state.lock().endpoint_streams.remove(&endpoint);
    }

    fn new_recorder(&mut self) -> Result<EndpointId> {
        let mut inner = self.state.lock();
        let endpoint = EndpointId(inner.next_id());
        inner.recorders.push(endpoint);
        Ok(endpoint)
    }

    fn start_recorder(&mut self, _endpoint: EndpointId, path: &Path) -> Result<()> {
        self.state.lock().recording_to = Some(path.to_path_buf());
        Ok(())
    }

    fn stop_recorder(&mut self, _endpoint: EndpointId) -> Result<()> {
        self.state.lock().recording_to = None;
        Ok(())
    }

    fn destroy_endpoint(&mut self, endpoint: EndpointId) {
        self.state.lock().recorders.retain(|e| *e != endpoint);
    }

    fn destroy(self: Box<Self>) {
        self.state.lock().mixer_destroyed = true;
    }
}

/// The three collaborators, ready to lend to a conference
#[derive(Debug, Clone, Default)]
pub struct Core {
    pub calls: FakeCalls,
    pub signaling: FakeSignaling,
    pub media: FakeMedia,
}

impl Core {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&mut self) -> CoreServices<'_> {
        CoreServices::new(&mut self.calls, &mut self.signaling, &mut self.media)
    }
}

//! State and behaviour shared by both conference variants

use tracing::{debug, info};

use crate::address::SipAddress;
use crate::collaborators::{CallManager, MediaEngine, MicGain};
use crate::config::SoundConfig;
use crate::errors::{ConferenceError, Result};
use crate::types::{CallId, ConferenceId, StreamId, VOLUME_DB_LOWEST};

use super::params::ConferenceParams;
use super::participant::Participant;

/// Participant set, local presence and microphone state
///
/// Participants are kept in admission order and never hold two entries with
/// equal addresses. The local party is not a participant: its presence is the
/// presence of `local_stream`.
#[derive(Debug)]
pub(crate) struct ConferenceBase {
    id: ConferenceId,
    participants: Vec<Participant>,
    pub(crate) local_stream: Option<StreamId>,
    muted: bool,
    params: ConferenceParams,
    sound: SoundConfig,
}

impl ConferenceBase {
    pub(crate) fn new(params: ConferenceParams, sound: SoundConfig) -> Self {
        Self {
            id: ConferenceId::new(),
            participants: Vec::new(),
            local_stream: None,
            muted: false,
            params,
            sound,
        }
    }

    pub(crate) fn id(&self) -> ConferenceId {
        self.id
    }

    pub(crate) fn params(&self) -> &ConferenceParams {
        &self.params
    }

    pub(crate) fn sound(&self) -> &SoundConfig {
        &self.sound
    }

    /// Fail if `call` already belongs to a conference
    pub(crate) fn ensure_unattached(&self, calls: &dyn CallManager, call: CallId) -> Result<()> {
        match calls.conference(call) {
            Some(owner) => Err(ConferenceError::invalid_state(format!(
                "{} is already attached to {}",
                call, owner
            ))),
            None => Ok(()),
        }
    }

    /// Record `call` as a participant and point its back-reference at us
    ///
    /// A call whose remote address is already present replaces the previous
    /// call of that participant.
    pub(crate) fn add_participant(&mut self, calls: &mut dyn CallManager, call: CallId) -> Result<()> {
        let participant = Participant::from_call(&*calls, call)?;

        match self.participants.iter_mut().find(|p| **p == participant) {
            Some(existing) => {
                if let Some(previous) = existing.call().filter(|previous| *previous != call) {
                    debug!(
                        "Participant {} moves from {} to {}",
                        existing.address(),
                        previous,
                        call
                    );
                    if calls.conference(previous) == Some(self.id) {
                        calls.set_conference(previous, None);
                    }
                }
                existing.set_call(Some(call));
            }
            None => {
                info!("Participant {} joins {}", participant.address(), self.id);
                self.participants.push(participant);
            }
        }

        calls.set_conference(call, Some(self.id));
        Ok(())
    }

    /// Drop the participant carried by `call`, if any, and clear the call's
    /// back-reference
    pub(crate) fn detach_call(&mut self, calls: &mut dyn CallManager, call: CallId) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.call() == Some(call))
            .or_else(|| {
                let address = calls.remote_address(call)?;
                self.participants.iter().position(|p| *p.address() == address)
            });

        if calls.conference(call) == Some(self.id) {
            calls.set_conference(call, None);
        }

        let removed = index.map(|i| self.participants.remove(i));
        if let Some(participant) = &removed {
            info!("Participant {} leaves {}", participant.address(), self.id);
        }
        removed
    }

    /// Forget `call` but keep the participant it carried, whose presence is
    /// now held elsewhere
    pub(crate) fn release_call(&mut self, calls: &mut dyn CallManager, call: CallId) {
        if calls.conference(call) == Some(self.id) {
            calls.set_conference(call, None);
        }
        if let Some(participant) = self.participants.iter_mut().find(|p| p.call() == Some(call)) {
            debug!("Participant {} no longer reachable through {}", participant.address(), call);
            participant.set_call(None);
        }
    }

    pub(crate) fn remove_by_address(
        &mut self,
        calls: &mut dyn CallManager,
        address: &SipAddress,
    ) -> Result<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.address() == address)
            .ok_or_else(|| ConferenceError::not_found(format!("participant {}", address)))?;

        let participant = self.participants.remove(index);
        if let Some(call) = participant.call() {
            if calls.conference(call) == Some(self.id) {
                calls.set_conference(call, None);
            }
        }
        info!("Participant {} leaves {}", address, self.id);
        Ok(participant)
    }

    pub(crate) fn has_call(&self, call: CallId) -> bool {
        self.participants.iter().any(|p| p.call() == Some(call))
    }

    pub(crate) fn find(&self, address: &SipAddress) -> Option<&Participant> {
        self.participants.iter().find(|p| p.address() == address)
    }

    pub(crate) fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Address snapshot in admission order
    pub(crate) fn participants(&self) -> Vec<SipAddress> {
        self.participants.iter().map(|p| p.address().clone()).collect()
    }

    pub(crate) fn mute_microphone(&mut self, media: &mut dyn MediaEngine, muted: bool) {
        if let Some(stream) = self.local_stream {
            let gain = if muted {
                MicGain::Silent
            } else {
                MicGain::Db(self.sound.soft_mic_level_db)
            };
            media.set_mic_gain(stream, gain);
            if self.sound.rtp_no_xmit_on_audio_mute {
                media.mute_rtp(stream, muted);
            }
        }
        self.muted = muted;
    }

    pub(crate) fn microphone_is_muted(&self) -> bool {
        self.muted
    }

    pub(crate) fn input_volume(&self, media: &dyn MediaEngine) -> f32 {
        match self.local_stream {
            Some(stream) if !self.muted => media.send_volume(stream).unwrap_or(VOLUME_DB_LOWEST),
            _ => VOLUME_DB_LOWEST,
        }
    }
}

//! Single-task conference dispatcher
//!
//! [`ConferenceHost`] owns the collaborators and at most one conference, and
//! runs every operation and notification on one tokio task, in arrival
//! order. Callers talk to it through a cloneable [`ConferenceHandle`];
//! membership and focus changes are published as [`ConferenceEvent`]s.
//!
//! A conference that reports [`Disposition::Finished`] from a notification,
//! or whose mixer is destroyed by a removal, is dropped by the host, which
//! then publishes [`ConferenceEvent::Finished`].

use std::path::PathBuf;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::address::SipAddress;
use crate::collaborators::{CallManager, CoreServices, MediaEngine, SignalingLayer};
use crate::conference::{Conference, ConferenceParams, Disposition};
use crate::config::ConferenceConfig;
use crate::errors::{ConferenceError, Result};
use crate::types::{CallId, CallState, ConferenceClass, ConferenceId, FocusState, SubscriptionId};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// Events published by the host
#[derive(Debug, Clone, PartialEq)]
pub enum ConferenceEvent {
    Created {
        id: ConferenceId,
        class: ConferenceClass,
    },
    ParticipantAdded {
        id: ConferenceId,
        address: SipAddress,
    },
    ParticipantRemoved {
        id: ConferenceId,
        address: SipAddress,
    },
    FocusStateChanged {
        id: ConferenceId,
        state: FocusState,
    },
    /// The conference released its resources and is gone
    Finished { id: ConferenceId },
}

/// Call-side notifications delivered to the active conference
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StreamStarting { call: CallId, paused_by_remote: bool },
    StreamStopping { call: CallId },
    Terminating { call: CallId },
    /// Routed only to the conference holding `subscription`
    CallStateChanged {
        subscription: SubscriptionId,
        call: CallId,
        state: CallState,
    },
    /// Routed only to the conference holding `subscription`
    TransferStateChanged {
        subscription: SubscriptionId,
        call: CallId,
        state: CallState,
    },
}

/// Point-in-time view of the active conference
#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceSnapshot {
    pub id: ConferenceId,
    pub class: ConferenceClass,
    pub size: usize,
    pub is_in: bool,
    pub participants: Vec<SipAddress>,
    pub focus_state: Option<FocusState>,
    pub microphone_muted: bool,
    pub subscription: Option<SubscriptionId>,
}

type Reply<T> = oneshot::Sender<Result<T>>;

#[derive(Debug)]
enum Command {
    CreateLocal {
        params: Option<ConferenceParams>,
        reply: Reply<ConferenceId>,
    },
    CreateRemote {
        params: Option<ConferenceParams>,
        reply: Reply<ConferenceId>,
    },
    AddParticipant {
        call: CallId,
        reply: Reply<()>,
    },
    RemoveParticipant {
        call: CallId,
        reply: Reply<()>,
    },
    RemoveByAddress {
        address: SipAddress,
        reply: Reply<()>,
    },
    Terminate {
        reply: Reply<()>,
    },
    Enter {
        reply: Reply<()>,
    },
    Leave {
        reply: Reply<()>,
    },
    StartRecording {
        path: PathBuf,
        reply: Reply<()>,
    },
    StopRecording {
        reply: Reply<()>,
    },
    MuteMicrophone {
        muted: bool,
        reply: Reply<()>,
    },
    InputVolume {
        reply: Reply<f32>,
    },
    Snapshot {
        reply: Reply<ConferenceSnapshot>,
    },
    Notify {
        notification: Notification,
        reply: Reply<()>,
    },
    Close {
        reply: Reply<()>,
    },
    Shutdown,
}

/// Membership and focus state captured around each command
struct Observed {
    id: ConferenceId,
    participants: Vec<SipAddress>,
    focus_state: Option<FocusState>,
}

impl Observed {
    fn capture(conference: &Conference) -> Self {
        Self {
            id: conference.id(),
            participants: conference.participants(),
            focus_state: conference.focus_state(),
        }
    }

    fn changes_to(&self, after: &Observed) -> Vec<ConferenceEvent> {
        let mut events = Vec::new();
        for address in &self.participants {
            if !after.participants.contains(address) {
                events.push(ConferenceEvent::ParticipantRemoved {
                    id: self.id,
                    address: address.clone(),
                });
            }
        }
        for address in &after.participants {
            if !self.participants.contains(address) {
                events.push(ConferenceEvent::ParticipantAdded {
                    id: self.id,
                    address: address.clone(),
                });
            }
        }
        if let Some(state) = after.focus_state.filter(|s| Some(*s) != self.focus_state) {
            events.push(ConferenceEvent::FocusStateChanged { id: self.id, state });
        }
        events
    }
}

/// Owner of the collaborators and the active conference
pub struct ConferenceHost<C, S, M> {
    calls: C,
    signaling: S,
    media: M,
    config: ConferenceConfig,
    conference: Option<Conference>,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<ConferenceEvent>,
}

impl<C, S, M> ConferenceHost<C, S, M>
where
    C: CallManager + 'static,
    S: SignalingLayer + 'static,
    M: MediaEngine + 'static,
{
    pub fn new(calls: C, signaling: S, media: M, config: ConferenceConfig) -> (Self, ConferenceHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = ConferenceHandle {
            commands: command_tx,
            events: event_tx.clone(),
        };
        let host = Self {
            calls,
            signaling,
            media,
            config,
            conference: None,
            commands: command_rx,
            events: event_tx,
        };
        (host, handle)
    }

    /// Run the host on its own task
    pub fn spawn(self) -> JoinHandle<(C, S, M)> {
        tokio::spawn(self.run())
    }

    /// Process commands until shutdown or until every handle is dropped,
    /// then give the collaborators back
    pub async fn run(mut self) -> (C, S, M) {
        info!("Conference host started");
        while let Some(command) = self.commands.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command);
        }

        if let Some(conference) = self.conference.take() {
            let id = conference.id();
            let mut svc = CoreServices::new(&mut self.calls, &mut self.signaling, &mut self.media);
            conference.dispose(&mut svc);
            self.publish(ConferenceEvent::Finished { id });
        }
        info!("Conference host stopped");
        (self.calls, self.signaling, self.media)
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::CreateLocal { params, reply } => {
                let _ = reply.send(self.create(ConferenceClass::Local, params));
            }
            Command::CreateRemote { params, reply } => {
                let _ = reply.send(self.create(ConferenceClass::Remote, params));
            }
            Command::AddParticipant { call, reply } => {
                let _ = reply.send(self.with_conference(|c, svc| c.add_participant(svc, call)));
            }
            Command::RemoveParticipant { call, reply } => {
                let _ = reply.send(self.with_conference(|c, svc| c.remove_participant(svc, call)));
            }
            Command::RemoveByAddress { address, reply } => {
                let _ = reply.send(
                    self.with_conference(|c, svc| c.remove_participant_by_address(svc, &address)),
                );
            }
            Command::Terminate { reply } => {
                let _ = reply.send(self.with_conference(|c, svc| c.terminate(svc)));
            }
            Command::Enter { reply } => {
                let _ = reply.send(self.with_conference(|c, svc| c.enter(svc)));
            }
            Command::Leave { reply } => {
                let _ = reply.send(self.with_conference(|c, svc| c.leave(svc)));
            }
            Command::StartRecording { path, reply } => {
                let _ = reply.send(self.with_conference(|c, _| c.start_recording(&path)));
            }
            Command::StopRecording { reply } => {
                let _ = reply.send(self.with_conference(|c, _| c.stop_recording()));
            }
            Command::MuteMicrophone { muted, reply } => {
                let _ = reply.send(self.with_conference(|c, svc| {
                    c.mute_microphone(svc.media, muted);
                    Ok(())
                }));
            }
            Command::InputVolume { reply } => {
                let _ = reply.send(self.with_conference(|c, svc| Ok(c.input_volume(&*svc.media))));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Notify {
                notification,
                reply,
            } => {
                let _ = reply.send(self.notify(notification));
            }
            Command::Close { reply } => {
                let _ = reply.send(self.close());
            }
            Command::Shutdown => {}
        }
    }

    fn create(&mut self, class: ConferenceClass, params: Option<ConferenceParams>) -> Result<ConferenceId> {
        if let Some(existing) = &self.conference {
            return Err(ConferenceError::invalid_state(format!(
                "conference {} is already running",
                existing.id()
            )));
        }

        let params = params.unwrap_or_else(|| ConferenceParams::from_config(&self.config));
        let conference = match class {
            ConferenceClass::Local => Conference::new_local(&mut self.media, params, &self.config)?,
            ConferenceClass::Remote => Conference::new_remote(&mut self.signaling, params, &self.config),
        };
        let id = conference.id();
        self.conference = Some(conference);
        self.publish(ConferenceEvent::Created { id, class });
        Ok(id)
    }

    /// Run `op` against the active conference and publish what it changed
    fn with_conference<T>(
        &mut self,
        op: impl FnOnce(&mut Conference, &mut CoreServices<'_>) -> Result<T>,
    ) -> Result<T> {
        let Some(conference) = self.conference.as_mut() else {
            return Err(ConferenceError::not_found("active conference"));
        };

        let before = Observed::capture(conference);
        let mut svc = CoreServices::new(&mut self.calls, &mut self.signaling, &mut self.media);
        let result = op(conference, &mut svc);
        let changes = before.changes_to(&Observed::capture(conference));
        let finished = conference.is_finished().then(|| conference.id());

        for event in changes {
            self.publish(event);
        }
        if let Some(id) = finished {
            self.conference = None;
            info!("Conference {} finished", id);
            self.publish(ConferenceEvent::Finished { id });
        }
        result
    }

    fn notify(&mut self, notification: Notification) -> Result<()> {
        let subscription = self
            .conference
            .as_ref()
            .ok_or_else(|| ConferenceError::not_found("active conference"))?
            .subscription();

        let disposition = self.with_conference(|c, svc| {
            let disposition = match notification {
                Notification::StreamStarting {
                    call,
                    paused_by_remote,
                } => {
                    c.on_call_stream_starting(svc, call, paused_by_remote);
                    Disposition::Continue
                }
                Notification::StreamStopping { call } => {
                    c.on_call_stream_stopping(call);
                    Disposition::Continue
                }
                Notification::Terminating { call } => c.on_call_terminating(svc, call),
                Notification::CallStateChanged {
                    subscription: target,
                    call,
                    state,
                } => {
                    if subscription == Some(target) {
                        c.on_call_state_changed(svc, call, state);
                    } else {
                        debug!("Ignoring call state of {} for another subscriber", call);
                    }
                    Disposition::Continue
                }
                Notification::TransferStateChanged {
                    subscription: target,
                    call,
                    state,
                } => {
                    if subscription == Some(target) {
                        c.on_transfer_state_changed(call, state);
                    } else {
                        debug!("Ignoring transfer state of {} for another subscriber", call);
                    }
                    Disposition::Continue
                }
            };
            Ok(disposition)
        })?;

        debug!("Notification handled: {:?}", disposition);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let conference = self
            .conference
            .take()
            .ok_or_else(|| ConferenceError::not_found("active conference"))?;
        let id = conference.id();
        let mut svc = CoreServices::new(&mut self.calls, &mut self.signaling, &mut self.media);
        conference.dispose(&mut svc);
        self.publish(ConferenceEvent::Finished { id });
        Ok(())
    }

    fn snapshot(&self) -> Result<ConferenceSnapshot> {
        let conference = self
            .conference
            .as_ref()
            .ok_or_else(|| ConferenceError::not_found("active conference"))?;
        Ok(ConferenceSnapshot {
            id: conference.id(),
            class: conference.class(),
            size: conference.size(&self.calls),
            is_in: conference.is_in(&self.calls),
            participants: conference.participants(),
            focus_state: conference.focus_state(),
            microphone_muted: conference.microphone_is_muted(),
            subscription: conference.subscription(),
        })
    }

    fn publish(&self, event: ConferenceEvent) {
        debug!("Publishing {:?}", event);
        if self.events.send(event).is_err() {
            debug!("No conference event subscribers");
        }
    }
}

/// Cloneable client of a [`ConferenceHost`]
#[derive(Debug, Clone)]
pub struct ConferenceHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ConferenceEvent>,
}

impl ConferenceHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ConferenceEvent> {
        self.events.subscribe()
    }

    /// Create a local conference; `None` derives params from the video policy
    pub async fn create_local(&self, params: Option<ConferenceParams>) -> Result<ConferenceId> {
        self.request(|reply| Command::CreateLocal { params, reply }).await
    }

    /// Create a conference relayed to the configured focus
    pub async fn create_remote(&self, params: Option<ConferenceParams>) -> Result<ConferenceId> {
        self.request(|reply| Command::CreateRemote { params, reply }).await
    }

    pub async fn add_participant(&self, call: CallId) -> Result<()> {
        self.request(|reply| Command::AddParticipant { call, reply }).await
    }

    pub async fn remove_participant(&self, call: CallId) -> Result<()> {
        self.request(|reply| Command::RemoveParticipant { call, reply }).await
    }

    pub async fn remove_participant_by_address(&self, address: SipAddress) -> Result<()> {
        self.request(|reply| Command::RemoveByAddress { address, reply }).await
    }

    pub async fn terminate(&self) -> Result<()> {
        self.request(|reply| Command::Terminate { reply }).await
    }

    pub async fn enter(&self) -> Result<()> {
        self.request(|reply| Command::Enter { reply }).await
    }

    pub async fn leave(&self) -> Result<()> {
        self.request(|reply| Command::Leave { reply }).await
    }

    pub async fn start_recording(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.request(|reply| Command::StartRecording { path, reply }).await
    }

    pub async fn stop_recording(&self) -> Result<()> {
        self.request(|reply| Command::StopRecording { reply }).await
    }

    pub async fn mute_microphone(&self, muted: bool) -> Result<()> {
        self.request(|reply| Command::MuteMicrophone { muted, reply }).await
    }

    pub async fn input_volume(&self) -> Result<f32> {
        self.request(|reply| Command::InputVolume { reply }).await
    }

    pub async fn snapshot(&self) -> Result<ConferenceSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Deliver a call-side notification and wait until it is handled
    pub async fn notify(&self, notification: Notification) -> Result<()> {
        self.request(|reply| Command::Notify {
            notification,
            reply,
        })
        .await
    }

    /// Dispose of the active conference
    pub async fn close(&self) -> Result<()> {
        self.request(|reply| Command::Close { reply }).await
    }

    /// Stop the host; the active conference is disposed
    pub async fn shutdown(&self) -> Result<()> {
        if self.commands.send(Command::Shutdown).await.is_err() {
            warn!("Conference host already stopped");
        }
        Ok(())
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).await?;
        response.await?
    }
}

//! # RVoIP Conference Core
//!
//! Multi-party audio conference orchestration on top of a SIP call stack.
//!
//! A conference decides how calls attach to, detach from, and are represented
//! within a multi-party session. Two strategies are provided:
//!
//! - **Local conference**: audio is bridged on this device by a mixing engine.
//!   Every attached call contributes one mixer endpoint, the device's own
//!   microphone/speaker contributes a loop-back endpoint.
//! - **Remote conference**: audio is bridged by a remote focus server. The local
//!   party calls the focus and relays every admitted call to it with a SIP
//!   transfer.
//!
//! ## Architecture
//!
//! - `conference`: the [`Conference`] enum and its two variants
//! - `collaborators`: traits for the call manager, signaling layer and media engine
//! - `host`: a single-task tokio dispatcher that owns the collaborators and the
//!   active conference, and serializes every operation and notification
//! - `address`: SIP address parsing and identity comparison
//! - `config`, `logging`, `errors`: ambient plumbing
//!
//! Conferences never own calls. They hold [`CallId`]s resolved against the
//! [`CallManager`], and every call carries a weak back-reference
//! ([`ConferenceId`]) to the conference it belongs to.

pub mod address;
pub mod collaborators;
pub mod conference;
pub mod config;
pub mod errors;
pub mod host;
pub mod logging;
pub mod types;

pub use address::{Scheme, SipAddress};
pub use collaborators::{
    CallManager, CoreServices, LoopbackRoute, MediaEngine, MicGain, MixerSession, PayloadType,
    SignalingLayer, TransportProfile,
};
pub use conference::{
    Conference, ConferenceParams, Disposition, LocalConference, Participant, RemoteConference,
};
pub use config::ConferenceConfig;
pub use errors::{ConferenceError, Result};
pub use host::{ConferenceEvent, ConferenceHandle, ConferenceHost, ConferenceSnapshot, Notification};
pub use types::*;

//! Conference participant

use crate::address::SipAddress;
use crate::collaborators::CallManager;
use crate::errors::{ConferenceError, Result};
use crate::types::CallId;

/// A remote call attached to a conference
///
/// Identity is the remote SIP address: two participants are equal when their
/// addresses are, whichever call currently carries them.
#[derive(Debug, Clone)]
pub struct Participant {
    address: SipAddress,
    call: Option<CallId>,
}

impl Participant {
    pub fn new(address: SipAddress, call: CallId) -> Self {
        Self {
            address,
            call: Some(call),
        }
    }

    /// Capture the remote address of `call`
    pub fn from_call(calls: &dyn CallManager, call: CallId) -> Result<Self> {
        let address = calls
            .remote_address(call)
            .ok_or_else(|| ConferenceError::not_found(format!("remote address of {}", call)))?;
        Ok(Self::new(address, call))
    }

    pub fn address(&self) -> &SipAddress {
        &self.address
    }

    pub fn call(&self) -> Option<CallId> {
        self.call
    }

    /// Re-point the participant at a call that replaced the previous one
    pub fn set_call(&mut self, call: Option<CallId>) {
        self.call = call;
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Participant {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_address() {
        let addr = SipAddress::parse("sip:alice@example.com").unwrap();
        let a = Participant::new(addr.clone(), CallId::new());
        let b = Participant::new(addr.with_display_name("Alice"), CallId::new());
        assert_eq!(a, b);

        let c = Participant::new(SipAddress::parse("sip:bob@example.com").unwrap(), CallId::new());
        assert_ne!(a, c);
    }

    #[test]
    fn test_repoint_call() {
        let first = CallId::new();
        let second = CallId::new();
        let mut participant =
            Participant::new(SipAddress::parse("sip:alice@example.com").unwrap(), first);
        let copy = participant.clone();

        participant.set_call(Some(second));
        assert_eq!(participant.call(), Some(second));
        assert_eq!(copy.call(), Some(first));
        assert_eq!(participant, copy);
    }
}

//! Delivery/read lifecycle state machine.
//!
//! `Sending → Sent → Delivered → Read` on the happy path, with the terminal
//! `Failed` state reachable only from `Sending` (retry ceiling exhausted or
//! permanent rejection). A status never regresses: [`DeliveryStatus::advanced_to`]
//! is the only sanctioned transition function.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Queued locally, not yet acknowledged by the remote store.
    Sending,
    /// Remote write acknowledged.
    Sent,
    /// Another participant has opened the conversation.
    Delivered,
    /// Another participant kept the conversation visible past the dwell time.
    Read,
    /// Retry ceiling exhausted or permanently rejected. Terminal.
    Failed,
}

impl DeliveryStatus {
    /// Position on the happy path; `Failed` sits outside it.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Sending => Some(0),
            Self::Sent => Some(1),
            Self::Delivered => Some(2),
            Self::Read => Some(3),
            Self::Failed => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self.rank(), next.rank()) {
            // Happy path: forward only.
            (Some(cur), Some(nxt)) => nxt > cur,
            // Failed is reachable only from Sending.
            (Some(_), None) => self == Self::Sending,
            // Nothing leaves Failed.
            (None, _) => false,
        }
    }

    /// Apply a transition, keeping the current status when it would regress.
    #[must_use]
    pub fn advanced_to(self, next: Self) -> Self {
        if self.can_advance_to(next) {
            next
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::DeliveryStatus;
    use super::DeliveryStatus::*;

    #[test]
    fn happy_path_is_forward_only() {
        assert_eq!(Sending.advanced_to(Sent), Sent);
        assert_eq!(Sent.advanced_to(Delivered), Delivered);
        assert_eq!(Delivered.advanced_to(Read), Read);
        // Skipping Delivered is allowed (recipient dwelled immediately).
        assert_eq!(Sent.advanced_to(Read), Read);
    }

    #[test]
    fn status_never_regresses() {
        assert_eq!(Read.advanced_to(Sent), Read);
        assert_eq!(Delivered.advanced_to(Sending), Delivered);
        assert_eq!(Sent.advanced_to(Sent), Sent);
    }

    #[test]
    fn failed_only_from_sending() {
        assert_eq!(Sending.advanced_to(Failed), Failed);
        assert_eq!(Sent.advanced_to(Failed), Sent);
        assert_eq!(Failed.advanced_to(Sent), Failed);
    }

    #[test]
    fn round_trips_through_str() {
        for s in [Sending, Sent, Delivered, Read, Failed] {
            assert_eq!(DeliveryStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(DeliveryStatus::parse("lu"), None);
    }
}

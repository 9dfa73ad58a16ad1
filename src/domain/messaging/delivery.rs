//! Per-recipient delivery status tracking.
//!
//! One `DeliveryRecord` exists per (message, recipient) pair, stored in a
//! status subcollection under the message and keyed by recipient id.
//! Progression is SENT -> DELIVERED -> READ; FAILED is a terminal side
//! state reached only through external error paths.
//!
//! The bus delivers at least once and status writes race each other, so
//! transitions are rank-forward: a write only applies if it advances the
//! record. A late DELIVERED arriving after READ is silently ignored.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

/// Delivery state of a message for a single recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryState {
    /// Position in the forward progression. FAILED sits beside DELIVERED:
    /// it may replace SENT or DELIVERED but never READ.
    fn rank(self) -> u8 {
        match self {
            DeliveryState::Sent => 0,
            DeliveryState::Delivered => 1,
            DeliveryState::Failed => 1,
            DeliveryState::Read => 2,
        }
    }

    /// Whether a transition from `self` to `next` moves forward.
    pub fn can_advance_to(self, next: DeliveryState) -> bool {
        next.rank() > self.rank()
    }
}

/// Per-recipient delivery status document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub user_id: UserId,
    pub status: DeliveryState,
    pub sent_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<Timestamp>,
}

impl DeliveryRecord {
    /// Creates the initial SENT record written when a message is created.
    pub fn sent(user_id: UserId, at: Timestamp) -> Self {
        Self {
            user_id,
            status: DeliveryState::Sent,
            sent_at: at,
            delivered_at: None,
            read_at: None,
        }
    }

    /// Creates a record directly in READ state. Used when a read receipt
    /// arrives before the fanout created the SENT record; `sent_at` is
    /// synthesized from the read time.
    pub fn read_directly(user_id: UserId, at: Timestamp) -> Self {
        Self {
            user_id,
            status: DeliveryState::Read,
            sent_at: at,
            delivered_at: None,
            read_at: Some(at),
        }
    }

    /// Applies a rank-forward transition, stamping the matching timestamp.
    ///
    /// Returns `true` if the record changed, `false` if the transition was
    /// regressive or redundant and was ignored.
    pub fn advance(&mut self, next: DeliveryState, at: Timestamp) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        match next {
            DeliveryState::Delivered => self.delivered_at = Some(at),
            DeliveryState::Read => self.read_at = Some(at),
            DeliveryState::Sent | DeliveryState::Failed => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn sent_record_has_no_delivery_timestamps() {
        let record = DeliveryRecord::sent(user("bob"), Timestamp::now());
        assert_eq!(record.status, DeliveryState::Sent);
        assert!(record.delivered_at.is_none());
        assert!(record.read_at.is_none());
    }

    #[test]
    fn sent_advances_to_delivered() {
        let mut record = DeliveryRecord::sent(user("bob"), Timestamp::now());
        assert!(record.advance(DeliveryState::Delivered, Timestamp::now()));
        assert_eq!(record.status, DeliveryState::Delivered);
        assert!(record.delivered_at.is_some());
    }

    #[test]
    fn sent_advances_straight_to_read() {
        let mut record = DeliveryRecord::sent(user("bob"), Timestamp::now());
        assert!(record.advance(DeliveryState::Read, Timestamp::now()));
        assert_eq!(record.status, DeliveryState::Read);
        assert!(record.read_at.is_some());
    }

    #[test]
    fn delivered_after_read_does_not_regress() {
        let mut record = DeliveryRecord::sent(user("bob"), Timestamp::now());
        record.advance(DeliveryState::Read, Timestamp::now());

        assert!(!record.advance(DeliveryState::Delivered, Timestamp::now()));
        assert_eq!(record.status, DeliveryState::Read);
    }

    #[test]
    fn duplicate_delivered_is_ignored() {
        let mut record = DeliveryRecord::sent(user("bob"), Timestamp::now());
        let first = Timestamp::now();
        assert!(record.advance(DeliveryState::Delivered, first));
        assert!(!record.advance(DeliveryState::Delivered, Timestamp::now()));
        assert_eq!(record.delivered_at, Some(first));
    }

    #[test]
    fn failed_never_overwrites_read() {
        let mut record = DeliveryRecord::sent(user("bob"), Timestamp::now());
        record.advance(DeliveryState::Read, Timestamp::now());
        assert!(!record.advance(DeliveryState::Failed, Timestamp::now()));
        assert_eq!(record.status, DeliveryState::Read);
    }

    #[test]
    fn failed_replaces_sent() {
        let mut record = DeliveryRecord::sent(user("bob"), Timestamp::now());
        assert!(record.advance(DeliveryState::Failed, Timestamp::now()));
        assert_eq!(record.status, DeliveryState::Failed);
    }

    #[test]
    fn read_directly_synthesizes_sent_at() {
        let at = Timestamp::now();
        let record = DeliveryRecord::read_directly(user("bob"), at);
        assert_eq!(record.status, DeliveryState::Read);
        assert_eq!(record.sent_at, at);
        assert_eq!(record.read_at, Some(at));
    }

    #[test]
    fn status_uses_wire_vocabulary() {
        let json = serde_json::to_string(&DeliveryState::Delivered).unwrap();
        assert_eq!(json, "\"DELIVERED\"");
    }
}

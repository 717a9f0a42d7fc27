//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use scrollback_core::ReadPosition;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Active conversation must be open.
///
/// If `active` is `Some(key)`, then `conversations` must contain `key`. This
/// prevents the UI from focusing a conversation that was closed.
pub struct ActiveConversationOpen;

impl Invariant for ActiveConversationOpen {
    fn name(&self) -> &'static str {
        "active_conversation_open"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if let Some(active) = &state.active
            && !state.conversations.contains_key(active)
        {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "active {active} not in conversations {:?}",
                    state.conversations.keys().collect::<Vec<_>>()
                ),
            });
        }
        Ok(())
    }
}

/// No message identity appears twice in one conversation.
///
/// Re-delivery and overlapping backfill must be no-ops.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (key, conversation) in &state.conversations {
            let mut seen = HashSet::new();
            for id in &conversation.message_ids {
                if !seen.insert(id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("{key}: message {id} stored twice"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Deleted messages keep their position but lose body and reactions.
pub struct TombstonesStayEmpty;

impl Invariant for TombstonesStayEmpty {
    fn name(&self) -> &'static str {
        "tombstones_stay_empty"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (key, conversation) in &state.conversations {
            if let Some(tombstone) =
                conversation.tombstones.iter().find(|t| !t.body.is_empty() || t.reactions > 0)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{key}: tombstone {:?} still has content", tombstone.id),
                });
            }
        }
        Ok(())
    }
}

/// Roster keys are the folded nicks of their members, even after renames.
pub struct RosterKeysConsistent;

impl Invariant for RosterKeysConsistent {
    fn name(&self) -> &'static str {
        "roster_keys_consistent"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        match state.conversations.iter().find(|(_, c)| !c.roster_consistent) {
            Some((key, _)) => Err(Violation {
                invariant: self.name(),
                message: format!("{key}: roster key does not match member nick"),
            }),
            None => Ok(()),
        }
    }
}

/// At most one history request is outstanding per conversation, and none for
/// a conversation that is not open.
pub struct SingleOutstandingBackfill;

impl Invariant for SingleOutstandingBackfill {
    fn name(&self) -> &'static str {
        "single_outstanding_backfill"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (key, &count) in &state.outstanding_requests {
            if count > 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{key}: {count} outstanding history requests"),
                });
            }
            if !state.conversations.contains_key(key) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{key}: request outstanding for closed conversation"),
                });
            }
        }
        Ok(())
    }
}

/// Stored read positions never move backwards.
///
/// Positions whose messages are still held compare by conversation order,
/// the rest by timestamp.
pub struct ReadPositionMonotonicity;

impl Invariant for ReadPositionMonotonicity {
    fn name(&self) -> &'static str {
        "read_position_monotonicity"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (key, history) in &state.read_history {
            let ids = state
                .conversations
                .get(key)
                .map(|conversation| conversation.message_ids.as_slice())
                .unwrap_or_default();
            let index = |position: &ReadPosition| {
                position.id.as_ref().and_then(|id| ids.iter().position(|held| held == id))
            };
            for window in history.windows(2) {
                let (before, after) = (&window[0], &window[1]);
                let backwards = match (index(before), index(after)) {
                    (Some(before), Some(after)) => after < before,
                    _ => after.timestamp < before.timestamp,
                };
                if backwards {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("{key}: read position moved back {before:?} → {after:?}"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Unread boundaries index an existing message.
pub struct BoundaryInRange;

impl Invariant for BoundaryInRange {
    fn name(&self) -> &'static str {
        "boundary_in_range"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (key, conversation) in &state.conversations {
            if let Some(index) = conversation.boundary
                && index >= conversation.len
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{key}: boundary {index} beyond {} messages", conversation.len),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use scrollback_core::{ConversationKey, MessageId};

    use super::*;
    use crate::invariants::{ConversationSnapshot, TombstoneSnapshot};

    fn with_conversation(conversation: ConversationSnapshot) -> SystemSnapshot {
        let mut snapshot = SystemSnapshot::empty();
        snapshot.conversations.insert(ConversationKey::new("#rust"), conversation);
        snapshot
    }

    fn healthy() -> ConversationSnapshot {
        ConversationSnapshot { roster_consistent: true, ..ConversationSnapshot::default() }
    }

    #[test]
    fn dangling_active_is_flagged() {
        let snapshot =
            SystemSnapshot { active: Some(ConversationKey::new("#gone")), ..SystemSnapshot::empty() };
        assert!(ActiveConversationOpen.check(&snapshot).is_err());

        let mut snapshot = with_conversation(healthy());
        snapshot.active = Some(ConversationKey::new("#RUST"));
        assert!(ActiveConversationOpen.check(&snapshot).is_ok());
    }

    #[test]
    fn duplicate_ids_are_flagged() {
        let snapshot = with_conversation(ConversationSnapshot {
            len: 2,
            message_ids: vec![MessageId::new("1"), MessageId::new("1")],
            ..healthy()
        });
        let violation = UniqueMessageIds.check(&snapshot).unwrap_err();
        assert_eq!(violation.to_string(), "unique_message_ids: #rust: message 1 stored twice");
    }

    #[test]
    fn tombstone_with_body_is_flagged() {
        let snapshot = with_conversation(ConversationSnapshot {
            tombstones: vec![TombstoneSnapshot { id: None, body: "x".into(), reactions: 0 }],
            ..healthy()
        });
        assert!(TombstonesStayEmpty.check(&snapshot).is_err());
    }

    #[test]
    fn request_for_closed_conversation_is_flagged() {
        let mut snapshot = with_conversation(healthy());
        snapshot.outstanding_requests.insert(ConversationKey::new("#rust"), 1);
        assert!(SingleOutstandingBackfill.check(&snapshot).is_ok());

        snapshot.outstanding_requests.insert(ConversationKey::new("#other"), 1);
        assert!(SingleOutstandingBackfill.check(&snapshot).is_err());
    }

    #[test]
    fn read_positions_follow_conversation_order() {
        let position = |id: &str, secs: i64| ReadPosition {
            id: Some(id.into()),
            timestamp: chrono::DateTime::from_timestamp(secs, 0).unwrap(),
        };
        let mut snapshot = with_conversation(ConversationSnapshot {
            len: 2,
            message_ids: vec![MessageId::new("1"), MessageId::new("2")],
            ..healthy()
        });
        let key = ConversationKey::new("#rust");

        // Later in the conversation, earlier on the server clock.
        snapshot.read_history.insert(key.clone(), vec![position("1", 10), position("2", 5)]);
        assert!(ReadPositionMonotonicity.check(&snapshot).is_ok());

        snapshot.read_history.insert(key.clone(), vec![position("2", 5), position("1", 10)]);
        assert!(ReadPositionMonotonicity.check(&snapshot).is_err());

        // Trimmed identities compare by time.
        snapshot.read_history.insert(key, vec![position("gone", 10), position("2", 5)]);
        assert!(ReadPositionMonotonicity.check(&snapshot).is_err());
    }

    #[test]
    fn boundary_past_end_is_flagged() {
        let snapshot =
            with_conversation(ConversationSnapshot { len: 2, boundary: Some(2), ..healthy() });
        assert!(BoundaryInRange.check(&snapshot).is_err());
    }
}

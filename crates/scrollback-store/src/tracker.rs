//! Snapshot-before-update read tracking.
//!
//! The unread boundary shown when a conversation opens must be computed from
//! the position as it stood before this viewing session. Opening a
//! conversation immediately records the newest message as read, so the prior
//! position is captured once per open, before the first write can overwrite
//! it, and handed out until the conversation is closed again.

use std::{cmp::Ordering, collections::HashMap};

use scrollback_core::{ConversationKey, ReadPosition};

use crate::{ReadPositionStore, StoreError};

/// Per-conversation read positions with viewing-session snapshots.
pub struct ReadPositionTracker<S: ReadPositionStore> {
    store: S,
    /// Position captured at open, per conversation being viewed. The inner
    /// `None` means nothing was stored when the session began.
    snapshots: HashMap<ConversationKey, Option<ReadPosition>>,
}

impl<S: ReadPositionStore> ReadPositionTracker<S> {
    /// Track positions persisted in `store`.
    pub fn new(store: S) -> Self {
        Self { store, snapshots: HashMap::new() }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Start a viewing session, capturing the prior position.
    ///
    /// Idempotent while the session is open: the first capture wins. Returns
    /// the captured position.
    pub fn begin_viewing(
        &mut self,
        key: &ConversationKey,
    ) -> Result<Option<ReadPosition>, StoreError> {
        if let Some(snapshot) = self.snapshots.get(key) {
            return Ok(snapshot.clone());
        }
        let prior = self.store.load(key)?;
        tracing::debug!(conversation = %key, ?prior, "Captured prior read position");
        self.snapshots.insert(key.clone(), prior.clone());
        Ok(prior)
    }

    /// Whether a viewing session is open for `key`.
    pub fn is_viewing(&self, key: &ConversationKey) -> bool {
        self.snapshots.contains_key(key)
    }

    /// Persist `position` as read.
    ///
    /// Captures the prior position first if no viewing session is open, so a
    /// write can never destroy the snapshot. Positions only move forward in
    /// time: a position older than the stored one is ignored. Returns whether
    /// the store was written.
    pub fn record_read(
        &mut self,
        key: &ConversationKey,
        position: ReadPosition,
    ) -> Result<bool, StoreError> {
        self.record_read_by(key, position, |a, b| a.timestamp.cmp(&b.timestamp))
    }

    /// Persist `position` as read unless `order` puts it behind the stored
    /// one.
    ///
    /// Callers that hold the conversation pass its message order, so a late
    /// arrival with a skewed server timestamp still moves the position.
    pub fn record_read_by(
        &mut self,
        key: &ConversationKey,
        position: ReadPosition,
        order: impl FnOnce(&ReadPosition, &ReadPosition) -> Ordering,
    ) -> Result<bool, StoreError> {
        self.begin_viewing(key)?;

        let current = self.store.load(key)?;
        if let Some(current) = &current
            && (*current == position || order(&position, current) == Ordering::Less)
        {
            return Ok(false);
        }
        self.store.save(key, &position)?;
        Ok(true)
    }

    /// Position as it stood before the current viewing session.
    ///
    /// Falls back to the stored position when no session is open.
    pub fn prior_read_position(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<ReadPosition>, StoreError> {
        match self.snapshots.get(key) {
            Some(snapshot) => Ok(snapshot.clone()),
            None => self.store.load(key),
        }
    }

    /// End the viewing session so the next open captures afresh.
    pub fn end_viewing(&mut self, key: &ConversationKey) {
        self.snapshots.remove(key);
    }

    /// Latest persisted position.
    pub fn current(&self, key: &ConversationKey) -> Result<Option<ReadPosition>, StoreError> {
        self.store.load(key)
    }

    /// Store `position` only if nothing was ever recorded for `key`.
    ///
    /// Used when a conversation is created so that traffic arriving after its
    /// creation counts as unread while earlier backfill does not. Returns
    /// whether the store was written.
    pub fn seed_if_absent(
        &mut self,
        key: &ConversationKey,
        position: &ReadPosition,
    ) -> Result<bool, StoreError> {
        if self.store.load(key)?.is_some() {
            return Ok(false);
        }
        self.store.save(key, position)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use scrollback_core::MessageId;

    use super::*;
    use crate::MemoryStore;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn position(id: &str, secs: i64) -> ReadPosition {
        ReadPosition { id: Some(id.into()), timestamp: at(secs) }
    }

    #[test]
    fn snapshot_survives_record_read() {
        let mut tracker = ReadPositionTracker::new(MemoryStore::new());
        let key = ConversationKey::new("#rust");
        tracker.record_read(&key, position("1", 0)).unwrap();
        tracker.end_viewing(&key);

        assert_eq!(tracker.begin_viewing(&key).unwrap(), Some(position("1", 0)));
        tracker.record_read(&key, position("6", 5)).unwrap();

        assert_eq!(tracker.prior_read_position(&key).unwrap(), Some(position("1", 0)));
        assert_eq!(tracker.current(&key).unwrap(), Some(position("6", 5)));

        // A second begin while still viewing keeps the first capture.
        assert_eq!(tracker.begin_viewing(&key).unwrap(), Some(position("1", 0)));

        tracker.end_viewing(&key);
        assert_eq!(tracker.prior_read_position(&key).unwrap(), Some(position("6", 5)));
    }

    #[test]
    fn record_without_open_still_snapshots() {
        let mut tracker = ReadPositionTracker::new(MemoryStore::new());
        let key = ConversationKey::new("#rust");
        tracker.store().save(&key, &position("1", 0)).unwrap();

        tracker.record_read(&key, position("2", 1)).unwrap();
        assert!(tracker.is_viewing(&key));
        assert_eq!(tracker.prior_read_position(&key).unwrap(), Some(position("1", 0)));
    }

    #[test]
    fn positions_never_move_backwards() {
        let mut tracker = ReadPositionTracker::new(MemoryStore::new());
        let key = ConversationKey::new("#rust");
        assert!(tracker.record_read(&key, position("5", 5)).unwrap());
        assert!(!tracker.record_read(&key, position("3", 3)).unwrap());
        assert!(!tracker.record_read(&key, position("5", 5)).unwrap());
        assert_eq!(tracker.current(&key).unwrap(), Some(position("5", 5)));
    }

    #[test]
    fn caller_order_overrides_timestamps() {
        let mut tracker = ReadPositionTracker::new(MemoryStore::new());
        let key = ConversationKey::new("#rust");
        let arrival = ["1", "2"];
        let by_arrival = |a: &ReadPosition, b: &ReadPosition| {
            let index = |p: &ReadPosition| {
                let id = p.id.as_ref().map(MessageId::as_str);
                arrival.iter().position(|held| Some(*held) == id)
            };
            index(a).cmp(&index(b))
        };

        tracker.record_read(&key, position("1", 10)).unwrap();
        // Arrived later, stamped earlier.
        assert!(!tracker.record_read(&key, position("2", 5)).unwrap());
        assert!(tracker.record_read_by(&key, position("2", 5), by_arrival).unwrap());
        assert_eq!(tracker.current(&key).unwrap(), Some(position("2", 5)));
        assert!(!tracker.record_read_by(&key, position("1", 10), by_arrival).unwrap());
    }

    #[test]
    fn seed_only_when_absent() {
        let mut tracker = ReadPositionTracker::new(MemoryStore::new());
        let key = ConversationKey::new("alice");
        assert!(tracker.seed_if_absent(&key, &ReadPosition::at_time(at(0))).unwrap());
        assert!(!tracker.seed_if_absent(&key, &ReadPosition::at_time(at(9))).unwrap());
        assert_eq!(tracker.current(&key).unwrap(), Some(ReadPosition::at_time(at(0))));
    }
}

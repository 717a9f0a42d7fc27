//! Read-position persistence and snapshot ordering tests.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use scrollback_core::{
    ConversationEvent, ConversationKey, ConversationStore, Identity, IncomingMessage, MessageId,
    ReadPosition, StoreConfig,
};
use scrollback_store::{
    ChaoticStore, MemoryStore, ReadPositionStore, ReadPositionTracker, RedbStore, StoreError,
};
use tempfile::tempdir;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
}

fn received(id: u32, sender: &str) -> ConversationEvent {
    ConversationEvent::MessageReceived {
        target: "#rust".into(),
        message: IncomingMessage {
            id: Some(MessageId::new(id.to_string())),
            sender: sender.into(),
            body: format!("message {id}"),
            timestamp: at(i64::from(id)),
            is_action: false,
            reply_to: None,
        },
    }
}

#[test]
fn positions_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("positions.redb");
    let rust = ConversationKey::new("#Rust");
    let alice = ConversationKey::new("alice");

    {
        let store = RedbStore::open(&db_path).unwrap();
        let mut tracker = ReadPositionTracker::new(store);
        tracker.record_read(&rust, ReadPosition { id: Some("41".into()), timestamp: at(41) }).unwrap();
        tracker.record_read(&alice, ReadPosition::at_time(at(7))).unwrap();

        // Database dropped
    }

    {
        let store = RedbStore::open(&db_path).unwrap();
        let mut listed = store.list().unwrap();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(listed.len(), 2);

        let mut tracker = ReadPositionTracker::new(store);
        let prior = tracker.begin_viewing(&ConversationKey::new("#rust")).unwrap();
        assert_eq!(prior, Some(ReadPosition { id: Some("41".into()), timestamp: at(41) }));
        assert_eq!(tracker.current(&alice).unwrap(), Some(ReadPosition::at_time(at(7))));
    }
}

/// INVARIANT: the boundary computed at open uses the position captured before
/// the open overwrote it.
#[test]
fn boundary_uses_position_from_before_open() {
    let key = ConversationKey::new("#rust");
    let me = Identity::new("me");
    let mut tracker = ReadPositionTracker::new(MemoryStore::new());
    let mut store = ConversationStore::new("#rust", StoreConfig::default(), me.clone());

    // Session one: read up to message 1, then leave.
    store.apply(&received(1, "alice"), at(1));
    tracker.begin_viewing(&key).unwrap();
    tracker.record_read(&key, store.latest_position().unwrap()).unwrap();
    tracker.end_viewing(&key);

    // Five messages arrive while away.
    for id in 2..=6 {
        store.apply(&received(id, "bob"), at(i64::from(id)));
    }

    // Session two: open, then record the newest as read straight away.
    tracker.begin_viewing(&key).unwrap();
    tracker.record_read(&key, store.latest_position().unwrap()).unwrap();

    let prior = tracker.prior_read_position(&key).unwrap().unwrap();
    let boundary = store.unread_boundary(&prior, &me).unwrap();
    assert_eq!(boundary.id, Some(MessageId::new("2")));

    // The just-written position would have hidden the separator.
    let current = tracker.current(&key).unwrap().unwrap();
    assert_eq!(store.unread_boundary(&current, &me), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_chaos_never_corrupts_positions(
        failure_rate in 0.0..0.7,
        seed in any::<u64>(),
        writes in prop::collection::vec(0i64..1000, 1..40),
    ) {
        let key = ConversationKey::new("#rust");
        let store = ChaoticStore::with_seed(MemoryStore::new(), failure_rate, seed);
        let mut tracker = ReadPositionTracker::new(store.clone());

        let mut persisted: Option<ReadPosition> = None;
        for secs in writes {
            let position = ReadPosition::at_time(at(secs));
            match tracker.record_read(&key, position.clone()) {
                Ok(true) => persisted = Some(position),
                Ok(false) => {},
                Err(err) => prop_assert!(matches!(err, StoreError::Injected { .. }), "unexpected error: {:?}", err),
            }
            prop_assert_eq!(store.inner().load(&key).unwrap(), persisted.clone());
        }

        // Stored positions only ever move forward.
        if let Some(stored) = store.inner().load(&key).unwrap() {
            prop_assert!(persisted.is_some_and(|p| p.timestamp == stored.timestamp));
        }
    }
}

//! Property-based tests for the conversation store.
//!
//! Arbitrary event sequences, duplicated and reordered, must leave the store
//! without duplicate identities and in a single consistent order.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use scrollback_core::{
    ConversationEvent, ConversationStore, HistoryDirection, Identity, IncomingMessage, MessageId,
    StoreConfig,
};

const TARGET: &str = "#rust";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
}

/// Message whose timestamp follows its numeric identity.
fn incoming(id: u32, sender: &str) -> IncomingMessage {
    IncomingMessage {
        id: Some(MessageId::new(id.to_string())),
        sender: sender.into(),
        body: format!("message {id}"),
        timestamp: at(i64::from(id)),
        is_action: false,
        reply_to: None,
    }
}

fn sender_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["alice", "bob", "carol", "me"])
}

fn event_strategy() -> impl Strategy<Value = ConversationEvent> {
    let id = 1u32..40;
    prop_oneof![
        4 => (id.clone(), sender_strategy()).prop_map(|(id, sender)| {
            ConversationEvent::MessageReceived { target: TARGET.into(), message: incoming(id, sender) }
        }),
        1 => (id.clone(), "[a-z]{1,8}").prop_map(|(id, body)| ConversationEvent::MessageEdited {
            target: TARGET.into(),
            id: MessageId::new(id.to_string()),
            body,
        }),
        1 => id.clone().prop_map(|id| ConversationEvent::MessageDeleted {
            target: TARGET.into(),
            id: MessageId::new(id.to_string()),
        }),
        1 => (id.clone(), sender_strategy()).prop_map(|(id, reactor)| {
            ConversationEvent::ReactionAdded {
                target: TARGET.into(),
                id: MessageId::new(id.to_string()),
                emoji: "👍".into(),
                reactor: reactor.into(),
            }
        }),
        1 => (id, sender_strategy()).prop_map(|(id, reactor)| ConversationEvent::ReactionRemoved {
            target: TARGET.into(),
            id: MessageId::new(id.to_string()),
            emoji: "👍".into(),
            reactor: reactor.into(),
        }),
        1 => sender_strategy().prop_map(|nick| ConversationEvent::MemberJoined {
            target: TARGET.into(),
            nick: nick.into(),
            verified: false,
        }),
        1 => sender_strategy().prop_map(|nick| ConversationEvent::MemberQuit {
            nick: nick.into(),
            reason: None,
        }),
    ]
}

fn new_store() -> ConversationStore {
    ConversationStore::new(TARGET, StoreConfig::default(), Identity::new("me"))
}

fn assert_unique_ids(store: &ConversationStore) -> Result<(), TestCaseError> {
    let mut seen = HashSet::new();
    for id in store.messages().iter().filter_map(|m| m.id.as_ref()) {
        prop_assert!(seen.insert(id.clone()), "duplicate identity {}", id);
    }
    Ok(())
}

fn assert_chronological(store: &ConversationStore) -> Result<(), TestCaseError> {
    let timestamps: Vec<_> = store.messages().iter().map(|m| m.timestamp).collect();
    prop_assert!(timestamps.windows(2).all(|w| w[0] <= w[1]), "not chronological: {:?}", timestamps);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_redelivery_is_a_noop(events in prop::collection::vec(event_strategy(), 0..60)) {
        let mut once = new_store();
        let mut twice = new_store();

        for event in &events {
            once.apply(event, at(0));
            twice.apply(event, at(0));
            twice.apply(event, at(0));
        }

        prop_assert_eq!(once.messages(), twice.messages());
        prop_assert_eq!(once.roster(), twice.roster());
        assert_unique_ids(&twice)?;
    }

    #[test]
    fn prop_live_messages_keep_arrival_order(ids in prop::collection::vec(1u32..500, 0..50)) {
        let mut store = new_store();
        let mut arrived: Vec<String> = Vec::new();

        for id in ids {
            let event = ConversationEvent::MessageReceived {
                target: TARGET.into(),
                message: incoming(id, "alice"),
            };
            if store.apply(&event, at(0)).change().is_some() {
                arrived.push(id.to_string());
            }
        }

        let stored: Vec<String> =
            store.messages().iter().filter_map(|m| m.id.as_ref().map(ToString::to_string)).collect();
        prop_assert_eq!(stored, arrived);
    }

    #[test]
    fn prop_overlapping_backfill_never_duplicates(
        live_from in 100u32..120,
        pages in prop::collection::vec((1u32..130, 1usize..30), 1..6),
    ) {
        let mut store = new_store();
        for id in live_from..live_from + 10 {
            let event = ConversationEvent::MessageReceived {
                target: TARGET.into(),
                message: incoming(id, "bob"),
            };
            store.apply(&event, at(0));
        }

        let mut expected: HashSet<u32> = (live_from..live_from + 10).collect();
        for (start, len) in pages {
            // Pages arrive newest first, the way servers often return them.
            let page: Vec<IncomingMessage> =
                (start..start + len as u32).rev().map(|id| incoming(id, "carol")).collect();
            let fresh = page
                .iter()
                .filter(|m| !expected.contains(&m.id.as_ref().unwrap().as_str().parse::<u32>().unwrap()))
                .count();
            let report = store.merge_history(page.clone(), HistoryDirection::Before);
            prop_assert_eq!(report.inserted, fresh);
            prop_assert_eq!(report.inserted + report.skipped, page.len());
            expected.extend(start..start + len as u32);

            assert_unique_ids(&store)?;
            assert_chronological(&store)?;
        }
        prop_assert_eq!(store.len(), expected.len());
    }

    #[test]
    fn prop_reactions_are_sets(reactors in prop::collection::vec(sender_strategy(), 1..20)) {
        let mut store = new_store();
        let message =
            ConversationEvent::MessageReceived { target: TARGET.into(), message: incoming(1, "alice") };
        store.apply(&message, at(0));

        for reactor in &reactors {
            let add = ConversationEvent::ReactionAdded {
                target: TARGET.into(),
                id: MessageId::new("1"),
                emoji: "🎉".into(),
                reactor: (*reactor).into(),
            };
            store.apply(&add, at(0));
        }

        let distinct: HashSet<&str> = reactors.iter().copied().collect();
        let held = &store.messages()[0].reactions;
        prop_assert_eq!(held.count("🎉"), distinct.len());

        for reactor in &distinct {
            let remove = ConversationEvent::ReactionRemoved {
                target: TARGET.into(),
                id: MessageId::new("1"),
                emoji: "🎉".into(),
                reactor: (*reactor).to_string(),
            };
            store.apply(&remove, at(0));
            store.apply(&remove, at(0));
        }
        prop_assert!(store.messages()[0].reactions.is_empty());
    }
}

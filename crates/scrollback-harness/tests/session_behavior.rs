//! End-to-end session flows on the virtual clock.

use chrono::TimeDelta;
use scrollback_client::{Change, Session, SessionAction, SessionConfig, SessionEvent};
use scrollback_core::{
    ConversationEvent, ConversationKey, Environment, IncomingMessage, MessageId,
};
use scrollback_harness::{LOCAL_NICK, SimEnv, SimInstant};
use scrollback_store::MemoryStore;

struct Fixture {
    env: SimEnv,
    session: Session<SimEnv, MemoryStore>,
}

impl Fixture {
    fn new() -> Self {
        let env = SimEnv::new();
        let config = SessionConfig { nick: LOCAL_NICK.into(), ..SessionConfig::default() };
        let session = Session::new(env.clone(), MemoryStore::new(), config);
        let mut fixture = Self { env, session };
        fixture.protocol(ConversationEvent::Registered { nick: LOCAL_NICK.into() });
        fixture
    }

    fn handle(&mut self, event: SessionEvent<SimInstant>) -> Vec<SessionAction> {
        self.session.handle(event).unwrap()
    }

    fn protocol(&mut self, event: ConversationEvent) -> Vec<SessionAction> {
        self.handle(SessionEvent::Protocol(event))
    }

    /// Message `id` from `sender` to `target`, stamped `id` seconds from now.
    fn receive(&mut self, target: &str, sender: &str, id: u32, body: &str) {
        let timestamp = self.env.wall_clock() + TimeDelta::seconds(i64::from(id));
        self.protocol(ConversationEvent::MessageReceived {
            target: target.into(),
            message: IncomingMessage {
                id: Some(MessageId::new(id.to_string())),
                sender: sender.into(),
                body: body.into(),
                timestamp,
                is_action: false,
                reply_to: None,
            },
        });
    }

    fn open(&mut self, name: &str) -> Vec<SessionAction> {
        self.handle(SessionEvent::Open { conversation: name.into() })
    }

    fn bodies(&self, name: &str) -> Vec<String> {
        self.session
            .registry()
            .get(name)
            .unwrap()
            .messages()
            .iter()
            .filter(|m| !m.is_system())
            .map(|m| m.rendered_body().unwrap_or("<deleted>").to_owned())
            .collect()
    }
}

#[test]
fn direct_messages_share_one_buffer_per_peer() {
    let mut fx = Fixture::new();
    fx.receive(LOCAL_NICK, "Bob", 1, "psst");
    fx.receive("bob", LOCAL_NICK, 2, "what");
    fx.receive(LOCAL_NICK, "bob", 3, "never mind");
    fx.protocol(ConversationEvent::MessageDeleted { target: LOCAL_NICK.into(), id: "3".into() });

    assert_eq!(fx.session.registry().len(), 1);
    assert_eq!(fx.bodies("BOB"), ["psst", "what", "<deleted>"]);

    // Replying means we caught up.
    let counts = fx.session.unread_counts();
    assert_eq!(counts.per_conversation[&ConversationKey::new("bob")].count, 0);
}

#[test]
fn background_mentions_are_flagged_until_opened() {
    let mut fx = Fixture::new();
    fx.receive("#rust", "alice", 1, "morning");
    fx.open("#rust");
    fx.receive("#tokio", "bob", 2, "me: can you review?");

    let counts = fx.session.unread_counts();
    let tokio = &counts.per_conversation[&ConversationKey::new("#tokio")];
    assert_eq!(tokio.count, 1);
    assert!(tokio.mentioned);
    assert_eq!(counts.total, 1);

    fx.open("#tokio");
    let counts = fx.session.unread_counts();
    assert_eq!(counts.total, 0);
    // #rust went to the background fully read.
    assert_eq!(counts.per_conversation[&ConversationKey::new("#rust")].count, 0);
}

#[test]
fn unread_boundary_follows_backfill() {
    let mut fx = Fixture::new();
    fx.receive("#rust", "alice", 10, "first unread");
    fx.receive("#rust", "alice", 11, "second unread");
    fx.open("#rust");
    assert_eq!(fx.session.boundary("#rust").unwrap().index, 0);

    let actions = fx.handle(SessionEvent::ScrollToTop { conversation: "#rust".into() });
    let [SessionAction::RequestHistory(request)] = actions.as_slice() else {
        panic!("expected a history request, got {actions:?}");
    };
    let older = (1..=3)
        .map(|n| IncomingMessage {
            id: Some(MessageId::new(format!("old{n}"))),
            sender: "carol".into(),
            body: format!("old {n}"),
            timestamp: fx.env.wall_clock() - TimeDelta::seconds(10 - n),
            is_action: false,
            reply_to: None,
        })
        .collect();
    fx.handle(SessionEvent::HistoryReceived { request_id: request.request_id, messages: older });

    let boundary = fx.session.boundary("#rust").unwrap();
    assert_eq!(boundary.id, Some(MessageId::new("10")));
    assert_eq!(boundary.index, 3);
    assert_eq!(fx.bodies("#rust")[3], "first unread");
}

#[test]
fn parting_the_active_channel_closes_it() {
    let mut fx = Fixture::new();
    fx.receive("#rust", "alice", 1, "hi");
    fx.open("#rust");

    let actions = fx.protocol(ConversationEvent::MemberParted {
        target: "#rust".into(),
        nick: LOCAL_NICK.into(),
        reason: None,
    });
    let changes: Vec<_> = actions
        .into_iter()
        .filter_map(|action| match action {
            SessionAction::Notify(change) => Some(change),
            _ => None,
        })
        .collect();
    assert!(changes.contains(&Change::Closed { key: ConversationKey::new("#rust") }));
    assert!(changes.contains(&Change::ActiveChanged { key: None }));
    assert!(fx.session.registry().is_empty());
    assert!(fx.session.boundary("#rust").is_none());
}

#[test]
fn own_nick_change_moves_mentions() {
    let mut fx = Fixture::new();
    fx.receive("#rust", "alice", 1, "hi");
    fx.protocol(ConversationEvent::NickChanged { old: LOCAL_NICK.into(), new: "ferris".into() });
    fx.receive("#rust", "alice", 2, "ferris: welcome back");

    assert_eq!(fx.session.registry().identity().nick(), "ferris");
    let counts = fx.session.unread_counts();
    assert!(counts.per_conversation[&ConversationKey::new("#rust")].mentioned);
}

#[test]
fn typing_expires_on_tick() {
    let mut fx = Fixture::new();
    fx.receive("#rust", "alice", 1, "hi");
    let at = fx.env.wall_clock();
    fx.protocol(ConversationEvent::TypingStarted {
        target: "#rust".into(),
        nick: "alice".into(),
        at,
    });
    assert_eq!(fx.session.registry().get("#rust").unwrap().typing(at), ["alice"]);

    fx.env.advance(std::time::Duration::from_secs(10));
    let now = fx.env.now();
    fx.handle(SessionEvent::Tick { now });
    let wall = fx.env.wall_clock();
    assert!(fx.session.registry().get("#rust").unwrap().typing(wall).is_empty());
}

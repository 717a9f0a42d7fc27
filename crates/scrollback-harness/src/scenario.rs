//! Seeded scenario generation.
//!
//! A [`Scenario`] is a reproducible sequence of [`Step`]s: protocol traffic
//! from a handful of simulated users, user intents (open, close, scroll) and
//! clock advances. The same seed always yields the same scenario.
//!
//! Traffic is deliberately messy: messages are re-delivered, edits and
//! reactions target unknown or deleted messages, members part channels they
//! never joined, and the connection drops mid-stream.

use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use scrollback_client::{HistoryRequest, Session, SessionAction, SessionConfig, SessionEvent};
use scrollback_core::{
    ConnectionState, ConversationEvent, ConversationKey, Environment, HistoryAnchor,
    IncomingMessage, Member, MessageId, Privilege,
};
use scrollback_store::ReadPositionStore;

use crate::sim_env::{SimEnv, SimInstant};

/// Local nickname used by generated scenarios.
pub const LOCAL_NICK: &str = "me";

const CHANNELS: [&str; 2] = ["#rust", "#tokio"];
const NICKS: [&str; 4] = ["alice", "bob", "carol", "dave"];
const EMOJI: [&str; 3] = ["👍", "🎉", "👀"];

/// One thing that happens in a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Protocol traffic.
    Protocol(ConversationEvent),
    /// User focuses a conversation.
    Open(String),
    /// User closes a conversation.
    Close(String),
    /// User scrolls to the top of a conversation.
    ScrollToTop(String),
    /// Virtual time passes; the session is ticked afterwards.
    Advance(Duration),
}

impl Step {
    /// Session event for this step. Advances the clock for [`Step::Advance`].
    pub fn into_event(self, env: &SimEnv) -> SessionEvent<SimInstant> {
        match self {
            Self::Protocol(event) => SessionEvent::Protocol(event),
            Self::Open(conversation) => SessionEvent::Open { conversation },
            Self::Close(conversation) => SessionEvent::Close { conversation },
            Self::ScrollToTop(conversation) => SessionEvent::ScrollToTop { conversation },
            Self::Advance(by) => {
                env.advance(by);
                SessionEvent::Tick { now: env.now() }
            },
        }
    }
}

/// Older messages the simulated server can hand out on request.
#[derive(Debug, Clone, Default)]
pub struct HistoryArchive {
    /// Oldest first, per conversation.
    messages: BTreeMap<ConversationKey, Vec<IncomingMessage>>,
}

impl HistoryArchive {
    /// Archive `messages` (oldest first) for `conversation`.
    pub fn insert(&mut self, conversation: &str, messages: Vec<IncomingMessage>) {
        self.messages.insert(ConversationKey::new(conversation), messages);
    }

    /// Page answering `request`: up to `limit` messages immediately older
    /// than the anchor, oldest first. Empty once the archive is exhausted.
    pub fn page(&self, request: &HistoryRequest) -> Vec<IncomingMessage> {
        let Some(archived) = self.messages.get(&ConversationKey::new(&request.conversation)) else {
            return Vec::new();
        };
        let end = match &request.anchor {
            HistoryAnchor::Latest => archived.len(),
            // An identity the archive never held is a live message, newer
            // than everything archived.
            HistoryAnchor::BeforeId(id) => archived
                .iter()
                .position(|m| m.id.as_ref() == Some(id))
                .unwrap_or(archived.len()),
            HistoryAnchor::BeforeTime(at) => archived.partition_point(|m| m.timestamp < *at),
        };
        let start = end.saturating_sub(request.limit);
        archived[start..end].to_vec()
    }
}

/// A generated scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Seed it was generated from.
    pub seed: u64,
    /// Steps in delivery order.
    pub steps: Vec<Step>,
    /// History the simulated server holds for each channel.
    pub archive: HistoryArchive,
}

impl Scenario {
    /// Generate `len` random steps after a fixed preamble (registration,
    /// connection, joins and roster snapshots).
    pub fn generate(seed: u64, len: usize) -> Self {
        let mut generator = Generator::new(seed);
        generator.preamble();
        for _ in 0..len {
            generator.step();
        }
        Self { seed, steps: generator.steps, archive: generator.archive }
    }
}

/// Where generated traffic starts on the wall clock.
fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default()
}

struct Generator {
    rng: ChaCha8Rng,
    steps: Vec<Step>,
    archive: HistoryArchive,
    next_id: u64,
    /// Identities delivered so far per conversation name.
    delivered: BTreeMap<String, Vec<MessageId>>,
    last_message: Option<ConversationEvent>,
    /// Current nick of each simulated user.
    nicks: Vec<String>,
}

impl Generator {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            steps: Vec::new(),
            archive: HistoryArchive::default(),
            next_id: 1,
            delivered: BTreeMap::new(),
            last_message: None,
            nicks: NICKS.iter().map(|n| (*n).to_owned()).collect(),
        }
    }

    fn push(&mut self, event: ConversationEvent) {
        self.steps.push(Step::Protocol(event));
    }

    fn preamble(&mut self) {
        self.push(ConversationEvent::ConnectionChanged { state: ConnectionState::Connected });
        self.push(ConversationEvent::Registered { nick: LOCAL_NICK.into() });
        for channel in CHANNELS {
            self.push(ConversationEvent::MemberJoined {
                target: channel.into(),
                nick: LOCAL_NICK.into(),
                verified: true,
            });
            let mut members = vec![
                Member::from_prefixed(&format!("@{LOCAL_NICK}"))
                    .unwrap_or_else(|| Member::new(LOCAL_NICK)),
            ];
            members.extend(self.nicks.iter().map(|nick| Member::new(nick.as_str())));
            let (first, rest) = members.split_at(2);
            self.push(ConversationEvent::MembersListed {
                target: channel.into(),
                members: first.to_vec(),
            });
            self.push(ConversationEvent::MembersListed {
                target: channel.into(),
                members: rest.to_vec(),
            });
            self.push(ConversationEvent::MembersListEnd { target: channel.into() });

            let archived = (0..120)
                .map(|n| IncomingMessage {
                    id: Some(MessageId::new(format!("{}-h{n:03}", &channel[1..]))),
                    sender: NICKS[n % NICKS.len()].into(),
                    body: format!("archived {n}"),
                    timestamp: base_time() - TimeDelta::seconds(3600 - i64::try_from(n).unwrap_or(0)),
                    is_action: false,
                    reply_to: None,
                })
                .collect();
            self.archive.insert(channel, archived);
        }
    }

    fn step(&mut self) {
        match self.rng.gen_range(0..100) {
            0..30 => self.message(),
            30..35 => {
                if let Some(event) = self.last_message.clone() {
                    self.push(event);
                }
            },
            35..43 => self.edit_or_delete(),
            43..51 => self.react(),
            51..57 => self.membership(),
            57..60 => self.nick_change(),
            60..64 => self.privilege_or_away(),
            64..69 => self.typing(),
            69..71 => {
                let channel = self.channel();
                let topic = format!("topic {}", self.rng.gen_range(0..5));
                let set_by = Some(self.nick());
                self.push(ConversationEvent::TopicChanged { target: channel, topic, set_by });
            },
            71..78 => {
                let conversation = self.conversation();
                self.steps.push(Step::Open(conversation));
            },
            78..80 => {
                let conversation = self.conversation();
                self.steps.push(Step::Close(conversation));
            },
            80..86 => {
                let conversation = self.conversation();
                self.steps.push(Step::ScrollToTop(conversation));
            },
            86..89 => {
                self.push(ConversationEvent::ConnectionChanged {
                    state: ConnectionState::Disconnected { reason: "reset by peer".into() },
                });
                self.push(ConversationEvent::ConnectionChanged { state: ConnectionState::Connected });
            },
            _ => {
                let millis = self.rng.gen_range(0..12_000);
                self.steps.push(Step::Advance(Duration::from_millis(millis)));
            },
        }
    }

    fn message(&mut self) {
        let id = self.next_id;
        self.next_id += 1;

        // Direct messages arrive addressed to us; ours go to the peer.
        let (target, sender, conversation) = match self.rng.gen_range(0..10) {
            0 => {
                let peer = self.nick();
                (LOCAL_NICK.to_owned(), peer.clone(), peer)
            },
            1 => {
                let peer = self.nick();
                (peer.clone(), LOCAL_NICK.to_owned(), peer)
            },
            2 => {
                let channel = self.channel();
                (channel.clone(), LOCAL_NICK.to_owned(), channel)
            },
            _ => {
                let channel = self.channel();
                (channel.clone(), self.nick(), channel)
            },
        };

        let reply_to = if self.rng.gen_bool(0.15) { self.known_id(&conversation) } else { None };
        let message = IncomingMessage {
            id: Some(MessageId::new(id.to_string())),
            sender,
            body: format!("message {id} about {}", if id % 3 == 0 { "rust" } else { "lunch" }),
            timestamp: base_time() + TimeDelta::seconds(i64::try_from(id).unwrap_or(i64::MAX)),
            is_action: self.rng.gen_bool(0.05),
            reply_to,
        };
        self.delivered
            .entry(conversation.to_lowercase())
            .or_default()
            .push(MessageId::new(id.to_string()));

        let event = ConversationEvent::MessageReceived { target, message };
        self.last_message = Some(event.clone());
        self.push(event);
    }

    fn edit_or_delete(&mut self) {
        let conversation = self.channel();
        let id = self.known_id(&conversation).unwrap_or_else(|| MessageId::new("missing"));
        if self.rng.gen_bool(0.6) {
            let body = format!("edited {}", self.rng.gen_range(0..3));
            self.push(ConversationEvent::MessageEdited { target: conversation, id, body });
        } else {
            self.push(ConversationEvent::MessageDeleted { target: conversation, id });
        }
    }

    fn react(&mut self) {
        let conversation = self.channel();
        let Some(id) = self.known_id(&conversation) else {
            return;
        };
        let emoji = (*EMOJI.choose(&mut self.rng).unwrap_or(&"👍")).to_owned();
        let reactor = self.nick();
        let event = if self.rng.gen_bool(0.7) {
            ConversationEvent::ReactionAdded { target: conversation, id, emoji, reactor }
        } else {
            ConversationEvent::ReactionRemoved { target: conversation, id, emoji, reactor }
        };
        self.push(event);
    }

    fn membership(&mut self) {
        let channel = self.channel();
        let nick = self.nick();
        let event = match self.rng.gen_range(0..4) {
            0 => ConversationEvent::MemberJoined { target: channel, nick, verified: false },
            1 => ConversationEvent::MemberParted { target: channel, nick, reason: None },
            2 => ConversationEvent::MemberKicked {
                target: channel,
                nick,
                by: LOCAL_NICK.into(),
                reason: Some("spam".into()),
            },
            _ => ConversationEvent::MemberQuit { nick, reason: Some("bye".into()) },
        };
        self.push(event);
    }

    fn nick_change(&mut self) {
        let index = self.rng.gen_range(0..self.nicks.len());
        let old = self.nicks[index].clone();
        let new = match old.strip_suffix('_') {
            Some(original) => original.to_owned(),
            None => format!("{old}_"),
        };
        self.nicks[index].clone_from(&new);
        self.push(ConversationEvent::NickChanged { old, new });
    }

    fn privilege_or_away(&mut self) {
        let nick = self.nick();
        if self.rng.gen_bool(0.5) {
            let privilege = *[Privilege::Operator, Privilege::HalfOperator, Privilege::Voiced]
                .choose(&mut self.rng)
                .unwrap_or(&Privilege::Voiced);
            let target = self.channel();
            let granted = self.rng.gen_bool(0.6);
            self.push(ConversationEvent::PrivilegeChanged { target, nick, privilege, granted });
        } else {
            let away = self.rng.gen_bool(0.5);
            let message = (away && self.rng.gen_bool(0.5)).then(|| "lunch".to_owned());
            self.push(ConversationEvent::AwayChanged { nick, away, message });
        }
    }

    fn typing(&mut self) {
        let target = self.channel();
        let nick = self.nick();
        if self.rng.gen_bool(0.7) {
            let offset = self.rng.gen_range(0..600);
            self.push(ConversationEvent::TypingStarted {
                target,
                nick,
                at: base_time() + TimeDelta::seconds(offset),
            });
        } else {
            self.push(ConversationEvent::TypingStopped { target, nick });
        }
    }

    fn channel(&mut self) -> String {
        (*CHANNELS.choose(&mut self.rng).unwrap_or(&CHANNELS[0])).to_owned()
    }

    fn nick(&mut self) -> String {
        self.nicks.choose(&mut self.rng).cloned().unwrap_or_else(|| NICKS[0].to_owned())
    }

    /// A channel or a direct-message peer.
    fn conversation(&mut self) -> String {
        if self.rng.gen_bool(0.8) { self.channel() } else { self.nick() }
    }

    fn known_id(&mut self, conversation: &str) -> Option<MessageId> {
        self.delivered.get(&conversation.to_lowercase())?.choose(&mut self.rng).cloned()
    }
}

/// Drives a [`Session`] through scenario steps synchronously, answering
/// history requests from the scenario's archive.
pub struct ScenarioRunner<S: ReadPositionStore> {
    env: SimEnv,
    session: Session<SimEnv, S>,
    archive: HistoryArchive,
    /// Every 'n'th history request fails instead of being answered.
    fail_every: Option<usize>,
    requests: usize,
}

impl<S: ReadPositionStore> ScenarioRunner<S> {
    /// Runner over a fresh session for [`LOCAL_NICK`].
    pub fn new(store: S, archive: HistoryArchive) -> Self {
        let env = SimEnv::new();
        let config = SessionConfig { nick: LOCAL_NICK.into(), ..SessionConfig::default() };
        Self {
            session: Session::new(env.clone(), store, config),
            env,
            archive,
            fail_every: None,
            requests: 0,
        }
    }

    /// Fail every `n`th history request.
    #[must_use]
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Apply one step plus any history responses it triggers.
    ///
    /// Returns every action the session produced.
    pub fn run_step(&mut self, step: Step) -> Vec<SessionAction> {
        let mut pending = VecDeque::from([step.into_event(&self.env)]);
        let mut produced = Vec::new();
        while let Some(event) = pending.pop_front() {
            let Ok(actions) = self.session.handle(event) else {
                continue;
            };
            for action in &actions {
                if let SessionAction::RequestHistory(request) = action {
                    pending.push_back(self.answer(request));
                }
            }
            produced.extend(actions);
        }
        produced
    }

    fn answer(&mut self, request: &HistoryRequest) -> SessionEvent<SimInstant> {
        self.requests += 1;
        if self.fail_every.is_some_and(|n| self.requests % n == 0) {
            return SessionEvent::HistoryFailed {
                request_id: request.request_id,
                reason: "simulated failure".into(),
            };
        }
        SessionEvent::HistoryReceived {
            request_id: request.request_id,
            messages: self.archive.page(request),
        }
    }

    /// Session under test.
    pub fn session(&self) -> &Session<SimEnv, S> {
        &self.session
    }

    /// Virtual clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_scenario() {
        let a = Scenario::generate(42, 200);
        let b = Scenario::generate(42, 200);
        assert_eq!(a.steps, b.steps);
        assert_ne!(a.steps, Scenario::generate(43, 200).steps);
    }

    #[test]
    fn archive_pages_backwards() {
        let scenario = Scenario::generate(1, 0);
        let request = |anchor| HistoryRequest {
            request_id: 1,
            conversation: "#rust".into(),
            anchor,
            limit: 50,
        };

        let newest = scenario.archive.page(&request(HistoryAnchor::Latest));
        assert_eq!(newest.len(), 50);
        assert_eq!(newest[0].id, Some(MessageId::new("rust-h070")));

        let older = scenario.archive.page(&request(HistoryAnchor::BeforeId("rust-h070".into())));
        assert_eq!(older.last().unwrap().id, Some(MessageId::new("rust-h069")));

        let oldest = scenario.archive.page(&request(HistoryAnchor::BeforeId("rust-h010".into())));
        assert_eq!(oldest.len(), 10);
        assert!(scenario.archive.page(&request(HistoryAnchor::BeforeId("rust-h000".into()))).is_empty());

        // A live anchor the archive never held pages from the newest end.
        let live = scenario.archive.page(&request(HistoryAnchor::BeforeId("7".into())));
        assert_eq!(live, newest);
    }
}

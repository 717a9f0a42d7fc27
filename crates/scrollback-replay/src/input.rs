//! Event log parsing.
//!
//! A log is JSON lines. Each line is either a protocol event, tagged the way
//! [`ConversationEvent`] serializes (`{"type": "message_received", ...}`), or
//! one of the replay-only records below:
//!
//! ```text
//! {"type": "open", "conversation": "#rust"}
//! {"type": "close", "conversation": "#rust"}
//! {"type": "scroll_to_top", "conversation": "#rust"}
//! {"type": "wait", "millis": 1500}
//! {"type": "history", "conversation": "#rust", "messages": [...]}
//! ```
//!
//! `history` records are not replayed in order. They make up the server's
//! archive: each one answers the next history request for its conversation.
//! Blank lines and lines starting with `#` are skipped.

use std::{
    collections::{HashMap, VecDeque},
    io::BufRead,
};

use chrono::{DateTime, Utc};
use scrollback_core::{ConversationEvent, ConversationKey, IncomingMessage};
use serde::Deserialize;

use crate::ReplayError;

/// Replay-only records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record {
    Open { conversation: String },
    Close { conversation: String },
    ScrollToTop { conversation: String },
    Wait { millis: u64 },
    History { conversation: String, messages: Vec<IncomingMessage> },
}

/// One replayed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Protocol traffic.
    Protocol(ConversationEvent),
    /// User focuses a conversation.
    Open(String),
    /// User closes a conversation.
    Close(String),
    /// User scrolls to the top of a conversation.
    ScrollToTop(String),
    /// Time passes without traffic.
    Wait(std::time::Duration),
}

/// Parsed log.
#[derive(Debug, Default)]
pub struct ReplayLog {
    /// Entries in delivery order.
    pub entries: Vec<Entry>,
    /// History pages per conversation, in the order they will be served.
    pub pages: HashMap<ConversationKey, VecDeque<Vec<IncomingMessage>>>,
}

impl ReplayLog {
    /// Timestamp of the first timestamped protocol event.
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Protocol(event) => timestamp_of(event),
            _ => None,
        })
    }
}

/// When `event` happened, if it says.
pub fn timestamp_of(event: &ConversationEvent) -> Option<DateTime<Utc>> {
    match event {
        ConversationEvent::MessageReceived { message, .. } => Some(message.timestamp),
        ConversationEvent::TypingStarted { at, .. } => Some(*at),
        _ => None,
    }
}

/// Parse a whole log.
///
/// # Errors
///
/// Fails on the first unreadable or unparseable line.
pub fn read_log(reader: impl BufRead) -> Result<ReplayLog, ReplayError> {
    let mut log = ReplayLog::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry = match serde_json::from_str::<Record>(trimmed) {
            Ok(Record::Open { conversation }) => Entry::Open(conversation),
            Ok(Record::Close { conversation }) => Entry::Close(conversation),
            Ok(Record::ScrollToTop { conversation }) => Entry::ScrollToTop(conversation),
            Ok(Record::Wait { millis }) => Entry::Wait(std::time::Duration::from_millis(millis)),
            Ok(Record::History { conversation, messages }) => {
                log.pages
                    .entry(ConversationKey::new(&conversation))
                    .or_default()
                    .push_back(messages);
                continue;
            },
            Err(_) => serde_json::from_str::<ConversationEvent>(trimmed)
                .map(Entry::Protocol)
                .map_err(|source| ReplayError::Parse { line: index + 1, source })?,
        };
        log.entries.push(entry);
    }
    tracing::debug!(
        entries = log.entries.len(),
        archived = log.pages.values().map(VecDeque::len).sum::<usize>(),
        "Parsed replay log"
    );
    Ok(log)
}

//! Scrollback replay tool.
//!
//! Feeds a recorded event log through the same runtime a chat client uses and
//! prints what the user would see: conversations, message counts, unread
//! counts and mentions.
//!
//! # Usage
//!
//! ```bash
//! # Replay against in-memory read positions
//! scrollback-replay --events session.jsonl
//!
//! # Persist read positions so a second replay starts where this one stopped
//! scrollback-replay --events session.jsonl --db positions.redb --nick ferris
//! ```

mod clock;
mod driver;
mod input;
mod log;

use std::{
    fs::File,
    io::{self, BufReader, Write},
    path::PathBuf,
};

use chrono::TimeDelta;
use clap::Parser;
use scrollback_app::Runtime;
use scrollback_client::{Session, SessionConfig};
use scrollback_core::Environment;
use scrollback_store::{MemoryStore, ReadPositionStore, RedbStore, StoreError};
use thiserror::Error;

use crate::{clock::LogClock, driver::ReplayDriver, input::ReplayLog};

/// Replay errors.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Reading the log failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A log line is neither a protocol event nor a replay record.
    #[error("line {line}: {source}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Read-position storage failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Replay a recorded chat session
#[derive(Parser, Debug)]
#[command(name = "scrollback-replay")]
#[command(about = "Replay a JSON-lines event log through the scrollback session engine")]
#[command(version)]
struct Args {
    /// Event log (JSON lines)
    #[arg(short, long)]
    events: PathBuf,

    /// Read-position database (redb). In-memory when omitted.
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Local nickname
    #[arg(short, long, default_value = "me")]
    nick: String,

    /// Messages per history page
    #[arg(long, default_value_t = scrollback_client::DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    log::init(&args.log_level);

    let log = input::read_log(BufReader::new(File::open(&args.events)?))?;
    tracing::info!(events = %args.events.display(), entries = log.entries.len(), "Replaying");

    let mut config = SessionConfig { nick: args.nick, ..SessionConfig::default() };
    config.backfill.page_size = args.page_size;

    let mut stdout = io::stdout().lock();
    match &args.db {
        Some(path) => replay(log, RedbStore::open(path)?, config, &mut stdout).await?,
        None => replay(log, MemoryStore::new(), config, &mut stdout).await?,
    }
    Ok(())
}

/// Run `log` to completion and write the summary to `out`.
async fn replay<S: ReadPositionStore>(
    log: ReplayLog,
    store: S,
    config: SessionConfig,
    out: &mut impl Write,
) -> Result<(), ReplayError> {
    // Start just before the first recorded timestamp so logged traffic is new
    // to conversations the log itself creates.
    let start = log
        .first_timestamp()
        .and_then(|first| first.checked_sub_signed(TimeDelta::milliseconds(1)))
        .unwrap_or_default();
    let clock = LogClock::starting_at(start);
    let driver = ReplayDriver::new(log, clock.clone());
    let mut runtime = Runtime::new(driver, clock, store, config);
    runtime.run().await?;

    write_summary(out, runtime.session(), runtime.driver())?;
    Ok(())
}

fn write_summary<E: Environment, S: ReadPositionStore>(
    out: &mut impl Write,
    session: &Session<E, S>,
    driver: &ReplayDriver,
) -> io::Result<()> {
    let registry = session.registry();
    let counts = session.unread_counts();

    for (key, store) in registry.iter() {
        let unread = counts.per_conversation.get(key).copied().unwrap_or_default();
        let marker = if registry.active() == Some(key) { "*" } else { " " };
        let mention = if unread.mentioned { ", mentioned" } else { "" };
        writeln!(
            out,
            "{marker} {}: {} messages, {} unread{mention}",
            store.name(),
            store.messages().iter().filter(|m| !m.is_system()).count(),
            unread.count,
        )?;
        if let Some(topic) = store.topic() {
            writeln!(out, "    topic: {}", topic.text)?;
        }
    }
    writeln!(out, "total unread: {}", counts.total)?;
    writeln!(
        out,
        "history requests: {}, resyncs: {}",
        driver.history_requests(),
        driver.resync_requests()
    )?;
    Ok(())
}

//! Generic runtime for session orchestration.
//!
//! The Runtime drives the session event loop, coordinating between:
//! - [`Session`]: conversation, read and backfill state
//! - [`Driver`]: platform-specific I/O
//! - subscribers: receive every [`Change`] over a broadcast channel
//!
//! Everything runs on one task. Events are fed into the session in the order
//! the driver delivers them; history requests are handed to the driver and
//! answered later through the same event stream, so a slow server never
//! blocks the loop.

use std::time::Duration;

use scrollback_client::{Change, Session, SessionAction, SessionConfig, SessionEvent};
use scrollback_core::Environment;
use scrollback_store::ReadPositionStore;
use tokio::sync::broadcast;

use crate::Driver;

/// How long a cycle waits for an event before ticking anyway.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the change broadcast channel. Slow subscribers that fall
/// further behind observe a lag error and skip ahead.
pub const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Generic runtime that orchestrates a [`Session`] over a [`Driver`].
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment providing time
/// - `S`: Read-position persistence
pub struct Runtime<D, E, S>
where
    D: Driver,
    E: Environment,
    S: ReadPositionStore,
{
    driver: D,
    session: Session<E, S>,
    changes: broadcast::Sender<Change>,
    tick_interval: Duration,
}

impl<D, E, S> Runtime<D, E, S>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
    S: ReadPositionStore,
{
    /// Create a runtime with a fresh session.
    pub fn new(driver: D, env: E, store: S, config: SessionConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            driver,
            session: Session::new(env, store, config),
            changes,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Override how long a cycle waits for an event.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Receive every change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    /// Read-only view of the session.
    pub fn session(&self) -> &Session<E, S> {
        &self.session
    }

    /// Driver, for inspection after a run.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Run until the driver's input closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(&mut self) -> Result<(), D::Error> {
        tracing::info!("Session runtime started");
        while self.process_cycle().await? {}
        self.driver.stop();
        tracing::info!("Session runtime stopped");
        Ok(())
    }

    /// Process one cycle of the event loop.
    ///
    /// Returns `false` once the driver has no more input.
    async fn process_cycle(&mut self) -> Result<bool, D::Error> {
        let env = self.session.env().clone();
        let polled = tokio::select! {
            biased;
            polled = self.driver.poll_event() => Some(polled?),
            () = env.sleep(self.tick_interval) => None,
        };

        match polled {
            Some(Some(event)) => self.process_event(event).await?,
            Some(None) => return Ok(false),
            None => {},
        }

        // Every cycle ticks, busy or idle, so deadlines expire under steady
        // traffic too.
        let now = self.session.env().now();
        self.process_event(SessionEvent::Tick { now }).await?;
        Ok(true)
    }

    /// Feed one event into the session and execute the resulting actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to send a request.
    pub async fn process_event(&mut self, event: SessionEvent<E::Instant>) -> Result<(), D::Error> {
        let actions = match self.session.handle(event) {
            Ok(actions) => actions,
            Err(err) => {
                tracing::warn!(error = %err, "Rejected session request");
                return Ok(());
            },
        };
        self.execute(actions).await
    }

    async fn execute(&mut self, actions: Vec<SessionAction>) -> Result<(), D::Error> {
        for action in actions {
            match action {
                SessionAction::RequestHistory(request) => {
                    self.driver.request_history(request).await?;
                },
                SessionAction::RequestResync(request) => {
                    self.driver.request_resync(request).await?;
                },
                SessionAction::Notify(change) => {
                    // No subscribers is not an error.
                    let _ = self.changes.send(change);
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use chrono::{DateTime, TimeZone, Utc};
    use scrollback_client::{BackfillPhase, HistoryRequest, ResyncRequest};
    use scrollback_core::{ConnectionState, ConversationEvent, ConversationKey, IncomingMessage};
    use scrollback_store::MemoryStore;

    use super::*;
    use crate::SystemEnv;

    #[derive(Debug)]
    struct ScriptError;

    impl std::fmt::Display for ScriptError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "script error")
        }
    }

    impl std::error::Error for ScriptError {}

    /// Replays a fixed script and answers history requests with empty pages.
    #[derive(Default)]
    struct ScriptDriver {
        script: VecDeque<SessionEvent>,
        history: Vec<HistoryRequest>,
        resyncs: Vec<ResyncRequest>,
        stopped: bool,
    }

    impl Driver for ScriptDriver {
        type Error = ScriptError;
        type Instant = std::time::Instant;

        async fn poll_event(&mut self) -> Result<Option<SessionEvent>, ScriptError> {
            Ok(self.script.pop_front())
        }

        async fn request_history(&mut self, request: HistoryRequest) -> Result<(), ScriptError> {
            self.script.push_front(SessionEvent::HistoryReceived {
                request_id: request.request_id,
                messages: Vec::new(),
            });
            self.history.push(request);
            Ok(())
        }

        async fn request_resync(&mut self, request: ResyncRequest) -> Result<(), ScriptError> {
            self.resyncs.push(request);
            Ok(())
        }

        fn stop(&mut self) {
            self.stopped = true;
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn received(id: &str, secs: i64) -> SessionEvent {
        SessionEvent::Protocol(ConversationEvent::MessageReceived {
            target: "#rust".into(),
            message: IncomingMessage {
                id: Some(id.into()),
                sender: "alice".into(),
                body: format!("message {id}"),
                timestamp: at(secs),
                is_action: false,
                reply_to: None,
            },
        })
    }

    fn runtime(script: Vec<SessionEvent>) -> Runtime<ScriptDriver, SystemEnv, MemoryStore> {
        let driver = ScriptDriver { script: script.into(), ..ScriptDriver::default() };
        let config = SessionConfig { nick: "me".into(), ..SessionConfig::default() };
        Runtime::new(driver, SystemEnv::new(), MemoryStore::new(), config)
            .with_tick_interval(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn runs_script_and_broadcasts_changes() {
        let mut runtime = runtime(vec![
            received("1", 1),
            received("2", 2),
            SessionEvent::Open { conversation: "#rust".into() },
        ]);
        let mut changes = runtime.subscribe();

        runtime.run().await.unwrap();
        assert!(runtime.driver().stopped);

        let key = ConversationKey::new("#rust");
        assert_eq!(changes.recv().await.unwrap(), Change::Opened { key: key.clone() });
        let mut seen = vec![];
        while let Ok(change) = changes.try_recv() {
            seen.push(change);
        }
        assert!(seen.contains(&Change::ActiveChanged { key: Some(key) }));
        assert_eq!(runtime.session().registry().get("#rust").unwrap().len(), 2);
        assert_eq!(runtime.session().unread_counts().total, 0);
    }

    #[tokio::test]
    async fn history_round_trip_exhausts_conversation() {
        let mut runtime = runtime(vec![
            received("1", 1),
            SessionEvent::ScrollToTop { conversation: "#rust".into() },
            SessionEvent::ScrollToTop { conversation: "#rust".into() },
        ]);
        runtime.run().await.unwrap();

        // First scroll gets an empty page back, so the second one is a no-op.
        assert_eq!(runtime.driver().history.len(), 1);
        let key = ConversationKey::new("#rust");
        assert!(runtime.session().backfill().is_exhausted(&key));
    }

    #[tokio::test]
    async fn reconnect_requests_resync() {
        let mut runtime = runtime(vec![
            received("1", 1),
            SessionEvent::Protocol(ConversationEvent::ConnectionChanged {
                state: ConnectionState::Disconnected { reason: "reset".into() },
            }),
            SessionEvent::Protocol(ConversationEvent::ConnectionChanged {
                state: ConnectionState::Connected,
            }),
        ]);
        runtime.run().await.unwrap();
        assert_eq!(runtime.driver().resyncs, vec![ResyncRequest { conversation: "#rust".into() }]);
    }

    /// Clock that only moves when the test moves it. Sleeping never
    /// completes, so the runtime only sees time through events.
    #[derive(Clone, Default)]
    struct ManualEnv {
        elapsed: Arc<Mutex<Duration>>,
    }

    impl Environment for ManualEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            *self.elapsed.lock().unwrap()
        }

        fn wall_clock(&self) -> DateTime<Utc> {
            at(0) + chrono::TimeDelta::from_std(self.now()).unwrap()
        }

        fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
            std::future::pending()
        }
    }

    /// Always has an event ready, one second after the previous one, and never
    /// answers history requests.
    struct BusyDriver {
        env: ManualEnv,
        script: VecDeque<SessionEvent<Duration>>,
        history: Vec<HistoryRequest>,
    }

    impl Driver for BusyDriver {
        type Error = ScriptError;
        type Instant = Duration;

        async fn poll_event(&mut self) -> Result<Option<SessionEvent<Duration>>, ScriptError> {
            *self.env.elapsed.lock().unwrap() += Duration::from_secs(1);
            Ok(self.script.pop_front())
        }

        async fn request_history(&mut self, request: HistoryRequest) -> Result<(), ScriptError> {
            self.history.push(request);
            Ok(())
        }

        async fn request_resync(&mut self, _request: ResyncRequest) -> Result<(), ScriptError> {
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn busy(secs: i64) -> SessionEvent<Duration> {
        SessionEvent::Protocol(ConversationEvent::MessageReceived {
            target: "#rust".into(),
            message: IncomingMessage {
                id: Some(secs.to_string().into()),
                sender: "alice".into(),
                body: "busy".into(),
                timestamp: at(secs),
                is_action: false,
                reply_to: None,
            },
        })
    }

    #[tokio::test]
    async fn unanswered_history_times_out_under_steady_traffic() {
        let env = ManualEnv::default();
        let scroll = || SessionEvent::ScrollToTop { conversation: "#rust".into() };
        let mut script = vec![busy(1), scroll()];
        script.extend((2..=60).map(busy));
        script.push(scroll());

        let driver = BusyDriver { env: env.clone(), script: script.into(), history: Vec::new() };
        let config = SessionConfig { nick: "me".into(), ..SessionConfig::default() };
        let mut runtime = Runtime::new(driver, env.clone(), MemoryStore::new(), config);
        runtime.run().await.unwrap();

        // The first request timed out and backed off while traffic kept
        // flowing, so the second scroll asks again.
        assert_eq!(runtime.driver().history.len(), 2);
        let key = ConversationKey::new("#rust");
        assert_eq!(runtime.session().backfill().phase(&key), BackfillPhase::Requesting);
        assert!(env.now() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn rejected_requests_do_not_stop_the_loop() {
        let mut runtime = runtime(vec![
            SessionEvent::Close { conversation: "#missing".into() },
            received("1", 1),
        ]);
        runtime.run().await.unwrap();
        assert!(runtime.session().registry().contains("#rust"));
    }
}

//! Simulated driver for the session runtime.
//!
//! Feeds scenario steps to a [`Runtime`](scrollback_app::Runtime) on virtual
//! time and plays the server side of history backfill from a
//! [`HistoryArchive`]. Responses are delivered ahead of the next scripted
//! step, so a request issued by step `n` is answered before step `n + 1`.

use std::{collections::VecDeque, convert::Infallible};

use scrollback_app::Driver;
use scrollback_client::{HistoryRequest, ResyncRequest, SessionEvent};

use crate::{
    scenario::{HistoryArchive, Scenario, Step},
    sim_env::{SimEnv, SimInstant},
};

/// [`Driver`] over a scripted scenario.
pub struct SimDriver {
    env: SimEnv,
    steps: VecDeque<Step>,
    responses: VecDeque<SessionEvent<SimInstant>>,
    archive: HistoryArchive,
    history: Vec<HistoryRequest>,
    resyncs: Vec<ResyncRequest>,
    fail_next: usize,
    stopped: bool,
}

impl SimDriver {
    /// Driver replaying `steps` against `env`'s clock.
    pub fn new(env: SimEnv, steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            env,
            steps: steps.into_iter().collect(),
            responses: VecDeque::new(),
            archive: HistoryArchive::default(),
            history: Vec::new(),
            resyncs: Vec::new(),
            fail_next: 0,
            stopped: false,
        }
    }

    /// Driver replaying a generated scenario, archive included.
    pub fn from_scenario(env: SimEnv, scenario: Scenario) -> Self {
        Self::new(env, scenario.steps).with_archive(scenario.archive)
    }

    /// Serve history from `archive`.
    #[must_use]
    pub fn with_archive(mut self, archive: HistoryArchive) -> Self {
        self.archive = archive;
        self
    }

    /// Fail the next `count` history requests.
    pub fn fail_next_requests(&mut self, count: usize) {
        self.fail_next = count;
    }

    /// Append a step to the script.
    pub fn inject(&mut self, step: Step) {
        self.steps.push_back(step);
    }

    /// History requests received so far.
    pub fn history_requests(&self) -> &[HistoryRequest] {
        &self.history
    }

    /// Resync requests received so far.
    pub fn resync_requests(&self) -> &[ResyncRequest] {
        &self.resyncs
    }

    /// Whether the runtime has stopped the driver.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Driver for SimDriver {
    type Error = Infallible;
    type Instant = SimInstant;

    async fn poll_event(&mut self) -> Result<Option<SessionEvent<SimInstant>>, Infallible> {
        if let Some(response) = self.responses.pop_front() {
            return Ok(Some(response));
        }
        Ok(self.steps.pop_front().map(|step| step.into_event(&self.env)))
    }

    async fn request_history(&mut self, request: HistoryRequest) -> Result<(), Infallible> {
        let response = if self.fail_next > 0 {
            self.fail_next -= 1;
            tracing::debug!(request_id = request.request_id, "Failing history request");
            SessionEvent::HistoryFailed {
                request_id: request.request_id,
                reason: "simulated failure".into(),
            }
        } else {
            SessionEvent::HistoryReceived {
                request_id: request.request_id,
                messages: self.archive.page(&request),
            }
        };
        self.responses.push_back(response);
        self.history.push(request);
        Ok(())
    }

    async fn request_resync(&mut self, request: ResyncRequest) -> Result<(), Infallible> {
        self.resyncs.push(request);
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

use crate::backend::{Backend, BackendError, JobId, ProgressOut, StartParseIn};
use crate::config::Config;
use crate::timeline::Timeline;
use anyhow::{Context, Result};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("failed to start parse: {0}")]
    Submit(BackendError),

    #[error("parse job failed: {0}")]
    Job(String),

    #[error("failed to fetch result: {0}")]
    ResultFetch(BackendError),

    #[error("no active job")]
    NotStarted,
}

impl JobError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl JobStatus {
    /// Unknown or missing statuses count as running.
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("pending") => JobStatus::Pending,
            Some("done") => JobStatus::Done,
            Some("error") => JobStatus::Error,
            _ => JobStatus::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// Client-side view of a server job. Only poll responses mutate it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub total_rounds: u32,
    pub processed_rounds: u32,
    pub percent: u8,
    pub message: String,
}

impl Job {
    fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            total_rounds: 0,
            processed_rounds: 0,
            percent: 0,
            message: String::new(),
        }
    }

    fn apply(&mut self, out: &ProgressOut) {
        self.status = JobStatus::from_wire(out.status.as_deref());
        self.total_rounds = out.total_rounds.unwrap_or(0);
        self.processed_rounds = out.processed_rounds.unwrap_or(0);
        self.percent = derive_percent(out.percent, self.processed_rounds, self.total_rounds);
        self.message = out.message.clone().unwrap_or_default();
    }

    /// `5/10 rounds · message`, with `?` while the total is unknown.
    pub fn progress_text(&self) -> String {
        let total = if self.total_rounds > 0 {
            self.total_rounds.to_string()
        } else {
            "?".to_string()
        };
        format!("{}/{} rounds · {}", self.processed_rounds, total, self.message)
    }
}

/// Reported percent when present, else `floor(processed / total * 100)`.
pub fn derive_percent(percent: Option<f64>, processed: u32, total: u32) -> u8 {
    match percent {
        Some(p) if p.is_finite() => p.floor().clamp(0.0, 100.0) as u8,
        _ if total > 0 => (u64::from(processed) * 100 / u64::from(total)).min(100) as u8,
        _ => 0,
    }
}

pub fn validate_every_n(raw: &str) -> Result<u32, JobError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(JobError::input(format!(
            "every_n must be an integer >= 1, got {raw:?}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Submitted,
    Polling,
    Done,
    Failed,
}

#[derive(Debug)]
pub enum PollOutcome {
    /// Job still running, or this poll was dropped by a transient error.
    Pending,
    Done(Arc<Timeline>),
    Failed(JobError),
    /// Nothing to poll.
    Idle,
}

#[derive(Debug)]
pub struct PollStep {
    /// Snapshot after a successful poll; `None` when the poll was skipped.
    pub progress: Option<Job>,
    pub outcome: PollOutcome,
}

impl PollStep {
    fn skipped() -> Self {
        Self {
            progress: None,
            outcome: PollOutcome::Pending,
        }
    }
}

/// Fixed-period ticker whose first tick lands one period after creation.
pub fn poll_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Drives one parse job at a time through submit, poll and result fetch.
pub struct JobPoller<B: Backend> {
    backend: B,
    interval: Duration,
    result_retries: u32,
    completion_message: Regex,
    state: PollerState,
    job: Option<Job>,
    started: Option<Instant>,
}

impl<B: Backend> JobPoller<B> {
    pub fn new(cfg: &Config, backend: B) -> Result<Self> {
        let completion_message = Regex::new(&cfg.job.completion_message_pattern)
            .with_context(|| "compiling job.completion_message_pattern")?;
        Ok(Self {
            backend,
            interval: cfg.job.poll_interval(),
            result_retries: cfg.job.result_fetch_retries.min(1),
            completion_message,
            state: PollerState::Idle,
            job: None,
            started: None,
        })
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn active_job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time since the current job was submitted.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started.map(|s| s.elapsed())
    }

    /// Forget the active job. Responses for it are never applied afterwards.
    pub fn cancel(&mut self) {
        if let Some(job) = self.job.take() {
            info!("job {} abandoned", job.id);
        }
        self.state = PollerState::Idle;
        self.started = None;
    }

    /// Validates input, drops any previous job and submits a new one.
    pub async fn start(&mut self, source: &str, every_n: u32) -> Result<JobId, JobError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(JobError::input("no demo selected"));
        }
        if every_n == 0 {
            return Err(JobError::input("every_n must be >= 1"));
        }

        self.cancel();
        self.state = PollerState::Submitted;
        let req = StartParseIn {
            name: source.to_string(),
            every_n,
        };
        match self.backend.start_parse(&req).await {
            Ok(id) => {
                info!("job {id} submitted for {source} every_n={every_n}");
                self.job = Some(Job::new(id.clone()));
                self.state = PollerState::Polling;
                self.started = Some(Instant::now());
                Ok(id)
            }
            Err(err) => {
                self.state = PollerState::Failed;
                Err(JobError::Submit(err))
            }
        }
    }

    /// One poll of the active job. Transient failures are swallowed.
    pub async fn poll_once(&mut self) -> PollStep {
        let Some(job) = self.job.as_mut() else {
            return PollStep {
                progress: None,
                outcome: PollOutcome::Idle,
            };
        };

        let out = match self.backend.progress(&job.id).await {
            Ok(out) => out,
            Err(err) => {
                warn!("progress poll for job {} failed, retrying: {err}", job.id);
                return PollStep::skipped();
            }
        };

        job.apply(&out);
        let snapshot = job.clone();
        debug!(
            "job {} status={:?} percent={} {}",
            snapshot.id,
            snapshot.status,
            snapshot.percent,
            snapshot.progress_text()
        );

        if snapshot.status == JobStatus::Done || self.completed_by_message(&snapshot) {
            self.job = None;
            let outcome = match self.fetch_result(&snapshot.id).await {
                Ok(timeline) => {
                    info!(
                        "job {} done: {} rounds",
                        snapshot.id,
                        timeline.rounds.len()
                    );
                    self.state = PollerState::Done;
                    PollOutcome::Done(Arc::new(timeline))
                }
                Err(err) => {
                    self.state = PollerState::Failed;
                    PollOutcome::Failed(JobError::ResultFetch(err))
                }
            };
            return PollStep {
                progress: Some(snapshot),
                outcome,
            };
        }

        if snapshot.status == JobStatus::Error {
            self.job = None;
            self.state = PollerState::Failed;
            let reason = if snapshot.message.is_empty() {
                "processing error".to_string()
            } else {
                snapshot.message.clone()
            };
            return PollStep {
                progress: Some(snapshot),
                outcome: PollOutcome::Failed(JobError::Job(reason)),
            };
        }

        PollStep {
            progress: Some(snapshot),
            outcome: PollOutcome::Pending,
        }
    }

    /// Polls on the configured interval until the job reaches a terminal state.
    pub async fn run_to_completion<F: FnMut(&Job)>(
        &mut self,
        mut on_progress: F,
    ) -> Result<Arc<Timeline>, JobError> {
        let mut ticker = poll_ticker(self.interval);
        loop {
            ticker.tick().await;
            let step = self.poll_once().await;
            if let Some(job) = &step.progress {
                on_progress(job);
            }
            match step.outcome {
                PollOutcome::Pending => {}
                PollOutcome::Done(timeline) => return Ok(timeline),
                PollOutcome::Failed(err) => return Err(err),
                PollOutcome::Idle => return Err(JobError::NotStarted),
            }
        }
    }

    /// Compatibility fallback for servers whose status lags behind percent.
    /// The explicit `done` status is authoritative; this only fires when the
    /// percent is saturated and the message reads as a completion notice.
    fn completed_by_message(&self, job: &Job) -> bool {
        job.status != JobStatus::Error
            && job.percent >= 100
            && self.completion_message.is_match(&job.message)
    }

    async fn fetch_result(&self, id: &JobId) -> Result<Timeline, BackendError> {
        let attempts = 1 + self.result_retries;
        let mut attempt = 1;
        loop {
            match self.backend.result(id).await {
                Ok(timeline) => return Ok(timeline),
                Err(err) if attempt < attempts => {
                    warn!("result fetch for job {id} failed (attempt {attempt}): {err}");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

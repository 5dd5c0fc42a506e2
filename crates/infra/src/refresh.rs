//! Daily forecast refresh.
//!
//! A background thread re-runs the offline batch for every active SKU once
//! per run day, as reported by the engine [`Clock`], and whenever triggered.
//! Subjects that failed for environmental reasons (database, storage, time
//! budget) are re-forecast a bounded number of times the same day; data and
//! model failures wait for the next run day.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

use stockcast_core::{EngineResult, ForecastError, Subject};
use stockcast_forecast::{
    BatchExecutor, BatchSummary, Clock, ForecastCache, ForecastOrchestrator, ModelStore, SalesSource,
};

/// What a refresh forecasts.
pub trait RefreshJob: Send + Sync + 'static {
    /// Subjects covered by a full pass.
    fn subjects(&self) -> EngineResult<Vec<Subject>>;

    fn refresh(&self, subjects: &[Subject], horizon_days: u32) -> EngineResult<BatchSummary>;
}

impl<S, M, C, E> RefreshJob for ForecastOrchestrator<S, M, C, E>
where
    S: SalesSource + 'static,
    M: ModelStore + 'static,
    C: ForecastCache + 'static,
    E: BatchExecutor + 'static,
{
    fn subjects(&self) -> EngineResult<Vec<Subject>> {
        self.active_subjects(None)
    }

    fn refresh(&self, subjects: &[Subject], horizon_days: u32) -> EngineResult<BatchSummary> {
        self.run_batch(subjects, horizon_days)
    }
}

/// Receives the summary of every batch a refresh runs, retries included.
pub trait RefreshReportSink: Send + Sync + 'static {
    fn emit(&self, summary: BatchSummary);
}

#[derive(Debug, Default)]
pub struct InMemoryRefreshReportSink {
    inner: Mutex<Vec<BatchSummary>>,
}

impl InMemoryRefreshReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<BatchSummary> {
        self.inner.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl RefreshReportSink for InMemoryRefreshReportSink {
    fn emit(&self, summary: BatchSummary) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.push(summary);
        }
    }
}

/// Logs each summary; the default sink for the worker binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReportSink;

impl RefreshReportSink for LoggingReportSink {
    fn emit(&self, summary: BatchSummary) {
        info!(
            run_id = %summary.run_id,
            successes = summary.successes(),
            sparse_skips = summary.sparse_skips.len(),
            failures = summary.failures.len(),
            retryable = summary.retryable_subjects().len(),
            cached_rows = summary.cached_rows,
            "forecast refresh batch finished"
        );
    }
}

#[derive(Debug, Clone)]
pub struct ForecastRefreshRunner {
    /// How often the thread looks for a new run day.
    pub check_interval: Duration,
    pub horizon_days: u32,
    /// Same-day retries of transiently failed subjects.
    pub max_retries: u32,
    /// Retry `n` waits `n * retry_delay`.
    pub retry_delay: Duration,
}

impl Default for ForecastRefreshRunner {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(15 * 60),
            horizon_days: 30,
            max_retries: 3,
            retry_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum Signal {
    Refresh,
    Stop,
}

/// Handle for a running refresh thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct RefreshHandle {
    signals: mpsc::SyncSender<Signal>,
    join: Option<thread::JoinHandle<()>>,
}

impl RefreshHandle {
    /// Refresh now, even if today's run already happened. Triggers coalesce:
    /// while one is pending, further calls are no-ops.
    pub fn trigger(&self) {
        let _ = self.signals.try_send(Signal::Refresh);
    }

    /// Stop the thread after its current batch.
    pub fn shutdown(mut self) {
        let _ = self.signals.send(Signal::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl ForecastRefreshRunner {
    /// Spawn the refresh thread. Today's run starts immediately; later runs
    /// start when `clock` reaches a new day, or on [`RefreshHandle::trigger`].
    /// Errors are logged, never propagated.
    pub fn spawn<J, K>(
        &self,
        name: &'static str,
        job: Arc<J>,
        sink: Arc<K>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<RefreshHandle>
    where
        J: RefreshJob,
        K: RefreshReportSink,
    {
        let (signals, inbox) = mpsc::sync_channel::<Signal>(1);
        let runner = self.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || runner.serve(name, inbox, job.as_ref(), sink.as_ref(), clock.as_ref()))
            .map_err(|e| ForecastError::invalid_config(format!("spawn refresh runner: {e}")))?;

        Ok(RefreshHandle {
            signals,
            join: Some(join),
        })
    }

    /// One run day's refresh on the calling thread, retries included.
    pub fn refresh_once<J, K>(&self, job: &J, sink: &K)
    where
        J: RefreshJob,
        K: RefreshReportSink,
    {
        self.run_day("refresh-once", job, sink, &mut |delay| {
            thread::sleep(delay);
            true
        });
    }

    fn serve<J, K>(&self, name: &'static str, inbox: mpsc::Receiver<Signal>, job: &J, sink: &K, clock: &dyn Clock)
    where
        J: RefreshJob,
        K: RefreshReportSink,
    {
        info!(runner = name, horizon_days = self.horizon_days, "forecast refresh runner started");

        let mut last_run_day: Option<NaiveDate> = None;
        let mut forced = false;
        loop {
            let today = clock.today();
            if forced || last_run_day != Some(today) {
                info!(runner = name, run_day = %today, forced, "forecast refresh starting");
                let mut pause = |delay: Duration| match inbox.recv_timeout(delay) {
                    // A trigger during a retry wait retries right away.
                    Ok(Signal::Refresh) | Err(RecvTimeoutError::Timeout) => true,
                    Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => false,
                };
                if !self.run_day(name, job, sink, &mut pause) {
                    break;
                }
                last_run_day = Some(today);
                forced = false;
            }

            match inbox.recv_timeout(self.check_interval) {
                Ok(Signal::Refresh) => forced = true,
                Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        info!(runner = name, "forecast refresh runner stopped");
    }

    /// Full pass, then up to `max_retries` passes over the subjects that failed
    /// transiently. `pause` waits between attempts and returns `false` when
    /// the runner should stop; so does this function.
    fn run_day<J, K>(&self, name: &str, job: &J, sink: &K, pause: &mut dyn FnMut(Duration) -> bool) -> bool
    where
        J: RefreshJob,
        K: RefreshReportSink,
    {
        let mut retry: Option<Vec<Subject>> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 && !pause(self.retry_delay * attempt) {
                return false;
            }

            let pass = match &retry {
                Some(subjects) => job.refresh(subjects, self.horizon_days),
                None => job
                    .subjects()
                    .and_then(|subjects| job.refresh(&subjects, self.horizon_days)),
            };
            match pass {
                Ok(summary) => {
                    let retryable = summary.retryable_subjects();
                    sink.emit(summary);
                    if retryable.is_empty() {
                        return true;
                    }
                    info!(runner = name, attempt, subjects = retryable.len(), "transient subject failures");
                    retry = Some(retryable);
                }
                Err(e) if e.is_transient() => {
                    warn!(runner = name, attempt, error = %e, "forecast refresh failed");
                }
                Err(e) => {
                    warn!(runner = name, error = %e, "forecast refresh failed; waiting for the next run day");
                    return true;
                }
            }
        }

        warn!(runner = name, retries = self.max_retries, "forecast refresh retries exhausted");
        true
    }
}

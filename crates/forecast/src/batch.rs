//! Batch execution of per-subject pipelines.
//!
//! Executors are storage/runtime agnostic: they only decide where and when a
//! subject's task runs. Each subject appears at most once per batch, so no two
//! workers ever fit or write the same subject's artifact.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use stockcast_core::{EngineResult, ForecastError, Subject};

/// Per-subject outcome, in input order.
pub type SubjectResults<T> = Vec<(Subject, EngineResult<T>)>;

pub trait BatchExecutor: Send + Sync {
    /// Run `task` for every distinct subject.
    ///
    /// A failing subject never affects the others.
    fn execute<T, F>(&self, subjects: &[Subject], task: Arc<F>) -> SubjectResults<T>
    where
        T: Send + 'static,
        F: Fn(&Subject, &Cancellation) -> EngineResult<T> + Send + Sync + 'static;
}

/// Raised for a task whose time budget ran out.
///
/// A timed-out task keeps running on its own thread, so tasks call
/// [`Cancellation::check`] before every externally visible write.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    budget: Duration,
}

impl Cancellation {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self::default()
    }

    fn with_budget(budget: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            budget,
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Timeout)` once the budget has run out.
    pub fn check(&self, subject: &Subject) -> EngineResult<()> {
        if self.is_cancelled() {
            return Err(timeout_error(subject, self.budget));
        }
        Ok(())
    }
}

fn timeout_error(subject: &Subject, budget: Duration) -> ForecastError {
    ForecastError::Timeout {
        subject: subject.clone(),
        millis: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Distinct subjects, first occurrence order.
pub fn distinct_subjects(subjects: &[Subject]) -> Vec<Subject> {
    let mut seen = HashSet::new();
    subjects
        .iter()
        .filter(|s| seen.insert((*s).clone()))
        .cloned()
        .collect()
}

/// Run `task` for one subject, giving up after `timeout`.
///
/// On timeout the task's token is cancelled and its result dropped; the task
/// itself runs on until its next [`Cancellation::check`].
fn run_bounded<T, F>(subject: &Subject, task: &Arc<F>, timeout: Option<Duration>) -> EngineResult<T>
where
    T: Send + 'static,
    F: Fn(&Subject, &Cancellation) -> EngineResult<T> + Send + Sync + 'static,
{
    let Some(timeout) = timeout else {
        return task(subject, &Cancellation::never());
    };

    let (tx, rx) = mpsc::sync_channel(1);
    let task = Arc::clone(task);
    let owned = subject.clone();
    let token = Cancellation::with_budget(timeout);
    let task_token = token.clone();
    let spawned = thread::Builder::new()
        .name(format!("stockcast-{}", subject.storage_key()))
        .spawn(move || {
            let _ = tx.send(task(&owned, &task_token));
        });
    if let Err(e) = spawned {
        return Err(ForecastError::model_fit(subject, format!("spawn task thread: {e}")));
    }

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            token.cancel();
            warn!(subject = %subject, millis = timeout.as_millis() as u64, "subject pipeline timed out");
            Err(timeout_error(subject, timeout))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ForecastError::model_fit(
            subject,
            "task terminated without a result",
        )),
    }
}

/// Runs subjects one after another on the calling thread.
#[derive(Debug, Copy, Clone, Default)]
pub struct SequentialExecutor {
    timeout: Option<Duration>,
}

impl SequentialExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl BatchExecutor for SequentialExecutor {
    fn execute<T, F>(&self, subjects: &[Subject], task: Arc<F>) -> SubjectResults<T>
    where
        T: Send + 'static,
        F: Fn(&Subject, &Cancellation) -> EngineResult<T> + Send + Sync + 'static,
    {
        distinct_subjects(subjects)
            .into_iter()
            .map(|subject| {
                let result = run_bounded(&subject, &task, self.timeout);
                (subject, result)
            })
            .collect()
    }
}

/// Fixed-size pool of scoped worker threads pulling subjects from a shared
/// cursor. Each worker buffers its own results; buffers are merged after all
/// workers finish.
#[derive(Debug, Copy, Clone)]
pub struct ThreadPoolExecutor {
    workers: usize,
    timeout: Option<Duration>,
}

impl ThreadPoolExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl BatchExecutor for ThreadPoolExecutor {
    fn execute<T, F>(&self, subjects: &[Subject], task: Arc<F>) -> SubjectResults<T>
    where
        T: Send + 'static,
        F: Fn(&Subject, &Cancellation) -> EngineResult<T> + Send + Sync + 'static,
    {
        let subjects = distinct_subjects(subjects);
        let cursor = AtomicUsize::new(0);
        let workers = self.workers.min(subjects.len()).max(1);

        let buffers: Vec<Vec<(usize, EngineResult<T>)>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let subjects = &subjects;
                    let cursor = &cursor;
                    let task = &task;
                    scope.spawn(move || {
                        let mut buffer = Vec::new();
                        loop {
                            let index = cursor.fetch_add(1, Ordering::Relaxed);
                            let Some(subject) = subjects.get(index) else {
                                break;
                            };
                            debug!(worker, subject = %subject, "running subject");
                            buffer.push((index, run_bounded(subject, task, self.timeout)));
                        }
                        buffer
                    })
                })
                .collect();

            handles
                .into_iter()
                .filter_map(|h| match h.join() {
                    Ok(buffer) => Some(buffer),
                    Err(_) => {
                        warn!("batch worker panicked; its subjects are reported as failed");
                        None
                    }
                })
                .collect()
        });

        let mut slots: Vec<Option<EngineResult<T>>> = subjects.iter().map(|_| None).collect();
        for (index, result) in buffers.into_iter().flatten() {
            slots[index] = Some(result);
        }
        subjects
            .into_iter()
            .zip(slots)
            .map(|(subject, slot)| {
                let result = slot.unwrap_or_else(|| {
                    Err(ForecastError::model_fit(&subject, "worker terminated unexpectedly"))
                });
                (subject, result)
            })
            .collect()
    }
}

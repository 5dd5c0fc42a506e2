//! Coordinates assembly, feature engineering, model selection and prediction.
//!
//! Every request walks the same state machine:
//!
//! `Requested → DataAssembled → Sufficient | FallbackToCategory → Featured →
//! ModelLoaded | ModelTrained → Predicted → (Cached) → Done`, with `Failed`
//! reachable from any stage. Transitions are logged at `debug`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use stockcast_core::{
    CachedForecast, CalendarEvents, Category, ConfidenceLevel, EngineResult, ForecastError, ForecastResult,
    ObservationSeries, PromotionWindow, RunId, Subject, round2, validate_horizon,
};

use crate::artifact::ModelArtifact;
use crate::assembler::TimeSeriesAssembler;
use crate::batch::{BatchExecutor, Cancellation, SequentialExecutor};
use crate::cache::ForecastCache;
use crate::clock::Clock;
use crate::config::ForecastConfig;
use crate::evaluate::{AccuracyMetrics, ModelEvaluator};
use crate::features::{FeatureEngineer, FeatureRow, Regressor, RegressorContract};
use crate::guard::{DataSufficiency, SparseDataGuard};
use crate::model::ForecastModel;
use crate::outcome::{
    BatchSummary, CrossValidationReport, CutoffMetrics, ForecastOutcome, ForecastSummary, SparseSkip, SubjectFailure,
    SubjectForecast, TrainReport, TrainStatus, TrainingSummary,
};
use crate::source::SalesSource;
use crate::store::ModelStore;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PipelineStage {
    Requested,
    DataAssembled,
    Sufficient,
    FallbackToCategory,
    Featured,
    ModelLoaded,
    ModelTrained,
    Predicted,
    Cached,
    Done,
    Failed,
}

fn enter(subject: &Subject, stage: PipelineStage) {
    debug!(subject = %subject, stage = ?stage, "pipeline stage");
}

/// A single-subject forecast request.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub subject: Subject,
    pub horizon_days: u32,
    /// `None` uses the configured default level.
    pub confidence_level: Option<ConfidenceLevel>,
    /// Known future promotions. `None` means none were supplied and every
    /// future promotion flag defaults to 0.
    pub future_promotions: Option<Vec<PromotionWindow>>,
}

impl ForecastRequest {
    pub fn new(subject: Subject, horizon_days: u32) -> Self {
        Self {
            subject,
            horizon_days,
            confidence_level: None,
            future_promotions: None,
        }
    }

    pub fn with_confidence(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_level = Some(level);
        self
    }

    pub fn with_future_promotions(mut self, promotions: Vec<PromotionWindow>) -> Self {
        self.future_promotions = Some(promotions);
        self
    }
}

struct PreparedHistory {
    series: ObservationSeries,
    rows: Vec<FeatureRow>,
}

struct Engine<S, M, C> {
    source: Arc<S>,
    store: Arc<M>,
    cache: Arc<C>,
    clock: Arc<dyn Clock>,
    config: ForecastConfig,
    assembler: TimeSeriesAssembler<S>,
    engineer: FeatureEngineer,
    guard: SparseDataGuard,
    model: ForecastModel,
    evaluator: ModelEvaluator,
    training_locks: Mutex<HashMap<Subject, Arc<Mutex<()>>>>,
}

/// Entry point for forecasting and training requests.
///
/// Cheap to clone; clones share the same stores and training locks.
pub struct ForecastOrchestrator<S, M, C, E = SequentialExecutor> {
    engine: Arc<Engine<S, M, C>>,
    executor: E,
}

impl<S, M, C, E: Clone> Clone for ForecastOrchestrator<S, M, C, E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            executor: self.executor.clone(),
        }
    }
}

impl<S, M, C> ForecastOrchestrator<S, M, C, SequentialExecutor>
where
    S: SalesSource + 'static,
    M: ModelStore + 'static,
    C: ForecastCache + 'static,
{
    pub fn new(
        source: Arc<S>,
        store: Arc<M>,
        cache: Arc<C>,
        config: ForecastConfig,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let executor =
            SequentialExecutor::new().with_timeout(config.subject_timeout_secs.map(Duration::from_secs));
        let engine = Engine {
            assembler: TimeSeriesAssembler::new(Arc::clone(&source)),
            engineer: FeatureEngineer::new(config.features.clone()),
            guard: SparseDataGuard::new(config.min_sale_days),
            model: config.model(),
            evaluator: ModelEvaluator::new(),
            training_locks: Mutex::new(HashMap::new()),
            source,
            store,
            cache,
            clock,
            config,
        };
        Ok(Self {
            engine: Arc::new(engine),
            executor,
        })
    }
}

impl<S, M, C, E> ForecastOrchestrator<S, M, C, E>
where
    S: SalesSource + 'static,
    M: ModelStore + 'static,
    C: ForecastCache + 'static,
    E: BatchExecutor,
{
    /// Swap the executor used for bulk, batch and training runs.
    pub fn with_executor<E2: BatchExecutor>(self, executor: E2) -> ForecastOrchestrator<S, M, C, E2> {
        ForecastOrchestrator {
            engine: self.engine,
            executor,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.engine.config
    }

    /// Forecast one subject, reporting expected failure modes as variants.
    pub fn forecast(&self, request: &ForecastRequest) -> ForecastOutcome {
        self.engine.forecast(request, &Cancellation::never()).into()
    }

    pub fn get_forecast(
        &self,
        subject: &Subject,
        horizon_days: u32,
        confidence_level: Option<ConfidenceLevel>,
    ) -> EngineResult<ForecastResult> {
        let mut request = ForecastRequest::new(subject.clone(), horizon_days);
        request.confidence_level = confidence_level;
        self.engine.forecast(&request, &Cancellation::never())
    }

    /// Forecast several subjects; per-subject errors are embedded.
    pub fn get_bulk_forecast(&self, subjects: &[Subject], horizon_days: u32) -> Vec<SubjectForecast> {
        let engine = Arc::clone(&self.engine);
        let task = Arc::new(move |subject: &Subject, cancel: &Cancellation| {
            engine.forecast(&ForecastRequest::new(subject.clone(), horizon_days), cancel)
        });
        self.executor
            .execute(subjects, task)
            .into_iter()
            .map(|(subject, result)| SubjectForecast {
                subject,
                outcome: result.into(),
            })
            .collect()
    }

    /// Offline batch: forecast every subject, skip sparse ones, record
    /// failures and upsert successes into the forecast cache.
    ///
    /// Cache writes happen here, after each task has reported back, so a
    /// subject that timed out never lands in the cache.
    pub fn run_batch(&self, subjects: &[Subject], horizon_days: u32) -> EngineResult<BatchSummary> {
        validate_horizon(horizon_days)?;
        let run_id = RunId::new();
        let started_at = self.engine.clock.now();
        info!(run_id = %run_id, subjects = subjects.len(), horizon_days, "forecast batch started");

        let engine = Arc::clone(&self.engine);
        let task = Arc::new(move |subject: &Subject, cancel: &Cancellation| {
            engine.forecast(&ForecastRequest::new(subject.clone(), horizon_days), cancel)
        });

        let mut summary = BatchSummary {
            run_id,
            horizon_days,
            started_at,
            forecasts: Vec::new(),
            sparse_skips: Vec::new(),
            failures: Vec::new(),
            cached_rows: 0,
        };
        for (subject, result) in self.executor.execute(subjects, task) {
            let result = result.and_then(|forecast| {
                let cached = self.engine.cache_result(&forecast)?;
                Ok((forecast, cached))
            });
            match result {
                Ok((forecast, cached)) => {
                    summary.cached_rows += cached;
                    summary.forecasts.push(forecast);
                }
                Err(ForecastError::InsufficientData { days, .. }) => {
                    info!(run_id = %run_id, subject = %subject, days, "skipping sparse subject");
                    summary.sparse_skips.push(SparseSkip { subject, days });
                }
                Err(e) => {
                    warn!(run_id = %run_id, subject = %subject, error = %e, "subject forecast failed");
                    summary.failures.push(SubjectFailure::new(subject, &e));
                }
            }
        }

        info!(
            run_id = %run_id,
            successes = summary.successes(),
            sparse_skips = summary.sparse_skips.len(),
            failures = summary.failures.len(),
            cached_rows = summary.cached_rows,
            "forecast batch complete"
        );
        Ok(summary)
    }

    /// Demand summary over at most `summary_cap` active SKUs.
    pub fn forecast_summary(&self, category: Option<&Category>, horizon_days: u32) -> EngineResult<ForecastSummary> {
        validate_horizon(horizon_days)?;
        let subjects: Vec<Subject> = self
            .engine
            .source
            .active_skus(category)?
            .into_iter()
            .take(self.engine.config.summary_cap)
            .map(Subject::Sku)
            .collect();

        let mut forecasts = Vec::new();
        let mut skipped = Vec::new();
        for entry in self.get_bulk_forecast(&subjects, horizon_days) {
            match entry.outcome.into_result() {
                Ok(result) => forecasts.push(result),
                Err(e) => skipped.push(SubjectFailure::new(entry.subject, &e)),
            }
        }

        let total: f64 = forecasts.iter().map(ForecastResult::total_demand).sum();
        Ok(ForecastSummary {
            category: category.cloned(),
            horizon_days,
            products_analysed: forecasts.len(),
            total_forecasted_demand: round2(total),
            average_daily_demand: round2(total / horizon_days as f64),
            forecasts,
            skipped,
        })
    }

    /// Fit and store a subject's model, optionally scoring it on a hold-out.
    pub fn train(&self, subject: &Subject, evaluate: bool) -> TrainReport {
        self.engine.train(subject, evaluate, &Cancellation::never())
    }

    /// Rolling-origin cross-validation of the subject's configured model over
    /// its lookback window. Nothing is saved.
    pub fn cross_validate(&self, subject: &Subject) -> EngineResult<CrossValidationReport> {
        self.engine.cross_validate(subject)
    }

    pub fn train_all(&self, subjects: &[Subject], evaluate: bool) -> TrainingSummary {
        let run_id = RunId::new();
        let started_at = self.engine.clock.now();
        info!(run_id = %run_id, subjects = subjects.len(), evaluate, "training run started");

        let engine = Arc::clone(&self.engine);
        let task =
            Arc::new(move |subject: &Subject, cancel: &Cancellation| Ok(engine.train(subject, evaluate, cancel)));
        let reports: Vec<TrainReport> = self
            .executor
            .execute(subjects, task)
            .into_iter()
            .map(|(subject, result)| result.unwrap_or_else(|e| TrainReport::failed(subject, &e)))
            .collect();

        let summary = TrainingSummary::new(run_id, started_at, reports);
        info!(
            run_id = %run_id,
            successes = summary.count(TrainStatus::Success),
            insufficient = summary.count(TrainStatus::InsufficientData),
            failures = summary.count(TrainStatus::Error),
            average_mae = summary.average_metrics.map(|m| m.mae),
            "training run complete"
        );
        summary
    }

    /// Active SKUs as subjects, optionally within one category.
    pub fn active_subjects(&self, category: Option<&Category>) -> EngineResult<Vec<Subject>> {
        Ok(self
            .engine
            .source
            .active_skus(category)?
            .into_iter()
            .map(Subject::Sku)
            .collect())
    }

    pub fn cached_forecasts(&self, subject: &Subject) -> EngineResult<Vec<CachedForecast>> {
        self.engine.cache.list(subject)
    }
}

impl<S, M, C> Engine<S, M, C>
where
    S: SalesSource,
    M: ModelStore,
    C: ForecastCache,
{
    fn forecast(&self, request: &ForecastRequest, cancel: &Cancellation) -> EngineResult<ForecastResult> {
        enter(&request.subject, PipelineStage::Requested);
        let result = self.run_pipeline(request, cancel);
        match &result {
            Ok(_) => enter(&request.subject, PipelineStage::Done),
            Err(e) => debug!(
                subject = %request.subject,
                stage = ?PipelineStage::Failed,
                error = %e,
                "pipeline stage"
            ),
        }
        result
    }

    fn run_pipeline(&self, request: &ForecastRequest, cancel: &Cancellation) -> EngineResult<ForecastResult> {
        let subject = &request.subject;
        validate_horizon(request.horizon_days)?;
        let level = request.confidence_level.unwrap_or(self.config.confidence_level);
        let now = self.clock.now();
        let today = now.date_naive();

        let (start, end) = self.history_window(today);
        let history = self.assembler.fetch_daily_quantities(subject, start, end)?;
        enter(subject, PipelineStage::DataAssembled);

        let mut warnings = Vec::new();
        let modeled = self.modeled_subject(subject, &mut warnings)?;

        let events = self.calendar()?;
        let future = self.engineer.engineer_future(
            today,
            request.horizon_days,
            &events,
            request.future_promotions.as_deref(),
            &modeled,
        );
        enter(subject, PipelineStage::Featured);

        let artifact = self.load_or_train(&modeled, today, cancel)?;
        let usage = RegressorContract::new(artifact.regressors.clone())
            .resolve_future(request.future_promotions.is_some());
        for warning in usage.iter().filter_map(|u| u.warning("the forecast horizon")) {
            warn!(subject = %subject, "{warning}");
            warnings.push(warning);
        }
        if let Some(unused) = unused_promotions(request, &artifact.regressors, &modeled) {
            warn!(subject = %subject, "{unused}");
            warnings.push(unused);
        }

        let points = artifact.model.forecast(&future, level)?;
        enter(subject, PipelineStage::Predicted);

        Ok(ForecastResult {
            subject: subject.clone(),
            modeled_subject: modeled,
            points,
            generated_at: now,
            horizon_days: request.horizon_days,
            historical_avg_daily_demand: round2(history.mean()),
            confidence_level: level,
            strategy: artifact.strategy(),
            warnings,
        })
    }

    /// `[today − lookback, today − 1]`: training data always predates the horizon.
    fn history_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = today - chrono::Duration::days(i64::from(self.config.lookback_days));
        let end = today - chrono::Duration::days(1);
        (start, end)
    }

    fn calendar(&self) -> EngineResult<CalendarEvents> {
        Ok(CalendarEvents::new(self.source.calendar_events()?).with_default_holidays())
    }

    /// The subject whose model serves the request: the subject itself, or the
    /// SKU's category when its history is sparse.
    fn modeled_subject(&self, subject: &Subject, warnings: &mut Vec<String>) -> EngineResult<Subject> {
        let days = self.source.count_sale_days(subject)?;
        let sku = match subject {
            Subject::Category(_) if days == 0 => {
                return Err(ForecastError::InsufficientData {
                    subject: subject.clone(),
                    days,
                });
            }
            Subject::Category(_) => {
                enter(subject, PipelineStage::Sufficient);
                return Ok(subject.clone());
            }
            Subject::Sku(sku) => sku,
        };

        if self.guard.classify(days) == DataSufficiency::Sufficient {
            enter(subject, PipelineStage::Sufficient);
            return Ok(subject.clone());
        }

        let category = if self.config.category_fallback {
            self.source.category_of(sku)?
        } else {
            None
        };
        let Some(category) = category else {
            return Err(ForecastError::InsufficientData {
                subject: subject.clone(),
                days,
            });
        };
        let fallback = Subject::Category(category);
        if self.source.count_sale_days(&fallback)? == 0 {
            return Err(ForecastError::InsufficientData {
                subject: subject.clone(),
                days,
            });
        }

        warn!(subject = %subject, days, fallback = %fallback, "sparse history; using category model");
        warnings.push(format!(
            "{subject} has {days} sale-day(s), below the {} required; forecast uses the {fallback} model",
            self.guard.min_sale_days()
        ));
        enter(subject, PipelineStage::FallbackToCategory);
        Ok(fallback)
    }

    fn load_or_train(&self, subject: &Subject, today: NaiveDate, cancel: &Cancellation) -> EngineResult<ModelArtifact> {
        if let Some(artifact) = self.store.load(subject)? {
            enter(subject, PipelineStage::ModelLoaded);
            return Ok(artifact);
        }
        if !self.config.train_on_missing {
            return Err(ForecastError::ModelArtifactMissing {
                subject: subject.clone(),
            });
        }

        self.with_training_lock(subject, || {
            // Another worker may have trained while we waited.
            if let Some(artifact) = self.store.load(subject)? {
                enter(subject, PipelineStage::ModelLoaded);
                return Ok(artifact);
            }

            let prepared = self.prepare_history(subject, today)?;
            if prepared.series.sale_days() == 0 {
                return Err(ForecastError::InsufficientData {
                    subject: subject.clone(),
                    days: 0,
                });
            }
            let (artifact, _) = self.fit_artifact(subject, &prepared)?;
            cancel.check(subject)?;
            self.store.save(&artifact)?;
            info!(subject = %subject, strategy = %artifact.strategy(), "trained missing model on demand");
            enter(subject, PipelineStage::ModelTrained);
            Ok(artifact)
        })
    }

    fn cache_result(&self, result: &ForecastResult) -> EngineResult<usize> {
        if !self.config.cache_forecasts {
            return Ok(0);
        }
        let rows: Vec<CachedForecast> = result
            .points
            .iter()
            .map(|p| CachedForecast::from_point(&result.subject, p, result.generated_at))
            .collect();
        self.cache.upsert(&rows)?;
        enter(&result.subject, PipelineStage::Cached);
        Ok(rows.len())
    }

    fn train(&self, subject: &Subject, evaluate: bool, cancel: &Cancellation) -> TrainReport {
        let outcome = self.with_training_lock(subject, || self.train_locked(subject, evaluate, cancel));
        match outcome {
            Ok(report) => report,
            Err(e) => {
                warn!(subject = %subject, error = %e, "training failed");
                TrainReport::failed(subject.clone(), &e)
            }
        }
    }

    fn train_locked(&self, subject: &Subject, evaluate: bool, cancel: &Cancellation) -> EngineResult<TrainReport> {
        let days = self.source.count_sale_days(subject)?;
        let sufficient = match subject {
            Subject::Sku(_) => self.guard.classify(days).is_sufficient(),
            Subject::Category(_) => days > 0,
        };
        if !sufficient {
            info!(subject = %subject, days, "insufficient data; not training");
            return Ok(TrainReport::insufficient(subject.clone(), days));
        }

        let today = self.clock.today();
        let prepared = self.prepare_history(subject, today)?;
        if prepared.series.sale_days() == 0 {
            info!(subject = %subject, "no sales inside the lookback window; not training");
            return Ok(TrainReport::insufficient(subject.clone(), 0));
        }

        let metrics = if evaluate {
            self.holdout_metrics(subject, &prepared, today)?
        } else {
            None
        };

        let (artifact, warnings) = self.fit_artifact(subject, &prepared)?;
        cancel.check(subject)?;
        self.store.save(&artifact)?;
        info!(
            subject = %subject,
            strategy = %artifact.strategy(),
            artifact = %artifact.id,
            metrics = ?metrics,
            "model trained and saved"
        );

        Ok(TrainReport {
            subject: subject.clone(),
            status: TrainStatus::Success,
            sale_days: days,
            strategy: Some(artifact.strategy()),
            metrics,
            warnings,
            error: None,
        })
    }

    /// Score the trailing hold-out window.
    fn holdout_metrics(
        &self,
        subject: &Subject,
        prepared: &PreparedHistory,
        today: NaiveDate,
    ) -> EngineResult<Option<AccuracyMetrics>> {
        let split = today - chrono::Duration::days(i64::from(self.config.holdout_days));
        match self.score_window(subject, prepared, split, None)? {
            Some(fold) => {
                info!(subject = %subject, metrics = %fold.metrics, "hold-out evaluation");
                Ok(Some(fold.metrics))
            }
            None => {
                warn!(subject = %subject, "not enough history for hold-out evaluation");
                Ok(None)
            }
        }
    }

    fn cross_validate(&self, subject: &Subject) -> EngineResult<CrossValidationReport> {
        let cv = &self.config.cross_validation;
        let prepared = self.prepare_history(subject, self.clock.today())?;
        let (Some(start), Some(end)) = (prepared.series.start(), prepared.series.end()) else {
            return Err(ForecastError::InsufficientData {
                subject: subject.clone(),
                days: 0,
            });
        };

        let horizon = chrono::Duration::days(i64::from(cv.horizon_days));
        let mut folds = Vec::new();
        for cutoff in cv.cutoffs(start, end) {
            if let Some(fold) = self.score_window(subject, &prepared, cutoff, Some(cutoff + horizon))? {
                debug!(subject = %subject, %cutoff, metrics = %fold.metrics, "cross-validation fold");
                folds.push(fold);
            }
        }
        if folds.is_empty() {
            warn!(
                subject = %subject,
                history_days = prepared.series.len(),
                initial_days = cv.initial_days,
                "history too short for cross-validation"
            );
        }

        let average_metrics =
            (!folds.is_empty()).then(|| AccuracyMetrics::average(folds.iter().map(|f| &f.metrics)));
        info!(subject = %subject, folds = folds.len(), average = ?average_metrics, "cross-validation complete");
        Ok(CrossValidationReport {
            subject: subject.clone(),
            horizon_days: cv.horizon_days,
            folds,
            average_metrics,
        })
    }

    /// Fit on rows before `from` and score `[from, until)` (to the end of the
    /// history when `until` is `None`), predicting with the window's actual
    /// regressor values.
    fn score_window(
        &self,
        subject: &Subject,
        prepared: &PreparedHistory,
        from: NaiveDate,
        until: Option<NaiveDate>,
    ) -> EngineResult<Option<CutoffMetrics>> {
        let scored = |date: NaiveDate| date >= from && until.map_or(true, |u| date < u);
        let train_rows: Vec<FeatureRow> = prepared.rows.iter().filter(|r| r.date < from).cloned().collect();
        let test_rows: Vec<FeatureRow> = prepared.rows.iter().filter(|r| scored(r.date)).cloned().collect();
        let train_days = train_rows.iter().filter(|r| r.quantity > 0.0).count() as u32;
        if test_rows.is_empty() || train_days == 0 {
            return Ok(None);
        }

        let contract = RegressorContract::for_subject(subject);
        let fitted = self.model.fit(subject, &train_rows, &contract, train_days)?;
        let predicted = fitted.model.forecast(&test_rows, self.config.confidence_level)?;
        let (_, actual) = prepared.series.split_at_date(from);
        Ok(Some(CutoffMetrics {
            cutoff: from,
            train_days,
            metrics: self.evaluator.evaluate_forecast(&actual, &predicted),
        }))
    }

    fn prepare_history(&self, subject: &Subject, today: NaiveDate) -> EngineResult<PreparedHistory> {
        let (start, end) = self.history_window(today);
        let series = self.assembler.fetch_daily_quantities(subject, start, end)?;
        let events = self.calendar()?;
        let promotions = self.source.promotions(subject, start, end)?;
        let rows = self.engineer.engineer(&series, &events, &promotions, subject);
        Ok(PreparedHistory { series, rows })
    }

    fn fit_artifact(&self, subject: &Subject, prepared: &PreparedHistory) -> EngineResult<(ModelArtifact, Vec<String>)> {
        let history_start = prepared
            .series
            .start()
            .ok_or_else(|| ForecastError::model_fit(subject, "empty training history"))?;
        let sale_days = prepared.series.sale_days();
        let contract = RegressorContract::for_subject(subject);
        let fitted = self.model.fit(subject, &prepared.rows, &contract, sale_days)?;
        for warning in &fitted.warnings {
            warn!(subject = %subject, "{warning}");
        }
        let artifact = ModelArtifact::new(
            subject.clone(),
            fitted.model,
            history_start,
            round2(prepared.series.mean()),
            sale_days,
            self.clock.now(),
        );
        Ok((artifact, fitted.warnings))
    }

    /// Run `f` holding the subject's training lock; the lock's table entry is
    /// dropped again once nobody else waits on it.
    fn with_training_lock<T>(&self, subject: &Subject, f: impl FnOnce() -> EngineResult<T>) -> EngineResult<T> {
        let lock = {
            let mut locks = self
                .training_locks
                .lock()
                .map_err(|_| ForecastError::storage("training lock table poisoned"))?;
            Arc::clone(locks.entry(subject.clone()).or_default())
        };
        let result = match lock.lock() {
            Ok(_held) => f(),
            Err(_) => Err(ForecastError::storage("training lock poisoned")),
        };
        self.release_training_lock(subject, &lock);
        result
    }

    fn release_training_lock(&self, subject: &Subject, lock: &Arc<Mutex<()>>) {
        let Ok(mut locks) = self.training_locks.lock() else {
            return;
        };
        // Clones are only handed out under the table lock: two references
        // (table + ours) mean no other worker holds or awaits this lock.
        let idle = locks
            .get(subject)
            .is_some_and(|entry| Arc::ptr_eq(entry, lock) && Arc::strong_count(entry) == 2);
        if idle {
            locks.remove(subject);
        }
    }
}

/// Warning for supplied future promotions the serving model cannot use.
fn unused_promotions(request: &ForecastRequest, regressors: &[Regressor], modeled: &Subject) -> Option<String> {
    let promotions = request.future_promotions.as_ref().filter(|p| !p.is_empty())?;
    if regressors.contains(&Regressor::IsPromo) {
        return None;
    }
    Some(format!(
        "{} supplied promotion(s) ignored: the {modeled} model has no is_promo regressor",
        promotions.len()
    ))
}

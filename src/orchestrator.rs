//! Saga orchestrator: drives a definition's steps to completion or rolls them back

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::compensation::{CompensationAction, CompensationReport, CompensationStack};
use crate::config::OrchestratorConfig;
use crate::context::{now_millis, SagaContext, SagaInstanceId, SagaStepId};
use crate::definition::{SagaDefinition, SagaOutcome, SagaStep, StepResults};
use crate::errors::{SagaError, StepError};
use crate::executor::{DefaultStepExecutor, StepExecutor, StepInvocation};
use crate::observer::{SagaObserver, TracingObserver};
use crate::records::{SagaInstance, SagaLog, SagaLogType, SagaStepRecord};
use crate::repository::RepositoryError;
use crate::stats::{OrchestratorStats, OrchestratorStatsSnapshot};
use crate::store::{SagaStore, SagaTrail};

/// Per-run bookkeeping that never outlives a single `run` call
struct Run {
    context: SagaContext,
    log_sequence: u64,
}

enum StepRun {
    Completed {
        record: SagaStepRecord,
        result: Value,
    },
    Failed {
        record: SagaStepRecord,
        error: StepError,
    },
}

/// Drives saga definitions.
///
/// Shareable across tasks; every call to [`run`](Self::run) owns its own
/// instance record, step records and compensation stack.
pub struct SagaOrchestrator {
    store: SagaStore,
    executor: Arc<dyn StepExecutor>,
    observer: Arc<dyn SagaObserver>,
    stats: Arc<OrchestratorStats>,
    config: OrchestratorConfig,
}

impl SagaOrchestrator {
    pub fn new(store: SagaStore) -> Self {
        Self {
            store,
            executor: Arc::new(DefaultStepExecutor),
            observer: Arc::new(TracingObserver),
            stats: Arc::new(OrchestratorStats::new()),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SagaObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &SagaStore {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn stats(&self) -> OrchestratorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Instance, steps and logs of a previous run
    pub async fn trail(&self, instance_id: SagaInstanceId) -> Result<SagaTrail, SagaError> {
        self.store.trail(instance_id).await
    }

    /// Execute every step of `definition` in order.
    ///
    /// Each call creates a brand-new instance. If a step fails, the undo
    /// actions of all earlier steps run newest-first, the instance ends
    /// FAILED, and the step failure is returned. Compensation failures are
    /// logged but never replace that error.
    ///
    /// Only a failure to create the initial instance record aborts the run
    /// early; later persistence failures are reported and the run continues.
    #[tracing::instrument(skip_all, fields(saga = %definition.name()))]
    pub async fn run<T>(
        &self,
        definition: &SagaDefinition<T>,
        trigger: &T,
    ) -> Result<SagaOutcome, SagaError>
    where
        T: Sync + 'static,
    {
        if let Some(step) = definition.duplicate_step() {
            return Err(SagaError::DuplicateStep {
                saga: definition.name().into(),
                step: step.into(),
            });
        }

        let mut instance = SagaInstance::new(definition.instance_name(trigger));
        self.store.instances.save(&instance).await?;

        let started_at = now_millis();
        instance.start(started_at)?;
        let mut run = Run {
            context: SagaContext::new(instance.id, &instance.name, started_at),
            log_sequence: 0,
        };
        self.persist_instance(&run, &instance).await;
        incr(&self.stats.sagas_started);
        self.observer.on_saga_started(&run.context);

        let mut stack = CompensationStack::new();
        let mut results = StepResults::new();

        for (index, step) in definition.steps().iter().enumerate() {
            let order = index as u32 + 1;
            match self
                .run_step(&mut run, step.as_ref(), order, trigger, &results)
                .await?
            {
                StepRun::Completed { record, result } => {
                    let undo = catch_unwind(AssertUnwindSafe(|| {
                        step.compensation(&record.payload, &result)
                    }))
                    .unwrap_or_else(|_| {
                        tracing::error!(step = %record.name, "building compensating action panicked");
                        Some(CompensationAction::unavailable(
                            format!("undo {}", record.name),
                            "compensating action could not be built",
                        ))
                    });
                    if let Some(action) = undo {
                        stack.push(&record, action);
                    }
                    results.push(step.name(), result);
                }
                StepRun::Failed { record, error } => {
                    let report = self.compensate(&mut run, &mut stack).await;
                    instance.fail(now_millis())?;
                    self.persist_instance(&run, &instance).await;
                    incr(&self.stats.sagas_failed);
                    self.observer
                        .on_saga_failed(&run.context, &record.name, &error.to_string());

                    return Err(SagaError::StepExecutionFailed {
                        instance_id: instance.id,
                        saga: instance.name.into(),
                        step: record.name.into(),
                        order: record.order,
                        compensations_failed: report.failed(),
                        source: error,
                    });
                }
            }
        }

        instance.complete(now_millis())?;
        self.persist_instance(&run, &instance).await;
        incr(&self.stats.sagas_completed);
        self.observer.on_saga_completed(&run.context);

        Ok(SagaOutcome {
            instance_id: instance.id,
            results,
        })
    }

    async fn run_step<T>(
        &self,
        run: &mut Run,
        step: &dyn SagaStep<T>,
        order: u32,
        trigger: &T,
        completed: &StepResults,
    ) -> Result<StepRun, SagaError>
    where
        T: Sync + 'static,
    {
        let payload = match catch_unwind(AssertUnwindSafe(|| step.payload(trigger, completed))) {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(cause)) => Err(StepError::Payload(cause)),
            Err(_) => Err(StepError::Panicked),
        };
        let max_retries = step
            .max_retries()
            .unwrap_or(self.config.default_max_retries);
        let timeout = step.timeout().or(self.config.step_timeout);

        let mut record = SagaStepRecord::new(
            run.context.instance_id,
            step.name(),
            order,
            payload.as_ref().ok().cloned().unwrap_or(Value::Null),
            max_retries,
        );
        self.persist_step(run, &record).await;

        record.start(now_millis())?;
        self.persist_step(run, &record).await;
        incr(&self.stats.steps_started);
        self.observer.on_step_started(&run.context, step.name(), order);
        self.append_log(
            run,
            record.id,
            SagaLogType::Debug,
            format!("Step '{}' started", record.name),
        )
        .await;

        let payload = match payload {
            Ok(payload) => payload,
            Err(error) => return self.fail_step(run, record, error).await,
        };

        loop {
            let attempt = record.retry_count + 1;
            let started = Instant::now();
            let invocation = StepInvocation {
                step: step.name(),
                attempt,
                timeout,
                action: step.invoke(payload.clone()),
            };

            let error = match self.executor.execute(invocation).await {
                Ok(result) => {
                    record.complete(result.clone(), now_millis())?;
                    self.persist_step(run, &record).await;
                    incr(&self.stats.steps_completed);
                    self.observer.on_step_completed(
                        &run.context,
                        step.name(),
                        started.elapsed().as_millis() as u64,
                    );
                    self.append_log(
                        run,
                        record.id,
                        SagaLogType::Info,
                        format!("Step '{}' completed", record.name),
                    )
                    .await;
                    return Ok(StepRun::Completed { record, result });
                }
                Err(error) => error,
            };

            if !record.record_retry() {
                return self.fail_step(run, record, error).await;
            }

            let message = error.to_string();
            incr(&self.stats.step_retries);
            self.observer
                .on_step_retrying(&run.context, step.name(), attempt, &message);
            self.persist_step(run, &record).await;
            self.append_log(
                run,
                record.id,
                SagaLogType::Warning,
                format!(
                    "Step '{}' attempt {} of {} failed: {}",
                    record.name,
                    attempt,
                    record.max_retries + 1,
                    message
                ),
            )
            .await;
        }
    }

    async fn fail_step(
        &self,
        run: &mut Run,
        mut record: SagaStepRecord,
        error: StepError,
    ) -> Result<StepRun, SagaError> {
        let message = error.to_string();
        record.fail(message.as_str(), now_millis())?;
        self.persist_step(run, &record).await;
        incr(&self.stats.steps_failed);
        self.observer
            .on_step_failed(&run.context, &record.name, &message);
        self.append_log(
            run,
            record.id,
            SagaLogType::Error,
            format!("Step '{}' failed: {}", record.name, message),
        )
        .await;
        Ok(StepRun::Failed { record, error })
    }

    async fn compensate(&self, run: &mut Run, stack: &mut CompensationStack) -> CompensationReport {
        let pending = stack.len();
        if pending == 0 {
            return CompensationReport::default();
        }

        self.stats
            .compensations_started
            .fetch_add(pending as u64, Ordering::Relaxed);
        self.observer.on_compensation_started(&run.context, pending);

        let report = stack.drain().await;

        for outcome in &report.outcomes {
            match &outcome.result {
                Ok(()) => {
                    incr(&self.stats.compensations_completed);
                    self.observer
                        .on_compensation_completed(&run.context, &outcome.step);
                    self.append_log(
                        run,
                        outcome.step_id,
                        SagaLogType::Info,
                        format!(
                            "Compensated step '{}': {}",
                            outcome.step, outcome.description
                        ),
                    )
                    .await;
                }
                Err(error) => {
                    let message = error.to_string();
                    incr(&self.stats.compensations_failed);
                    self.observer
                        .on_compensation_failed(&run.context, &outcome.step, &message);
                    self.append_log(run, outcome.step_id, SagaLogType::Error, message)
                        .await;
                }
            }
        }

        report
    }

    async fn persist_instance(&self, run: &Run, instance: &SagaInstance) {
        if let Err(error) = self.store.instances.save(instance).await {
            self.persistence_failed(run, "saga_instance", &error);
        }
    }

    async fn persist_step(&self, run: &Run, record: &SagaStepRecord) {
        if let Err(error) = self.store.steps.save(record).await {
            self.persistence_failed(run, "saga_step", &error);
        }
    }

    async fn append_log(
        &self,
        run: &mut Run,
        step_id: SagaStepId,
        log_type: SagaLogType,
        message: String,
    ) {
        run.log_sequence += 1;
        let log = SagaLog::new(
            run.context.instance_id,
            step_id,
            log_type,
            message,
            run.log_sequence,
            now_millis(),
        );
        if let Err(error) = self.store.logs.save(&log).await {
            self.persistence_failed(run, "saga_log", &error);
        }
    }

    fn persistence_failed(&self, run: &Run, record: &str, error: &RepositoryError) {
        incr(&self.stats.persistence_failures);
        self.observer
            .on_persistence_failed(&run.context, record, &error.to_string());
    }
}

fn incr(counter: &AtomicU64) {
    OrchestratorStats::incr(counter);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BoxError;
    use crate::observer::NoOpObserver;
    use crate::state::SagaStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    struct Flaky {
        failures_left: AtomicU32,
        retries: u32,
    }

    #[async_trait]
    impl SagaStep<()> for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn payload(&self, _trigger: &(), _completed: &StepResults) -> Result<Value, BoxError> {
            Ok(json!({}))
        }

        async fn invoke(&self, _payload: Value) -> Result<Value, BoxError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err("transient".into());
            }
            Ok(json!("ok"))
        }

        fn max_retries(&self) -> Option<u32> {
            Some(self.retries)
        }
    }

    struct Counter {
        name: &'static str,
        undone: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl SagaStep<()> for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn payload(&self, _trigger: &(), completed: &StepResults) -> Result<Value, BoxError> {
            Ok(json!({"seen": completed.len()}))
        }

        async fn invoke(&self, payload: Value) -> Result<Value, BoxError> {
            Ok(payload)
        }

        fn compensation(&self, _payload: &Value, _result: &Value) -> Option<CompensationAction> {
            let undone = Arc::clone(&self.undone);
            let name = self.name;
            Some(CompensationAction::new(format!("undo {name}"), move || async move {
                undone.lock().unwrap().push(name);
                Ok::<(), BoxError>(())
            }))
        }
    }

    fn orchestrator() -> SagaOrchestrator {
        SagaOrchestrator::new(SagaStore::in_memory()).with_observer(Arc::new(NoOpObserver))
    }

    #[tokio::test]
    async fn transient_failure_is_retried_within_ceiling() {
        let orchestrator = orchestrator();
        let definition = SagaDefinition::new("retry").step(Flaky {
            failures_left: AtomicU32::new(2),
            retries: 2,
        });

        let outcome = orchestrator.run(&definition, &()).await.unwrap();
        let trail = orchestrator.trail(outcome.instance_id).await.unwrap();

        assert_eq!(trail.steps[0].status, SagaStatus::Completed);
        assert_eq!(trail.steps[0].retry_count, 2);
        let warnings = trail
            .logs
            .iter()
            .filter(|l| l.log_type == SagaLogType::Warning)
            .count();
        assert_eq!(warnings, 2);
        assert_eq!(orchestrator.stats().step_retries, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_step() {
        let orchestrator = orchestrator();
        let definition = SagaDefinition::new("retry").step(Flaky {
            failures_left: AtomicU32::new(5),
            retries: 1,
        });

        let err = orchestrator.run(&definition, &()).await.unwrap_err();
        let instance_id = err.instance_id().unwrap();
        let trail = orchestrator.trail(instance_id).await.unwrap();

        assert_eq!(trail.instance.status, SagaStatus::Failed);
        assert_eq!(trail.steps[0].status, SagaStatus::Failed);
        assert_eq!(trail.steps[0].retry_count, 1);
        assert!(trail.steps[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("transient"));
    }

    #[tokio::test]
    async fn later_payloads_see_earlier_results() {
        let orchestrator = orchestrator();
        let undone = Arc::new(Mutex::new(Vec::new()));
        let definition = SagaDefinition::new("chain")
            .step(Counter {
                name: "first",
                undone: Arc::clone(&undone),
            })
            .step(Counter {
                name: "second",
                undone: Arc::clone(&undone),
            });

        let outcome = orchestrator.run(&definition, &()).await.unwrap();

        assert_eq!(outcome.results.get("first"), Some(&json!({"seen": 0})));
        assert_eq!(outcome.results.get("second"), Some(&json!({"seen": 1})));
        assert!(undone.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn payload_error_fails_step_and_compensates() {
        struct BadPayload;

        #[async_trait]
        impl SagaStep<()> for BadPayload {
            fn name(&self) -> &str {
                "bad_payload"
            }

            fn payload(&self, _trigger: &(), completed: &StepResults) -> Result<Value, BoxError> {
                completed.decode::<u64>("missing")?;
                Ok(Value::Null)
            }

            async fn invoke(&self, _payload: Value) -> Result<Value, BoxError> {
                unreachable!("payload never builds")
            }
        }

        let orchestrator = orchestrator();
        let undone = Arc::new(Mutex::new(Vec::new()));
        let definition = SagaDefinition::new("payload")
            .step(Counter {
                name: "first",
                undone: Arc::clone(&undone),
            })
            .step(BadPayload);

        let err = orchestrator.run(&definition, &()).await.unwrap_err();

        assert!(matches!(err.step_error(), Some(StepError::Payload(_))));
        assert_eq!(*undone.lock().unwrap(), vec!["first"]);
    }

    struct PanickingPayload;

    #[async_trait]
    impl SagaStep<()> for PanickingPayload {
        fn name(&self) -> &str {
            "panicking_payload"
        }

        fn payload(&self, _trigger: &(), _completed: &StepResults) -> Result<Value, BoxError> {
            let ids: Vec<u64> = Vec::new();
            Ok(json!(ids[0]))
        }

        async fn invoke(&self, _payload: Value) -> Result<Value, BoxError> {
            unreachable!("payload never builds")
        }
    }

    struct PanickingUndo;

    #[async_trait]
    impl SagaStep<()> for PanickingUndo {
        fn name(&self) -> &str {
            "panicking_undo"
        }

        fn payload(&self, _trigger: &(), _completed: &StepResults) -> Result<Value, BoxError> {
            Ok(json!({}))
        }

        async fn invoke(&self, payload: Value) -> Result<Value, BoxError> {
            Ok(payload)
        }

        fn compensation(&self, _payload: &Value, _result: &Value) -> Option<CompensationAction> {
            panic!("cannot describe undo");
        }
    }

    #[tokio::test]
    async fn payload_panic_fails_step_and_compensates() {
        let orchestrator = orchestrator();
        let undone = Arc::new(Mutex::new(Vec::new()));
        let definition = SagaDefinition::new("payload_panic")
            .step(Counter {
                name: "first",
                undone: Arc::clone(&undone),
            })
            .step(PanickingPayload);

        let err = orchestrator.run(&definition, &()).await.unwrap_err();

        assert!(matches!(err.step_error(), Some(StepError::Panicked)));
        assert_eq!(*undone.lock().unwrap(), vec!["first"]);

        let trail = orchestrator.trail(err.instance_id().unwrap()).await.unwrap();
        assert_eq!(trail.instance.status, SagaStatus::Failed);
        assert_eq!(trail.steps[1].status, SagaStatus::Failed);
        assert_eq!(trail.steps[1].payload, Value::Null);
    }

    #[tokio::test]
    async fn undo_builder_panic_counts_as_failed_compensation() {
        let orchestrator = orchestrator();
        let undone = Arc::new(Mutex::new(Vec::new()));
        let definition = SagaDefinition::new("undo_panic")
            .step(Counter {
                name: "first",
                undone: Arc::clone(&undone),
            })
            .step(PanickingUndo)
            .step(Flaky {
                failures_left: AtomicU32::new(1),
                retries: 0,
            });

        let err = orchestrator.run(&definition, &()).await.unwrap_err();

        assert!(matches!(
            err,
            SagaError::StepExecutionFailed { order: 3, compensations_failed: 1, .. }
        ));
        assert_eq!(*undone.lock().unwrap(), vec!["first"]);
        let trail = orchestrator.trail(err.instance_id().unwrap()).await.unwrap();
        assert_eq!(trail.instance.status, SagaStatus::Failed);
    }

    #[tokio::test]
    async fn repeated_step_name_is_rejected_before_running() {
        let orchestrator = orchestrator();
        let undone = Arc::new(Mutex::new(Vec::new()));
        let definition = SagaDefinition::new("twice")
            .step(Counter {
                name: "same",
                undone: Arc::clone(&undone),
            })
            .step(Counter {
                name: "same",
                undone: Arc::clone(&undone),
            });

        let err = orchestrator.run(&definition, &()).await.unwrap_err();

        assert!(matches!(err, SagaError::DuplicateStep { ref step, .. } if &**step == "same"));
        assert_eq!(orchestrator.stats().sagas_started, 0);
    }

    #[tokio::test]
    async fn empty_definition_completes_immediately() {
        let orchestrator = orchestrator();
        let definition = SagaDefinition::<()>::new("empty");

        let outcome = orchestrator.run(&definition, &()).await.unwrap();
        let instance = orchestrator.store().instance(outcome.instance_id).await.unwrap();

        assert_eq!(instance.status, SagaStatus::Completed);
        assert!(outcome.results.is_empty());
    }
}

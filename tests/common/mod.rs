//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tenant_saga::{
    BoxError, CompensationAction, InMemoryRepository, Page, Pagination, Record, Repository,
    RepositoryError, SagaContext, SagaObserver, SagaStep, StepResults,
};

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Copy)]
pub enum Action {
    Succeed,
    Fail(&'static str),
    Sleep(Duration),
}

#[derive(Clone, Copy)]
pub enum Undo {
    Nothing,
    Succeed,
    Fail(&'static str),
}

/// Step whose behaviour is fixed up front; records what ran in a journal
pub struct ScriptedStep {
    name: &'static str,
    action: Action,
    undo: Undo,
    journal: Journal,
}

impl ScriptedStep {
    pub fn new(name: &'static str, action: Action, undo: Undo, journal: &Journal) -> Self {
        Self {
            name,
            action,
            undo,
            journal: Arc::clone(journal),
        }
    }

    pub fn ok(name: &'static str, journal: &Journal) -> Self {
        Self::new(name, Action::Succeed, Undo::Succeed, journal)
    }

    pub fn failing(name: &'static str, message: &'static str, journal: &Journal) -> Self {
        Self::new(name, Action::Fail(message), Undo::Nothing, journal)
    }
}

#[async_trait]
impl SagaStep<u32> for ScriptedStep {
    fn name(&self) -> &str {
        self.name
    }

    fn payload(&self, trigger: &u32, completed: &StepResults) -> Result<Value, BoxError> {
        Ok(json!({ "trigger": trigger, "after": completed.len() }))
    }

    async fn invoke(&self, _payload: Value) -> Result<Value, BoxError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("run {}", self.name));
        match self.action {
            Action::Succeed => Ok(json!({ "step": self.name })),
            Action::Fail(message) => Err(message.into()),
            Action::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(json!({ "step": self.name }))
            }
        }
    }

    fn compensation(&self, _payload: &Value, _result: &Value) -> Option<CompensationAction> {
        let journal = Arc::clone(&self.journal);
        let name = self.name;
        let outcome = match self.undo {
            Undo::Nothing => return None,
            Undo::Succeed => None,
            Undo::Fail(message) => Some(message),
        };
        Some(CompensationAction::new(format!("undo {name}"), move || async move {
            journal.lock().unwrap().push(format!("undo {name}"));
            match outcome {
                None => Ok(()),
                Some(message) => Err::<(), BoxError>(message.into()),
            }
        }))
    }
}

/// In-memory repository that starts rejecting saves once its allowance is used up
pub struct FlakyRepository<R: Record> {
    inner: InMemoryRepository<R>,
    saves_left: AtomicUsize,
}

impl<R: Record> FlakyRepository<R> {
    pub fn new(allowed_saves: usize) -> Self {
        Self {
            inner: InMemoryRepository::new(),
            saves_left: AtomicUsize::new(allowed_saves),
        }
    }
}

#[async_trait]
impl<R: Record> Repository<R> for FlakyRepository<R> {
    async fn save(&self, record: &R) -> Result<(), RepositoryError> {
        let allowed = self
            .saves_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(RepositoryError::Storage("disk full".into()));
        }
        self.inner.save(record).await
    }

    async fn find_by_id(&self, id: R::Id) -> Result<Option<R>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_criteria(
        &self,
        criteria: &R::Criteria,
        pagination: Pagination,
    ) -> Result<Page<R>, RepositoryError> {
        self.inner.find_by_criteria(criteria, pagination).await
    }

    async fn delete(&self, id: R::Id) -> Result<bool, RepositoryError> {
        self.inner.delete(id).await
    }
}

/// Observer that keeps every callback as a short string
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SagaObserver for RecordingObserver {
    fn on_saga_started(&self, _context: &SagaContext) {
        self.push("saga_started".into());
    }

    fn on_step_started(&self, _context: &SagaContext, step: &str, order: u32) {
        self.push(format!("step_started {step} #{order}"));
    }

    fn on_step_completed(&self, _context: &SagaContext, step: &str, _duration_millis: u64) {
        self.push(format!("step_completed {step}"));
    }

    fn on_step_retrying(&self, _context: &SagaContext, step: &str, attempt: u32, _error: &str) {
        self.push(format!("step_retrying {step} attempt {attempt}"));
    }

    fn on_step_failed(&self, _context: &SagaContext, step: &str, _error: &str) {
        self.push(format!("step_failed {step}"));
    }

    fn on_compensation_started(&self, _context: &SagaContext, pending: usize) {
        self.push(format!("compensation_started {pending}"));
    }

    fn on_compensation_completed(&self, _context: &SagaContext, step: &str) {
        self.push(format!("compensation_completed {step}"));
    }

    fn on_compensation_failed(&self, _context: &SagaContext, step: &str, _error: &str) {
        self.push(format!("compensation_failed {step}"));
    }

    fn on_saga_completed(&self, _context: &SagaContext) {
        self.push("saga_completed".into());
    }

    fn on_saga_failed(&self, _context: &SagaContext, step: &str, _reason: &str) {
        self.push(format!("saga_failed {step}"));
    }

    fn on_persistence_failed(&self, _context: &SagaContext, record: &str, _error: &str) {
        self.push(format!("persistence_failed {record}"));
    }
}

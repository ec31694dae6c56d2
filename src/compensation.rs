//! Run-scoped compensation stack
//!
//! Every successful step pushes its undo action. When a later step fails the
//! stack is drained newest-first; one failing action never stops the others.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::SagaStepId;
use crate::errors::{BoxError, CompensationError};
use crate::records::SagaStepRecord;

type UndoFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Zero-argument asynchronous action undoing one completed step
pub struct CompensationAction {
    description: Box<str>,
    undo: UndoFn,
}

impl CompensationAction {
    pub fn new<F, Fut>(description: impl Into<Box<str>>, undo: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            description: description.into(),
            undo: Box::new(move || undo().boxed()),
        }
    }

    /// Action that always fails with `reason`.
    ///
    /// Keeps an effect that cannot be undone visible in the rollback report
    /// instead of silently dropping it.
    pub fn unavailable(description: impl Into<Box<str>>, reason: &'static str) -> Self {
        Self::new(description, move || async move { Err::<(), BoxError>(reason.into()) })
    }

    /// What the action will undo, e.g. "delete user 42"
    pub fn description(&self) -> &str {
        &self.description
    }

    fn invoke(self) -> BoxFuture<'static, Result<(), BoxError>> {
        (self.undo)()
    }
}

impl std::fmt::Debug for CompensationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompensationAction")
            .field("description", &self.description)
            .finish()
    }
}

struct Entry {
    step_id: SagaStepId,
    step: Box<str>,
    order: u32,
    action: CompensationAction,
}

/// Result of one compensating action
#[derive(Debug)]
pub struct CompensationOutcome {
    pub step_id: SagaStepId,
    pub step: Box<str>,
    pub order: u32,
    pub description: Box<str>,
    pub result: Result<(), CompensationError>,
}

/// Everything that happened during one drain, in execution order
#[derive(Debug, Default)]
pub struct CompensationReport {
    pub outcomes: Vec<CompensationOutcome>,
}

impl CompensationReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

/// LIFO collection of undo actions owned by a single run
#[derive(Default)]
pub struct CompensationStack {
    entries: Vec<Entry>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the undo action of a step that just completed
    pub fn push(&mut self, step: &SagaStepRecord, action: CompensationAction) {
        self.entries.push(Entry {
            step_id: step.id,
            step: step.name.as_str().into(),
            order: step.order,
            action,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every pending action from last pushed to first.
    ///
    /// The stack is empty afterwards regardless of individual failures or
    /// panics.
    pub async fn drain(&mut self) -> CompensationReport {
        let entries = std::mem::take(&mut self.entries);
        let mut report = CompensationReport {
            outcomes: Vec::with_capacity(entries.len()),
        };

        for entry in entries.into_iter().rev() {
            let Entry {
                step_id,
                step,
                order,
                action,
            } = entry;
            let description: Box<str> = action.description().into();

            let undo = AssertUnwindSafe(async move { action.invoke().await });
            let result = match undo.catch_unwind().await {
                Ok(Ok(())) => {
                    tracing::debug!(step = %step, %description, "compensating action succeeded");
                    Ok(())
                }
                Ok(Err(source)) => {
                    tracing::warn!(step = %step, %description, error = %source, "compensating action failed");
                    Err(CompensationError::Failed {
                        step: step.clone(),
                        source,
                    })
                }
                Err(_) => {
                    tracing::warn!(step = %step, %description, "compensating action panicked");
                    Err(CompensationError::Panicked { step: step.clone() })
                }
            };

            report.outcomes.push(CompensationOutcome {
                step_id,
                step,
                order,
                description,
                result,
            });
        }

        report
    }
}

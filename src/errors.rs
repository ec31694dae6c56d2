//! Error types for saga execution and compensation

use std::time::Duration;

use uuid::Uuid;

use crate::context::SagaInstanceId;
use crate::repository::RepositoryError;
use crate::state::TransitionError;

/// Opaque cause raised by a step action or a compensating action
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a single step attempt failed
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The action itself returned an error
    #[error("step action failed: {0}")]
    Failed(#[source] BoxError),
    /// The payload could not be derived from the trigger and earlier results
    #[error("step payload could not be built: {0}")]
    Payload(#[source] BoxError),
    /// The action did not finish within the configured step timeout
    #[error("step timed out after {0:?}")]
    TimedOut(Duration),
    /// The action panicked while running
    #[error("step action panicked")]
    Panicked,
}

/// Failure of one compensating action.
///
/// Recorded in the saga log and reported to the observer; never surfaced as
/// the error of the run.
#[derive(Debug, thiserror::Error)]
pub enum CompensationError {
    #[error("compensation for step '{step}' failed: {source}")]
    Failed {
        step: Box<str>,
        #[source]
        source: BoxError,
    },
    #[error("compensation for step '{step}' panicked")]
    Panicked { step: Box<str> },
}

impl CompensationError {
    /// Name of the step whose undo failed
    pub fn step(&self) -> &str {
        match self {
            Self::Failed { step, .. } | Self::Panicked { step } => step,
        }
    }
}

/// Kind of record a read-back expected to find
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Instance,
    Step,
    Log,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Instance => "saga instance",
            Self::Step => "saga step",
            Self::Log => "saga log",
        })
    }
}

/// Error returned by the orchestrator
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    /// A step failed; earlier steps were compensated before this was returned.
    ///
    /// `source` is always the original step failure, whatever happened
    /// during compensation.
    #[error("saga '{saga}' failed at step '{step}'")]
    StepExecutionFailed {
        instance_id: SagaInstanceId,
        saga: Box<str>,
        step: Box<str>,
        order: u32,
        /// Compensating actions that failed during rollback
        compensations_failed: usize,
        #[source]
        source: StepError,
    },
    /// Two steps of one definition share a name; nothing was run
    #[error("saga '{saga}' defines step '{step}' more than once")]
    DuplicateStep { saga: Box<str>, step: Box<str> },
    /// A record that must exist was missing on read-back
    #[error("{kind} {id} not found")]
    RecordNotFound { kind: RecordKind, id: Uuid },
    #[error("saga persistence failed")]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    /// A completed step's result did not have the shape its consumer expected
    #[error("result of step '{step}' is malformed")]
    MalformedResult {
        step: Box<str>,
        #[source]
        source: BoxError,
    },
}

impl SagaError {
    /// The step failure behind this error, if any
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            Self::StepExecutionFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn instance_id(&self) -> Option<SagaInstanceId> {
        match self {
            Self::StepExecutionFailed { instance_id, .. } => Some(*instance_id),
            _ => None,
        }
    }
}

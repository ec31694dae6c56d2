//! Orchestration-based SAGA for the tenant backend
//!
//! A central orchestrator runs a saga definition step by step, persisting an
//! instance record, one record per step and an ordered audit log. When a step
//! fails, the undo actions of every step that already succeeded run in reverse
//! order and the instance ends FAILED.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tenant_saga::registration::{InMemoryDirectory, RegistrationRequest, RegistrationSaga};
//! use tenant_saga::{SagaOrchestrator, SagaStore};
//!
//! // 1. Wire the stores and the orchestrator
//! let orchestrator = SagaOrchestrator::new(SagaStore::in_memory());
//!
//! // 2. Build the saga over its command interfaces
//! let directory = Arc::new(InMemoryDirectory::new());
//! let saga = RegistrationSaga::new(directory.clone(), directory);
//!
//! // 3. Run it; on failure earlier steps are already compensated
//! let registration = saga.register(&orchestrator, &request).await?;
//! let trail = orchestrator.trail(registration.instance_id).await?;
//!
//! // Custom sagas implement `SagaStep<T>` and run through
//! // `orchestrator.run(&SagaDefinition::new("name").step(..), &trigger)`.
//! ```

// === Core Types ===
mod context;
mod errors;
mod records;
mod state;

// === Execution ===
mod compensation;
mod config;
mod definition;
mod executor;
mod orchestrator;

// === Storage ===
#[cfg(feature = "lmdb")]
mod lmdb;
mod repository;
mod store;

// === Observability ===
mod observer;
mod stats;

// === Sagas ===
pub mod registration;

// === Re-exports ===

// Types
pub use context::{now_millis, SagaContext, SagaInstanceId, SagaLogId, SagaStepId};
pub use records::{SagaInstance, SagaLog, SagaLogType, SagaStepRecord};

// State
pub use state::{SagaStatus, TransitionError};

// Errors
pub use errors::{BoxError, CompensationError, RecordKind, SagaError, StepError};

// Execution
pub use compensation::{
    CompensationAction, CompensationOutcome, CompensationReport, CompensationStack,
};
pub use config::OrchestratorConfig;
pub use definition::{SagaDefinition, SagaOutcome, SagaStep, StepResults};
pub use executor::{DefaultStepExecutor, StepExecutor, StepFuture, StepInvocation};
pub use orchestrator::SagaOrchestrator;

// Storage
#[cfg(feature = "lmdb")]
pub use lmdb::{LmdbRepository, LmdbStore};
pub use repository::{
    InMemoryRepository, InstanceCriteria, LogCriteria, Page, Pagination, Record, Repository,
    RepositoryError, StepCriteria,
};
pub use store::{SagaStore, SagaTrail};

// Observability
pub use observer::{NoOpObserver, SagaObserver, TracingObserver};
pub use stats::{OrchestratorStats, OrchestratorStatsSnapshot};

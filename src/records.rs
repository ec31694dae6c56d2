//! Durable records written by the orchestrator: instances, steps and logs

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{SagaInstanceId, SagaLogId, SagaStepId};
use crate::state::{SagaStatus, TransitionError};

/// One orchestration run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SagaInstance {
    pub id: SagaInstanceId,
    pub name: String,
    pub status: SagaStatus,
    /// Set when the instance enters RUNNING
    pub start_date: Option<u64>,
    /// Set when the instance reaches a terminal state
    pub end_date: Option<u64>,
}

impl SagaInstance {
    /// Create a PENDING instance with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SagaInstanceId::new(),
            name: name.into(),
            status: SagaStatus::Pending,
            start_date: None,
            end_date: None,
        }
    }

    pub fn start(&mut self, now_millis: u64) -> Result<(), TransitionError> {
        self.status = self.status.transition(SagaStatus::Running)?;
        self.start_date = Some(now_millis);
        Ok(())
    }

    pub fn complete(&mut self, now_millis: u64) -> Result<(), TransitionError> {
        self.status = self.status.transition(SagaStatus::Completed)?;
        self.end_date = Some(now_millis);
        Ok(())
    }

    pub fn fail(&mut self, now_millis: u64) -> Result<(), TransitionError> {
        self.status = self.status.transition(SagaStatus::Failed)?;
        self.end_date = Some(now_millis);
        Ok(())
    }
}

/// One step within an instance.
///
/// Records are historical facts: compensation never rewrites a COMPLETED step,
/// it only runs the step's undo action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SagaStepRecord {
    pub id: SagaStepId,
    pub saga_instance_id: SagaInstanceId,
    pub name: String,
    /// 1-based position; steps execute in ascending order
    pub order: u32,
    pub status: SagaStatus,
    pub start_date: Option<u64>,
    pub end_date: Option<u64>,
    pub error_message: Option<String>,
    /// Attempts made beyond the first one
    pub retry_count: u32,
    /// Ceiling for `retry_count`
    pub max_retries: u32,
    pub payload: Value,
    pub result: Option<Value>,
}

impl SagaStepRecord {
    pub fn new(
        saga_instance_id: SagaInstanceId,
        name: impl Into<String>,
        order: u32,
        payload: Value,
        max_retries: u32,
    ) -> Self {
        Self {
            id: SagaStepId::new(),
            saga_instance_id,
            name: name.into(),
            order,
            status: SagaStatus::Pending,
            start_date: None,
            end_date: None,
            error_message: None,
            retry_count: 0,
            max_retries,
            payload,
            result: None,
        }
    }

    pub fn start(&mut self, now_millis: u64) -> Result<(), TransitionError> {
        self.status = self.status.transition(SagaStatus::Running)?;
        self.start_date = Some(now_millis);
        Ok(())
    }

    pub fn complete(&mut self, result: Value, now_millis: u64) -> Result<(), TransitionError> {
        self.status = self.status.transition(SagaStatus::Completed)?;
        self.result = Some(result);
        self.end_date = Some(now_millis);
        Ok(())
    }

    pub fn fail(
        &mut self,
        error_message: impl Into<String>,
        now_millis: u64,
    ) -> Result<(), TransitionError> {
        self.status = self.status.transition(SagaStatus::Failed)?;
        self.error_message = Some(error_message.into());
        self.end_date = Some(now_millis);
        Ok(())
    }

    /// Whether another attempt is still within the retry ceiling
    pub fn can_retry(&self) -> bool {
        self.status == SagaStatus::Running && self.retry_count < self.max_retries
    }

    /// Count one more attempt; returns `false` once the ceiling is reached
    pub fn record_retry(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.retry_count += 1;
        true
    }
}

/// Severity of a saga log line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaLogType {
    Info,
    Warning,
    Error,
    Debug,
}

impl SagaLogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
        }
    }
}

impl std::fmt::Display for SagaLogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Append-only audit line, always attributable to a step of an instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SagaLog {
    pub id: SagaLogId,
    pub saga_instance_id: SagaInstanceId,
    pub saga_step_id: SagaStepId,
    pub log_type: SagaLogType,
    pub message: String,
    /// Position within the run's trail
    pub sequence: u64,
    pub created_at: u64,
}

impl SagaLog {
    pub fn new(
        saga_instance_id: SagaInstanceId,
        saga_step_id: SagaStepId,
        log_type: SagaLogType,
        message: impl Into<String>,
        sequence: u64,
        now_millis: u64,
    ) -> Self {
        Self {
            id: SagaLogId::new(),
            saga_instance_id,
            saga_step_id,
            log_type,
            message: message.into(),
            sequence,
            created_at: now_millis,
        }
    }
}

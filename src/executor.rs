//! Step executor: runs one unit of work and reports success or failure

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::errors::{BoxError, StepError};

/// The pending work of one step attempt
pub type StepFuture<'a> = BoxFuture<'a, Result<Value, BoxError>>;

/// One attempt at running a step's action
pub struct StepInvocation<'a> {
    pub step: &'a str,
    /// 1-based attempt number
    pub attempt: u32,
    pub timeout: Option<Duration>,
    pub action: StepFuture<'a>,
}

/// Performs one unit of work.
///
/// Implementations know nothing about retries or compensation; any error they
/// return is treated by the orchestrator as a step failure.
#[async_trait]
pub trait StepExecutor: Send + Sync + 'static {
    async fn execute(&self, invocation: StepInvocation<'_>) -> Result<Value, StepError>;
}

/// Awaits the action in place, enforcing the invocation timeout and turning
/// panics into [`StepError::Panicked`]
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultStepExecutor;

#[async_trait]
impl StepExecutor for DefaultStepExecutor {
    async fn execute(&self, invocation: StepInvocation<'_>) -> Result<Value, StepError> {
        let StepInvocation {
            step,
            attempt,
            timeout,
            action,
        } = invocation;

        tracing::trace!(step = %step, attempt, "invoking step action");
        let guarded = AssertUnwindSafe(action).catch_unwind();
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(StepError::TimedOut(limit)),
            },
            None => guarded.await,
        };

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(cause)) => Err(StepError::Failed(cause)),
            Err(_) => Err(StepError::Panicked),
        }
    }
}

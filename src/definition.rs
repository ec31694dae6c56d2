//! Code-defined saga definitions
//!
//! A definition is a fixed, ordered list of steps. Each step derives its
//! payload from the trigger and the results of the steps before it, performs
//! its action, and may hand back an undo action for the compensation stack.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::compensation::CompensationAction;
use crate::context::SagaInstanceId;
use crate::errors::BoxError;

/// One step of a saga triggered by `T`.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl SagaStep<RegistrationRequest> for CreateUserStep {
///     fn name(&self) -> &str { "create_user" }
///
///     fn payload(&self, trigger: &RegistrationRequest, _: &StepResults)
///         -> Result<Value, BoxError>
///     {
///         Ok(serde_json::to_value(trigger.new_user())?)
///     }
///
///     async fn invoke(&self, payload: Value) -> Result<Value, BoxError> {
///         // call the user command interface
///     }
///
///     fn compensation(&self, _: &Value, result: &Value) -> Option<CompensationAction> {
///         // delete the user that was just created
///     }
/// }
/// ```
#[async_trait]
pub trait SagaStep<T>: Send + Sync + 'static {
    /// Unique name within the definition; keys the step's result.
    /// `SagaOrchestrator::run` refuses definitions that repeat a name.
    fn name(&self) -> &str;

    /// Build the payload for this step
    fn payload(&self, trigger: &T, completed: &StepResults) -> Result<Value, BoxError>;

    /// Perform the unit of work
    async fn invoke(&self, payload: Value) -> Result<Value, BoxError>;

    /// Undo action for a successful invocation; `None` for steps with nothing to undo
    fn compensation(&self, _payload: &Value, _result: &Value) -> Option<CompensationAction> {
        None
    }

    /// Retry ceiling; `None` uses the orchestrator default
    fn max_retries(&self) -> Option<u32> {
        None
    }

    /// Per-attempt deadline; `None` uses the orchestrator default
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Results of completed steps, in execution order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepResults {
    entries: Vec<(Box<str>, Value)>,
}

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: &str, result: Value) {
        self.entries.push((step.into(), result));
    }

    pub fn get(&self, step: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name.as_ref() == step)
            .map(|(_, value)| value)
    }

    /// Deserialize the result of an earlier step
    pub fn decode<R: DeserializeOwned>(&self, step: &str) -> Result<R, BoxError> {
        let value = self
            .get(step)
            .ok_or_else(|| format!("no result recorded for step '{step}'"))?;
        Ok(R::deserialize(value)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_ref(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Successful run of a saga
#[derive(Clone, Debug)]
pub struct SagaOutcome {
    pub instance_id: SagaInstanceId,
    pub results: StepResults,
}

type Describe<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

/// Ordered, immutable list of steps plus a naming rule for instances
pub struct SagaDefinition<T> {
    name: Box<str>,
    describe: Option<Describe<T>>,
    steps: Vec<Box<dyn SagaStep<T>>>,
}

impl<T> SagaDefinition<T> {
    pub fn new(name: impl Into<Box<str>>) -> Self {
        Self {
            name: name.into(),
            describe: None,
            steps: Vec::new(),
        }
    }

    /// Name each instance from its trigger, e.g. "Complete User Registration for a@b.c"
    pub fn describe_with<F>(mut self, describe: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.describe = Some(Box::new(describe));
        self
    }

    /// Append a step; steps run in the order they are added
    pub fn step<S>(mut self, step: S) -> Self
    where
        S: SagaStep<T>,
    {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_name(&self, trigger: &T) -> String {
        match &self.describe {
            Some(describe) => describe(trigger),
            None => self.name.to_string(),
        }
    }

    pub fn steps(&self) -> &[Box<dyn SagaStep<T>>] {
        &self.steps
    }

    /// First step name that appears more than once, if any
    pub fn duplicate_step(&self) -> Option<&str>
    where
        T: 'static,
    {
        self.steps.iter().enumerate().find_map(|(index, step)| {
            self.steps[..index]
                .iter()
                .any(|earlier| earlier.name() == step.name())
                .then(|| step.name())
        })
    }
}

//! Two-step registration: create the user, then its auth record

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::commands::{AuthCommands, AuthId, NewAuth, NewUser, UserCommands, UserId};
use crate::compensation::CompensationAction;
use crate::context::SagaInstanceId;
use crate::definition::{SagaDefinition, SagaStep, StepResults};
use crate::errors::{BoxError, SagaError};
use crate::orchestrator::SagaOrchestrator;

pub const CREATE_USER: &str = "create_user";
pub const CREATE_AUTH: &str = "create_auth";

/// Trigger of the registration saga
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
}

/// Identifiers produced by a successful registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub instance_id: SagaInstanceId,
    pub user_id: UserId,
    pub auth_id: AuthId,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedUser {
    user_id: UserId,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedAuth {
    auth_id: AuthId,
}

struct CreateUserStep {
    users: Arc<dyn UserCommands>,
}

#[async_trait]
impl SagaStep<RegistrationRequest> for CreateUserStep {
    fn name(&self) -> &str {
        CREATE_USER
    }

    fn payload(
        &self,
        request: &RegistrationRequest,
        _completed: &StepResults,
    ) -> Result<Value, BoxError> {
        Ok(serde_json::to_value(NewUser {
            email: request.email.clone(),
            display_name: request.display_name.clone(),
        })?)
    }

    async fn invoke(&self, payload: Value) -> Result<Value, BoxError> {
        let user: NewUser = serde_json::from_value(payload)?;
        let user_id = self.users.create_user(user).await?;
        Ok(serde_json::to_value(CreatedUser { user_id })?)
    }

    fn compensation(&self, _payload: &Value, result: &Value) -> Option<CompensationAction> {
        let CreatedUser { user_id } = match CreatedUser::deserialize(result) {
            Ok(created) => created,
            Err(error) => {
                tracing::warn!(step = CREATE_USER, %error, "no user id in step result");
                return Some(CompensationAction::unavailable(
                    "delete_user <unknown>",
                    "create_user result carries no user id",
                ));
            }
        };
        let users = Arc::clone(&self.users);
        Some(CompensationAction::new(
            format!("delete_user {user_id}"),
            move || async move { Ok::<(), BoxError>(users.delete_user(user_id).await?) },
        ))
    }
}

struct CreateAuthStep {
    auth: Arc<dyn AuthCommands>,
}

#[async_trait]
impl SagaStep<RegistrationRequest> for CreateAuthStep {
    fn name(&self) -> &str {
        CREATE_AUTH
    }

    fn payload(
        &self,
        request: &RegistrationRequest,
        completed: &StepResults,
    ) -> Result<Value, BoxError> {
        let CreatedUser { user_id } = completed.decode(CREATE_USER)?;
        Ok(serde_json::to_value(NewAuth {
            user_id,
            email: request.email.clone(),
            password_hash: request.password_hash.clone(),
        })?)
    }

    async fn invoke(&self, payload: Value) -> Result<Value, BoxError> {
        let auth: NewAuth = serde_json::from_value(payload)?;
        let auth_id = self.auth.create_auth(auth).await?;
        Ok(serde_json::to_value(CreatedAuth { auth_id })?)
    }

    fn compensation(&self, _payload: &Value, result: &Value) -> Option<CompensationAction> {
        let CreatedAuth { auth_id } = match CreatedAuth::deserialize(result) {
            Ok(created) => created,
            Err(error) => {
                tracing::warn!(step = CREATE_AUTH, %error, "no auth id in step result");
                return Some(CompensationAction::unavailable(
                    "delete_auth <unknown>",
                    "create_auth result carries no auth id",
                ));
            }
        };
        let auth = Arc::clone(&self.auth);
        Some(CompensationAction::new(
            format!("delete_auth {auth_id}"),
            move || async move { Ok::<(), BoxError>(auth.delete_auth(auth_id).await?) },
        ))
    }
}

/// Registers a user and their credentials atomically from the caller's view
pub struct RegistrationSaga {
    definition: SagaDefinition<RegistrationRequest>,
}

impl RegistrationSaga {
    pub fn new(users: Arc<dyn UserCommands>, auth: Arc<dyn AuthCommands>) -> Self {
        let definition = SagaDefinition::new("user_registration")
            .describe_with(|request: &RegistrationRequest| {
                format!("Complete User Registration for {}", request.email)
            })
            .step(CreateUserStep { users })
            .step(CreateAuthStep { auth });
        Self { definition }
    }

    pub fn definition(&self) -> &SagaDefinition<RegistrationRequest> {
        &self.definition
    }

    /// Run the saga; on failure the user created by the first step is removed again
    pub async fn register(
        &self,
        orchestrator: &SagaOrchestrator,
        request: &RegistrationRequest,
    ) -> Result<Registration, SagaError> {
        let outcome = orchestrator.run(&self.definition, request).await?;

        let CreatedUser { user_id } = outcome
            .results
            .decode(CREATE_USER)
            .map_err(|source| malformed(CREATE_USER, source))?;
        let CreatedAuth { auth_id } = outcome
            .results
            .decode(CREATE_AUTH)
            .map_err(|source| malformed(CREATE_AUTH, source))?;

        Ok(Registration {
            instance_id: outcome.instance_id,
            user_id,
            auth_id,
        })
    }
}

fn malformed(step: &str, source: BoxError) -> SagaError {
    SagaError::MalformedResult {
        step: step.into(),
        source,
    }
}

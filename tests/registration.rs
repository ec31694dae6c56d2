//! End-to-end registration saga: success, rollback and failed rollback.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use tenant_saga::registration::{
    AuthCommands, AuthId, CommandError, InMemoryDirectory, NewAuth, RegistrationRequest,
    RegistrationSaga, UserCommands, CREATE_AUTH, CREATE_USER,
};
use tenant_saga::{
    NoOpObserver, SagaError, SagaLogType, SagaOrchestrator, SagaStatus, SagaStore, StepError,
};

/// Auth backend that is down. Optionally removes the user first, the way a
/// concurrent admin cleanup would.
struct BrokenAuth {
    directory: Arc<InMemoryDirectory>,
    remove_user_first: bool,
}

#[async_trait]
impl AuthCommands for BrokenAuth {
    async fn create_auth(&self, auth: NewAuth) -> Result<AuthId, CommandError> {
        if self.remove_user_first {
            self.directory.delete_user(auth.user_id).await?;
        }
        Err(CommandError::Unavailable("auth service down".to_string()))
    }

    async fn delete_auth(&self, _id: AuthId) -> Result<(), CommandError> {
        Ok(())
    }
}

fn request() -> RegistrationRequest {
    RegistrationRequest {
        email: "grace@example.com".to_string(),
        display_name: "Grace Hopper".to_string(),
        password_hash: "argon2:7f3a".to_string(),
    }
}

fn orchestrator() -> SagaOrchestrator {
    common::init_tracing();
    SagaOrchestrator::new(SagaStore::in_memory()).with_observer(Arc::new(NoOpObserver))
}

#[tokio::test]
async fn both_steps_succeed() {
    let directory = Arc::new(InMemoryDirectory::new());
    let saga = RegistrationSaga::new(directory.clone(), directory.clone());
    let orchestrator = orchestrator();

    let registration = saga.register(&orchestrator, &request()).await.unwrap();
    let trail = orchestrator.trail(registration.instance_id).await.unwrap();

    assert_eq!(trail.instance.status, SagaStatus::Completed);
    assert_eq!(
        trail.instance.name,
        "Complete User Registration for grace@example.com"
    );
    assert_eq!(trail.steps.len(), 2);
    assert!(trail.steps.iter().all(|s| s.status == SagaStatus::Completed));
    assert_eq!(trail.steps[0].name, CREATE_USER);
    assert_eq!(trail.steps[1].name, CREATE_AUTH);

    assert_eq!(
        directory.auth(registration.auth_id).unwrap().user_id,
        registration.user_id
    );
    assert_eq!(directory.user_count(), 1);
}

#[tokio::test]
async fn auth_failure_deletes_the_new_user() {
    let directory = Arc::new(InMemoryDirectory::new());
    let auth = Arc::new(BrokenAuth {
        directory: directory.clone(),
        remove_user_first: false,
    });
    let saga = RegistrationSaga::new(directory.clone(), auth);
    let orchestrator = orchestrator();

    let err = saga.register(&orchestrator, &request()).await.unwrap_err();

    assert!(matches!(
        &err,
        SagaError::StepExecutionFailed { step, order: 2, compensations_failed: 0, .. }
            if &**step == CREATE_AUTH
    ));
    assert!(matches!(
        err.step_error(),
        Some(StepError::Failed(cause)) if cause.to_string().contains("auth service down")
    ));
    assert_eq!(directory.user_count(), 0);

    let trail = orchestrator.trail(err.instance_id().unwrap()).await.unwrap();
    assert_eq!(trail.instance.status, SagaStatus::Failed);
    // the user step stays COMPLETED even though its effect was undone
    assert_eq!(trail.steps[0].status, SagaStatus::Completed);
    assert_eq!(trail.steps[1].status, SagaStatus::Failed);
    assert!(trail
        .logs
        .iter()
        .any(|log| log.log_type == SagaLogType::Info && log.message.contains("delete_user")));
}

#[tokio::test]
async fn failed_user_cleanup_still_reports_auth_failure() {
    let directory = Arc::new(InMemoryDirectory::new());
    let auth = Arc::new(BrokenAuth {
        directory: directory.clone(),
        remove_user_first: true,
    });
    let saga = RegistrationSaga::new(directory.clone(), auth);
    let orchestrator = orchestrator();

    let err = saga.register(&orchestrator, &request()).await.unwrap_err();

    assert!(matches!(
        &err,
        SagaError::StepExecutionFailed { step, compensations_failed: 1, .. }
            if &**step == CREATE_AUTH
    ));
    assert!(err
        .step_error()
        .unwrap()
        .to_string()
        .contains("auth service down"));

    let trail = orchestrator.trail(err.instance_id().unwrap()).await.unwrap();
    assert_eq!(trail.instance.status, SagaStatus::Failed);
    let compensation_errors: Vec<_> = trail
        .logs
        .iter()
        .filter(|log| log.log_type == SagaLogType::Error && log.saga_step_id == trail.steps[0].id)
        .collect();
    assert_eq!(compensation_errors.len(), 1);
    assert!(compensation_errors[0].message.contains("not found"));
}

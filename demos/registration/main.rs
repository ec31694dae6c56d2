//! User Registration Example
//!
//! Runs the registration saga three times against an in-memory directory:
//!
//! - a fresh email: both steps succeed
//! - the same email again: the first step fails, nothing to undo
//! - an auth backend that is down: the new user is deleted again
//!
//! Run with `RUST_LOG=debug` to see every step and compensation.

use std::sync::Arc;

use async_trait::async_trait;
use tenant_saga::registration::{
    AuthCommands, AuthId, CommandError, InMemoryDirectory, NewAuth, RegistrationRequest,
    RegistrationSaga,
};
use tenant_saga::{SagaInstanceId, SagaOrchestrator, SagaStore};

struct OfflineAuth;

#[async_trait]
impl AuthCommands for OfflineAuth {
    async fn create_auth(&self, _auth: NewAuth) -> Result<AuthId, CommandError> {
        Err(CommandError::Unavailable("auth service offline".to_string()))
    }

    async fn delete_auth(&self, _id: AuthId) -> Result<(), CommandError> {
        Ok(())
    }
}

fn request(email: &str) -> RegistrationRequest {
    RegistrationRequest {
        email: email.to_string(),
        display_name: "Demo User".to_string(),
        password_hash: "argon2:demo".to_string(),
    }
}

async fn print_trail(orchestrator: &SagaOrchestrator, id: SagaInstanceId) {
    match orchestrator.trail(id).await {
        Ok(trail) => {
            println!("  instance {} [{}] {}", trail.instance.id, trail.instance.status, trail.instance.name);
            for step in &trail.steps {
                println!("    step #{} {} [{}]", step.order, step.name, step.status);
            }
            for log in &trail.logs {
                println!("    {:>3} {:<7} {}", log.sequence, log.log_type, log.message);
            }
        }
        Err(error) => println!("  trail unavailable: {error}"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = SagaStore::in_memory();
    let orchestrator = SagaOrchestrator::new(store);
    let directory = Arc::new(InMemoryDirectory::new());
    let saga = RegistrationSaga::new(directory.clone(), directory.clone());

    println!("== new account");
    match saga.register(&orchestrator, &request("ada@example.com")).await {
        Ok(registration) => {
            println!("  registered user {} / auth {}", registration.user_id, registration.auth_id);
            print_trail(&orchestrator, registration.instance_id).await;
        }
        Err(error) => println!("  unexpected failure: {error}"),
    }

    println!("== duplicate email");
    if let Err(error) = saga.register(&orchestrator, &request("ada@example.com")).await {
        println!("  rejected: {error}");
        if let Some(id) = error.instance_id() {
            print_trail(&orchestrator, id).await;
        }
    }

    println!("== auth backend offline");
    let offline = RegistrationSaga::new(directory.clone(), Arc::new(OfflineAuth));
    if let Err(error) = offline.register(&orchestrator, &request("grace@example.com")).await {
        println!("  rejected: {error}");
        if let Some(id) = error.instance_id() {
            print_trail(&orchestrator, id).await;
        }
    }
    println!("  users left in directory: {}", directory.user_count());

    println!("== stats: {:?}", orchestrator.stats());
}

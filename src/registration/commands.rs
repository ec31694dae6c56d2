//! Command interfaces the registration saga drives, plus an in-memory directory

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::record_id;

record_id!(
    /// Identifier of a user account
    UserId
);
record_id!(
    /// Identifier of an authentication record
    AuthId
);

/// Errors raised by user and auth commands
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Conflict(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: uuid::Uuid },
    #[error("command backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuth {
    pub user_id: UserId,
    pub email: String,
    /// Already hashed by the caller; never a plain-text password
    pub password_hash: String,
}

#[async_trait]
pub trait UserCommands: Send + Sync + 'static {
    async fn create_user(&self, user: NewUser) -> Result<UserId, CommandError>;
    async fn delete_user(&self, id: UserId) -> Result<(), CommandError>;
}

#[async_trait]
pub trait AuthCommands: Send + Sync + 'static {
    async fn create_auth(&self, auth: NewAuth) -> Result<AuthId, CommandError>;
    async fn delete_auth(&self, id: AuthId) -> Result<(), CommandError>;
}

/// Users and auth records held in process memory.
///
/// Emails are unique per table. An auth record can only be created for a user
/// that exists.
pub struct InMemoryDirectory {
    users: RwLock<HashMap<UserId, NewUser>>,
    auths: RwLock<HashMap<AuthId, NewAuth>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            auths: RwLock::new(HashMap::new()),
        }
    }

    pub fn user(&self, id: UserId) -> Option<NewUser> {
        self.users.read().ok()?.get(&id).cloned()
    }

    pub fn auth(&self, id: AuthId) -> Option<NewAuth> {
        self.auths.read().ok()?.get(&id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.users.read().map(|users| users.len()).unwrap_or(0)
    }

    pub fn auth_count(&self) -> usize {
        self.auths.read().map(|auths| auths.len()).unwrap_or(0)
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> CommandError {
    CommandError::Unavailable("directory lock poisoned".to_string())
}

#[async_trait]
impl UserCommands for InMemoryDirectory {
    async fn create_user(&self, user: NewUser) -> Result<UserId, CommandError> {
        let mut users = self.users.write().map_err(poisoned)?;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(CommandError::Conflict(format!(
                "user with email {} already exists",
                user.email
            )));
        }
        let id = UserId::new();
        users.insert(id, user);
        Ok(id)
    }

    async fn delete_user(&self, id: UserId) -> Result<(), CommandError> {
        let mut users = self.users.write().map_err(poisoned)?;
        users
            .remove(&id)
            .map(|_| ())
            .ok_or(CommandError::NotFound {
                kind: "user",
                id: id.into(),
            })
    }
}

#[async_trait]
impl AuthCommands for InMemoryDirectory {
    async fn create_auth(&self, auth: NewAuth) -> Result<AuthId, CommandError> {
        let user_exists = self.users.read().map_err(poisoned)?.contains_key(&auth.user_id);
        if !user_exists {
            return Err(CommandError::NotFound {
                kind: "user",
                id: auth.user_id.into(),
            });
        }

        let mut auths = self.auths.write().map_err(poisoned)?;
        if auths.values().any(|existing| existing.email == auth.email) {
            return Err(CommandError::Conflict(format!(
                "auth record for {} already exists",
                auth.email
            )));
        }
        let id = AuthId::new();
        auths.insert(id, auth);
        Ok(id)
    }

    async fn delete_auth(&self, id: AuthId) -> Result<(), CommandError> {
        let mut auths = self.auths.write().map_err(poisoned)?;
        auths
            .remove(&id)
            .map(|_| ())
            .ok_or(CommandError::NotFound {
                kind: "auth record",
                id: id.into(),
            })
    }
}

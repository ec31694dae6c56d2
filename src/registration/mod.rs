//! User registration saga
//!
//! Creates a user account and then its authentication record. If the auth
//! record cannot be created the new user is deleted again, so a failed
//! registration leaves no half-registered account behind.

mod commands;
mod saga;

pub use commands::{
    AuthCommands, AuthId, CommandError, InMemoryDirectory, NewAuth, NewUser, UserCommands, UserId,
};
pub use saga::{Registration, RegistrationRequest, RegistrationSaga, CREATE_AUTH, CREATE_USER};

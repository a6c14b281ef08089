//! Storage backends for fleetgate
//!
//! Each collaborator is a trait with a PostgreSQL implementation and an
//! in-memory implementation for tests and development mode.

pub mod refresh_token;
pub mod user;

pub use refresh_token::{
    InMemoryRefreshTokenStore, PgRefreshTokenStore, RefreshTokenStore, StoreError, hash_token,
};
pub use user::{DirectoryError, InMemoryUserDirectory, PgUserRepository, UserDirectory};

//! Database module for fleetgate
//!
//! This module provides database connectivity, models, and the user and
//! refresh-token storage backends.

pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used items
pub use models::*;
pub use pool::{DbConfig, DbError, connect};
pub use repositories::{
    DirectoryError, InMemoryRefreshTokenStore, InMemoryUserDirectory, PgRefreshTokenStore,
    PgUserRepository, RefreshTokenStore, StoreError, UserDirectory,
};

// Re-export sqlx types that might be needed
pub use sqlx::PgPool;

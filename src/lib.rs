pub mod auth;
pub mod config;
pub mod constants;
pub mod database;
pub mod details;
pub mod expenses;
pub mod friends;
pub mod metrics;
pub mod models;
pub mod trips;
pub mod utils;

// Re-export types at crate root for convenient importing
pub use crate::database::{Db, TransactionError, with_transaction};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Single shared database (users, trips, expenses)
    pub db: Db,
}

pub mod auth;
pub mod error;
pub mod models;
pub mod pagination;
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage;
pub mod view;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;

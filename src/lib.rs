// Public API for integration tests and potential library usage

pub mod abuse;
pub mod api;
pub mod auth;
pub mod content;
pub mod digest;
pub mod error;
pub mod protocol;
pub mod state;
pub mod types;
pub mod ws;

// Re-export broadcast for testing
pub mod broadcast;

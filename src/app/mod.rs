//! Shared server state

pub mod state;

pub use state::{JoinError, ServerContext};

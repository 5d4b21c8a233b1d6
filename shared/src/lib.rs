//! Shared infrastructure for ContentGen backend services

pub mod database;
pub mod observability;
pub mod retry;

pub use retry::{retry, RetryPolicy};

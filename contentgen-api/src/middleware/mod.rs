// Middleware and extractors for the API
pub mod auth;
pub mod logging;
pub mod rate_limiter;

pub use auth::{CurrentUser, SuperUser};

//! Request/response bodies, database rows and the content document model.

pub mod ai;
pub mod content;
pub mod dashboard;
pub mod error;
pub mod image;
pub mod media;
pub mod post;
pub mod token;
pub mod user;

pub use error::{ApiError, ApiResult};

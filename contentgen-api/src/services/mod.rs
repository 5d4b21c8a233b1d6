pub mod ai_generator;
pub mod auth_service;
pub mod database;
pub mod email;
pub mod image_uploader;
pub mod media_service;
pub mod redis;
pub mod storage;

pub use ai_generator::AiGenerator;
pub use auth_service::AuthService;
pub use database::DatabaseService;
pub use email::EmailService;
pub use image_uploader::ImageUploader;
pub use media_service::MediaService;
pub use redis::RedisCounterStore;

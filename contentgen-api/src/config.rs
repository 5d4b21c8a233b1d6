use serde::{Deserialize, Serialize};
use shared::database::DatabaseConfig;
use shared::observability::{LogFormat, LogLevel};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::middleware::rate_limiter::RateLimitRule;

const DEFAULT_SECRET: &str = "changethis";

/// Upper bound for any token lifetime, about ten years
const MAX_TOKEN_LIFETIME_DAYS: i64 = 3650;
const MAX_POLL_WAIT_SECONDS: f64 = 60.0;
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub security: SecurityConfig,
    pub rate_limits: RateLimitsConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub ai: AiConfig,
    pub cors: CorsConfig,
    pub superuser: SuperuserConfig,
    pub logging: LoggingConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    Staging,
    Production,
}

impl Environment {
    pub fn is_local(&self) -> bool {
        matches!(self, Environment::Local)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "development" | "dev" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::InvalidValue(format!(
                "Invalid ENVIRONMENT: {}",
                other
            ))),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Public base URL of this service, used in links and upload URLs
    pub public_url: String,
    pub project_name: String,
    pub frontend_host: String,
    pub api_prefix: String,
    pub environment: Environment,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

/// Token lifetimes and signing secret
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub email_reset_token_expire_hours: i64,
    pub email_verification_token_expire_hours: i64,
}

/// Rate-limit rules, each written as `N/unit` items separated by `;`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub enabled: bool,
    pub login: String,
    pub public_ai: String,
    pub protected_ai: String,
}

/// Local uploads and S3-compatible object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub max_file_size: usize,
    pub allowed_extensions: Vec<String>,
    pub upload_dir: String,
    /// Browser-facing object store URL
    pub minio_base_url: String,
    /// Endpoint the service itself talks to
    pub minio_api_base_url: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
    pub region: String,
    pub signed_url_expiration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    /// Postmark server token; takes precedence over plain SMTP
    pub smtp_token: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub flux_api_base_url: String,
    pub flux_api_key: String,
    pub openai_api_base_url: String,
    pub openai_api_key: String,
    pub draft_model: String,
    pub moderation_model: String,
    pub poll_max_attempts: u32,
    pub poll_wait_seconds: f64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub backend_cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperuserConfig {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            public_url: "http://localhost:8000".to_string(),
            project_name: "ContentGen".to_string(),
            frontend_host: "http://localhost:3000".to_string(),
            api_prefix: "/api/v1".to_string(),
            environment: Environment::Local,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: DEFAULT_SECRET.to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
            email_reset_token_expire_hours: 48,
            email_verification_token_expire_hours: 24,
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login: "5/minute;20/hour".to_string(),
            public_ai: "2/minute;5/hour".to_string(),
            protected_ai: "5/minute;10/hour".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "mp4", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            upload_dir: "uploads".to_string(),
            minio_base_url: "http://localhost:9000".to_string(),
            minio_api_base_url: "http://minio:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket_name: "uploads".to_string(),
            region: "us-east-1".to_string(),
            signed_url_expiration: 3600,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            smtp_token: None,
            from_email: None,
            from_name: None,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            flux_api_base_url: "https://api.bfl.ml/v1".to_string(),
            flux_api_key: String::new(),
            openai_api_base_url: "https://api.openai.com/v1".to_string(),
            openai_api_key: String::new(),
            draft_model: "gpt-4o-2024-08-06".to_string(),
            moderation_model: "omni-moderation-latest".to_string(),
            poll_max_attempts: 30,
            poll_wait_seconds: 0.3,
            request_timeout_seconds: 60,
        }
    }
}

impl Default for SuperuserConfig {
    fn default() -> Self {
        Self {
            email: "admin@example.com".to_string(),
            password: DEFAULT_SECRET.to_string(),
            full_name: "Admin".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> ConfigResult<Option<T>> {
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("Invalid {}: {}", name, raw))),
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = AppConfig::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration with priority: env -> file -> defaults.
    ///
    /// The result is not validated; call [`AppConfig::validate`] once logging
    /// is up so that warnings are visible.
    pub fn load() -> ConfigResult<Self> {
        let path = env_var("CONFIG_FILE").unwrap_or_else(|| "config.toml".to_string());
        if !Path::new(&path).exists() {
            return Self::from_env();
        }
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides to existing config
    fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        // Server
        if let Some(env) = env_parse::<Environment>("ENVIRONMENT")? {
            self.server.environment = env;
        }
        if let Some(v) = env_var("PROJECT_NAME") {
            self.server.project_name = v;
        }
        if let Some(v) = env_var("SERVER_HOST") {
            self.server.public_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_var("BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(v) = env_parse("PORT")? {
            self.server.port = v;
        }
        if let Some(v) = env_var("FRONTEND_HOST") {
            self.server.frontend_host = v.trim_end_matches('/').to_string();
        }

        // Database
        if let Some(v) = env_var("POSTGRES_SERVER") {
            self.database.host = v;
        }
        if let Some(v) = env_parse("POSTGRES_PORT")? {
            self.database.port = v;
        }
        if let Some(v) = env_var("POSTGRES_USER") {
            self.database.username = v;
        }
        if let Some(v) = env_var("POSTGRES_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = env_var("POSTGRES_DB") {
            self.database.database_name = v;
        }
        if let Some(v) = env_var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Some(v) = env_parse("DATABASE_MAX_CONNECTIONS")? {
            self.database.max_connections = v;
        }

        // Redis and rate limits
        if let Some(v) = env_var("REDIS_URL") {
            self.redis.url = v;
        }
        if let Some(v) = env_parse("RATE_LIMIT_ENABLED")? {
            self.rate_limits.enabled = v;
        }
        if let Some(v) = env_var("RATE_LIMIT_LOGIN") {
            self.rate_limits.login = v;
        }
        if let Some(v) = env_var("RATE_LIMIT_PUBLIC_AI") {
            self.rate_limits.public_ai = v;
        }
        if let Some(v) = env_var("RATE_LIMIT_PROTECTED_AI") {
            self.rate_limits.protected_ai = v;
        }

        // Security
        if let Some(v) = env_var("SECRET_KEY") {
            self.security.secret_key = v;
        }
        if let Some(v) = env_parse("ACCESS_TOKEN_EXPIRE_MINUTES")? {
            self.security.access_token_expire_minutes = v;
        }
        if let Some(v) = env_parse("REFRESH_TOKEN_EXPIRE_DAYS")? {
            self.security.refresh_token_expire_days = v;
        }
        if let Some(v) = env_parse("EMAIL_RESET_TOKEN_EXPIRE_HOURS")? {
            self.security.email_reset_token_expire_hours = v;
        }
        if let Some(v) = env_parse("EMAIL_VERIFICATION_TOKEN_EXPIRE_HOURS")? {
            self.security.email_verification_token_expire_hours = v;
        }

        // CORS
        if let Some(v) = env_var("BACKEND_CORS_ORIGINS") {
            self.cors.backend_cors_origins = split_list(&v);
        }

        // Storage
        if let Some(v) = env_parse("MAX_FILE_SIZE")? {
            self.storage.max_file_size = v;
        }
        if let Some(v) = env_var("ALLOWED_EXTENSIONS") {
            self.storage.allowed_extensions =
                split_list(&v).into_iter().map(|e| e.to_lowercase()).collect();
        }
        if let Some(v) = env_var("UPLOAD_DIR") {
            self.storage.upload_dir = v;
        }
        if let Some(v) = env_var("MINIO_BASE_URL") {
            self.storage.minio_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_var("MINIO_API_BASE_URL") {
            self.storage.minio_api_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_var("MINIO_ROOT_USER") {
            self.storage.access_key = v;
        }
        if let Some(v) = env_var("MINIO_ROOT_PASSWORD") {
            self.storage.secret_key = v;
        }
        if let Some(v) = env_var("MINIO_BUCKET_NAME") {
            self.storage.bucket_name = v;
        }
        if let Some(v) = env_var("MINIO_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = env_parse("SIGNED_URL_EXPIRATION")? {
            self.storage.signed_url_expiration = v;
        }

        // Email
        if let Some(v) = env_var("SMTP_HOST") {
            self.email.smtp_host = Some(v);
        }
        if let Some(v) = env_parse("SMTP_PORT")? {
            self.email.smtp_port = v;
        }
        if let Some(v) = env_var("SMTP_USER") {
            self.email.smtp_user = Some(v);
        }
        if let Some(v) = env_var("SMTP_PASSWORD") {
            self.email.smtp_password = Some(v);
        }
        if let Some(v) = env_var("SMTP_TOKEN") {
            self.email.smtp_token = Some(v);
        }
        if let Some(v) = env_var("EMAILS_FROM_EMAIL") {
            self.email.from_email = Some(v);
        }
        if let Some(v) = env_var("EMAILS_FROM_NAME") {
            self.email.from_name = Some(v);
        }

        // AI providers
        if let Some(v) = env_var("FLUX_API_BASE_URL") {
            self.ai.flux_api_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_var("FLUX_API_KEY") {
            self.ai.flux_api_key = v;
        }
        if let Some(v) = env_var("OPENAI_API_BASE_URL") {
            self.ai.openai_api_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_var("OPENAI_API_KEY") {
            self.ai.openai_api_key = v;
        }
        if let Some(v) = env_parse("IMAGE_GENERATION_POLL_MAX_ATTEMPTS")? {
            self.ai.poll_max_attempts = v;
        }
        if let Some(v) = env_parse("IMAGE_GENERATION_POLL_WAIT_SECONDS")? {
            self.ai.poll_wait_seconds = v;
        }

        // First superuser
        if let Some(v) = env_var("FIRST_SUPERUSER") {
            self.superuser.email = v;
        }
        if let Some(v) = env_var("FIRST_SUPERUSER_PASSWORD") {
            self.superuser.password = v;
        }
        if let Some(v) = env_var("FIRST_SUPERUSER_NAME") {
            self.superuser.full_name = v;
        }

        // Logging
        if let Some(v) = env_var("LOG_LEVEL") {
            self.logging.level = v
                .parse()
                .map_err(|e: shared::observability::ObservabilityError| {
                    ConfigError::InvalidValue(e.to_string())
                })?;
        }
        if let Some(v) = env_var("LOG_FORMAT") {
            self.logging.format = v
                .parse()
                .map_err(|e: shared::observability::ObservabilityError| {
                    ConfigError::InvalidValue(e.to_string())
                })?;
        }

        Ok(())
    }

    fn check_default_secret(&self, name: &str, value: &str) -> ConfigResult<()> {
        if value != DEFAULT_SECRET {
            return Ok(());
        }
        let message = format!(
            "The value of {} is \"{}\", for security, please change it, at least for deployments.",
            name, DEFAULT_SECRET
        );
        if self.server.environment.is_local() {
            warn!("{}", message);
            Ok(())
        } else {
            Err(ConfigError::InvalidValue(message))
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue("Server port cannot be 0".to_string()));
        }
        if self.security.secret_key.is_empty() {
            return Err(ConfigError::MissingField("SECRET_KEY".to_string()));
        }
        for (name, value, max) in [
            (
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                self.security.access_token_expire_minutes,
                MAX_TOKEN_LIFETIME_DAYS * 24 * 60,
            ),
            (
                "REFRESH_TOKEN_EXPIRE_DAYS",
                self.security.refresh_token_expire_days,
                MAX_TOKEN_LIFETIME_DAYS,
            ),
            (
                "EMAIL_RESET_TOKEN_EXPIRE_HOURS",
                self.security.email_reset_token_expire_hours,
                MAX_TOKEN_LIFETIME_DAYS * 24,
            ),
            (
                "EMAIL_VERIFICATION_TOKEN_EXPIRE_HOURS",
                self.security.email_verification_token_expire_hours,
                MAX_TOKEN_LIFETIME_DAYS * 24,
            ),
        ] {
            if !(1..=max).contains(&value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be between 1 and {}",
                    name, max
                )));
            }
        }
        if !self.redis.url.starts_with("redis://") {
            return Err(ConfigError::InvalidValue(
                "Redis URL must start with redis://".to_string(),
            ));
        }
        if self.ai.poll_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "IMAGE_GENERATION_POLL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if !(0.0..=MAX_POLL_WAIT_SECONDS).contains(&self.ai.poll_wait_seconds) {
            return Err(ConfigError::InvalidValue(format!(
                "IMAGE_GENERATION_POLL_WAIT_SECONDS must be between 0 and {}",
                MAX_POLL_WAIT_SECONDS
            )));
        }
        if self.storage.max_file_size > MAX_UPLOAD_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "MAX_FILE_SIZE cannot exceed {} bytes",
                MAX_UPLOAD_BYTES
            )));
        }
        if self.storage.bucket_name.is_empty() {
            return Err(ConfigError::MissingField("MINIO_BUCKET_NAME".to_string()));
        }
        for (name, rule) in [
            ("RATE_LIMIT_LOGIN", &self.rate_limits.login),
            ("RATE_LIMIT_PUBLIC_AI", &self.rate_limits.public_ai),
            ("RATE_LIMIT_PROTECTED_AI", &self.rate_limits.protected_ai),
        ] {
            RateLimitRule::parse_list(rule)
                .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", name, e)))?;
        }

        self.check_default_secret("SECRET_KEY", &self.security.secret_key)?;
        self.check_default_secret("POSTGRES_PASSWORD", &self.database.password)?;
        self.check_default_secret("FIRST_SUPERUSER_PASSWORD", &self.superuser.password)?;

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    /// Origins allowed by CORS: the configured list plus the frontend
    pub fn all_cors_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = self
            .cors
            .backend_cors_origins
            .iter()
            .map(|o| o.trim_end_matches('/').to_string())
            .collect();
        if !origins.contains(&self.server.frontend_host) {
            origins.push(self.server.frontend_host.clone());
        }
        origins
    }

    pub fn emails_enabled(&self) -> bool {
        self.email.smtp_host.is_some() && self.email.from_email.is_some()
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs_f64(self.ai.poll_wait_seconds)
    }

    /// Request bodies may carry a full upload plus multipart framing
    pub fn body_limit_bytes(&self) -> usize {
        self.storage.max_file_size.saturating_add(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.environment, Environment::Local);
        assert_eq!(config.server.api_prefix, "/api/v1");
        assert_eq!(config.security.access_token_expire_minutes, 30);
        assert_eq!(config.storage.max_file_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_production_default_secret_rejected() {
        let mut config = AppConfig::default();
        config.server.environment = Environment::Production;
        assert!(config.validate().is_err());

        config.security.secret_key = "a-real-secret".to_string();
        config.database.password = "db-secret".to_string();
        config.superuser.password = "admin-secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_url_scheme() {
        let mut config = AppConfig::default();
        config.redis.url = "http://localhost:6379".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_lifetimes_bounded() {
        let mut config = AppConfig::default();
        config.security.refresh_token_expire_days = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.security.access_token_expire_minutes = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.security.email_reset_token_expire_hours = MAX_TOKEN_LIFETIME_DAYS * 24 + 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.security.email_verification_token_expire_hours = MAX_TOKEN_LIFETIME_DAYS * 24;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_wait_and_upload_size_bounded() {
        let mut config = AppConfig::default();
        config.ai.poll_wait_seconds = 1e300;
        assert!(config.validate().is_err());
        config.ai.poll_wait_seconds = f64::NAN;
        assert!(config.validate().is_err());
        config.ai.poll_wait_seconds = -0.5;
        assert!(config.validate().is_err());
        config.ai.poll_wait_seconds = MAX_POLL_WAIT_SECONDS;
        assert!(config.validate().is_ok());

        config.storage.max_file_size = usize::MAX;
        assert!(config.validate().is_err());
        assert_eq!(config.body_limit_bytes(), usize::MAX);
    }

    #[test]
    fn test_bad_rate_limit_rule() {
        let mut config = AppConfig::default();
        config.rate_limits.login = "five per minute".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_cors_origins() {
        let mut config = AppConfig::default();
        config.cors.backend_cors_origins = vec![
            "http://localhost:5173/".to_string(),
            "https://app.example.com".to_string(),
        ];
        assert_eq!(
            config.all_cors_origins(),
            vec![
                "http://localhost:5173".to_string(),
                "https://app.example.com".to_string(),
                "http://localhost:3000".to_string(),
            ]
        );
    }

    #[test]
    fn test_emails_enabled() {
        let mut config = AppConfig::default();
        assert!(!config.emails_enabled());
        config.email.smtp_host = Some("smtp.example.com".to_string());
        assert!(!config.emails_enabled());
        config.email.from_email = Some("noreply@example.com".to_string());
        assert!(config.emails_enabled());
    }

    #[test]
    fn test_toml_partial_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000
            environment = "staging"

            [storage]
            bucket_name = "media"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.environment, Environment::Staging);
        assert_eq!(config.storage.bucket_name, "media");
        assert_eq!(config.storage.upload_dir, "uploads");
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("local".parse::<Environment>().unwrap(), Environment::Local);
        assert_eq!("PRODUCTION".parse::<Environment>().unwrap(), Environment::Production);
        assert!("qa".parse::<Environment>().is_err());
        assert!(Environment::Production.is_production());
        assert!(!Environment::Staging.is_local());
    }

    #[test]
    fn test_poll_wait() {
        let config = AppConfig::default();
        let wait = config.poll_wait().as_secs_f64();
        assert!((wait - 0.3).abs() < 1e-6);
    }
}

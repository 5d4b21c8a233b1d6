use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::models::error::{ApiError, ApiResult};
use crate::models::token::Token;

#[derive(Error, Debug, PartialEq)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Invalid token type")]
    WrongType,
    #[error("Failed to generate token: {0}")]
    Encoding(String),
}

/// What a token may be used for, stored in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    PasswordReset,
    MagicLink,
    EmailVerification,
}

/// JWT claims. `sub` is a user id for access/refresh tokens and an email otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

impl Claims {
    fn new(sub: String, kind: TokenKind, ttl: Duration, user_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            sub,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            kind,
            user_id,
        }
    }

    /// Subject parsed as a user id
    pub fn user_uuid(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid)
    }
}

/// Password hashing plus HS256 token issuing and checking
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
    verification_ttl: Duration,
}

impl AuthService {
    pub fn new(config: &SecurityConfig) -> Self {
        let secret = config.secret_key.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::default(),
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expire_days),
            reset_ttl: Duration::hours(config.email_reset_token_expire_hours),
            verification_ttl: Duration::hours(config.email_verification_token_expire_hours),
        }
    }

    /// Hash a password using Argon2 with a random salt
    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))
    }

    /// A malformed stored hash never verifies
    pub fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        match PasswordHash::new(password_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!("Stored password hash is not a valid PHC string: {}", e);
                false
            }
        }
    }

    pub fn access_token_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Decode a token and require the given kind
    pub fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;
        if data.claims.kind != expected {
            return Err(TokenError::WrongType);
        }
        Ok(data.claims)
    }

    pub fn create_access_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.encode(&Claims::new(
            user_id.to_string(),
            TokenKind::Access,
            self.access_ttl,
            None,
        ))
    }

    pub fn create_refresh_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.encode(&Claims::new(
            user_id.to_string(),
            TokenKind::Refresh,
            self.refresh_ttl,
            None,
        ))
    }

    pub fn create_token_pair(&self, user_id: Uuid) -> Result<Token, TokenError> {
        Ok(Token::bearer(
            self.create_access_token(user_id)?,
            self.create_refresh_token(user_id)?,
            self.access_token_seconds(),
        ))
    }

    pub fn create_password_reset_token(&self, email: &str) -> Result<String, TokenError> {
        self.encode(&Claims::new(
            email.to_string(),
            TokenKind::PasswordReset,
            self.reset_ttl,
            None,
        ))
    }

    pub fn create_magic_link_token(&self, email: &str) -> Result<String, TokenError> {
        self.encode(&Claims::new(
            email.to_string(),
            TokenKind::MagicLink,
            self.access_ttl,
            None,
        ))
    }

    pub fn create_email_verification_token(
        &self,
        email: &str,
        user_id: Uuid,
    ) -> Result<String, TokenError> {
        self.encode(&Claims::new(
            email.to_string(),
            TokenKind::EmailVerification,
            self.verification_ttl,
            Some(user_id),
        ))
    }

    /// Email carried by a password reset token
    pub fn verify_password_reset_token(&self, token: &str) -> Result<String, TokenError> {
        self.decode(token, TokenKind::PasswordReset).map(|c| c.sub)
    }

    pub fn verify_magic_link_token(&self, token: &str) -> Result<String, TokenError> {
        self.decode(token, TokenKind::MagicLink).map(|c| c.sub)
    }

    /// Email and user id carried by a verification token
    pub fn verify_email_verification_token(
        &self,
        token: &str,
    ) -> Result<(String, Uuid), TokenError> {
        let claims = self.decode(token, TokenKind::EmailVerification)?;
        let user_id = claims.user_id.ok_or(TokenError::Invalid)?;
        Ok((claims.sub, user_id))
    }
}

/// Extract bearer token from an authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let (scheme, token) = auth_header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn service() -> AuthService {
        AuthService::new(&SecurityConfig {
            secret_key: "test_secret_key_at_least_32_chars_long".to_string(),
            ..SecurityConfig::default()
        })
    }

    #[test]
    fn test_password_hashing_and_verification() {
        let auth = service();
        let hash = auth.hash_password("SecurePassword123!").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(auth.verify_password("SecurePassword123!", &hash));
        assert!(!auth.verify_password("WrongPassword", &hash));
        assert!(!auth.verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_token_pair_round_trip() {
        let auth = service();
        let user_id = Uuid::new_v4();
        let pair = auth.create_token_pair(user_id).unwrap();

        assert_eq!(pair.token_type, "bearer");
        assert_eq!(pair.expires_in, 30 * 60);

        let access = auth.decode(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.user_uuid().unwrap(), user_id);
        let refresh = auth.decode(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_wrong_token_type_rejected() {
        let auth = service();
        let refresh = auth.create_refresh_token(Uuid::new_v4()).unwrap();
        assert_eq!(
            auth.decode(&refresh, TokenKind::Access).unwrap_err(),
            TokenError::WrongType
        );

        let reset = auth.create_password_reset_token("a@b.io").unwrap();
        assert_eq!(
            auth.verify_magic_link_token(&reset).unwrap_err().to_string(),
            "Invalid token type"
        );
        assert_eq!(auth.verify_password_reset_token(&reset).unwrap(), "a@b.io");
    }

    #[test]
    fn test_expired_token() {
        let auth = service();
        let claims = Claims::new(
            "a@b.io".to_string(),
            TokenKind::MagicLink,
            Duration::minutes(-10),
            None,
        );
        let token = auth.encode(&claims).unwrap();
        assert_eq!(
            auth.verify_magic_link_token(&token).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_foreign_signature_invalid() {
        let other = AuthService::new(&SecurityConfig {
            secret_key: "a-completely-different-signing-secret".to_string(),
            ..SecurityConfig::default()
        });
        let token = other.create_access_token(Uuid::new_v4()).unwrap();
        assert_eq!(
            service().decode(&token, TokenKind::Access).unwrap_err(),
            TokenError::Invalid
        );
        assert_eq!(
            service().decode("garbage", TokenKind::Access).unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn test_email_verification_carries_user_id() {
        let auth = service();
        let user_id = Uuid::new_v4();
        let token = auth
            .create_email_verification_token("writer@example.com", user_id)
            .unwrap();
        let (email, id) = auth.verify_email_verification_token(&token).unwrap();
        assert_eq!(email, "writer@example.com");
        assert_eq!(id, user_id);
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123xyz"), Some("abc123xyz"));
        assert_eq!(extract_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("abc123xyz"), None);
        assert_eq!(extract_bearer_token("Basic dXNlcjpwYXNz"), None);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub email_verified: bool,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            image_url: user.image_url,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            email_verified: user.email_verified,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersPublic {
    pub data: Vec<UserPublic>,
    pub count: i64,
}

fn default_true() -> bool {
    true
}

/// Admin-side user creation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UserCreate {
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 8, max = 40))]
    pub password: String,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
    #[validate(length(max = 255))]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub email_verified: bool,
}

/// Self-service signup
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UserRegister {
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 8, max = 40))]
    pub password: String,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
}

impl From<UserRegister> for UserCreate {
    fn from(register: UserRegister) -> Self {
        Self {
            email: register.email,
            password: register.password,
            full_name: register.full_name,
            image_url: None,
            is_active: true,
            is_superuser: false,
            email_verified: false,
        }
    }
}

/// Admin-side partial update
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(email, length(max = 255))]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 40))]
    pub password: Option<String>,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
    #[validate(length(max = 255))]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UserUpdateMe {
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
    #[validate(email, length(max = 255))]
    pub email: Option<String>,
    #[validate(length(max = 255))]
    pub image_url: Option<String>,
}

impl From<UserUpdateMe> for UserUpdate {
    fn from(me: UserUpdateMe) -> Self {
        Self {
            email: me.email,
            full_name: me.full_name,
            image_url: me.image_url,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePassword {
    #[validate(length(min = 8, max = 40))]
    pub current_password: String,
    #[validate(length(min = 8, max = 40))]
    pub new_password: String,
}

/// Local-only shortcut for seeding accounts
#[derive(Debug, Deserialize, Validate)]
pub struct PrivateUserCreate {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 40))]
    pub password: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "writer@example.com".to_string(),
            hashed_password: "$argon2id$v=19$...".to_string(),
            full_name: Some("Writer".to_string()),
            image_url: None,
            is_active: true,
            is_superuser: false,
            email_verified: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("hashed_password").is_none());
        assert_eq!(json["email"], "writer@example.com");
    }

    #[test]
    fn test_user_create_defaults() {
        let create: UserCreate =
            serde_json::from_str(r#"{"email": "a@b.io", "password": "longenough"}"#).unwrap();
        assert!(create.is_active);
        assert!(!create.is_superuser);
        assert!(create.validate().is_ok());
    }

    #[test]
    fn test_register_validation() {
        let register = UserRegister {
            email: "a@b.io".to_string(),
            password: "short".to_string(),
            full_name: None,
        };
        assert!(register.validate().is_err());

        let too_long = UserRegister {
            password: "x".repeat(41),
            ..register
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_update_me_skips_absent_fields() {
        let update = UserUpdateMe {
            full_name: Some("New Name".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_ok());

        let update: UserUpdate = update.into();
        assert!(update.email.is_none());
        assert!(update.password.is_none());
        assert_eq!(update.full_name.as_deref(), Some("New Name"));
    }
}

//! Authentication: password hashing, login tokens and the bearer security scheme.

use crate::model::core::Role;
use crate::model::util::ServiceError;
use crate::AppConfig;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, warn};
use pbkdf2::pbkdf2_hmac;
use poem::Request;
use poem_openapi::auth::Bearer;
use poem_openapi::SecurityScheme;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const PASSWORD_ITERATIONS: u32 = 260_000;
const HASH_METHOD: &str = "pbkdf2:sha256";
const HASH_LENGTH: usize = 32;

fn derive_key(password: &str, salt: &str, iterations: u32) -> [u8; HASH_LENGTH] {
    let mut key = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut key);
    key
}

/// Hash a password as `pbkdf2:sha256:<iterations>$<salt>$<hex digest>`.
pub fn hash_password_with(password: &str, iterations: u32) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let key = derive_key(password, &salt, iterations);
    format!("{}:{}${}${}", HASH_METHOD, iterations, salt, hex::encode(key))
}

pub fn hash_password(password: &str) -> String {
    hash_password_with(password, PASSWORD_ITERATIONS)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (method, salt, digest) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(s), Some(d)) => (m, s, d),
        _ => return false,
    };

    let iterations = match method
        .strip_prefix(HASH_METHOD)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|n| n.parse::<u32>().ok())
    {
        Some(n) if n > 0 => n,
        _ => return false,
    };

    let expected = match hex::decode(digest) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let key = derive_key(password, salt, iterations);
    key.as_slice().ct_eq(expected.as_slice()).into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// The user id.
    pub sub: String,
    pub username: String,
    pub role: String,
    pub exp: i64,
}

pub fn issue_token(
    user_id: i64,
    username: &str,
    role: Role,
    config: &AppConfig,
) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        role: role.as_str().to_string(),
        exp: Utc::now().timestamp() + config.token_ttl_secs,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret_key.as_bytes()),
    )
    .map_err(|e| ServiceError::invalid(&format!("Failed to issue a token: {}", e)))
}

pub fn decode_token(token: &str, secret: &str) -> Result<CurrentUser, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;

    let claims = data.claims;
    let id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| jsonwebtoken::errors::ErrorKind::InvalidSubject)?;
    let role = Role::from_str(&claims.role)
        .map_err(|_| jsonwebtoken::errors::ErrorKind::InvalidToken)?;

    Ok(CurrentUser {
        id,
        username: claims.username,
        role,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn require(&self, role: Role) -> Result<(), ServiceError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ServiceError::forbidden(&format!(
                "Only a {} can do this.",
                role.as_str()
            )))
        }
    }

    pub fn is_coach(&self) -> bool {
        self.role == Role::Coach
    }
}

#[derive(SecurityScheme)]
#[oai(type = "bearer", checker = "jwt_token_checker")]
pub struct CustomSecurityScheme(pub CurrentUser);

async fn jwt_token_checker(req: &Request, bearer: Bearer) -> Option<CurrentUser> {
    let config = match req.data::<Arc<AppConfig>>() {
        Some(config) => config,
        None => {
            warn!("The app config is missing, every token will be rejected.");
            return None;
        }
    };

    match decode_token(&bearer.token, &config.jwt_secret_key) {
        Ok(user) => {
            debug!("current_user: {:?}", user);
            Some(user)
        }
        Err(err) => {
            warn!("Invalid token: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round() {
        let stored = hash_password_with("s3cret-pass", 1000);
        assert!(stored.starts_with("pbkdf2:sha256:1000$"));
        assert!(verify_password("s3cret-pass", &stored));
        assert!(!verify_password("s3cret-pas", &stored));

        // Every hash gets its own salt.
        assert_ne!(stored, hash_password_with("s3cret-pass", 1000));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "plain-text"));
        assert!(!verify_password("x", "pbkdf2:sha256:abc$salt$00"));
        assert!(!verify_password("x", "pbkdf2:sha256:10$salt$zz"));
        assert!(!verify_password("x", "scrypt:32768$salt$00"));
    }

    #[test]
    fn test_token_round() {
        let config = AppConfig::new("unit-test-secret");
        let token = issue_token(12, "coach_ravi", Role::Coach, &config).unwrap();

        let user = decode_token(&token, "unit-test-secret").unwrap();
        assert_eq!(user.id, 12);
        assert_eq!(user.username, "coach_ravi");
        assert_eq!(user.role, Role::Coach);
        assert!(user.is_coach());
        assert!(user.require(Role::Coach).is_ok());
        assert!(user.require(Role::Player).is_err());

        assert!(decode_token(&token, "another-secret").is_err());
    }

    #[test]
    fn test_expired_token() {
        let mut config = AppConfig::new("unit-test-secret");
        config.token_ttl_secs = -3600;
        let token = issue_token(1, "p1", Role::Player, &config).unwrap();
        assert!(decode_token(&token, "unit-test-secret").is_err());
    }
}

use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::error::{Error, ErrorKind};
use crate::database::schema::{Id, User};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, lifetime_hours: i64) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(lifetime_hours)).timestamp();

        Self {
            user_id: id,
            username,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            username: value.username,
            user_id: value.user_id,
        }
    }
}

fn signing_key(secret: &[u8]) -> Result<Hmac<Sha256>, Error> {
    Hmac::new_from_slice(secret).map_err(|_| {
        log::error!("> Invalid token signing key");
        ErrorKind::Internal.default()
    })
}

pub fn generate_jwt_session(user: &User, secret: &[u8], lifetime_hours: i64) -> Result<String, Error> {
    let key = signing_key(secret)?;
    let claims = JwtSessionData::new(user.id, user.username.to_owned(), lifetime_hours);

    claims.sign_with_key(&key).map_err(|e| {
        log::error!("> Failed to sign session: {e}");
        ErrorKind::Internal.default()
    })
}

pub fn verify_jwt_session(token: &str, secret: &[u8]) -> Result<JwtSessionData, Error> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| ErrorKind::Unauthorized.new("Invalid token."))?;

    let now = Local::now().timestamp();
    if (session.exp - now).is_negative() {
        return Err(ErrorKind::Unauthorized.new("Token expired."));
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn user() -> User {
        User {
            id: 5,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Ann"),
            last_name: String::from("Cook"),
            password: String::new(),
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn issued_tokens_verify() {
        let token = generate_jwt_session(&user(), b"secret", 1).unwrap();
        let session: SessionData = verify_jwt_session(&token, b"secret").unwrap().into();

        assert_eq!(
            session,
            SessionData {
                user_id: 5,
                username: String::from("cook"),
            }
        );
    }

    #[test]
    fn foreign_or_expired_tokens_are_rejected() {
        let token = generate_jwt_session(&user(), b"secret", 1).unwrap();
        let error = verify_jwt_session(&token, b"other").unwrap_err();
        assert_eq!(error.kind, ErrorKind::Unauthorized);

        let expired = generate_jwt_session(&user(), b"secret", -1).unwrap();
        let error = verify_jwt_session(&expired, b"secret").unwrap_err();
        assert_eq!(error.info, "Token expired.");

        assert!(verify_jwt_session("garbage", b"secret").is_err());
    }
}

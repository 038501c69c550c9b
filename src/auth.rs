use std::env;
use std::future::{ready, Ready};

use actix_web::cookie::Cookie;
use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::Id;

pub const SESSION_COOKIE: &str = "session";

const SESSION_TTL_DAYS: i64 = 14;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id,
    pub username: String,
    pub exp: usize,
}

/// Validate a session token and return its claims.
fn decode_session_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = env::var("SESSION_SECRET").expect("SESSION_SECRET not set");
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Extractor yielding the validated claims of the `session` cookie.
///
/// Pages that also render for guests take `Option<Auth>` instead and decide
/// themselves whether to redirect to the login form.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        if let Some(cookie) = req.cookie(SESSION_COOKIE) {
            return match decode_session_jwt(cookie.value()) {
                Ok(claims) => ready(Ok(Auth(claims))),
                Err(_) => ready(Err(actix_web::error::ErrorUnauthorized(
                    "Invalid session",
                ))),
            };
        }
        ready(Err(actix_web::error::ErrorUnauthorized("Login required")))
    }
}

/// Create a session token for a user. Public so tests can force-login.
pub fn create_session_jwt(
    user_id: Id,
    username: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("SESSION_SECRET").expect("SESSION_SECRET not set");
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(SESSION_TTL_DAYS))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .finish()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .finish();
    cookie.make_removal();
    cookie
}

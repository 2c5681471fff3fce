use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::server::ApiError;

/// HS256 secret shared with the service that issues tokens.
#[derive(Clone)]
pub struct JwtSecret(pub Arc<String>);

impl JwtSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::new(secret.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    pub exp: u64,
}

/// Identity of the authenticated caller, available to every report handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Requester {
    pub subject: String,
    pub name: Option<String>,
}

impl From<Claims> for Requester {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
            name: claims.name,
        }
    }
}

impl std::fmt::Display for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.subject),
            None => f.write_str(&self.subject),
        }
    }
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn auth_error(code: &str, msg: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError {
            code: code.to_string(),
            error: msg.to_string(),
        }),
    )
        .into_response()
}

pub async fn require_bearer(
    State(secret): State<JwtSecret>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = match req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        None => return auth_error("unauthorized", "missing authorization header"),
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return auth_error("unauthorized", "invalid authorization header"),
        },
    };

    match validate_token(&secret.0, &token) {
        Ok(claims) => {
            req.extensions_mut().insert(Requester::from(claims));
            next.run(req).await
        }
        Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
            auth_error("token_expired", "token expired")
        }
        Err(_) => auth_error("unauthorized", "invalid token"),
    }
}

#[cfg(test)]
pub fn issue_token(secret: &str, subject: &str, ttl_secs: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = Claims {
        sub: subject.to_string(),
        name: Some("Operator".to_string()),
        exp: exp.max(0) as u64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

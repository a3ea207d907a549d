use crate::models::user::{capabilities_for, Capabilities, Role};
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Role,
}

/// Verified identity for the current request. Set up once by
/// `authenticate`, torn down with the request; nothing reads tokens from
/// ambient storage.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl SessionContext {
    pub fn capabilities(&self) -> Capabilities {
        capabilities_for(self.role)
    }
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

/// Decodes the bearer token and stores a `SessionContext` extension for
/// the handlers downstream.
pub async fn authenticate(mut req: Request, next: Next) -> Response {
    let Some(header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return reject(StatusCode::UNAUTHORIZED, "missing_authorization");
    };
    let Ok(header) = header.to_str() else {
        return reject(StatusCode::UNAUTHORIZED, "bad_authorization");
    };
    let Some(token) = header.strip_prefix("Bearer ") else {
        return reject(StatusCode::UNAUTHORIZED, "unsupported_scheme");
    };

    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let claims = match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => data.claims,
        Err(_) => return reject(StatusCode::UNAUTHORIZED, "invalid_token"),
    };

    let Ok(user_id) = claims.sub.parse::<Uuid>() else {
        return reject(StatusCode::UNAUTHORIZED, "invalid_token");
    };

    req.extensions_mut().insert(SessionContext {
        user_id,
        role: claims.role,
    });
    next.run(req).await
}

pub async fn require_take_tests(req: Request, next: Next) -> Response {
    guard(req, next, |caps| caps.can_take_tests).await
}

pub async fn require_manage_tests(req: Request, next: Next) -> Response {
    guard(req, next, |caps| caps.can_manage_tests).await
}

async fn guard(req: Request, next: Next, allowed: fn(Capabilities) -> bool) -> Response {
    match req.extensions().get::<SessionContext>() {
        Some(session) if allowed(session.capabilities()) => next.run(req).await,
        Some(_) => reject(StatusCode::FORBIDDEN, "forbidden"),
        None => reject(StatusCode::UNAUTHORIZED, "missing_session"),
    }
}

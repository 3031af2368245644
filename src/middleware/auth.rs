//! Authentication middleware
//!
//! Bearer access tokens (HS256 JWT) guard every API route except the public
//! ones. A valid token resolves to an active user, attached to the request as
//! [`CurrentUser`].

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

use crate::config::JwtConfig;
use crate::entity::{now_ts, user};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Shared connection handle for use in handlers via Extension
#[derive(Clone)]
pub struct DbConn(pub Arc<DatabaseConnection>);

impl Deref for DbConn {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Extension to store current user in request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub user_code: String,
    pub user_name: String,
    pub role_names: Vec<String>,
}

impl From<user::Model> for CurrentUser {
    fn from(model: user::Model) -> Self {
        let role_names = model.role_names();
        Self {
            id: model.id,
            user_code: model.user_code,
            user_name: model.user_name,
            role_names,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_code: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

fn secret_and_ttl(jwt: &JwtConfig, kind: TokenKind) -> (&str, i64) {
    match kind {
        TokenKind::Access => (jwt.access_secret.as_str(), jwt.access_ttl_secs),
        TokenKind::Refresh => (jwt.refresh_secret.as_str(), jwt.refresh_ttl_secs),
    }
}

/// Sign a token of the given kind for `user_code`.
pub fn issue_token(jwt: &JwtConfig, user_code: &str, kind: TokenKind) -> AppResult<String> {
    let (secret, ttl) = secret_and_ttl(jwt, kind);
    let iat = now_ts();
    let claims = Claims {
        user_code: user_code.to_string(),
        kind,
        iat,
        exp: iat + ttl,
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Verify signature, expiry and token kind.
pub fn verify_token(jwt: &JwtConfig, token: &str, kind: TokenKind) -> AppResult<Claims> {
    let (secret, _) = secret_and_ttl(jwt, kind);
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;

    if data.claims.kind != kind {
        return Err(AppError::Unauthorized("wrong token type".to_string()));
    }
    Ok(data.claims)
}

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Look up the token owner; disabled or deleted users are rejected.
pub async fn load_active_user(db: &DatabaseConnection, user_code: &str) -> AppResult<user::Model> {
    let found = user::Entity::find()
        .filter(user::Column::UserCode.eq(user_code))
        .one(db)
        .await?;

    match found {
        Some(u) if u.is_active() => Ok(u),
        Some(_) => Err(AppError::Unauthorized("user is disabled".to_string())),
        None => Err(AppError::Unauthorized("user not found".to_string())),
    }
}

/// Paths that don't require a bearer token
fn is_public_path(path: &str) -> bool {
    if !path.starts_with("/api") {
        return true;
    }

    // The socket authenticates itself from the query string
    matches!(
        path,
        "/api/health" | "/api/auth/login" | "/api/auth/refresh" | "/api/ws"
    )
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<CurrentUser> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
    let claims = verify_token(&state.config.jwt, token, TokenKind::Access)?;
    let model = load_active_user(state.db.as_ref(), &claims.user_code).await?;
    Ok(CurrentUser::from(model))
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(DbConn(state.db.clone()));

    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    match authenticate(&state, request.headers()).await {
        Ok(current_user) => {
            request.extensions_mut().insert(current_user);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!("Rejected {}: {}", request.uri().path(), e);
            e.into_response()
        }
    }
}

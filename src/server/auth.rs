//! Shared-secret login and bearer token verification

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::AppState;

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 access tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    identity: String,
    lifetime_secs: i64,
}

impl TokenService {
    pub fn new(secret: &str, identity: impl Into<String>, lifetime_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            identity: identity.into(),
            lifetime_secs: i64::try_from(lifetime_secs).unwrap_or(i64::MAX),
        }
    }

    pub fn create_token(&self) -> jsonwebtoken::errors::Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: self.identity.clone(),
            iat: now,
            exp: now.saturating_add(self.lifetime_secs),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn verify_token(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let mut validation = Validation::default();
        validation.sub = Some(self.identity.clone());
        decode::<Claims>(token, &self.decoding_key, &validation).map(|data| data.claims)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "message": message })),
    )
        .into_response()
}

/// `POST /login`: exchange the shared secret for an access token
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Response {
    if request.api_key != state.shared_secret.as_str() {
        crate::metrics::record_api_request("/login", 401);
        return unauthorized("Invalid secret");
    }

    match state.tokens.create_token() {
        Ok(access_token) => {
            crate::metrics::record_api_request("/login", 200);
            (StatusCode::OK, Json(LoginResponse { access_token })).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to sign access token");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Middleware rejecting requests without a valid bearer token
pub async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    let Some(token) = token else {
        tracing::debug!("missing or malformed authorization header");
        return unauthorized("Missing Authorization Header");
    };

    if let Err(e) = state.tokens.verify_token(token) {
        tracing::debug!(error = %e, "rejected access token");
        return unauthorized("Invalid token");
    }

    next.run(request).await
}

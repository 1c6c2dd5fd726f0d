//! Auth proxy routes
//!
//! The backend identifies users by a short-lived HS256 token carried in the
//! `authjs.session-token` cookie. These handlers turn the browser session
//! into such a token and forward model CRUD calls. Checks run in a fixed
//! order: signing secret, then browser session, then backend user. The
//! backend is not contacted until the first two pass.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use jsonwebtoken::{EncodingKey, Header};
use log::{debug, error, warn};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::app::AppState;
use crate::gateway::models::model_id_of;
use crate::gateway::{DEFAULT_LIST_LIMIT, Operation};
use crate::login::{SessionUser, current_user};

/// Cookie the backend reads its identity token from
pub const BACKEND_TOKEN_COOKIE: &str = "authjs.session-token";

/// Claims of the backend identity token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendClaims {
    pub sub: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a backend token for `user_id`
///
/// # Arguments
/// * `secret` - HS256 signing secret
/// * `user_id` - Backend user identifier, used as subject
/// * `user` - Browser session user whose email and name are embedded
/// * `ttl` - Token lifetime
/// * `now` - Issue time
///
/// # Returns
/// * `Result<String, jsonwebtoken::errors::Error>` - The encoded token
pub fn mint_token(
    secret: &str,
    user_id: &str,
    user: &SessionUser,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let iat = now.timestamp();
    let claims = BackendClaims {
        sub: user_id.to_string(),
        user_id: user_id.to_string(),
        email: user.email.clone(),
        name: user.name.clone(),
        iat,
        exp: iat + ttl.as_secs() as i64,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Server configuration error: AUTH_SECRET not set")]
    MissingSecret,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Could not resolve backend user: {0}")]
    UserResolution(String),

    #[error("Could not sign backend token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with an error status; its body is passed through
    #[error("Backend returned {status}")]
    Upstream { status: StatusCode, body: Value },
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ProxyError::MissingSecret => {
                error!("{}", ProxyError::MissingSecret);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": ProxyError::MissingSecret.to_string() }),
                )
            }
            ProxyError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({ "detail": ProxyError::Unauthenticated.to_string() }),
            ),
            ProxyError::Upstream { status, body } => {
                warn!("Backend returned {status}");
                (status, body)
            }
            other => {
                error!("Error in models proxy: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct BackendUser {
    id: String,
}

#[derive(Debug, Serialize)]
struct NewBackendUser<'a> {
    email: &'a str,
    name: Option<&'a str>,
    image: Option<&'a str>,
}

/// Client for the backend's user and model routes
#[derive(Debug, Clone)]
pub struct BackendProxy {
    client: Client,
    base_url: String,
}

impl BackendProxy {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        BackendProxy {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Backend user id for the session's email, creating the user if needed
    pub async fn get_or_create_user(&self, user: &SessionUser) -> Result<String, ProxyError> {
        let email = user
            .email
            .as_deref()
            .filter(|email| !email.is_empty())
            .ok_or_else(|| ProxyError::UserResolution("No email in session".to_string()))?;

        let url = self.url(&format!("/api/users/by-email/{}", urlencoding::encode(email)));
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            let found: BackendUser = response.json().await?;
            return Ok(found.id);
        }
        if status != StatusCode::NOT_FOUND {
            return Err(ProxyError::UserResolution(format!(
                "Failed to fetch user: {status}"
            )));
        }

        debug!("Creating backend user for {email}");
        let body = NewBackendUser {
            email,
            name: user.name.as_deref(),
            image: user.image.as_deref(),
        };
        let response = self.client.post(self.url("/api/users")).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ProxyError::UserResolution(format!(
                "Failed to create user: {}",
                response.status()
            )));
        }
        let created: BackendUser = response.json().await?;
        Ok(created.id)
    }

    /// Send with the token cookie; error statuses become `Upstream`
    async fn forward(
        &self,
        request: RequestBuilder,
        token: &str,
        operation: Operation,
    ) -> Result<reqwest::Response, ProxyError> {
        let response = request
            .header(
                reqwest::header::COOKIE,
                format!("{BACKEND_TOKEN_COOKIE}={token}"),
            )
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let bytes = response.bytes().await.unwrap_or_default();
        let body = serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| json!({ "detail": operation.fallback_message() }));
        Err(ProxyError::Upstream { status, body })
    }
}

/// Secret, session and backend user, in that order, as a signed token
async fn authorize(state: &AppState, jar: &CookieJar) -> Result<String, ProxyError> {
    let secret = state
        .config
        .auth_secret
        .as_deref()
        .ok_or(ProxyError::MissingSecret)?;
    let user = current_user(jar, &state.sessions).ok_or(ProxyError::Unauthenticated)?;
    let user_id = state.backend.get_or_create_user(&user).await?;
    Ok(mint_token(
        secret,
        &user_id,
        &user,
        state.config.token_ttl,
        Utc::now(),
    )?)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn list_models(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ProxyError> {
    let token = authorize(&state, &jar).await?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let request = state
        .backend
        .client
        .get(state.backend.url("/api/models"))
        .query(&[("limit", limit), ("offset", offset)]);
    let response = state
        .backend
        .forward(request, &token, Operation::ListModels)
        .await?;
    Ok(Json(response.json().await?))
}

/// Save a model record
///
/// The body is forwarded untouched and is not read until the caller is
/// authorized.
pub async fn create_model(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ProxyError> {
    let token = authorize(&state, &jar).await?;

    let request = state
        .backend
        .client
        .post(state.backend.url("/api/models"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body);
    let response = state
        .backend
        .forward(request, &token, Operation::SaveModel)
        .await?;
    let saved: Value = response.json().await?;
    debug!("Saved model {}", model_id_of(&saved).unwrap_or("without id"));
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn get_model(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(model_id): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    let token = authorize(&state, &jar).await?;

    let url = state
        .backend
        .url(&format!("/api/models/{}", urlencoding::encode(&model_id)));
    let request = state.backend.client.get(url);
    let response = state
        .backend
        .forward(request, &token, Operation::GetModel)
        .await?;
    Ok(Json(response.json().await?))
}

pub async fn delete_model(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(model_id): Path<String>,
) -> Result<StatusCode, ProxyError> {
    let token = authorize(&state, &jar).await?;

    let url = state
        .backend
        .url(&format!("/api/models/{}", urlencoding::encode(&model_id)));
    let request = state.backend.client.delete(url);
    state
        .backend
        .forward(request, &token, Operation::DeleteModel)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Liveness probe
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "nebula360-frontend",
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

//! Browser sessions, Google sign-in and the page guard
//!
//! A signed-in browser carries a `session` cookie whose value keys into the
//! server's [`SessionStore`]. The proxy routes read the user from there;
//! pages under `/app` are only served to browsers with a live session.

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::app::AppState;

/// Name of the browser session cookie
pub const SESSION_COOKIE: &str = "session";

/// Cookie holding the OAuth `state` between redirect and callback
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

pub const LOGIN_PATH: &str = "/auth/login";
pub const APP_PATH: &str = "/app";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Identity read from the provider
///
/// Any field may be missing; the proxy routes refuse to resolve a backend
/// user without an email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "picture")]
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
struct BrowserSession {
    user: SessionUser,
    expires_at: SystemTime,
}

/// In-memory browser sessions
///
/// Owned by the application state rather than a global, so every router
/// (and every test) gets its own.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, BrowserSession>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a new session
    ///
    /// Generates a unique session ID valid for the store's lifetime.
    ///
    /// # Arguments
    /// * `user` - The identity to attach to the session
    ///
    /// # Returns
    /// * `String` - The session ID to place in the cookie
    pub fn create_session(&self, user: SessionUser) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = BrowserSession {
            user,
            expires_at: SystemTime::now() + self.ttl,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.expires_at > SystemTime::now());
        sessions.insert(session_id.clone(), session);

        session_id
    }

    /// Validate a session
    ///
    /// An expired or unknown session is treated as no session.
    ///
    /// # Arguments
    /// * `session_id` - The session ID to validate
    ///
    /// # Returns
    /// * `Option<SessionUser>` - The user for the session if valid, None otherwise
    pub fn validate_session(&self, session_id: &str) -> Option<SessionUser> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .filter(|session| session.expires_at > SystemTime::now())
            .map(|session| session.user.clone())
    }

    /// Drop a session, returning whether it existed
    pub fn remove_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The signed-in user for this request, if any
pub fn current_user(jar: &CookieJar, store: &SessionStore) -> Option<SessionUser> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| store.validate_session(cookie.value()))
}

fn session_cookie(value: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn is_app_path(path: &str) -> bool {
    path == APP_PATH || path.starts_with("/app/")
}

/// Page guard middleware
///
/// Redirects `/app` pages to the login page when there is no session, and
/// the login page to `/app` when there is one. API routes are never
/// redirected; they answer 401 themselves.
///
/// # Arguments
/// * `state` - Application state holding the session store
/// * `jar` - Cookie jar containing session information
/// * `request` - The incoming request
/// * `next` - Next middleware in the chain
///
/// # Returns
/// * `Response` - Either passes the request through or redirects
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if path == "/api" || path.starts_with("/api/") {
        return next.run(request).await;
    }

    let user = current_user(&jar, &state.sessions);
    match (&user, path.as_str()) {
        (None, p) if is_app_path(p) => return Redirect::to(LOGIN_PATH).into_response(),
        (Some(_), LOGIN_PATH) => return Redirect::to(APP_PATH).into_response(),
        _ => {}
    }

    if let Some(user) = user {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

/// Handle user logout
///
/// Drops the server-side session, clears the cookie and sends the browser
/// back to the login page. An unknown session still signs out.
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !state.sessions.remove_session(cookie.value()) {
            warn!("Sign-out for unknown session");
        }
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to(LOGIN_PATH))
}

fn redirect_uri(state: &AppState) -> String {
    format!("{}/auth/callback/google", state.config.auth_url)
}

fn login_error(reason: &str) -> Response {
    Redirect::to(&format!("{LOGIN_PATH}?error={}", urlencoding::encode(reason))).into_response()
}

/// Start Google sign-in
pub async fn handle_google_login(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(client_id) = state.config.google_client_id.as_deref() else {
        error!("Google sign-in requested but AUTH_GOOGLE_ID is not set");
        return login_error("Configuration");
    };

    let csrf = Uuid::new_v4().to_string();
    let location = format!(
        "{GOOGLE_AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
        urlencoding::encode(client_id),
        urlencoding::encode(&redirect_uri(&state)),
        urlencoding::encode("openid email profile"),
        csrf,
    );
    let cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf))
        .path("/auth")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    (jar.add(cookie), Redirect::to(&location)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Finish Google sign-in and open a browser session
pub async fn handle_google_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(callback): Query<OAuthCallback>,
) -> Response {
    if let Some(reason) = callback.error {
        warn!("Google sign-in refused: {reason}");
        return login_error("AccessDenied");
    }

    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path("/auth"));
    let (Some(code), Some(returned)) = (callback.code, callback.state) else {
        return (jar, login_error("OAuthCallback")).into_response();
    };
    if expected.as_deref() != Some(returned.as_str()) {
        warn!("OAuth state mismatch");
        return (jar, login_error("OAuthCallback")).into_response();
    }

    match fetch_google_user(&state, &code).await {
        Ok(user) => {
            info!(
                "Signed in {}",
                user.email.as_deref().unwrap_or("user without email")
            );
            let session_id = state.sessions.create_session(user);
            (jar.add(session_cookie(session_id)), Redirect::to(APP_PATH)).into_response()
        }
        Err(err) => {
            error!("Google sign-in failed: {err}");
            (jar, login_error("OAuthCallback")).into_response()
        }
    }
}

async fn fetch_google_user(state: &AppState, code: &str) -> Result<SessionUser, reqwest::Error> {
    let client_id = state.config.google_client_id.clone().unwrap_or_default();
    let client_secret = state.config.google_client_secret.clone().unwrap_or_default();
    let redirect = redirect_uri(state);

    let token: TokenResponse = state
        .http
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("code", code),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", redirect.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    state
        .http
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(token.access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> SessionUser {
        SessionUser {
            name: Some("Ada".to_string()),
            email: Some(email.to_string()),
            image: None,
        }
    }

    #[test]
    fn sessions_validate_until_removed() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create_session(user("ada@example.com"));

        assert_eq!(store.validate_session(&id), Some(user("ada@example.com")));
        assert!(store.remove_session(&id));
        assert_eq!(store.validate_session(&id), None);
        assert!(!store.remove_session(&id));
    }

    #[test]
    fn expired_sessions_count_as_none() {
        let store = SessionStore::new(Duration::ZERO);
        let id = store.create_session(user("ada@example.com"));
        assert_eq!(store.validate_session(&id), None);
    }

    #[test]
    fn expired_sessions_are_purged_on_create() {
        let store = SessionStore::new(Duration::ZERO);
        store.create_session(user("a@example.com"));
        store.create_session(user("b@example.com"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn current_user_reads_cookie() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create_session(user("ada@example.com"));

        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, id));
        assert!(current_user(&jar, &store).is_some());

        let stale = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "corrupt"));
        assert!(current_user(&stale, &store).is_none());
        assert!(current_user(&CookieJar::new(), &store).is_none());
    }

    #[test]
    fn userinfo_picture_maps_to_image() {
        let user: SessionUser = serde_json::from_value(serde_json::json!({
            "name": "Ada",
            "email": "ada@example.com",
            "picture": "https://example.com/ada.png",
            "sub": "123"
        }))
        .unwrap();
        assert_eq!(user.image.as_deref(), Some("https://example.com/ada.png"));
    }

    #[test]
    fn app_paths() {
        assert!(is_app_path("/app"));
        assert!(is_app_path("/app/6f1c"));
        assert!(!is_app_path("/apple"));
        assert!(!is_app_path("/auth/login"));
    }
}

use axum::{
    Router, middleware,
    routing::get,
};
use log::info;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::{AppConfig, ExecutionContext};
use crate::login::{self, SessionStore};
use crate::proxy::{self, BackendProxy};

/// Shared state of the server
///
/// Built once in [`run`] (or by tests) and handed to every handler.
pub struct AppState {
    pub config: AppConfig,
    pub sessions: SessionStore,
    pub backend: BackendProxy,
    /// Client for the identity provider
    pub http: Client,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let backend = BackendProxy::new(http.clone(), config.api_url(ExecutionContext::Server));
        Ok(AppState {
            sessions: SessionStore::new(config.session_ttl),
            backend,
            http,
            started_at: Instant::now(),
            config,
        })
    }
}

/// Assemble every route behind the page guard
///
/// `/app` and `/auth/login` are served from `app.html` and `login.html` in
/// the static directory; anything else unmatched falls through to the
/// directory itself.
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let app_page = ServeFile::new(static_dir.join("app.html"));
    let login_page = ServeFile::new(static_dir.join("login.html"));

    Router::new()
        .route("/api/health", get(proxy::health))
        .route("/api/models", get(proxy::list_models).post(proxy::create_model))
        .route(
            "/api/models/:model_id",
            get(proxy::get_model).delete(proxy::delete_model),
        )
        .route(
            "/auth/logout",
            get(login::handle_logout).post(login::handle_logout),
        )
        .route("/auth/login/google", get(login::handle_google_login))
        .route("/auth/callback/google", get(login::handle_google_callback))
        .route_service("/auth/login", login_page)
        .route_service("/app", app_page.clone())
        .route_service("/app/*rest", app_page)
        .fallback_service(ServeDir::new(static_dir))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ))
        .with_state(state)
}

/// Start the server and block until it stops
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.bind_addr;
    info!(
        "Proxying model routes to {}",
        config.api_url(ExecutionContext::Server)
    );
    let state = Arc::new(AppState::new(config)?);
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

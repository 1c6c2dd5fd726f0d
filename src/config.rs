//! Environment-driven configuration
//!
//! The backend URL is resolved separately for browser-side and server-side
//! calls, mirroring how the deployed front end is wired: the browser talks to
//! the public backend address, while the proxy routes may reach the backend
//! through an internal name (for example the docker-compose service).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Backend used in production when no URL is configured
pub const PRODUCTION_BACKEND_URL: &str = "https://nebulabackend.azurewebsites.net";

/// Backend used for local development
pub const LOCAL_BACKEND_URL: &str = "http://localhost:8000";

/// Backend service name inside docker-compose
pub const DOCKER_BACKEND_URL: &str = "http://backend:8000";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_STATIC_DIR: &str = "static";
const TOKEN_DURATION: u64 = 60 * 60; // 1 hour in seconds
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

/// Where a backend call originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Calls issued on behalf of the browser (analysis endpoints, downloads)
    Browser,
    /// Calls issued by the proxy routes
    Server,
}

/// Application configuration
///
/// Built once at startup and handed to whatever needs it; nothing in the
/// crate reads the environment after this point.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend URL for browser-side requests
    pub client_api_url: String,

    /// Backend URL for server-side requests
    pub server_api_url: String,

    /// Secret used to sign backend tokens
    pub auth_secret: Option<String>,

    /// OAuth client id
    pub google_client_id: Option<String>,

    /// OAuth client secret
    pub google_client_secret: Option<String>,

    /// Address the server listens on
    pub bind_addr: SocketAddr,

    /// Public base URL of this server, used for OAuth callbacks
    pub auth_url: String,

    /// Directory holding the pre-built pages
    pub static_dir: PathBuf,

    /// Lifetime of a backend token
    pub token_ttl: Duration,

    /// Lifetime of a browser session
    pub session_ttl: Duration,
}

impl AppConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    ///
    /// # Examples
    /// ```
    /// use nebula360::config::AppConfig;
    ///
    /// let config = AppConfig::from_lookup(|key| match key {
    ///     "BACKEND_URL" => Some("http://analysis:9000".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.server_api_url, "http://analysis:9000");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let production = get("APP_ENV").is_some_and(|env| env == "production");
        let docker = get("DOCKER").is_some_and(|flag| flag == "true");
        let public_url = get("PUBLIC_API_URL");

        let client_api_url = match &public_url {
            Some(url) => url.clone(),
            None if production => PRODUCTION_BACKEND_URL.to_string(),
            None => LOCAL_BACKEND_URL.to_string(),
        };

        let server_api_url = if let Some(url) = get("BACKEND_URL") {
            url
        } else if let Some(url) = public_url {
            url
        } else if production {
            PRODUCTION_BACKEND_URL.to_string()
        } else if docker {
            DOCKER_BACKEND_URL.to_string()
        } else {
            LOCAL_BACKEND_URL.to_string()
        };

        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("Invalid BIND_ADDR {:?}, using {}", raw, DEFAULT_BIND_ADDR);
                default_bind_addr()
            }),
            None => default_bind_addr(),
        };

        let auth_url = get("AUTH_URL").unwrap_or_else(|| format!("http://{bind_addr}"));

        AppConfig {
            client_api_url: trim_url(client_api_url),
            server_api_url: trim_url(server_api_url),
            auth_secret: get("AUTH_SECRET"),
            google_client_id: get("AUTH_GOOGLE_ID"),
            google_client_secret: get("AUTH_GOOGLE_SECRET"),
            bind_addr,
            auth_url: trim_url(auth_url),
            static_dir: get("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            token_ttl: Duration::from_secs(TOKEN_DURATION),
            session_ttl: Duration::from_secs(SESSION_DURATION),
        }
    }

    /// Backend URL for the given execution context
    pub fn api_url(&self, context: ExecutionContext) -> &str {
        match context {
            ExecutionContext::Browser => &self.client_api_url,
            ExecutionContext::Server => &self.server_api_url,
        }
    }

    /// Whether both OAuth credentials are present
    pub fn has_oauth_credentials(&self) -> bool {
        self.google_client_id.is_some() && self.google_client_secret.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

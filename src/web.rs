#![cfg(not(tarpaulin_include))]

use log::error;
use nebula360::app;
use nebula360::config::AppConfig;

/// Main entry point for the auth proxy server
///
/// Reads the configuration from the environment and serves the pages, the
/// sign-in routes and the model proxy until the process is stopped.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    if !config.has_oauth_credentials() {
        error!("AUTH_GOOGLE_ID / AUTH_GOOGLE_SECRET are not set; Google sign-in will fail");
    }
    if config.auth_secret.is_none() {
        error!("AUTH_SECRET is not set; model routes will answer 500");
    }

    app::run(config).await
}

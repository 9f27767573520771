use std::net::SocketAddr;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::cache::Cache;
use crate::config::Config;
use crate::pool::Pool;
use crate::web::middleware::{cors, rate_limit};
use crate::web::openapi::create_swagger_ui;
use crate::web::routes::{create_api_routes, create_health_routes};
use crate::web::state::AppState;

/// Web server configuration, split out from `Config` so the HTTP layer
/// can be tuned independently of the upstream pool (spec §6).
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub enable_rate_limiting: bool,
    pub rate_limit_requests_per_second: u64,
    pub rate_limit_burst_size: u32,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            enable_rate_limiting: true,
            rate_limit_requests_per_second: 10,
            rate_limit_burst_size: 20,
        }
    }
}

impl From<&Config> for WebServerConfig {
    fn from(config: &Config) -> Self {
        Self { host: config.http_host.clone(), port: config.http_port, ..Self::default() }
    }
}

/// Axum application assembling the downstream read-only JSON surface over
/// the shared `Pool`/`Cache` (spec §4.11).
pub struct WebServer {
    config: WebServerConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(pool: Pool, cache: Cache, config: WebServerConfig) -> Self {
        Self { config, state: AppState::new(pool, cache) }
    }

    pub fn create_app(&self) -> Router {
        let mut app = Router::new()
            .merge(create_api_routes())
            .merge(create_health_routes())
            .with_state(self.state.clone())
            .merge(create_swagger_ui());

        if self.config.enable_cors {
            app = app.layer(cors::create_cors_layer());
        }
        if self.config.enable_rate_limiting {
            app = app.layer(rate_limit::create_rate_limit_layer(
                self.config.rate_limit_requests_per_second,
                self.config.rate_limit_burst_size,
            ));
        }

        app.layer(TraceLayer::new_for_http()).layer(CompressionLayer::new())
    }

    pub async fn start_with_shutdown(&self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_app();
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;

        tracing::info!("starting web server on {addr}");
        let listener = tokio::net::TcpListener::bind(addr).await?;

        let shutdown_signal = async {
            tokio::signal::ctrl_c().await.expect("failed to install CTRL+C signal handler");
            tracing::info!("shutdown signal received");
        };

        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal).await?;
        Ok(())
    }
}

pub fn create_web_server(pool: Pool, cache: Cache, config: &Config) -> WebServer {
    WebServer::new(pool, cache, WebServerConfig::from(config))
}

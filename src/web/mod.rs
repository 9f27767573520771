// HTTP layer: the downstream read-only JSON surface over the gateway core.
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{create_web_server, WebServer, WebServerConfig};
pub use state::AppState;

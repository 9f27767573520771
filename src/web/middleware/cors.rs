use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS for the read-only JSON surface: no cookies or
/// credentials cross this boundary, so a wildcard origin is safe.
pub fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

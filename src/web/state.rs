use crate::cache::Cache;
use crate::pool::Pool;

/// Shared application state handed to every handler via `axum::extract::State`.
/// Both `Pool` and `Cache` are themselves cheap to clone (internally `Arc`-backed),
/// so `AppState` needs no further indirection.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub cache: Cache,
}

impl AppState {
    pub fn new(pool: Pool, cache: Cache) -> Self {
        Self { pool, cache }
    }
}

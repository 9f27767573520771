use thiserror::Error;

/// The error taxonomy every component in this crate translates its
/// failures into before they cross a component boundary.
#[derive(Clone, Error, Debug)]
pub enum GatewayError {
    /// Transport-level or server-side failure that is safe to retry on the
    /// same or a different endpoint: 5xx, timeouts, JSON parse failures,
    /// `-32603`/`-32002` ("internal error").
    #[error("retryable RPC error: {0}")]
    Retryable(String),

    /// HTTP 429, JSON-RPC `code=-32005`, or a message containing "rate limit".
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// `getBlock` reported the slot was skipped or the block is not available.
    #[error("slot skipped: {0}")]
    SlotSkipped(String),

    /// JSON-RPC `code=-32601` or a message containing "method not found".
    /// Endpoint-local: other endpoints may still support the method.
    #[error("method not supported: {0}")]
    MethodNotSupported(String),

    /// Explicit health-probe failure: the node is behind the rest of the cluster.
    #[error("node behind: {0}")]
    NodeBehind(String),

    /// Explicit health-probe failure: the node failed a basic health check.
    #[error("node unhealthy: {0}")]
    NodeUnhealthy(String),

    /// Too many consecutive `SlotSkipped` results in one `get_block` call.
    #[error("missing blocks: {0}")]
    MissingBlocks(String),

    /// Any other well-formed JSON-RPC error. Terminal.
    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    /// The pool has no usable client and re-initialization failed. Terminal.
    #[error("no clients available: {0}")]
    NoClientsAvailable(String),

    /// Client-supplied argument failed validation. Terminal.
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl GatewayError {
    /// Whether the Retry Driver should attempt another endpoint for this
    /// error rather than propagating it immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Retryable(_)
                | GatewayError::RateLimit(_)
                | GatewayError::MethodNotSupported(_)
                | GatewayError::SlotSkipped(_)
        )
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GatewayError::RateLimit(_))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

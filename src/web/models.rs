use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

/// Three-way status envelope every handler returns with HTTP 200
/// (spec §7's user-visible failure shape; only unhandled panics surface
/// as 5xx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GatewayResponse<T> {
    pub status: GatewayStatus,
    #[schema(value_type = Option<Object>)]
    pub data: Option<T>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> GatewayResponse<T> {
    pub fn success(data: T) -> Self {
        Self { status: GatewayStatus::Success, data: Some(data), errors: Vec::new(), timestamp: Utc::now() }
    }

    /// Partial success: the payload is present but one or more
    /// sub-queries failed and were absorbed (e.g. `NetworkStatus.errors`).
    pub fn warning(data: T, errors: Vec<String>) -> Self {
        Self { status: GatewayStatus::Warning, data: Some(data), errors, timestamp: Utc::now() }
    }

    pub fn error(errors: Vec<String>) -> Self {
        Self { status: GatewayStatus::Error, data: None, errors, timestamp: Utc::now() }
    }
}

#[derive(Debug, Default, serde::Deserialize, utoipa::IntoParams)]
pub struct NetworkStatusParams {
    #[serde(default)]
    pub summary_only: bool,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Default, serde::Deserialize, utoipa::IntoParams)]
pub struct RpcNodesParams {
    #[serde(default)]
    pub include_details: bool,
    #[serde(default)]
    pub health_check: bool,
    #[serde(default)]
    pub include_all: bool,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Default, serde::Deserialize, utoipa::IntoParams)]
pub struct PerformanceParams {
    #[serde(default)]
    pub refresh: bool,
}

/// `limit=1..10` per spec §6; out-of-range values are a client error
/// (`GatewayError::ValidationError`) rather than a silent clamp.
#[derive(Debug, serde::Deserialize, utoipa::IntoParams, Validate)]
pub struct MintExtractParams {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 10))]
    pub limit: u32,
}

fn default_limit() -> u32 {
    1
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams, Validate)]
pub struct MintNewParams {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 10))]
    pub blocks: u32,
    pub min_volume_change: Option<f64>,
    pub min_price_change: Option<f64>,
    pub min_transactions: Option<u64>,
}

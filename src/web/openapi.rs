use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::handlers;

/// OpenAPI documentation for the Solana RPC gateway's read-only surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::network_status,
        handlers::rpc_nodes,
        handlers::performance_metrics,
        handlers::mints_extract,
        handlers::mints_new,
    ),
    components(
        schemas(
            crate::rpc::wire::ClusterNode,
            crate::rpc::wire::PerformanceSample,
            crate::rpc::wire::BlockProduction,
            crate::rpc::wire::BlockProductionRange,
            crate::rpc::wire::BlockProductionError,
            crate::query::network_status::Distribution,
            crate::query::network_status::StakeBucket,
            crate::query::network_status::StakeDistribution,
            crate::query::NetworkStatus,
            crate::scan::BlockScanEntry,
            crate::scan::ScanSummary,
            crate::scan::ScanResult,
            crate::web::handlers::PerformanceMetricsResponse,
            crate::web::handlers::MintsNewResponse,
            crate::web::handlers::RpcNodesResponse,
            crate::web::handlers::NetworkStatusSummary,
            crate::web::models::GatewayStatus,
        )
    ),
    tags(
        (name = "Network", description = "Cluster health and topology"),
        (name = "Performance", description = "Recent performance samples and block production"),
        (name = "Mints", description = "Block-scan mint extraction"),
    ),
    info(
        title = "Solana RPC Gateway",
        version = "0.1.0",
        description = "Resilient, rate-limit-aware aggregation gateway over multiple Solana JSON-RPC endpoints"
    )
)]
pub struct ApiDoc;

/// Creates the Swagger UI router.
pub fn create_swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}

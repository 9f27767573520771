//! Shared wiremock scaffolding for the end-to-end scenarios in
//! `tests/integration_tests.rs`.

use serde_json::{json, Value};
use solana_gateway::pool::Pool;
use solana_gateway::Config;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Matches a JSON-RPC request body by its `method` field, since every
/// upstream call in this crate is a POST to the same path.
pub struct JsonRpcMethod(pub &'static str);

impl wiremock::Match for JsonRpcMethod {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body.get("method").and_then(|m| m.as_str().map(str::to_owned)))
            .is_some_and(|method| method == self.0)
    }
}

pub fn rpc_result(result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": "00000000-0000-0000-0000-000000000000", "result": result})
}

pub fn rpc_error(code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": "00000000-0000-0000-0000-000000000000", "error": {"code": code, "message": message}})
}

/// Mounts a healthy `getHealth` responder, required for `Pool::initialize`
/// to consider the endpoint connected.
pub async fn mount_health_ok(server: &MockServer) {
    Mock::given(wiremock::matchers::method("POST"))
        .and(JsonRpcMethod("getHealth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(json!("ok"))))
        .mount(server)
        .await;
}

/// Builds a `Config` pointed at the given mock endpoints with test-sized
/// timeouts so failure scenarios don't stall the test suite.
pub fn test_config(endpoints: Vec<String>) -> Config {
    Config {
        endpoints,
        helius_api_key: None,
        pool_size: 10,
        request_timeout_secs: 2,
        connect_timeout_secs: 2,
        max_consecutive_failures: 5,
        max_retries: 3,
        retry_delay_secs: 0.05,
        ..Config::default()
    }
}

/// Spins up `n` mock servers, each with a healthy `getHealth` responder
/// mounted, and a `Pool` connected to all of them.
pub async fn pool_with_mock_servers(n: usize) -> (Pool, Vec<MockServer>) {
    let mut servers = Vec::with_capacity(n);
    let mut endpoints = Vec::with_capacity(n);
    for _ in 0..n {
        let server = MockServer::start().await;
        mount_health_ok(&server).await;
        endpoints.push(server.uri());
        servers.push(server);
    }

    let pool = Pool::initialize(test_config(endpoints)).await.expect("pool should connect to mock servers");
    (pool, servers)
}

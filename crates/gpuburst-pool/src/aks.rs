//! AksPool — node pool control through the Azure Resource Manager REST API.
//!
//! Resizing is a read-modify-write of the agent pool resource: GET the
//! current body, set `properties.count`, PUT it back. ARM answers a PUT on an
//! agent pool with a long-running operation; when the response carries an
//! `Azure-AsyncOperation` header the adapter polls that URL until the
//! operation reaches a terminal status.
//!
//! The bearer token is taken as-is from configuration. Acquiring or
//! refreshing it is somebody else's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::control::PoolControl;
use crate::error::{QueryError, ScaleError};
use crate::types::PoolState;

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Connection settings for one AKS agent pool.
#[derive(Debug, Clone)]
pub struct AksPoolConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    pub pool_name: String,
    pub access_token: String,
    /// ARM API version, e.g. "2024-05-01".
    pub api_version: String,
    /// ARM endpoint, e.g. "https://management.azure.com".
    pub management_endpoint: String,
    /// Interval between async-operation status checks.
    pub operation_poll_interval: Duration,
    /// Upper bound on waiting for a resize operation to finish.
    pub operation_timeout: Duration,
}

impl AksPoolConfig {
    /// Full URL of the agent pool resource.
    pub fn resource_url(&self) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}/agentPools/{}?api-version={}",
            self.management_endpoint.trim_end_matches('/'),
            self.subscription_id,
            self.resource_group,
            self.cluster_name,
            self.pool_name,
            self.api_version,
        )
    }
}

/// Agent pool resource as returned by ARM. Only the fields we read.
#[derive(Debug, Deserialize)]
struct AgentPool {
    name: String,
    properties: AgentPoolProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentPoolProperties {
    #[serde(default)]
    count: u32,
    #[serde(default)]
    vm_size: String,
    #[serde(default)]
    provisioning_state: String,
    power_state: Option<PowerState>,
}

#[derive(Debug, Deserialize)]
struct PowerState {
    code: String,
}

impl From<AgentPool> for PoolState {
    fn from(pool: AgentPool) -> Self {
        PoolState {
            name: pool.name,
            count: pool.properties.count,
            vm_size: pool.properties.vm_size,
            provisioning_state: pool.properties.provisioning_state,
            power_state: pool.properties.power_state.map(|p| p.code),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AsyncOperation {
    status: String,
}

/// ARM-backed pool control.
#[derive(Clone)]
pub struct AksPool {
    client: Client,
    config: AksPoolConfig,
}

impl AksPool {
    pub fn new(config: AksPoolConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AksPoolConfig {
        &self.config
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.access_token)
    }

    /// GET the raw agent pool resource.
    async fn fetch_resource(&self) -> Result<Value, QueryError> {
        let resp = self
            .client
            .get(self.config.resource_url())
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QueryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| QueryError::Decode(e.to_string()))
    }

    /// Poll an ARM async operation until it reaches a terminal status.
    async fn await_operation(&self, target: u32, url: &str) -> Result<(), ScaleError> {
        let start = Instant::now();
        loop {
            let resp = self
                .client
                .get(url)
                .header(AUTHORIZATION, self.bearer())
                .send()
                .await
                .map_err(|e| ScaleError::Transport(e.to_string()))?;
            let op: AsyncOperation = ensure_accepted(target, resp)
                .await?
                .json()
                .await
                .map_err(|e| ScaleError::Decode(e.to_string()))?;

            match op.status.as_str() {
                "Succeeded" => return Ok(()),
                "Failed" | "Canceled" => {
                    return Err(ScaleError::OperationFailed {
                        target,
                        status: op.status,
                    });
                }
                other => debug!(target, status = %other, "resize operation in progress"),
            }

            if start.elapsed() >= self.config.operation_timeout {
                return Err(ScaleError::Timeout {
                    target,
                    waited_secs: start.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.config.operation_poll_interval).await;
        }
    }
}

/// Turn a non-2xx response to a resize call into `ScaleError::Rejected`.
async fn ensure_accepted(target: u32, resp: Response) -> Result<Response, ScaleError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ScaleError::Rejected {
        target,
        status: status.as_u16(),
        body,
    })
}

fn async_operation_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ASYNC_OPERATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Set `properties.count` on a raw agent pool body.
fn set_count(resource: &mut Value, target: u32) -> Result<(), ScaleError> {
    let properties = resource
        .get_mut("properties")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ScaleError::Decode("agent pool has no properties object".to_string()))?;
    properties.insert("count".to_string(), Value::from(target));
    Ok(())
}

#[async_trait]
impl PoolControl for AksPool {
    async fn request_scale(&self, target: u32) -> Result<(), ScaleError> {
        info!(pool = %self.config.pool_name, target, "requesting node pool resize");

        let mut resource = self.fetch_resource().await?;
        set_count(&mut resource, target)?;

        let resp = self
            .client
            .put(self.config.resource_url())
            .header(AUTHORIZATION, self.bearer())
            .json(&resource)
            .send()
            .await
            .map_err(|e| ScaleError::Transport(e.to_string()))?;

        let resp = ensure_accepted(target, resp).await?;
        let operation = async_operation_url(resp.headers());

        match operation {
            Some(url) => self.await_operation(target, &url).await?,
            None => warn!(target, "resize response carried no async operation, treating as applied"),
        }

        info!(pool = %self.config.pool_name, target, "node pool resized");
        Ok(())
    }

    async fn get_state(&self) -> Result<PoolState, QueryError> {
        let resource = self.fetch_resource().await?;
        let pool: AgentPool =
            serde_json::from_value(resource).map_err(|e| QueryError::Decode(e.to_string()))?;
        Ok(pool.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::get;
    use reqwest::header::{HeaderName, HeaderValue};
    use serde_json::json;

    fn config() -> AksPoolConfig {
        AksPoolConfig {
            subscription_id: "sub-1".to_string(),
            resource_group: "rg-gpu".to_string(),
            cluster_name: "aks-main".to_string(),
            pool_name: "gpupool".to_string(),
            access_token: "token".to_string(),
            api_version: "2024-05-01".to_string(),
            management_endpoint: "https://management.azure.com/".to_string(),
            operation_poll_interval: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(1800),
        }
    }

    #[test]
    fn resource_url_is_fully_qualified() {
        assert_eq!(
            config().resource_url(),
            "https://management.azure.com/subscriptions/sub-1/resourceGroups/rg-gpu/providers/Microsoft.ContainerService/managedClusters/aks-main/agentPools/gpupool?api-version=2024-05-01"
        );
    }

    #[test]
    fn agent_pool_maps_to_pool_state() {
        let body = json!({
            "name": "gpupool",
            "properties": {
                "count": 2,
                "vmSize": "Standard_NC6s_v3",
                "provisioningState": "Succeeded",
                "powerState": { "code": "Running" }
            }
        });
        let pool: AgentPool = serde_json::from_value(body).unwrap();
        let state = PoolState::from(pool);
        assert_eq!(state.count, 2);
        assert_eq!(state.vm_size, "Standard_NC6s_v3");
        assert_eq!(state.power_state.as_deref(), Some("Running"));
        assert!(state.is_ready_at(2));
    }

    #[test]
    fn missing_power_state_is_none() {
        let body = json!({
            "name": "gpupool",
            "properties": { "count": 0, "vmSize": "x", "provisioningState": "Scaling" }
        });
        let pool: AgentPool = serde_json::from_value(body).unwrap();
        assert_eq!(PoolState::from(pool).power_state, None);
    }

    #[test]
    fn set_count_preserves_other_properties() {
        let mut body = json!({
            "name": "gpupool",
            "properties": { "count": 0, "vmSize": "Standard_NC6s_v3", "mode": "User" }
        });
        set_count(&mut body, 4).unwrap();
        assert_eq!(body["properties"]["count"], 4);
        assert_eq!(body["properties"]["mode"], "User");
    }

    #[test]
    fn set_count_rejects_body_without_properties() {
        let mut body = json!({ "name": "gpupool" });
        assert!(matches!(set_count(&mut body, 1), Err(ScaleError::Decode(_))));
    }

    #[test]
    fn async_operation_header_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"Azure-AsyncOperation").unwrap(),
            HeaderValue::from_static("https://management.azure.com/op/1"),
        );
        assert_eq!(
            async_operation_url(&headers).as_deref(),
            Some("https://management.azure.com/op/1")
        );
        assert_eq!(async_operation_url(&HeaderMap::new()), None);
    }

    // ── Against a fake ARM endpoint ─────────────────────────────


    const POOL_PATH: &str = "/subscriptions/sub-1/resourceGroups/rg-gpu/providers/Microsoft.ContainerService/managedClusters/aks-main/agentPools/gpupool";
    const OPERATION_PATH: &str = "/operations/op-1";

    /// Scripted ARM behaviour and a record of what the adapter sent.
    struct FakeArm {
        base: String,
        resource: Value,
        get_status: Option<u16>,
        put_status: Option<u16>,
        async_operation: bool,
        /// Operation statuses handed out in order; the last one repeats.
        operation_statuses: VecDeque<&'static str>,
        puts: Vec<Value>,
        operation_polls: u32,
        authorizations: Vec<String>,
    }

    impl FakeArm {
        fn new() -> Self {
            Self {
                base: String::new(),
                resource: json!({
                    "name": "gpupool",
                    "properties": {
                        "count": 0,
                        "vmSize": "Standard_NC6s_v3",
                        "mode": "User",
                        "provisioningState": "Succeeded",
                        "powerState": { "code": "Running" }
                    }
                }),
                get_status: None,
                put_status: None,
                async_operation: true,
                operation_statuses: VecDeque::from(["Succeeded"]),
                puts: Vec::new(),
                operation_polls: 0,
                authorizations: Vec::new(),
            }
        }

        fn with_operation(mut self, statuses: &[&'static str]) -> Self {
            self.operation_statuses = statuses.iter().copied().collect();
            self
        }
    }

    type SharedArm = Arc<Mutex<FakeArm>>;

    fn scripted_failure(code: u16, body: &'static str) -> AxumResponse {
        (StatusCode::from_u16(code).unwrap(), body).into_response()
    }

    async fn get_pool(State(arm): State<SharedArm>, headers: HeaderMap) -> AxumResponse {
        let mut arm = arm.lock().unwrap();
        if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            arm.authorizations.push(auth.to_string());
        }
        match arm.get_status {
            Some(code) => scripted_failure(code, "AuthorizationFailed"),
            None => Json(arm.resource.clone()).into_response(),
        }
    }

    async fn put_pool(State(arm): State<SharedArm>, Json(body): Json<Value>) -> AxumResponse {
        let mut arm = arm.lock().unwrap();
        arm.puts.push(body.clone());
        if let Some(code) = arm.put_status {
            return scripted_failure(code, "QuotaExceeded");
        }
        arm.resource = body;
        let mut resp = Json(arm.resource.clone()).into_response();
        if arm.async_operation {
            let url = format!("{}{OPERATION_PATH}", arm.base);
            resp.headers_mut()
                .insert(ASYNC_OPERATION_HEADER, url.parse().unwrap());
        }
        resp
    }

    async fn get_operation(State(arm): State<SharedArm>) -> Json<Value> {
        let mut arm = arm.lock().unwrap();
        arm.operation_polls += 1;
        let status = if arm.operation_statuses.len() > 1 {
            arm.operation_statuses.pop_front()
        } else {
            arm.operation_statuses.front().copied()
        };
        Json(json!({ "status": status.unwrap_or("Succeeded") }))
    }

    async fn serve(arm: FakeArm) -> (SharedArm, AksPool) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let shared = Arc::new(Mutex::new(FakeArm {
            base: base.clone(),
            ..arm
        }));

        let router = Router::new()
            .route(POOL_PATH, get(get_pool).put(put_pool))
            .route(OPERATION_PATH, get(get_operation))
            .with_state(Arc::clone(&shared));
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let pool = AksPool::new(AksPoolConfig {
            management_endpoint: base,
            operation_poll_interval: Duration::from_millis(10),
            operation_timeout: Duration::from_secs(5),
            ..config()
        })
        .unwrap();
        (shared, pool)
    }

    #[tokio::test]
    async fn get_state_reads_agent_pool() {
        let (arm, pool) = serve(FakeArm::new()).await;

        let state = pool.get_state().await.unwrap();
        assert_eq!(state.name, "gpupool");
        assert_eq!(state.count, 0);
        assert_eq!(state.power_state.as_deref(), Some("Running"));
        assert_eq!(arm.lock().unwrap().authorizations, vec!["Bearer token"]);
    }

    #[tokio::test]
    async fn resize_writes_back_fetched_resource_and_follows_operation() {
        let (arm, pool) =
            serve(FakeArm::new().with_operation(&["InProgress", "InProgress", "Succeeded"])).await;

        pool.request_scale(3).await.unwrap();

        let arm = arm.lock().unwrap();
        assert_eq!(arm.puts.len(), 1);
        assert_eq!(arm.puts[0]["properties"]["count"], 3);
        assert_eq!(arm.puts[0]["properties"]["mode"], "User");
        assert_eq!(arm.operation_polls, 3);
    }

    #[tokio::test]
    async fn resize_without_operation_header_is_final() {
        let mut fake = FakeArm::new();
        fake.async_operation = false;
        let (arm, pool) = serve(fake).await;

        pool.request_scale(2).await.unwrap();

        let arm = arm.lock().unwrap();
        assert_eq!(arm.puts.len(), 1);
        assert_eq!(arm.operation_polls, 0);
        assert_eq!(arm.resource["properties"]["count"], 2);
    }

    #[tokio::test]
    async fn failed_or_canceled_operation_is_an_error() {
        for terminal in ["Failed", "Canceled"] {
            let (_arm, pool) =
                serve(FakeArm::new().with_operation(&["InProgress", terminal])).await;

            let err = pool.request_scale(2).await.unwrap_err();
            assert!(
                matches!(err, ScaleError::OperationFailed { target: 2, ref status } if status == terminal),
                "{terminal}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn operation_that_never_finishes_times_out() {
        let (arm, mut pool) = serve(FakeArm::new().with_operation(&["InProgress"])).await;
        pool.config.operation_timeout = Duration::from_millis(50);

        let err = pool.request_scale(2).await.unwrap_err();
        assert!(matches!(err, ScaleError::Timeout { target: 2, .. }), "{err}");
        assert!(arm.lock().unwrap().operation_polls >= 2);
    }

    #[tokio::test]
    async fn rejected_fetch_fails_resize_before_put() {
        let mut fake = FakeArm::new();
        fake.get_status = Some(403);
        let (arm, pool) = serve(fake).await;

        let err = pool.request_scale(2).await.unwrap_err();
        assert!(
            matches!(
                err,
                ScaleError::Query(QueryError::Rejected { status: 403, ref body }) if body == "AuthorizationFailed"
            ),
            "{err}"
        );
        assert!(matches!(
            pool.get_state().await,
            Err(QueryError::Rejected { status: 403, .. })
        ));
        assert!(arm.lock().unwrap().puts.is_empty());
    }

    #[tokio::test]
    async fn rejected_put_carries_status_and_body() {
        let mut fake = FakeArm::new();
        fake.put_status = Some(409);
        let (arm, pool) = serve(fake).await;

        let err = pool.request_scale(8).await.unwrap_err();
        assert!(
            matches!(
                err,
                ScaleError::Rejected { target: 8, status: 409, ref body } if body == "QuotaExceeded"
            ),
            "{err}"
        );
        let arm = arm.lock().unwrap();
        assert_eq!(arm.operation_polls, 0);
        assert_eq!(arm.resource["properties"]["count"], 0);
    }
}

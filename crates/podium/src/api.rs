//! HTTP API: operator routes, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use podium_lib::{
    health::ComponentStatus, LatencyMethod, Podium, PodiumError, PodiumMetrics, Protocol,
    TrafficFilter, TrafficIntent, TrafficRecord, TrafficRule,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub podium: Arc<Podium>,
    pub metrics: PodiumMetrics,
}

impl AppState {
    pub fn new(podium: Arc<Podium>, metrics: PodiumMetrics) -> Self {
        Self { podium, metrics }
    }
}

/// Error body returned by operator routes
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let status = match err.downcast_ref::<PodiumError>() {
            Some(PodiumError::UnresolvedEndpoint(_)) => StatusCode::NOT_FOUND,
            Some(PodiumError::InvalidRule(_)) | Some(PodiumError::Config(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn duration_from_secs(secs: Option<u64>) -> Option<Duration> {
    secs.map(Duration::from_secs)
}

// ---- health and metrics ----

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.podium.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the primary monitor runs
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.podium.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    state
        .metrics
        .set_endpoints_registered(state.podium.registry().len());
    state.metrics.set_rules_registered(state.podium.rules().len());

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

// ---- hosts ----

#[derive(Debug, Deserialize)]
pub struct AddHostsRequest {
    pub hosts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AddHostsResponse {
    /// Endpoints added per host that completed
    pub added: BTreeMap<String, usize>,
}

async fn add_hosts(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddHostsRequest>,
) -> ApiResult<AddHostsResponse> {
    if req.hosts.is_empty() {
        return Err(ApiError::bad_request("no hosts given"));
    }
    let added = state.podium.add_hosts(&req.hosts).await;
    info!(requested = req.hosts.len(), added = added.len(), "Hosts added");
    Ok(Json(AddHostsResponse {
        added: added.into_iter().collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct StopServiceRequest {
    pub hosts: Vec<String>,
    #[serde(default)]
    pub remove_db: bool,
}

#[derive(Debug, Serialize)]
pub struct HostsResponse {
    pub hosts: BTreeSet<String>,
}

async fn stop_service(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StopServiceRequest>,
) -> ApiResult<HostsResponse> {
    let hosts = state.podium.stop_service(&req.hosts, req.remove_db).await;
    Ok(Json(HostsResponse { hosts }))
}

#[derive(Debug, Serialize)]
pub struct EndpointResponse {
    pub endpoint: String,
    pub host: String,
}

async fn endpoint_host(
    State(state): State<Arc<AppState>>,
    Path(endpoint): Path<String>,
) -> ApiResult<EndpointResponse> {
    let host = state.podium.registry().require(&endpoint).map_err(anyhow::Error::from)?;
    Ok(Json(EndpointResponse { endpoint, host }))
}

#[derive(Debug, Serialize)]
pub struct HostUpResponse {
    pub host: String,
    pub up: bool,
}

async fn host_up(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> Json<HostUpResponse> {
    let up = state.podium.is_host_up(&host).await;
    Json(HostUpResponse { host, up })
}

async fn start_monitoring(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.podium.start_resource_monitoring(&host).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_monitoring(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.podium.stop_resource_monitoring(&host).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PcapRequest {
    pub file: String,
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub args: String,
}

async fn start_pcap(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
    Json(req): Json<PcapRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .podium
        .start_pcap(&host, &req.file, &req.interface, &req.args)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_pcap(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
    Json(req): Json<PcapRequest>,
) -> Result<StatusCode, ApiError> {
    state.podium.stop_pcap(&host, &req.file).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- traffic ----

#[derive(Debug, Deserialize)]
pub struct RunTrafficRequest {
    pub src: String,
    pub dst: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default = "default_connected")]
    pub connected: bool,
    /// Stop the request after this many seconds
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MeshRequest {
    pub hosts: Vec<String>,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default = "default_connected")]
    pub connected: bool,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

fn default_connected() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ReqidResponse {
    pub reqid: String,
}

async fn run_traffic(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunTrafficRequest>,
) -> ApiResult<ReqidResponse> {
    let reqid = state
        .podium
        .run_traffic(
            &req.src,
            &req.dst,
            req.port,
            req.protocol,
            req.connected,
            duration_from_secs(req.duration_secs),
        )
        .await;
    Ok(Json(ReqidResponse { reqid }))
}

async fn run_mesh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MeshRequest>,
) -> ApiResult<ReqidResponse> {
    if req.hosts.len() < 2 {
        return Err(ApiError::bad_request("a mesh needs at least two hosts"));
    }
    let reqid = state
        .podium
        .run_mesh_ping(
            &req.hosts,
            req.port,
            req.protocol,
            req.connected,
            duration_from_secs(req.duration_secs),
        )
        .await;
    Ok(Json(ReqidResponse { reqid }))
}

/// One intent of a batch registration; all intents share one reqid
#[derive(Debug, Deserialize)]
pub struct IntentRequest {
    pub src: String,
    pub dst: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default = "default_connected")]
    pub connected: bool,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub interval: Option<f64>,
    #[serde(default)]
    pub tries: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub reqid: String,
    #[serde(flatten)]
    pub outcome: podium_lib::RegistrationOutcome,
}

async fn register_intents(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<Vec<IntentRequest>>,
) -> ApiResult<RegisterResponse> {
    let reqid = podium_lib::new_id();
    let intents = batch
        .into_iter()
        .map(|req| {
            let mut intent = TrafficIntent::new(req.src, req.dst, req.port, req.protocol)
                .with_reqid(reqid.clone())
                .connected(req.connected);
            if let Some(payload) = req.payload {
                intent = intent.with_field("payload", payload);
            }
            if let Some(interval) = req.interval {
                intent = intent.with_field("interval", interval);
            }
            if let Some(tries) = req.tries {
                intent = intent.with_field("tries", tries);
            }
            intent
        })
        .collect();
    let outcome = state.podium.register_traffic(intents).await;
    Ok(Json(RegisterResponse { reqid, outcome }))
}

async fn rules(
    State(state): State<Arc<AppState>>,
    Path(reqid): Path<String>,
) -> Json<Vec<TrafficRule>> {
    Json(state.podium.get_rules_by_reqid(&reqid))
}

async fn start_traffic(
    State(state): State<Arc<AppState>>,
    Path(reqid): Path<String>,
) -> Json<HostsResponse> {
    let hosts = state.podium.start_traffic(&reqid).await;
    Json(HostsResponse { hosts })
}

async fn stop_traffic(
    State(state): State<Arc<AppState>>,
    Path(reqid): Path<String>,
) -> Json<HostsResponse> {
    let hosts = state.podium.stop_traffic(&reqid).await;
    Json(HostsResponse { hosts })
}

async fn mock_traffic(
    State(state): State<Arc<AppState>>,
    Path(reqid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let rules = state.podium.get_rules_by_reqid(&reqid);
    if rules.is_empty() {
        return Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("no rules for reqid {reqid}"),
        });
    }
    state.podium.monitor().start_mock_traffic(rules).await;
    Ok(StatusCode::ACCEPTED)
}

/// `duration` (seconds) plus any record filters
async fn results(
    State(state): State<Arc<AppState>>,
    Path(reqid): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<TrafficRecord>> {
    let duration = take_duration(&mut params)?;
    let filter = TrafficFilter::from_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    Ok(Json(state.podium.get_results(&reqid, duration, filter).await))
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub reqid: String,
    pub success: usize,
    pub failure: usize,
    pub pass_percent: f64,
    pub fail_percent: f64,
}

async fn stats(
    State(state): State<Arc<AppState>>,
    Path(reqid): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Json<StatsResponse> {
    let stats = state
        .podium
        .get_traffic_stats(&reqid, duration_from_secs(query.duration))
        .await;
    Json(StatsResponse {
        success: stats.success,
        failure: stats.failure,
        pass_percent: stats.pass_percent(),
        fail_percent: stats.fail_percent(),
        reqid,
    })
}

#[derive(Debug, Serialize)]
pub struct LatencyResponse {
    pub reqid: String,
    pub method: String,
    pub latency: f64,
}

/// `method` (avg, min, max), `duration` (seconds) plus any record filters
async fn latency(
    State(state): State<Arc<AppState>>,
    Path(reqid): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> ApiResult<LatencyResponse> {
    let method = params.remove("method").unwrap_or_else(|| "avg".to_string());
    if LatencyMethod::parse(&method).is_none() {
        return Err(ApiError::bad_request(format!("unknown method {method}")));
    }
    let duration = take_duration(&mut params)?;
    let filter = TrafficFilter::from_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let latency = state
        .podium
        .get_latency(&reqid, &method, duration, filter)
        .await;
    Ok(Json(LatencyResponse {
        reqid,
        method,
        latency,
    }))
}

fn take_duration(params: &mut HashMap<String, String>) -> Result<Option<Duration>, ApiError> {
    params
        .remove("duration")
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ApiError::bad_request(format!("invalid duration {raw}")))
        })
        .transpose()
}

// ---- remote parameters and local monitor ----

#[derive(Debug, Serialize, Deserialize)]
pub struct ParamValue {
    pub value: Option<String>,
}

async fn get_param(
    State(state): State<Arc<AppState>>,
    Path((endpoint, name)): Path<(String, String)>,
) -> ApiResult<ParamValue> {
    let value = state.podium.get_param(&endpoint, &name).await?;
    Ok(Json(ParamValue { value }))
}

async fn set_param(
    State(state): State<Arc<AppState>>,
    Path((endpoint, name)): Path<(String, String)>,
    Json(body): Json<ParamValue>,
) -> Result<StatusCode, ApiError> {
    let value = body
        .value
        .ok_or_else(|| ApiError::bad_request("missing value"))?;
    state.podium.set_param(&endpoint, &name, &value).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn monitor_status(State(state): State<Arc<AppState>>) -> Json<podium_lib::MonitorStatus> {
    Json(state.podium.monitor().status().await)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/hosts", post(add_hosts))
        .route("/api/v1/hosts/stop", post(stop_service))
        .route("/api/v1/hosts/:host/up", get(host_up))
        .route("/api/v1/hosts/:host/monitor/start", post(start_monitoring))
        .route("/api/v1/hosts/:host/monitor/stop", post(stop_monitoring))
        .route("/api/v1/hosts/:host/pcap/start", post(start_pcap))
        .route("/api/v1/hosts/:host/pcap/stop", post(stop_pcap))
        .route("/api/v1/endpoints/:endpoint", get(endpoint_host))
        .route("/api/v1/traffic", post(run_traffic))
        .route("/api/v1/traffic/mesh", post(run_mesh))
        .route("/api/v1/traffic/intents", post(register_intents))
        .route("/api/v1/traffic/:reqid/rules", get(rules))
        .route("/api/v1/traffic/:reqid/start", post(start_traffic))
        .route("/api/v1/traffic/:reqid/stop", post(stop_traffic))
        .route("/api/v1/traffic/:reqid/mock", post(mock_traffic))
        .route("/api/v1/traffic/:reqid/results", get(results))
        .route("/api/v1/traffic/:reqid/stats", get(stats))
        .route("/api/v1/traffic/:reqid/latency", get(latency))
        .route(
            "/api/v1/params/:endpoint/:name",
            get(get_param).put(set_param),
        )
        .route("/api/v1/monitor", get(monitor_status))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! HTTP API: predictions, model info, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, MatchedPath, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use churn_lib::{
    error::FieldError,
    health::{HealthResponse, ReadinessResponse},
    models::{BatchResponse, ModelInfo, PredictionResult},
    observability::ChurnMetrics,
    predictor::InferenceService,
    ChurnError,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const SERVICE_NAME: &str = "churn-api";

const ROUTES: [&str; 7] = [
    "GET /",
    "GET /health",
    "GET /ready",
    "GET /metrics",
    "POST /predict",
    "POST /predict/batch",
    "GET /model/info",
];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InferenceService>,
    pub metrics: ChurnMetrics,
    pub version: String,
}

impl AppState {
    pub fn new(service: Arc<InferenceService>, metrics: ChurnMetrics, version: impl Into<String>) -> Self {
        Self {
            service,
            metrics,
            version: version.into(),
        }
    }
}

/// Correlation id of the current request
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<FieldError>>,
}

/// Error returned by handlers
pub struct ApiError(ChurnError);

impl From<ChurnError> for ApiError {
    fn from(err: ChurnError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            ChurnError::InvalidInput(invalid) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    error: "invalid_input",
                    message: invalid.to_string(),
                    fields: Some(invalid.fields),
                },
            ),
            ChurnError::Validation(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    error: "invalid_input",
                    message,
                    fields: Some(Vec::new()),
                },
            ),
            ChurnError::ServiceUnavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error: "service_unavailable",
                    message,
                    fields: None,
                },
            ),
            other => {
                error!(error = %other, kind = other.kind(), "Request failed");
                return internal_error();
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Generic 500; details stay in the server log
fn internal_error() -> Response {
    let body = ErrorBody {
        error: "internal_error",
        message: "internal server error".to_string(),
        fields: None,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "Request handler panicked");
    internal_error()
}

/// Unwrap a JSON body; every rejection is reported as a 422
fn json_body(state: &AppState, body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        state.metrics.inc_invalid_input();
        ApiError(ChurnError::Validation(format!(
            "malformed JSON body: {}",
            rejection.body_text()
        )))
    })
}

/// Service description
async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": state.version,
        "routes": ROUTES,
    }))
}

/// Liveness: 200 as long as the process answers
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse::from_state(&state.service.state(), &state.version))
}

/// Readiness: 200 once the model is loaded, 503 otherwise
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = ReadinessResponse::from_state(&state.service.state());

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let body = state.metrics.render()?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        body,
    ))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let input = json_body(&state, body)?;
    let result = state.service.predict(&input, &request_id.0)?;
    Ok(Json(result))
}

async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let input = json_body(&state, body)?;
    let customers = input
        .get("customers")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            state.metrics.inc_invalid_input();
            ChurnError::Validation("body must be an object with a \"customers\" array".to_string())
        })?;

    let items = state.service.predict_batch(customers, &request_id.0)?;
    Ok(Json(BatchResponse::from_items(items)))
}

async fn model_info(State(state): State<Arc<AppState>>) -> Result<Json<ModelInfo>, ApiError> {
    Ok(Json(state.service.model_info()?))
}

/// Attach a correlation id and count the request by route and status
async fn track_request(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    state.metrics.record_request(&endpoint, response.status().as_u16());
    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/model/info", get(model_info))
        .route_layer(CatchPanicLayer::custom(handle_panic))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_request))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve<F>(addr: &str, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

//! Integration tests for the churn API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use churn_api::{create_router, AppState, REQUEST_ID_HEADER};
use churn_lib::{
    data::generate_sample_data,
    features::{FeatureEngineer, FeatureMatrix},
    model::{ChurnModel, ModelType},
    models::ModelInfo,
    observability::{ChurnMetrics, StructuredLogger},
    predictor::{InferenceService, ModelSource, OutputFormatter, Predictor, StaticModelSource},
    ChurnError, Result,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tower::ServiceExt;

/// Hands over its predictor only once the gate is opened
struct GatedSource {
    gate: Arc<Notify>,
    predictor: Arc<dyn Predictor>,
}

#[async_trait]
impl ModelSource for GatedSource {
    fn describe(&self) -> String {
        "gated".to_string()
    }

    async fn load(&self) -> Result<Arc<dyn Predictor>> {
        self.gate.notified().await;
        Ok(Arc::clone(&self.predictor))
    }
}

struct BrokenSource;

#[async_trait]
impl ModelSource for BrokenSource {
    fn describe(&self) -> String {
        "broken".to_string()
    }

    async fn load(&self) -> Result<Arc<dyn Predictor>> {
        Err(ChurnError::NotFound {
            path: PathBuf::from("/srv/models/churn.artifact"),
        })
    }
}

/// Scoring backend that fails instead of scoring
struct FaultyPredictor {
    panics: bool,
}

impl Predictor for FaultyPredictor {
    fn predict_proba(&self, _features: &FeatureMatrix) -> Result<Vec<f64>> {
        if self.panics {
            panic!("scoring backend crashed");
        }
        Err(ChurnError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "read failed on /srv/models/weights",
        )))
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            model_version: "faulty-1".to_string(),
            model_type: "faulty".to_string(),
            feature_names: FeatureEngineer::new().feature_names(),
            trained_at: None,
            decision_threshold: 0.5,
            metrics: None,
        }
    }
}

/// Logistic model trained on synthetic data where short-tenure
/// month-to-month customers churn
fn trained_model() -> Arc<dyn Predictor> {
    let data = generate_sample_data(2000, 42);
    let records: Vec<_> = data.iter().map(|l| l.record.clone()).collect();
    let labels: Vec<u8> = data.iter().map(|l| l.churn).collect();

    let mut model = ChurnModel::new(ModelType::LogisticRegression, None).unwrap();
    model
        .fit(&FeatureEngineer::new().transform(&records), &labels)
        .unwrap();
    Arc::new(model)
}

fn setup_test_app() -> (Router, Arc<InferenceService>) {
    let metrics = ChurnMetrics::new();
    let service = Arc::new(InferenceService::new(
        FeatureEngineer::new(),
        OutputFormatter::new(),
        Arc::new(StructuredLogger::new("churn-api-test")),
        metrics.clone(),
    ));
    let state = Arc::new(AppState::new(Arc::clone(&service), metrics, "0.1.0-test"));
    (create_router(state), service)
}

async fn setup_ready_app() -> Router {
    let (app, service) = setup_test_app();
    service
        .load(&StaticModelSource::new(trained_model()))
        .await
        .unwrap();
    app
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn scenario_customer() -> Value {
    json!({
        "tenure_months": 12,
        "monthly_charges": 65.50,
        "total_charges": 786.00,
        "contract_type": "Month-to-month"
    })
}

#[tokio::test]
async fn test_root_lists_routes() {
    let (app, _service) = setup_test_app();

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["service"], "churn-api");
    assert_eq!(body["version"], "0.1.0-test");
    let routes: Vec<&str> = body["routes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(routes.contains(&"POST /predict"));
    assert!(routes.contains(&"GET /ready"));
}

#[tokio::test]
async fn test_health_ok_before_model_loaded() {
    let (app, _service) = setup_test_app();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["model_state"], "not_loaded");
    assert_eq!(health["version"], "0.1.0-test");
    assert!(health["timestamp"].is_string());
}

#[tokio::test]
async fn test_ready_503_until_load_completes() {
    let (app, service) = setup_test_app();
    let gate = Arc::new(Notify::new());
    let source = GatedSource {
        gate: Arc::clone(&gate),
        predictor: trained_model(),
    };

    let loader = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.load(&source).await })
    };

    let response = app.clone().oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], false);
    assert!(readiness["reason"].is_string());

    // Liveness is unaffected while loading
    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    gate.notify_one();
    loader.await.unwrap().unwrap();

    let response = app.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_ready_reports_load_failure_reason() {
    let (app, service) = setup_test_app();
    assert!(service.load(&BrokenSource).await.is_err());

    let response = app.clone().oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = body_json(response).await;
    assert_eq!(readiness["reason"], "model load failed: not_found");
    assert!(!readiness.to_string().contains("/srv/models"));

    let response = app
        .oneshot(post_json("/predict", &scenario_customer()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "service_unavailable");
    assert!(!body.to_string().contains("/srv/models"));
}

#[tokio::test]
async fn test_predict_503_when_not_ready() {
    let (app, _service) = setup_test_app();

    let response = app
        .oneshot(post_json("/predict", &scenario_customer()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_predict_high_risk_scenario() {
    let app = setup_ready_app().await;

    let response = app
        .oneshot(post_json("/predict", &scenario_customer()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = body_json(response).await;
    let probability = result["churn_probability"].as_f64().unwrap();
    assert!(probability >= 0.5, "probability {}", probability);
    assert_eq!(result["prediction"], 1);
    assert_eq!(result["risk_category"], "High");
    assert!(result["model_version"]
        .as_str()
        .unwrap()
        .starts_with("logistic_regression"));
    assert!(result["timestamp"].is_string());
}

#[tokio::test]
async fn test_predict_missing_field_names_it() {
    let app = setup_ready_app().await;

    let response = app
        .oneshot(post_json(
            "/predict",
            &json!({
                "monthly_charges": 65.50,
                "total_charges": 786.00,
                "contract_type": "Month-to-month"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_input");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["field"].as_str())
        .collect();
    assert_eq!(fields, vec!["tenure_months"]);
}

#[tokio::test]
async fn test_predict_malformed_json_is_422() {
    let app = setup_ready_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from("{\"tenure_months\": 12,"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], "invalid_input");
}

#[tokio::test]
async fn test_request_id_echoed_or_generated() {
    let app = setup_ready_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .header(REQUEST_ID_HEADER, "req-42")
        .body(Body::from(scenario_customer().to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");

    let response = app.oneshot(get("/health")).await.unwrap();
    let generated = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
    assert_eq!(generated.len(), 36);
}

#[tokio::test]
async fn test_batch_with_one_malformed_item() {
    let app = setup_ready_app().await;

    let body = json!({
        "customers": [
            scenario_customer(),
            {"tenure_months": "twelve", "monthly_charges": 65.50},
            {
                "tenure_months": 60,
                "monthly_charges": 25.0,
                "total_charges": 1500.0,
                "contract_type": "Two year"
            }
        ]
    });
    let response = app.oneshot(post_json("/predict/batch", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let batch = body_json(response).await;
    assert_eq!(batch["total"], 3);
    assert_eq!(batch["succeeded"], 2);
    assert_eq!(batch["failed"], 1);

    let results = batch["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["index"], 0);
    assert!(results[0]["prediction"].is_object());
    assert_eq!(results[1]["index"], 1);
    assert!(results[1]["prediction"].is_null());
    assert_eq!(results[1]["error"]["error"], "invalid_input");
    assert!(results[2]["prediction"].is_object());
    assert_eq!(results[2]["prediction"]["risk_category"], "Low");
    assert_eq!(batch["predicted_churners"], 1);
}

#[tokio::test]
async fn test_batch_requires_customers_array() {
    let app = setup_ready_app().await;

    let response = app
        .oneshot(post_json("/predict/batch", &json!([scenario_customer()])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_model_info() {
    let (app, _service) = setup_test_app();
    let response = app.oneshot(get("/model/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let app = setup_ready_app().await;
    let response = app.oneshot(get("/model/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let info = body_json(response).await;
    assert_eq!(info["model_type"], "logistic_regression");
    assert_eq!(info["decision_threshold"], 0.5);
    assert_eq!(
        info["feature_names"].as_array().unwrap().len(),
        FeatureEngineer::new().feature_names().len()
    );
    assert!(info["trained_at"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_ready_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/predict", &scenario_customer()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("churn_api_requests_total"));
    assert!(metrics_text.contains("churn_api_prediction_latency_seconds_bucket"));
    assert!(metrics_text.contains("churn_api_predictions_total"));
    assert!(metrics_text.contains("churn_api_model_info"));
}

async fn assert_generic_500(panics: bool) {
    let (app, service) = setup_test_app();
    service
        .load(&StaticModelSource::new(Arc::new(FaultyPredictor { panics })))
        .await
        .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .header(REQUEST_ID_HEADER, "req-500")
        .body(Body::from(scenario_customer().to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-500");
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"error": "internal_error", "message": "internal server error"})
    );

    // the service keeps answering afterwards
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_predictor_error_is_generic_500() {
    assert_generic_500(false).await;
}

#[tokio::test]
async fn test_predictor_panic_is_generic_500() {
    assert_generic_500(true).await;
}

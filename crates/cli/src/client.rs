//! API client for communicating with the churn prediction service

use anyhow::{Context, Result};
use churn_lib::error::FieldError;
use churn_lib::health::{HealthResponse, ReadinessResponse};
use churn_lib::models::{BatchResponse, ModelInfo, PredictionResult};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

/// Error body returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub fields: Option<Vec<FieldError>>,
}

/// API client for the churn prediction service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Relative joins keep any path prefix of the base only with a trailing slash
        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, describe_error(&body));
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn predict(&self, customer: &Value) -> Result<PredictionResult> {
        self.post("predict", customer).await
    }

    pub async fn predict_batch(&self, customers: Vec<Value>) -> Result<BatchResponse> {
        self.post("predict/batch", &json!({ "customers": customers })).await
    }

    pub async fn model_info(&self) -> Result<ModelInfo> {
        self.get("model/info").await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("health").await
    }

    /// Readiness; a 503 still carries a readiness body
    pub async fn ready(&self) -> Result<ReadinessResponse> {
        let url = self.base_url.join("ready").context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return response.json().await.context("Failed to parse response");
        }
        Self::parse(response).await
    }
}

/// Render an API error body, falling back to the raw text
fn describe_error(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => match err.fields.as_deref() {
            Some(fields) if !fields.is_empty() => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{}: {}", f.field, f.reason))
                    .collect();
                format!("{} ({})", err.error, fields.join("; "))
            }
            _ => format!("{}: {}", err.error, err.message),
        },
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_lib::models::RiskCategory;
    use churn_lib::predictor::ModelPhase;
    use mockito::Matcher;

    const PREDICTION: &str = r#"{
        "prediction": 1,
        "churn_probability": 0.912,
        "risk_category": "High",
        "model_version": "random_forest-20240101120000",
        "timestamp": "2024-01-01T12:00:00Z"
    }"#;

    #[tokio::test]
    async fn test_predict_posts_customer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({"tenure_months": 12})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(PREDICTION)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result = client
            .predict(&json!({"tenure_months": 12, "contract_type": "Month-to-month"}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.prediction, 1);
        assert_eq!(result.risk_category, RiskCategory::High);
        assert_eq!(result.churn_probability, 0.912);
    }

    #[tokio::test]
    async fn test_predict_batch_wraps_customers() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            r#"{{
                "results": [
                    {{"index": 0, "prediction": {}}},
                    {{"index": 1, "error": {{"error": "invalid_input", "message": "tenure_months: missing required field"}}}}
                ],
                "total": 2, "succeeded": 1, "failed": 1, "predicted_churners": 1
            }}"#,
            PREDICTION
        );
        let mock = server
            .mock("POST", "/predict/batch")
            .match_body(Matcher::PartialJson(json!({"customers": [{"tenure_months": 3}, {}]})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client
            .predict_batch(vec![json!({"tenure_months": 3}), json!({})])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.total, 2);
        assert!(response.results[0].is_ok());
        assert_eq!(response.results[1].error.as_ref().unwrap().error, "invalid_input");
    }

    #[tokio::test]
    async fn test_validation_error_names_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":"invalid_input","message":"tenure_months: missing required field",
                    "fields":[{"field":"tenure_months","reason":"missing required field"}]}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.predict(&json!({})).await.unwrap_err().to_string();

        assert!(err.contains("422"), "{}", err);
        assert!(err.contains("tenure_months: missing required field"), "{}", err);
    }

    #[tokio::test]
    async fn test_ready_accepts_503_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ready")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ready":false,"reason":"model is loading"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"healthy","timestamp":"2024-01-01T12:00:00Z",
                    "model_state":"loading","version":"0.1.0"}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let readiness = client.ready().await.unwrap();
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("model is loading"));

        let health = client.health().await.unwrap();
        assert_eq!(health.model_state, ModelPhase::Loading);
    }

    #[tokio::test]
    async fn test_model_info_503_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/model/info")
            .with_status(503)
            .with_body(r#"{"error":"service_unavailable","message":"model not loaded"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.model_info().await.unwrap_err().to_string();
        assert!(err.contains("service_unavailable: model not loaded"), "{}", err);
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let client = ApiClient::new("http://localhost:8080/churn").unwrap();
        assert_eq!(
            client.base_url().join("predict").unwrap().as_str(),
            "http://localhost:8080/churn/predict"
        );
        assert!(ApiClient::new("not a url").is_err());
    }
}

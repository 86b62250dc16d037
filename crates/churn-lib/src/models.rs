//! Core data models for churn prediction

use crate::error::FieldError;
use crate::model::EvaluationMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Categorical value with a fixed, named domain
pub trait Categorical: Sized + Copy + 'static {
    /// Every member of the domain, in declaration order
    fn variants() -> &'static [Self];

    /// Canonical spelling used in responses and CSV output
    fn label(&self) -> &'static str;

    /// Match a raw value against the domain, ignoring case and separator style
    fn parse(raw: &str) -> Option<Self> {
        let wanted = normalize_category(raw);
        Self::variants()
            .iter()
            .copied()
            .find(|v| normalize_category(v.label()) == wanted)
    }

    /// Canonical labels of the whole domain
    fn labels() -> Vec<&'static str> {
        Self::variants().iter().map(|v| v.label()).collect()
    }
}

/// Lowercase and unify space/underscore/hyphen separators
pub fn normalize_category(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '_' => '-',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractType {
    #[serde(rename = "Month-to-month")]
    MonthToMonth,
    #[serde(rename = "One year")]
    OneYear,
    #[serde(rename = "Two year")]
    TwoYear,
}

impl Categorical for ContractType {
    fn variants() -> &'static [Self] {
        &[Self::MonthToMonth, Self::OneYear, Self::TwoYear]
    }

    fn label(&self) -> &'static str {
        match self {
            Self::MonthToMonth => "Month-to-month",
            Self::OneYear => "One year",
            Self::TwoYear => "Two year",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "Credit card")]
    CreditCard,
    #[serde(rename = "Bank transfer")]
    BankTransfer,
    #[serde(rename = "Electronic check")]
    ElectronicCheck,
    #[serde(rename = "Mailed check")]
    MailedCheck,
}

impl Categorical for PaymentMethod {
    fn variants() -> &'static [Self] {
        &[
            Self::CreditCard,
            Self::BankTransfer,
            Self::ElectronicCheck,
            Self::MailedCheck,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            Self::CreditCard => "Credit card",
            Self::BankTransfer => "Bank transfer",
            Self::ElectronicCheck => "Electronic check",
            Self::MailedCheck => "Mailed check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InternetService {
    #[serde(rename = "DSL")]
    Dsl,
    #[serde(rename = "Fiber optic")]
    FiberOptic,
    #[serde(rename = "No")]
    NoService,
}

impl Categorical for InternetService {
    fn variants() -> &'static [Self] {
        &[Self::Dsl, Self::FiberOptic, Self::NoService]
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Dsl => "DSL",
            Self::FiberOptic => "Fiber optic",
            Self::NoService => "No",
        }
    }
}

/// Yes/No service flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn is_yes(&self) -> bool {
        matches!(self, YesNo::Yes)
    }
}

impl Categorical for YesNo {
    fn variants() -> &'static [Self] {
        &[Self::Yes, Self::No]
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

/// One customer row, after schema validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub tenure_months: f64,
    pub monthly_charges: f64,
    pub total_charges: f64,
    pub contract_type: ContractType,
    pub payment_method: PaymentMethod,
    pub internet_service: InternetService,
    pub tech_support: YesNo,
    pub online_security: YesNo,
}

/// A record paired with its churn label (0 = stayed, 1 = churned)
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRecord {
    pub record: CustomerRecord,
    pub churn: u8,
}

/// Coarse risk bucket derived from the churn probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    /// Bucket a probability: below `low` is Low, above `high` is High
    pub fn from_probability(probability: f64, thresholds: &RiskThresholds) -> Self {
        if probability < thresholds.low {
            RiskCategory::Low
        } else if probability > thresholds.high {
            RiskCategory::High
        } else {
            RiskCategory::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "Low",
            RiskCategory::Medium => "Medium",
            RiskCategory::High => "High",
        }
    }
}

/// Configurable risk thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskThresholds {
    #[serde(default = "default_low")]
    pub low: f64,
    #[serde(default = "default_high")]
    pub high: f64,
}

fn default_low() -> f64 {
    0.3
}

fn default_high() -> f64 {
    0.7
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: default_low(),
            high: default_high(),
        }
    }
}

/// Single prediction returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub prediction: u8,
    pub churn_probability: f64,
    pub risk_category: RiskCategory,
    pub model_version: String,
    pub timestamp: DateTime<Utc>,
}

/// Error attached to a failed batch item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

/// Outcome of one element of a batch request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.prediction.is_some()
    }
}

/// Batch response with summary counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItem>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub predicted_churners: usize,
}

impl BatchResponse {
    pub fn from_items(results: Vec<BatchItem>) -> Self {
        let succeeded = results.iter().filter(|i| i.is_ok()).count();
        let predicted_churners = results
            .iter()
            .filter_map(|i| i.prediction.as_ref())
            .filter(|p| p.prediction == 1)
            .count();
        Self {
            total: results.len(),
            failed: results.len() - succeeded,
            succeeded,
            predicted_churners,
            results,
        }
    }
}

/// Description of the model a service is serving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_version: String,
    pub model_type: String,
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
    pub decision_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EvaluationMetrics>,
}

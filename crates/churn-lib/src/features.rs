//! Feature engineering for churn models
//!
//! Turns validated customer records into a fixed, ordered numeric feature
//! matrix. The same function runs at training time and at serving time, and
//! reads nothing but the record itself.

use crate::error::{ChurnError, Result};
use crate::models::{ContractType, CustomerRecord, InternetService, PaymentMethod};
use serde::{Deserialize, Serialize};

/// Column order of every feature matrix produced by [`FeatureEngineer`]
pub const FEATURE_NAMES: [&str; 21] = [
    "tenure_months",
    "monthly_charges",
    "total_charges",
    "avg_monthly_spend",
    "charge_ratio",
    "tenure_0_12",
    "tenure_13_24",
    "tenure_25_48",
    "tenure_49_plus",
    "contract_month_to_month",
    "contract_one_year",
    "contract_two_year",
    "payment_credit_card",
    "payment_bank_transfer",
    "payment_electronic_check",
    "payment_mailed_check",
    "internet_dsl",
    "internet_fiber_optic",
    "internet_none",
    "has_tech_support",
    "has_online_security",
];

/// Named numeric rows, one per record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Build a matrix, checking every row has one value per column
    pub fn new(feature_names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != feature_names.len())
        {
            return Err(ChurnError::Validation(format!(
                "row {} has {} values, expected {}",
                i + 1,
                row.len(),
                feature_names.len()
            )));
        }
        Ok(Self {
            feature_names,
            rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows at the given indices, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Value of a named column for one row
    pub fn value(&self, row: usize, feature: &str) -> Option<f64> {
        let col = self.feature_names.iter().position(|f| f == feature)?;
        self.rows.get(row).and_then(|r| r.get(col)).copied()
    }
}

/// Derives model features from customer records
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Names of the produced columns, in order
    pub fn feature_names(&self) -> Vec<String> {
        FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }

    pub fn transform(&self, records: &[CustomerRecord]) -> FeatureMatrix {
        FeatureMatrix {
            feature_names: self.feature_names(),
            rows: records.iter().map(|r| self.transform_one(r)).collect(),
        }
    }

    pub fn transform_one(&self, record: &CustomerRecord) -> Vec<f64> {
        let tenure = record.tenure_months;
        let monthly = record.monthly_charges;
        let total = record.total_charges;
        let bucket = tenure_bucket(tenure);

        vec![
            tenure,
            monthly,
            total,
            total / (tenure + 1.0),
            monthly / (total + 1.0),
            flag(bucket == 0),
            flag(bucket == 1),
            flag(bucket == 2),
            flag(bucket == 3),
            flag(record.contract_type == ContractType::MonthToMonth),
            flag(record.contract_type == ContractType::OneYear),
            flag(record.contract_type == ContractType::TwoYear),
            flag(record.payment_method == PaymentMethod::CreditCard),
            flag(record.payment_method == PaymentMethod::BankTransfer),
            flag(record.payment_method == PaymentMethod::ElectronicCheck),
            flag(record.payment_method == PaymentMethod::MailedCheck),
            flag(record.internet_service == InternetService::Dsl),
            flag(record.internet_service == InternetService::FiberOptic),
            flag(record.internet_service == InternetService::NoService),
            flag(record.tech_support.is_yes()),
            flag(record.online_security.is_yes()),
        ]
    }
}

/// Tenure bins (0, 12], (12, 24], (24, 48], (48, inf); zero tenure falls in the first
fn tenure_bucket(tenure: f64) -> usize {
    if tenure <= 12.0 {
        0
    } else if tenure <= 24.0 {
        1
    } else if tenure <= 48.0 {
        2
    } else {
        3
    }
}

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

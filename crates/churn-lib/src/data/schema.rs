//! Declared record schema
//!
//! One schema validates both CSV rows at training time and JSON payloads at
//! serving time, so a customer is parsed the same way on both paths. Every
//! failing field is reported, not just the first.

use crate::error::{FieldError, InvalidInput};
use crate::models::{
    Categorical, ContractType, CustomerRecord, InternetService, PaymentMethod, YesNo,
};
use serde_json::Value;
use std::collections::HashMap;

/// Value domain of a field
#[derive(Debug, Clone)]
pub enum FieldKind {
    Numeric { min: f64, max: f64 },
    Categorical { allowed: Vec<&'static str> },
    Identifier,
}

/// Declaration of one record field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<&'static str>,
}

impl FieldSpec {
    fn accepts_key(&self, key: &str) -> bool {
        self.name == key || self.aliases.contains(&key)
    }

    /// Canonical name followed by the aliases
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }

    /// Header indices that carry this field, canonical name first
    pub fn column_indices(&self, headers: &[String]) -> Vec<usize> {
        self.keys()
            .filter_map(|k| headers.iter().position(|h| h == k))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Parsed {
    Number(f64),
    Label(&'static str),
    Text(String),
}

#[derive(Debug, Clone, Copy)]
enum Raw<'a> {
    Json(&'a Value),
    Text(&'a str),
}

/// Field-level schema for customer records
#[derive(Debug, Clone)]
pub struct RecordSchema {
    fields: Vec<FieldSpec>,
}

impl Default for RecordSchema {
    fn default() -> Self {
        Self::customer()
    }
}

impl RecordSchema {
    /// The customer schema used for training data and prediction requests
    pub fn customer() -> Self {
        let fields = vec![
            FieldSpec {
                name: "customer_id",
                aliases: &[],
                kind: FieldKind::Identifier,
                required: false,
                default: None,
            },
            FieldSpec {
                name: "tenure_months",
                aliases: &["tenure"],
                kind: FieldKind::Numeric { min: 0.0, max: 1200.0 },
                required: true,
                default: None,
            },
            FieldSpec {
                name: "monthly_charges",
                aliases: &[],
                kind: FieldKind::Numeric { min: 0.0, max: 100_000.0 },
                required: true,
                default: None,
            },
            FieldSpec {
                name: "total_charges",
                aliases: &[],
                kind: FieldKind::Numeric { min: 0.0, max: 10_000_000.0 },
                required: true,
                default: None,
            },
            FieldSpec {
                name: "contract_type",
                aliases: &["contract"],
                kind: FieldKind::Categorical { allowed: ContractType::labels() },
                required: true,
                default: None,
            },
            FieldSpec {
                name: "payment_method",
                aliases: &[],
                kind: FieldKind::Categorical { allowed: PaymentMethod::labels() },
                required: false,
                default: Some("Credit card"),
            },
            FieldSpec {
                name: "internet_service",
                aliases: &[],
                kind: FieldKind::Categorical { allowed: InternetService::labels() },
                required: false,
                default: Some("Fiber optic"),
            },
            FieldSpec {
                name: "tech_support",
                aliases: &[],
                kind: FieldKind::Categorical { allowed: YesNo::labels() },
                required: false,
                default: Some("No"),
            },
            FieldSpec {
                name: "online_security",
                aliases: &[],
                kind: FieldKind::Categorical { allowed: YesNo::labels() },
                required: false,
                default: Some("No"),
            },
        ];
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Canonical names of the fields a record must carry
    pub fn required_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect()
    }

    /// Required fields for which no header, canonical or alias, is present
    pub fn missing_columns(&self, headers: &[String]) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .filter(|f| !headers.iter().any(|h| f.accepts_key(h)))
            .map(|f| f.name)
            .collect()
    }

    /// Validate a JSON object and build a record
    pub fn parse(&self, value: &Value) -> Result<CustomerRecord, InvalidInput> {
        let object = match value.as_object() {
            Some(o) => o,
            None => {
                return Err(InvalidInput::new(vec![FieldError::new(
                    "$",
                    "expected a JSON object",
                )]))
            }
        };

        let mut errors = Vec::new();
        for key in object.keys() {
            if !self.fields.iter().any(|f| f.accepts_key(key)) {
                errors.push(FieldError::new(key.as_str(), "unknown field"));
            }
        }

        let parsed = self.parse_fields(&mut errors, |spec| {
            let mut present = spec
                .keys()
                .filter_map(|k| object.get(k).filter(|v| !v.is_null()).map(|v| (k, v)));
            let first = present.next();
            if let Some((alias, _)) = present.next() {
                return Err(format!("conflicts with alias '{}'", alias));
            }
            Ok(first.map(|(_, v)| Raw::Json(v)))
        });

        finish(parsed, errors)
    }

    /// Validate one CSV row; unknown columns (such as the label) are ignored
    pub fn parse_row(&self, headers: &[String], row: &[String]) -> Result<CustomerRecord, InvalidInput> {
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();

        let mut errors = Vec::new();
        let parsed = self.parse_fields(&mut errors, |spec| {
            let mut present = spec
                .keys()
                .filter_map(|k| index.get(k).map(|&i| (k, i)))
                .filter_map(|(k, i)| row.get(i).map(|s| (k, s.trim())))
                .filter(|(_, s)| !s.is_empty());
            let first = present.next();
            if let Some((alias, _)) = present.next() {
                return Err(format!("conflicts with alias '{}'", alias));
            }
            Ok(first.map(|(_, s)| Raw::Text(s)))
        });

        finish(parsed, errors)
    }

    fn parse_fields<'a, F>(&self, errors: &mut Vec<FieldError>, mut lookup: F) -> HashMap<&'static str, Parsed>
    where
        F: FnMut(&FieldSpec) -> Result<Option<Raw<'a>>, String>,
    {
        let mut parsed = HashMap::new();
        for spec in &self.fields {
            let raw = match lookup(spec) {
                Ok(raw) => raw,
                Err(reason) => {
                    errors.push(FieldError::new(spec.name, reason));
                    continue;
                }
            };
            let raw = match (raw, spec.default) {
                (Some(raw), _) => raw,
                (None, Some(default)) => Raw::Text(default),
                (None, None) if spec.required => {
                    errors.push(FieldError::new(spec.name, "missing required field"));
                    continue;
                }
                (None, None) => continue,
            };
            match parse_value(spec, raw) {
                Ok(value) => {
                    parsed.insert(spec.name, value);
                }
                Err(reason) => errors.push(FieldError::new(spec.name, reason)),
            }
        }
        parsed
    }
}

fn parse_value(spec: &FieldSpec, raw: Raw<'_>) -> Result<Parsed, String> {
    match &spec.kind {
        FieldKind::Numeric { min, max } => {
            let number = match raw {
                Raw::Json(Value::Number(n)) => n.as_f64().ok_or("not representable as a number")?,
                Raw::Json(other) => return Err(format!("expected a number, got {}", json_type(other))),
                Raw::Text(s) => s
                    .parse::<f64>()
                    .map_err(|_| format!("not a number: '{}'", s))?,
            };
            if !number.is_finite() {
                return Err("must be a finite number".to_string());
            }
            if number < *min || number > *max {
                return Err(format!("must be between {} and {}, got {}", min, max, number));
            }
            Ok(Parsed::Number(number))
        }
        FieldKind::Categorical { allowed } => {
            let text = match raw {
                Raw::Json(Value::String(s)) => s.clone(),
                Raw::Json(Value::Bool(b)) => if *b { "yes" } else { "no" }.to_string(),
                Raw::Json(other) => return Err(format!("expected a string, got {}", json_type(other))),
                Raw::Text(s) => s.to_string(),
            };
            let wanted = crate::models::normalize_category(&text);
            allowed
                .iter()
                .find(|label| crate::models::normalize_category(label) == wanted)
                .map(|label| Parsed::Label(*label))
                .ok_or_else(|| format!("unknown category '{}', expected one of {:?}", text, allowed))
        }
        FieldKind::Identifier => match raw {
            Raw::Json(Value::String(s)) => Ok(Parsed::Text(s.clone())),
            Raw::Json(Value::Number(n)) => Ok(Parsed::Text(n.to_string())),
            Raw::Json(other) => Err(format!("expected a string or number, got {}", json_type(other))),
            Raw::Text(s) => Ok(Parsed::Text(s.to_string())),
        },
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn finish(
    parsed: HashMap<&'static str, Parsed>,
    mut errors: Vec<FieldError>,
) -> Result<CustomerRecord, InvalidInput> {
    if !errors.is_empty() {
        return Err(InvalidInput::new(errors));
    }

    let record = CustomerRecord {
        customer_id: match parsed.get("customer_id") {
            Some(Parsed::Text(id)) => Some(id.clone()),
            _ => None,
        },
        tenure_months: number(&parsed, "tenure_months", &mut errors),
        monthly_charges: number(&parsed, "monthly_charges", &mut errors),
        total_charges: number(&parsed, "total_charges", &mut errors),
        contract_type: category(&parsed, "contract_type", &mut errors)
            .unwrap_or(ContractType::MonthToMonth),
        payment_method: category(&parsed, "payment_method", &mut errors)
            .unwrap_or(PaymentMethod::CreditCard),
        internet_service: category(&parsed, "internet_service", &mut errors)
            .unwrap_or(InternetService::FiberOptic),
        tech_support: category(&parsed, "tech_support", &mut errors).unwrap_or(YesNo::No),
        online_security: category(&parsed, "online_security", &mut errors).unwrap_or(YesNo::No),
    };

    if errors.is_empty() {
        Ok(record)
    } else {
        Err(InvalidInput::new(errors))
    }
}

fn number(parsed: &HashMap<&'static str, Parsed>, name: &str, errors: &mut Vec<FieldError>) -> f64 {
    match parsed.get(name) {
        Some(Parsed::Number(n)) => *n,
        _ => {
            errors.push(FieldError::new(name, "missing required field"));
            0.0
        }
    }
}

fn category<C: Categorical>(
    parsed: &HashMap<&'static str, Parsed>,
    name: &str,
    errors: &mut Vec<FieldError>,
) -> Option<C> {
    let value = match parsed.get(name) {
        Some(Parsed::Label(label)) => C::parse(label),
        _ => None,
    };
    if value.is_none() {
        errors.push(FieldError::new(name, "missing required field"));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_payload_applies_defaults() {
        let schema = RecordSchema::customer();
        let record = schema
            .parse(&json!({
                "tenure_months": 12,
                "monthly_charges": 65.50,
                "total_charges": 786.00,
                "contract_type": "Month-to-month"
            }))
            .unwrap();

        assert_eq!(record.tenure_months, 12.0);
        assert_eq!(record.contract_type, ContractType::MonthToMonth);
        assert_eq!(record.payment_method, PaymentMethod::CreditCard);
        assert_eq!(record.internet_service, InternetService::FiberOptic);
        assert_eq!(record.tech_support, YesNo::No);
        assert!(record.customer_id.is_none());
    }

    #[test]
    fn test_tenure_alias_accepted() {
        let schema = RecordSchema::customer();
        let record = schema
            .parse(&json!({
                "tenure": 24,
                "monthly_charges": 65.5,
                "total_charges": 1572.0,
                "contract_type": "one_year",
                "tech_support": "yes"
            }))
            .unwrap();
        assert_eq!(record.tenure_months, 24.0);
        assert_eq!(record.contract_type, ContractType::OneYear);
        assert_eq!(record.tech_support, YesNo::Yes);
    }

    #[test]
    fn test_missing_fields_are_all_named() {
        let schema = RecordSchema::customer();
        let err = schema
            .parse(&json!({ "monthly_charges": 20.0 }))
            .unwrap_err();
        let names = err.field_names();
        assert!(names.contains(&"tenure_months"));
        assert!(names.contains(&"total_charges"));
        assert!(names.contains(&"contract_type"));
        assert!(!names.contains(&"monthly_charges"));
    }

    #[test]
    fn test_range_type_and_category_violations() {
        let schema = RecordSchema::customer();
        let err = schema
            .parse(&json!({
                "tenure_months": -1,
                "monthly_charges": "lots",
                "total_charges": 100.0,
                "contract_type": "weekly",
                "shoe_size": 42
            }))
            .unwrap_err();
        let names = err.field_names();
        assert_eq!(names.len(), 4);
        assert!(names.contains(&"tenure_months"));
        assert!(names.contains(&"monthly_charges"));
        assert!(names.contains(&"contract_type"));
        assert!(names.contains(&"shoe_size"));
    }

    #[test]
    fn test_conflicting_alias_rejected() {
        let schema = RecordSchema::customer();
        let err = schema
            .parse(&json!({
                "tenure_months": 3,
                "tenure": 4,
                "monthly_charges": 20.0,
                "total_charges": 60.0,
                "contract_type": "Two year"
            }))
            .unwrap_err();
        assert_eq!(err.field_names(), vec!["tenure_months"]);
    }

    #[test]
    fn test_non_object_rejected() {
        let schema = RecordSchema::customer();
        let err = schema.parse(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.field_names(), vec!["$"]);
    }

    #[test]
    fn test_parse_csv_row_ignores_extra_columns() {
        let schema = RecordSchema::customer();
        let headers: Vec<String> = ["customer_id", "tenure", "monthly_charges", "total_charges", "contract_type", "churn"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row: Vec<String> = ["C-1", "5", "70.1", "350.5", "month_to_month", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let record = schema.parse_row(&headers, &row).unwrap();
        assert_eq!(record.customer_id.as_deref(), Some("C-1"));
        assert_eq!(record.tenure_months, 5.0);
    }

    #[test]
    fn test_csv_row_rejects_nan() {
        let schema = RecordSchema::customer();
        let headers: Vec<String> = ["tenure_months", "monthly_charges", "total_charges", "contract_type"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row: Vec<String> = ["NaN", "70.1", "", "Two year"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let err = schema.parse_row(&headers, &row).unwrap_err();
        assert_eq!(err.field_names(), vec!["tenure_months", "total_charges"]);
    }

    #[test]
    fn test_csv_row_conflicting_alias_rejected() {
        let schema = RecordSchema::customer();
        let headers: Vec<String> = ["tenure_months", "tenure", "monthly_charges", "total_charges", "contract_type"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row: Vec<String> = ["3", "4", "20.0", "60.0", "Two year"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let err = schema.parse_row(&headers, &row).unwrap_err();
        assert_eq!(err.field_names(), vec!["tenure_months"]);
        assert!(err.to_string().contains("conflicts with alias 'tenure'"));

        // one empty cell is not a conflict
        let row: Vec<String> = ["", "4", "20.0", "60.0", "Two year"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(schema.parse_row(&headers, &row).unwrap().tenure_months, 4.0);
    }

    #[test]
    fn test_missing_columns_resolves_aliases() {
        let schema = RecordSchema::customer();
        let headers: Vec<String> = ["customer_id", "tenure", "monthly_charges", "contract"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(schema.missing_columns(&headers), vec!["total_charges"]);
    }

    #[test]
    fn test_required_fields() {
        let schema = RecordSchema::customer();
        assert_eq!(
            schema.required_fields(),
            vec!["tenure_months", "monthly_charges", "total_charges", "contract_type"]
        );
    }
}

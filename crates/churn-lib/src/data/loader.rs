//! CSV loading and data-set validation

use super::schema::{FieldKind, RecordSchema};
use crate::error::{ChurnError, Result};
use crate::models::{Categorical, LabeledRecord};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Maximum number of row errors quoted in a validation message
const MAX_REPORTED_ROW_ERRORS: usize = 10;

/// Raw tabular data read from a CSV file
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Fill empty schema cells: median for numeric columns, most frequent
    /// value for categorical ones. Returns the number of cells filled.
    pub fn impute_missing(&mut self, schema: &RecordSchema) -> usize {
        let mut filled = 0;
        for spec in schema.fields() {
            for idx in spec.column_indices(&self.headers) {
                let fill = match spec.kind {
                    FieldKind::Numeric { .. } => self.column_median(idx),
                    FieldKind::Categorical { .. } => self.column_mode(idx),
                    FieldKind::Identifier => None,
                };
                let Some(fill) = fill else { continue };
                for row in &mut self.rows {
                    if let Some(cell) = row.get_mut(idx).filter(|c| c.trim().is_empty()) {
                        *cell = fill.clone();
                        filled += 1;
                    }
                }
            }
        }
        if filled > 0 {
            info!(cells = filled, "Imputed missing values");
        }
        filled
    }

    fn column_median(&self, idx: usize) -> Option<String> {
        let mut values: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter_map(|cell| cell.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };
        Some(median.to_string())
    }

    fn column_mode(&self, idx: usize) -> Option<String> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (order, cell) in self
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .enumerate()
        {
            counts.entry(cell).or_insert((0, order)).0 += 1;
        }
        // ties go to the value seen first
        counts
            .into_iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
            .map(|(value, _)| value.to_string())
    }

    /// Parse every row through the schema and read the label column
    pub fn labeled_records(&self, schema: &RecordSchema, target: &str) -> Result<Vec<LabeledRecord>> {
        let target_idx = self
            .headers
            .iter()
            .position(|h| h == target)
            .ok_or_else(|| ChurnError::Validation(format!("missing target column '{}'", target)))?;

        let mut records = Vec::with_capacity(self.rows.len());
        let mut problems = Vec::new();

        for (i, row) in self.rows.iter().enumerate() {
            let row_no = i + 1;
            let record = schema.parse_row(&self.headers, row);
            let label = row
                .get(target_idx)
                .map(|cell| parse_label(cell))
                .unwrap_or(None);

            match (record, label) {
                (Ok(record), Some(churn)) => records.push(LabeledRecord { record, churn }),
                (Ok(_), None) => problems.push(format!("row {}: {}: not a binary label", row_no, target)),
                (Err(invalid), label) => {
                    let mut msg = format!("row {}: {}", row_no, invalid);
                    if label.is_none() {
                        msg.push_str(&format!("; {}: not a binary label", target));
                    }
                    problems.push(msg);
                }
            }
        }

        if !problems.is_empty() {
            let total = problems.len();
            problems.truncate(MAX_REPORTED_ROW_ERRORS);
            return Err(ChurnError::Validation(format!(
                "{} invalid rows: {}",
                total,
                problems.join(" | ")
            )));
        }

        debug!(rows = records.len(), "Parsed labeled records");
        Ok(records)
    }
}

/// Read a CSV file with a header row
pub fn load(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading data");

    if !path.exists() {
        return Err(ChurnError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    let table = Table { headers, rows };
    info!(
        rows = table.len(),
        columns = table.headers.len(),
        "Loaded data"
    );
    Ok(table)
}

/// Load pre-split train and test tables from one directory
pub fn load_train_test(dir: impl AsRef<Path>, train_file: &str, test_file: &str) -> Result<(Table, Table)> {
    let dir = dir.as_ref();
    Ok((load(dir.join(train_file))?, load(dir.join(test_file))?))
}

/// Check that the table is non-empty and carries every required schema field
/// (under its name or an alias) plus the extra columns
pub fn validate(table: &Table, schema: &RecordSchema, extra_columns: &[&str]) -> Result<()> {
    if table.is_empty() {
        return Err(ChurnError::Validation("data set is empty".to_string()));
    }

    let mut missing: Vec<&str> = schema.missing_columns(&table.headers);
    missing.extend(extra_columns.iter().copied().filter(|c| !table.has_column(c)));
    if !missing.is_empty() {
        return Err(ChurnError::Validation(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    info!("Data validation passed");
    Ok(())
}

/// Write labeled records as CSV, in the column layout `load` reads back
pub fn write_csv(path: impl AsRef<Path>, records: &[LabeledRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "customer_id",
        "tenure_months",
        "monthly_charges",
        "total_charges",
        "contract_type",
        "payment_method",
        "internet_service",
        "tech_support",
        "online_security",
        "churn",
    ])?;

    for labeled in records {
        let r = &labeled.record;
        writer.write_record([
            r.customer_id.clone().unwrap_or_default(),
            r.tenure_months.to_string(),
            r.monthly_charges.to_string(),
            r.total_charges.to_string(),
            r.contract_type.label().to_string(),
            r.payment_method.label().to_string(),
            r.internet_service.label().to_string(),
            r.tech_support.label().to_string(),
            r.online_security.label().to_string(),
            labeled.churn.to_string(),
        ])?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = records.len(), "Wrote data");
    Ok(())
}

fn parse_label(cell: &str) -> Option<u8> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "yes" | "true" => Some(1),
        "0" | "0.0" | "no" | "false" => Some(0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::generate_sample_data;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_missing_file() {
        let err = load("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, ChurnError::NotFound { .. }));
    }

    #[test]
    fn test_load_and_validate() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "data.csv",
            "tenure_months, monthly_charges,total_charges,contract_type,churn\n\
             12,65.5,786,Month-to-month,1\n\
             48,30.0,1440,Two year,0\n",
        );

        let table = load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.has_column("monthly_charges"));
        let schema = RecordSchema::customer();
        assert!(validate(&table, &schema, &["churn"]).is_ok());

        let err = validate(&table, &schema, &["gender", "region"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("gender") && msg.contains("region"));
    }

    #[test]
    fn test_validate_empty_table() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.csv", "tenure_months,churn\n");
        let table = load(&path).unwrap();
        assert!(matches!(
            validate(&table, &RecordSchema::customer(), &[]),
            Err(ChurnError::Validation(_))
        ));
    }

    #[test]
    fn test_labeled_records_reports_bad_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "data.csv",
            "tenure_months,monthly_charges,total_charges,contract_type,churn\n\
             12,65.5,786,Month-to-month,yes\n\
             abc,30.0,1440,Two year,0\n\
             3,30.0,90,One year,maybe\n",
        );
        let table = load(&path).unwrap();
        let err = table
            .labeled_records(&RecordSchema::customer(), "churn")
            .unwrap_err()
            .to_string();
        assert!(err.contains("2 invalid rows"));
        assert!(err.contains("row 2: tenure_months"));
        assert!(err.contains("row 3: churn"));
    }

    #[test]
    fn test_write_then_load_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sample.csv");
        let records = generate_sample_data(25, 3);

        write_csv(&path, &records).unwrap();
        let table = load(&path).unwrap();
        let parsed = table
            .labeled_records(&RecordSchema::customer(), "churn")
            .unwrap();

        assert_eq!(parsed, records);
    }

    #[test]
    fn test_validate_accepts_alias_headers() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "data.csv",
            "customer_id,tenure,monthly_charges,total_charges,contract,churn\n\
             C-1,12,65.5,786,Month-to-month,1\n",
        );
        let table = load(&path).unwrap();
        assert!(validate(&table, &RecordSchema::customer(), &["churn"]).is_ok());

        let path = write_file(&dir, "short.csv", "tenure,monthly_charges,churn\n1,20,0\n");
        let err = validate(&load(&path).unwrap(), &RecordSchema::customer(), &["churn"])
            .unwrap_err()
            .to_string();
        assert!(err.contains("total_charges, contract_type"));
        assert!(!err.contains("tenure_months"));
    }

    #[test]
    fn test_impute_missing_fills_median_and_mode() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "gaps.csv",
            "customer_id,tenure,monthly_charges,total_charges,contract_type,churn\n\
             ,1,20,20,One year,0\n\
             C-2,,30,,Two year,1\n\
             C-3,10,40,400,Two year,0\n\
             C-4,4,50,200,,1\n",
        );
        let mut table = load(&path).unwrap();
        let schema = RecordSchema::customer();
        assert!(table.labeled_records(&schema, "churn").is_err());

        assert_eq!(table.impute_missing(&schema), 3);
        assert_eq!(table.rows[1][1], "4");
        assert_eq!(table.rows[1][3], "200");
        assert_eq!(table.rows[3][4], "Two year");
        assert_eq!(table.rows[0][0], "");

        let records = table.labeled_records(&schema, "churn").unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[1].record.tenure_months, 4.0);
    }

    #[test]
    fn test_load_train_test() {
        let dir = TempDir::new().unwrap();
        let header = "tenure_months,monthly_charges,total_charges,contract_type,churn\n";
        write_file(&dir, "train.csv", &format!("{}1,20,20,One year,0\n", header));
        write_file(&dir, "test.csv", &format!("{}2,20,40,One year,1\n", header));

        let (train, test) = load_train_test(dir.path(), "train.csv", "test.csv").unwrap();
        assert_eq!(train.len(), 1);
        assert_eq!(test.rows[0][0], "2");
    }
}

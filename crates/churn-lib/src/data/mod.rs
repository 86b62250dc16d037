//! Data loading, schema validation, splitting and synthetic samples

pub mod loader;
pub mod sample;
pub mod schema;
pub mod split;

pub use loader::{load, load_train_test, validate, write_csv, Table};
pub use sample::{churn_risk, generate_sample_data};
pub use schema::{FieldKind, FieldSpec, RecordSchema};
pub use split::{stratified_folds, stratified_split, Split};

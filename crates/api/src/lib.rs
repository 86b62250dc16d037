//! HTTP serving layer for the churn prediction service

pub mod api;

pub use api::{create_router, serve, AppState, RequestId, REQUEST_ID_HEADER};

//! On-disk model artifact
//!
//! Layout:
//!
//! ```text
//! CHURN-ARTIFACT\n
//! {"format_version":1,"metadata":{..},"params_len":N,"params_sha256":".."}\n
//! <N bytes of JSON-encoded fitted parameters>
//! ```
//!
//! The header is readable without touching the parameter blob; the blob is
//! verified against its length and SHA-256 before it is decoded.

use super::metrics::EvaluationMetrics;
use super::{Hyperparameters, ModelType};
use crate::error::{ChurnError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MAGIC: &str = "CHURN-ARTIFACT";
pub const FORMAT_VERSION: u32 = 1;

/// Everything about a fitted model except its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model_type: ModelType,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub hyperparameters: Hyperparameters,
    pub decision_threshold: f64,
    #[serde(default)]
    pub metrics: Option<EvaluationMetrics>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    format_version: u32,
    metadata: ArtifactMetadata,
    params_len: usize,
    params_sha256: String,
}

pub fn encode(metadata: &ArtifactMetadata, params: &[u8]) -> Result<Vec<u8>> {
    let header = Header {
        format_version: FORMAT_VERSION,
        metadata: metadata.clone(),
        params_len: params.len(),
        params_sha256: checksum(params),
    };

    let mut out = Vec::with_capacity(params.len() + 512);
    out.extend_from_slice(MAGIC.as_bytes());
    out.push(b'\n');
    serde_json::to_writer(&mut out, &header)?;
    out.push(b'\n');
    out.extend_from_slice(params);
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<(ArtifactMetadata, Vec<u8>)> {
    let (magic, rest) = split_line(bytes)
        .ok_or_else(|| ChurnError::CorruptArtifact("missing magic line".to_string()))?;
    if magic != MAGIC.as_bytes() {
        return Err(ChurnError::CorruptArtifact("bad magic".to_string()));
    }

    let (header_line, params) = split_line(rest)
        .ok_or_else(|| ChurnError::CorruptArtifact("missing header line".to_string()))?;
    let raw: serde_json::Value = serde_json::from_slice(header_line)
        .map_err(|e| ChurnError::CorruptArtifact(format!("unreadable header: {}", e)))?;

    // Check the version before the rest of the header, whose shape may differ
    let found = raw
        .get("format_version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ChurnError::CorruptArtifact("header lacks format_version".to_string()))?;
    if found != u64::from(FORMAT_VERSION) {
        return Err(ChurnError::IncompatibleArtifact {
            found: u32::try_from(found).unwrap_or(u32::MAX),
            expected: FORMAT_VERSION,
        });
    }

    let header: Header = serde_json::from_value(raw)
        .map_err(|e| ChurnError::CorruptArtifact(format!("invalid header: {}", e)))?;

    if params.len() != header.params_len {
        return Err(ChurnError::CorruptArtifact(format!(
            "parameter blob is {} bytes, header says {}",
            params.len(),
            header.params_len
        )));
    }
    if checksum(params) != header.params_sha256 {
        return Err(ChurnError::CorruptArtifact(
            "parameter checksum mismatch".to_string(),
        ));
    }

    Ok((header.metadata, params.to_vec()))
}

/// Write through a temp file, fsync, then rename into place
pub fn write(path: &Path, metadata: &ArtifactMetadata, params: &[u8]) -> Result<()> {
    let bytes = encode(metadata, params)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path(path);
    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote model artifact");
    Ok(())
}

pub fn read(path: &Path) -> Result<(ArtifactMetadata, Vec<u8>)> {
    if !path.exists() {
        return Err(ChurnError::NotFound {
            path: path.to_path_buf(),
        });
    }
    decode(&fs::read(path)?)
}

/// Sibling of `path` with `.tmp` appended to the full file name
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn split_line(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = bytes.iter().position(|&b| b == b'\n')?;
    Some((&bytes[..pos], &bytes[pos + 1..]))
}

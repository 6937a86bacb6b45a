use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const ID_PREFIX: &str = "doc_";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("document id must not be empty")]
    EmptyId,
    #[error("document id must not contain whitespace: {0:?}")]
    InvalidId(String),
}

/// Join key between the binary and metadata regions of the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn generate() -> Self {
        Self(format!("{ID_PREFIX}{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn parse(raw: impl Into<String>) -> Result<Self, ModelError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ModelError::EmptyId);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(ModelError::InvalidId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-document record kept next to the stored bytes.
///
/// `last_page` is 1-based and the only field that changes after upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub id: DocumentId,
    pub name: String,
    pub size_label: String,
    pub last_page: u32,
    pub created_at: i64,
}

impl DocumentMetadata {
    pub fn new(id: DocumentId, name: impl Into<String>, byte_len: u64) -> Self {
        Self {
            id,
            name: name.into(),
            size_label: size_label(byte_len),
            last_page: 1,
            created_at: now_millis(),
        }
    }
}

/// Human-readable size in megabytes, two decimals.
pub fn size_label(byte_len: u64) -> String {
    format!("{:.2} MB", byte_len as f64 / 1024.0 / 1024.0)
}

/// Clamps a 1-based page number into `[1, page_count]`.
///
/// A document always has at least one page, so `page_count == 0` clamps to 1.
pub fn clamp_page(page: i64, page_count: u32) -> u32 {
    let upper = i64::from(page_count.max(1));
    page.clamp(1, upper) as u32
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

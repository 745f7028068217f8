//! Request and response payloads.
//!
//! Block uploads are multipart and carry raw bytes next to the text fields
//! below; merge and exist use plain `key=value` pairs.

use serde::{Deserialize, Serialize};

use crate::constants::{FIELD_BLOCK, FIELD_DIGEST, FIELD_SUFFIX};

/// Text fields of a block upload. The `file` part is attached separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFields {
    pub md5: String,
    pub block: usize,
}

impl BlockFields {
    /// Returns the fields as ordered `(name, value)` pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_DIGEST.to_string(), self.md5.clone()),
            (FIELD_BLOCK.to_string(), self.block.to_string()),
        ]
    }
}

/// Url-encoded body of the merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub md5: String,
    pub suffix: String,
}

impl MergeRequest {
    /// Returns the form as ordered `(name, value)` pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_DIGEST.to_string(), self.md5.clone()),
            (FIELD_SUFFIX.to_string(), self.suffix.clone()),
        ]
    }
}

/// Query string of the exist check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistQuery {
    pub md5: String,
    pub suffix: String,
}

impl ExistQuery {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_DIGEST.to_string(), self.md5.clone()),
            (FIELD_SUFFIX.to_string(), self.suffix.clone()),
        ]
    }
}

/// Body returned by the exist endpoint.
///
/// The server spells the key `ieExist`; `isExist` is accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistResponse {
    #[serde(rename = "ieExist", alias = "isExist")]
    pub exists: bool,
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Delimiter giữa location và metadata trong một representation string.
pub const METADATA_DELIMITER: &str = "//";

/// One located copy of a catalog item: `location[//metadata_json]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Representation {
    /// Path relative to the target root.
    pub location: String,
    pub metadata: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub item_id: String,
    pub representations: Vec<Representation>,
}

impl CatalogEntry {
    /// Only the first representation is ever transferred.
    pub fn primary(&self) -> Option<&Representation> {
        self.representations.first()
    }
}

/// One completed transfer, one line in the progress log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub local_path: String,
    pub catalog_index: usize,
    #[serde(default)]
    pub destination_album_id: Option<String>,
    pub destination_item_id: String,
    #[serde(default)]
    pub caption: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,

    /// RFC 3339, UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Where the next scan starts, plus the album carried over from the last record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResumePosition {
    pub index: usize,
    pub destination_album_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NextUploadDescriptor {
    pub local_path: String,
    pub catalog_index: usize,
    pub content_type: String,
    pub size_bytes: u64,
    pub metadata: Option<Value>,
    pub destination_album_id: Option<String>,
    pub destination_item_id: Option<String>,
    pub caption: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NextUpload {
    Ready(NextUploadDescriptor),
    Exhausted,
}

impl NextUpload {
    pub const NO_MORE_ITEMS: &'static str = "no more items";

    /// JSON shape served to the transport layer.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            NextUpload::Ready(d) => serde_json::to_value(d),
            NextUpload::Exhausted => Ok(serde_json::json!({ "message": Self::NO_MORE_ITEMS })),
        }
    }
}

/// Identifiers assigned by the uploader on success.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationIds {
    pub destination_album_id: Option<String>,
    pub destination_item_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileStamp {
    pub path: PathBuf,
    pub size: u64,

    /// mtime theo milliseconds
    pub mtime_unix_ms: i64,

    /// hash nhanh để detect đổi nội dung
    pub quick_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub catalog_len: usize,
    pub records: usize,
    pub last_index: Option<usize>,
    pub resume_index: usize,
    pub destination_album_id: Option<String>,
    pub remaining_eligible: usize,
}

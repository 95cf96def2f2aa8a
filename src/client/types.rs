//! Wire types for the modeling API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A model as returned by the models listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawModel {
    pub name: String,
    pub project_name: String,
    #[serde(default)]
    pub explores: Vec<RawExplore>,
}

/// An explore stub nested inside a model listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExplore {
    pub name: String,
}

/// A field (dimension) descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawField {
    /// Fully-qualified `view.field` name.
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub sql: String,
    /// Source-location link, relative to the instance base URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// Handle returned when a query is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHandle {
    pub id: i64,
    #[serde(default)]
    pub share_url: Option<String>,
}

/// Handle for an asynchronous query task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
}

/// Remote status of a query task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Complete,
    Error,
    Running,
    Added,
    Expired,
    /// Any status string outside the documented set.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Terminal statuses stop polling; the rest are retried next tick.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Unknown)
    }
}

/// One entry in a multi-status poll response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTaskResult {
    pub status: TaskStatus,
    /// Heterogeneous result payload; shape varies between success and the
    /// several error forms. Classified by the extraction contract.
    #[serde(default)]
    pub data: Option<Value>,
}

/// One piece of content (dashboard/look) that failed to resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContentError {
    pub model: String,
    pub explore: String,
    pub message: String,
    /// "dashboard" or "look".
    pub content_type: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub field_name: Option<String>,
}

/// A declared data test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataTest {
    pub name: String,
    pub model_name: String,
    pub explore_name: String,
}

/// Result of running one data test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataTestResult {
    pub test_name: String,
    pub model_name: String,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<RawDataTestError>,
}

/// One assertion failure inside a data test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataTestError {
    pub message: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_number: Option<u64>,
}

/// Response of the remote model compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCompileValidation {
    #[serde(default)]
    pub errors: Vec<RawCompileError>,
}

/// One compile diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCompileError {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub explore: Option<String>,
    #[serde(default)]
    pub field_name: Option<String>,
    pub message: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_number: Option<u64>,
}

/// Project manifest: declared dependencies on other projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawManifest {
    #[serde(default)]
    pub imports: Vec<RawManifestImport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawManifestImport {
    pub name: String,
}

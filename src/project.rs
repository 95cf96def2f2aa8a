//! Resource model: the project → model → explore → field tree, plus the
//! normalized error record and the error-payload extraction contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Validation status of an explore.
///
/// Transitions are monotonic: `Pending → Queued → Running → {Passed, Failed,
/// Error}`, with `Skipped` reachable directly from `Pending` when the
/// selector excludes the explore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExploreStatus {
    Pending,
    Queued,
    Running,
    Passed,
    Failed,
    Error,
    Skipped,
}

impl ExploreStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Passed | Self::Failed | Self::Error | Self::Skipped
        )
    }
}

impl std::fmt::Display for ExploreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// A dimension of an explore. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Fully-qualified `view.field` name.
    pub name: String,
    pub field_type: String,
    /// SQL expression template.
    pub sql: String,
    /// Absolute source-location link for diagnostics.
    pub url: Option<String>,
}

/// A queryable view within a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explore {
    pub name: String,
    pub fields: Vec<Field>,
    pub status: ExploreStatus,
    pub errors: Vec<ErrorDetail>,
}

impl Explore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            status: ExploreStatus::Pending,
            errors: Vec::new(),
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// A model: a named group of explores belonging to one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub project_name: String,
    pub explores: Vec<Explore>,
}

/// Root of the resource tree. Built once per invocation, read-only afterward
/// except for explore status/errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub models: Vec<Model>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            models: Vec::new(),
        }
    }

    pub fn explore_count(&self) -> usize {
        self.models.iter().map(|m| m.explores.len()).sum()
    }

    pub fn field_count(&self) -> usize {
        self.models
            .iter()
            .flat_map(|m| &m.explores)
            .map(|e| e.fields.len())
            .sum()
    }

    pub fn get_explore_mut(&mut self, model: &str, explore: &str) -> Option<&mut Explore> {
        self.models
            .iter_mut()
            .find(|m| m.name == model)?
            .explores
            .iter_mut()
            .find(|e| e.name == explore)
    }
}

/// Normalized error record extracted from heterogeneous API error payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub model: String,
    pub explore: String,
    /// Isolated failing field, when the error is attributable to one.
    pub field: Option<String>,
    pub message: String,
    pub sql: Option<String>,
    /// Raw error entry as returned by the API, for diagnostics.
    pub metadata: Value,
    pub file_path: Option<String>,
    pub line_number: Option<u64>,
    pub severity: Option<String>,
    /// Source-location link for the offending field, when known.
    pub url: Option<String>,
}

impl ErrorDetail {
    pub fn new(
        model: impl Into<String>,
        explore: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            explore: explore.into(),
            field: None,
            message: message.into(),
            sql: None,
            metadata: Value::Null,
            file_path: None,
            line_number: None,
            severity: None,
            url: None,
        }
    }
}

/// Recognized shapes of a query-task error payload.
///
/// The API returns either a mapping carrying an `errors` list (or a single
/// `error` object) and the offending `sql`, or a bare sequence whose first
/// element is the message. Anything else is an extraction-class failure.
#[derive(Debug)]
pub enum ErrorPayload<'a> {
    Mapping(&'a Map<String, Value>),
    Sequence(&'a [Value]),
}

impl<'a> ErrorPayload<'a> {
    /// Classify a raw payload, rejecting unrecognized container shapes.
    pub fn classify(data: &'a Value) -> Result<Self> {
        match data {
            Value::Object(map) => Ok(Self::Mapping(map)),
            Value::Array(items) => Ok(Self::Sequence(items)),
            other => Err(Error::extraction(format!(
                "expected an error mapping or sequence, got: {other}"
            ))),
        }
    }
}

/// Extracted `(message, sql, line_number, metadata)` from an error payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedError {
    pub message: String,
    pub sql: Option<String>,
    pub line_number: Option<u64>,
    pub metadata: Value,
}

/// Apply the error-extraction contract to a query-task error payload.
///
/// For mapping payloads the first entry of `errors` (or the single `error`
/// object) supplies the message, optionally suffixed with `message_details`;
/// a `message_details` of any non-string type is an extraction failure, never
/// coerced.
pub fn extract_error_details(data: &Value) -> Result<ExtractedError> {
    match ErrorPayload::classify(data)? {
        ErrorPayload::Mapping(map) => {
            let first = map
                .get("errors")
                .and_then(Value::as_array)
                .and_then(|errors| errors.first())
                .or_else(|| map.get("error"))
                .ok_or_else(|| {
                    Error::extraction("error payload has neither 'errors' nor 'error'")
                })?;
            let entry = first.as_object().ok_or_else(|| {
                Error::extraction(format!("error entry is not a mapping: {first}"))
            })?;

            let message = entry
                .get("message")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::extraction("error entry has no string 'message'"))?;
            let message = match entry.get("message_details") {
                None | Some(Value::Null) => message.to_string(),
                // An empty details string adds no suffix (and no trailing
                // space).
                Some(Value::String(details)) if details.is_empty() => message.to_string(),
                Some(Value::String(details)) => format!("{message} {details}"),
                Some(other) => {
                    return Err(Error::extraction(format!(
                        "message_details is not a string: {other}"
                    )))
                }
            };

            let sql = map.get("sql").and_then(Value::as_str).map(str::to_string);
            let line_number = entry
                .get("sql_error_loc")
                .and_then(|loc| loc.get("line"))
                .and_then(Value::as_u64);

            Ok(ExtractedError {
                message,
                sql,
                line_number,
                metadata: first.clone(),
            })
        }
        ErrorPayload::Sequence(items) => {
            let first = items
                .first()
                .ok_or_else(|| Error::extraction("error sequence is empty"))?;
            let message = first
                .as_str()
                .ok_or_else(|| {
                    Error::extraction(format!("error sequence entry is not a string: {first}"))
                })?
                .to_string();
            Ok(ExtractedError {
                message,
                sql: None,
                line_number: None,
                metadata: first.clone(),
            })
        }
    }
}

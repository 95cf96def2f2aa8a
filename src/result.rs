//! Result aggregation: per-explore records merged into one validation report.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::project::{ErrorDetail, ExploreStatus};

/// The validator kind that produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Sql,
    Content,
    DataTest,
    Compile,
}

impl std::fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sql => "sql",
            Self::Content => "content",
            Self::DataTest => "data_test",
            Self::Compile => "compile",
        };
        write!(f, "{s}")
    }
}

/// Overall status of one validation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Passed,
    Failed,
}

/// One `(model, explore, status)` entry in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestedExplore {
    pub model: String,
    pub explore: String,
    pub status: ExploreStatus,
}

/// Per-validator-kind report handed to the reporting layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validator: ValidatorKind,
    pub status: OverallStatus,
    /// Canonical (model, explore) order.
    pub tested: Vec<TestedExplore>,
    pub errors: Vec<ErrorDetail>,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.status == OverallStatus::Passed
    }
}

/// Append-only collector of per-explore outcomes.
///
/// Records arrive in completion order; `finish` re-sorts them into canonical
/// (model, explore) order. A later record for an already-recorded pair is
/// dropped with a warning, never merged.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    records: Vec<TestedExplore>,
    errors: Vec<ErrorDetail>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        model: impl Into<String>,
        explore: impl Into<String>,
        status: ExploreStatus,
        errors: Vec<ErrorDetail>,
    ) {
        let model = model.into();
        let explore = explore.into();
        if self
            .records
            .iter()
            .any(|r| r.model == model && r.explore == explore)
        {
            warn!(%model, %explore, "duplicate record for explore, keeping the first");
            return;
        }
        self.records.push(TestedExplore {
            model,
            explore,
            status,
        });
        self.errors.extend(errors);
    }

    /// Record errors not attributable to a tested explore (e.g. project-level
    /// compile diagnostics).
    pub fn record_errors(&mut self, errors: Vec<ErrorDetail>) {
        self.errors.extend(errors);
    }

    /// Build the final report, re-sorted into canonical order.
    pub fn finish(mut self, validator: ValidatorKind) -> ValidationResult {
        self.records
            .sort_by(|a, b| (&a.model, &a.explore).cmp(&(&b.model, &b.explore)));
        self.errors.sort_by(|a, b| {
            (&a.model, &a.explore, &a.field).cmp(&(&b.model, &b.explore, &b.field))
        });
        let failed = self.records.iter().any(|r| {
            matches!(r.status, ExploreStatus::Failed | ExploreStatus::Error)
        }) || !self.errors.is_empty();
        ValidationResult {
            validator,
            status: if failed {
                OverallStatus::Failed
            } else {
                OverallStatus::Passed
            },
            tested: self.records,
            errors: self.errors,
        }
    }
}

//! Model-compile validator: pure delegation to the remote compiler.

use std::sync::Arc;

use tracing::{info, warn};

use crate::client::ApiClient;
use crate::error::Result;
use crate::project::{ErrorDetail, ExploreStatus, Project};
use crate::result::{ResultAggregator, ValidationResult, ValidatorKind};

/// Asks the remote service to compile the project's model definitions and
/// maps its diagnostics back onto the resource tree.
pub struct CompileValidator<C: ApiClient + ?Sized> {
    client: Arc<C>,
}

impl<C: ApiClient + ?Sized> CompileValidator<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub async fn validate(&self, project: &mut Project) -> Result<ValidationResult> {
        info!(project = %project.name, "running compile validation");
        let compiled = self.client.compile_validation(&project.name).await?;

        let details: Vec<ErrorDetail> = compiled
            .errors
            .iter()
            .map(|raw| {
                let mut detail = ErrorDetail::new(
                    raw.model_id.clone().unwrap_or_default(),
                    raw.explore.clone().unwrap_or_default(),
                    &raw.message,
                );
                detail.field = raw.field_name.clone();
                detail.severity = raw.severity.clone();
                detail.file_path = raw.file_path.clone();
                detail.line_number = raw.line_number;
                detail.url = raw.file_path.as_ref().map(|path| {
                    let mut url = format!(
                        "{}/projects/{}/files/{path}",
                        self.client.base_url(),
                        project.name
                    );
                    if let Some(line) = raw.line_number {
                        url.push_str(&format!("?line={line}"));
                    }
                    url
                });
                detail
            })
            .collect();

        let mut aggregator = ResultAggregator::new();
        for model in &mut project.models {
            for explore in &mut model.explores {
                if explore.status == ExploreStatus::Skipped {
                    let suppressed = details
                        .iter()
                        .filter(|d| d.model == model.name && d.explore == explore.name)
                        .count();
                    if suppressed > 0 {
                        warn!(
                            model = %model.name,
                            explore = %explore.name,
                            count = suppressed,
                            "compile diagnostics suppressed for selector-skipped explore"
                        );
                    }
                    aggregator.record(
                        &model.name,
                        &explore.name,
                        ExploreStatus::Skipped,
                        Vec::new(),
                    );
                    continue;
                }
                let errors: Vec<ErrorDetail> = details
                    .iter()
                    .filter(|d| d.model == model.name && d.explore == explore.name)
                    .cloned()
                    .collect();
                let status = if errors.is_empty() {
                    ExploreStatus::Passed
                } else {
                    ExploreStatus::Failed
                };
                explore.status = status;
                explore.errors = errors.clone();
                aggregator.record(&model.name, &explore.name, status, errors);
            }
        }
        // Diagnostics that don't name an explore in the tree (model- or
        // project-level) still belong in the report.
        let orphaned: Vec<ErrorDetail> = details
            .iter()
            .filter(|d| {
                !project.models.iter().any(|m| {
                    m.name == d.model && m.explores.iter().any(|e| e.name == d.explore)
                })
            })
            .cloned()
            .collect();
        aggregator.record_errors(orphaned);

        Ok(aggregator.finish(ValidatorKind::Compile))
    }
}

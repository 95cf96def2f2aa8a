//! Content validator: checks that dashboards and looks referencing the
//! project's explores still resolve.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::error::Result;
use crate::project::{ErrorDetail, ExploreStatus, Project};
use crate::result::{ResultAggregator, ValidationResult, ValidatorKind};

/// Validates dependent content against the project's explores. Content items
/// are independent units; there is nothing to decompose on failure.
pub struct ContentValidator<C: ApiClient + ?Sized> {
    client: Arc<C>,
}

impl<C: ApiClient + ?Sized> ContentValidator<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub async fn validate(&self, project: &mut Project) -> Result<ValidationResult> {
        info!(project = %project.name, "running content validation");
        let content_errors = self.client.content_validation().await?;

        let mut aggregator = ResultAggregator::new();
        for model in &mut project.models {
            for explore in &mut model.explores {
                if explore.status == ExploreStatus::Skipped {
                    let suppressed = content_errors
                        .iter()
                        .filter(|c| c.model == model.name && c.explore == explore.name)
                        .count();
                    if suppressed > 0 {
                        warn!(
                            model = %model.name,
                            explore = %explore.name,
                            count = suppressed,
                            "content errors suppressed for selector-skipped explore"
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
                let errors: Vec<ErrorDetail> = content_errors
                    .iter()
                    .filter(|c| c.model == model.name && c.explore == explore.name)
                    .map(|c| {
                        let mut detail =
                            ErrorDetail::new(&model.name, &explore.name, &c.message);
                        detail.field = c.field_name.clone();
                        detail.url = c.url.clone();
                        detail.metadata = json!({
                            "content_type": c.content_type,
                            "title": c.title,
                        });
                        detail
                    })
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
        Ok(aggregator.finish(ValidatorKind::Content))
    }
}

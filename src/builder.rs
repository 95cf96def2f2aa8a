//! Project builder: assembles the resource tree from the API.

use tracing::{debug, info};

use crate::client::ApiClient;
use crate::error::Result;
use crate::project::{Explore, ExploreStatus, Field, Model, Project};
use crate::select::Selector;

/// Fetch all models of a project and the fields of every explore the
/// selector admits. Excluded explores are kept in the tree with status
/// `Skipped` and no fields, and trigger no further API calls.
pub async fn build_project<C: ApiClient + ?Sized>(
    client: &C,
    project_name: &str,
    selector: &Selector,
) -> Result<Project> {
    info!(project = project_name, "building project resource tree");
    let mut project = Project::new(project_name);

    let raw_models = client.get_models().await?;
    for raw_model in raw_models {
        if raw_model.project_name != project_name {
            continue;
        }
        let mut model = Model {
            name: raw_model.name.clone(),
            project_name: raw_model.project_name.clone(),
            explores: Vec::new(),
        };
        for raw_explore in &raw_model.explores {
            let mut explore = Explore::new(&raw_explore.name);
            if !selector.matches(&model.name, &explore.name) {
                debug!(
                    model = %model.name,
                    explore = %explore.name,
                    "excluded by selector, skipping"
                );
                explore.status = ExploreStatus::Skipped;
                model.explores.push(explore);
                continue;
            }
            let raw_fields = client.get_fields(&model.name, &explore.name).await?;
            explore.fields = raw_fields
                .into_iter()
                .map(|raw| Field {
                    name: raw.name,
                    field_type: raw.field_type,
                    sql: raw.sql,
                    url: raw
                        .url
                        .map(|u| format!("{}{u}", client.base_url())),
                })
                .collect();
            model.explores.push(explore);
        }
        project.models.push(model);
    }

    info!(
        models = project.models.len(),
        explores = project.explore_count(),
        fields = project.field_count(),
        "project tree built"
    );
    Ok(project)
}

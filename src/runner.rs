//! Invocation orchestration: branch management around a validation run and
//! invocation tracking through the injected port.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::builder::build_project;
use crate::client::ApiClient;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::pool::CancelToken;
use crate::result::ValidationResult;
use crate::select::Selector;
use crate::tracking::{Invocation, InvocationTracker};
use crate::validators::{CompileValidator, ContentValidator, DataTestValidator, SqlValidator};

/// A dependent project temporarily pinned to a scratch branch.
struct PinnedDependency {
    project: String,
    original_branch: String,
    temp_branch: String,
}

/// Runs validators against one project on one branch.
pub struct Runner<C: ApiClient + ?Sized + 'static, T: InvocationTracker> {
    client: Arc<C>,
    project: String,
    branch: String,
    config: EngineConfig,
    tracker: T,
    /// Pin manifest-dependent projects to scratch branches for the run.
    manifest_dependencies: bool,
}

impl<C: ApiClient + ?Sized + 'static, T: InvocationTracker> Runner<C, T> {
    pub fn new(
        client: Arc<C>,
        project: impl Into<String>,
        branch: impl Into<String>,
        config: EngineConfig,
        tracker: T,
    ) -> Self {
        Self {
            client,
            project: project.into(),
            branch: branch.into(),
            config,
            tracker,
            manifest_dependencies: false,
        }
    }

    pub fn with_manifest_dependencies(mut self, enabled: bool) -> Self {
        self.manifest_dependencies = enabled;
        self
    }

    /// Authenticate and check out the branch under validation.
    pub async fn prepare(&self) -> Result<()> {
        self.client.authenticate().await?;
        self.client.update_workspace("dev").await?;
        self.client.update_branch(&self.project, &self.branch).await?;
        info!(project = %self.project, branch = %self.branch, "branch checked out");
        Ok(())
    }

    pub async fn validate_sql(
        &self,
        selectors: &[String],
        cancel: &CancelToken,
    ) -> Result<ValidationResult> {
        let invocation = self.start("sql");
        let result = self.validate_sql_inner(selectors, cancel).await;
        self.end(&invocation, &result);
        result
    }

    pub async fn validate_content(
        &self,
        selectors: &[String],
    ) -> Result<ValidationResult> {
        let invocation = self.start("content");
        let result = self.validate_content_inner(selectors).await;
        self.end(&invocation, &result);
        result
    }

    pub async fn validate_data_tests(
        &self,
        selectors: &[String],
    ) -> Result<ValidationResult> {
        let invocation = self.start("data_test");
        let result = self.validate_data_tests_inner(selectors).await;
        self.end(&invocation, &result);
        result
    }

    pub async fn validate_compile(
        &self,
        selectors: &[String],
    ) -> Result<ValidationResult> {
        let invocation = self.start("compile");
        let result = self.validate_compile_inner(selectors).await;
        self.end(&invocation, &result);
        result
    }

    fn start(&self, command: &str) -> Invocation {
        let invocation = Invocation::new(command, self.client.base_url(), &self.project);
        self.tracker.invocation_started(&invocation);
        invocation
    }

    /// Emit the end event on every path, success or error.
    fn end(&self, invocation: &Invocation, result: &Result<ValidationResult>) {
        let passed = matches!(result, Ok(r) if r.passed());
        self.tracker.invocation_ended(invocation, passed);
    }

    async fn validate_sql_inner(
        &self,
        selectors: &[String],
        cancel: &CancelToken,
    ) -> Result<ValidationResult> {
        let selector = Selector::compile(selectors)?;
        let pinned = self.pin_dependencies().await?;
        let result = async {
            let mut project =
                build_project(self.client.as_ref(), &self.project, &selector).await?;
            SqlValidator::new(Arc::clone(&self.client), self.config.clone())
                .validate(&mut project, cancel)
                .await
        }
        .await;
        self.unpin_dependencies(pinned).await;
        result
    }

    async fn validate_content_inner(&self, selectors: &[String]) -> Result<ValidationResult> {
        let selector = Selector::compile(selectors)?;
        let pinned = self.pin_dependencies().await?;
        let result = async {
            let mut project =
                build_project(self.client.as_ref(), &self.project, &selector).await?;
            ContentValidator::new(Arc::clone(&self.client))
                .validate(&mut project)
                .await
        }
        .await;
        self.unpin_dependencies(pinned).await;
        result
    }

    async fn validate_data_tests_inner(&self, selectors: &[String]) -> Result<ValidationResult> {
        let selector = Selector::compile(selectors)?;
        DataTestValidator::new(Arc::clone(&self.client), &self.project)
            .validate(&selector)
            .await
    }

    async fn validate_compile_inner(&self, selectors: &[String]) -> Result<ValidationResult> {
        let selector = Selector::compile(selectors)?;
        let mut project =
            build_project(self.client.as_ref(), &self.project, &selector).await?;
        CompileValidator::new(Arc::clone(&self.client))
            .validate(&mut project)
            .await
    }

    /// Create scratch branches on every project this one imports, so their
    /// state can't shift under the run.
    async fn pin_dependencies(&self) -> Result<Vec<PinnedDependency>> {
        if !self.manifest_dependencies {
            return Ok(Vec::new());
        }
        let manifest = self.client.get_manifest(&self.project).await?;
        let mut pinned = Vec::with_capacity(manifest.imports.len());
        for import in manifest.imports {
            let original_branch = self.client.get_active_branch(&import.name).await?;
            let temp_branch = format!(
                "tmp_spyglass_{}",
                &Uuid::new_v4().simple().to_string()[..8]
            );
            self.client.create_branch(&import.name, &temp_branch).await?;
            info!(
                project = %import.name,
                branch = %temp_branch,
                "pinned dependent project"
            );
            pinned.push(PinnedDependency {
                project: import.name,
                original_branch,
                temp_branch,
            });
        }
        Ok(pinned)
    }

    /// Restore dependent projects. Cleanup failures are logged, not raised,
    /// so they can't mask a validation result.
    async fn unpin_dependencies(&self, pinned: Vec<PinnedDependency>) {
        for dep in pinned {
            if let Err(err) = self
                .client
                .update_branch(&dep.project, &dep.original_branch)
                .await
            {
                warn!(project = %dep.project, error = %err, "failed to restore branch");
            }
            if let Err(err) = self
                .client
                .delete_branch(&dep.project, &dep.temp_branch)
                .await
            {
                warn!(project = %dep.project, error = %err, "failed to delete temp branch");
            }
        }
    }
}

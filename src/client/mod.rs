//! Modeling API gateway.
//!
//! The engine consumes the API through the [`ApiClient`] trait, one method
//! per remote operation. [`HttpClient`] is the reqwest-backed production
//! implementation; tests substitute a scripted client.

mod http;
mod types;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

pub use http::HttpClient;
pub use types::{
    QueryHandle, RawCompileError, RawCompileValidation, RawContentError, RawDataTest,
    RawDataTestError, RawDataTestResult, RawExplore, RawField, RawManifest, RawManifestImport,
    RawModel, RawTaskResult, TaskHandle, TaskStatus,
};

/// Authenticated access to the remote modeling service.
///
/// The session is stateless after authentication and safe to share across
/// concurrent tasks.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Acquire a session token. Must be called before any other operation.
    async fn authenticate(&self) -> Result<()>;

    /// Instance base URL, used to absolutize source-location links.
    fn base_url(&self) -> &str;

    /// List every model on the instance, with explore stubs.
    async fn get_models(&self) -> Result<Vec<RawModel>>;

    /// List the dimensions of one explore.
    async fn get_fields(&self, model: &str, explore: &str) -> Result<Vec<RawField>>;

    /// Create a query over a subset of an explore's fields. An empty field
    /// list is valid and queries zero fields.
    async fn create_query(
        &self,
        model: &str,
        explore: &str,
        fields: &[String],
    ) -> Result<QueryHandle>;

    /// Start asynchronous execution of a created query.
    async fn create_query_task(&self, query_id: i64) -> Result<TaskHandle>;

    /// Fetch the status of several query tasks in one round trip.
    async fn get_task_statuses(
        &self,
        task_ids: &[String],
    ) -> Result<HashMap<String, RawTaskResult>>;

    /// Ask the remote to stop a running query task. Best-effort; callers
    /// ignore failures.
    async fn cancel_task(&self, task_id: &str) -> Result<()>;

    /// Run an instance-wide content validation sweep.
    async fn content_validation(&self) -> Result<Vec<RawContentError>>;

    /// List the data tests declared in a project.
    async fn all_data_tests(&self, project: &str) -> Result<Vec<RawDataTest>>;

    /// Run a single data test.
    async fn run_data_test(
        &self,
        project: &str,
        model: &str,
        test: &str,
    ) -> Result<Vec<RawDataTestResult>>;

    /// Ask the remote compiler to validate the project's model definitions.
    async fn compile_validation(&self, project: &str) -> Result<RawCompileValidation>;

    /// Switch the API session workspace ("production" or "dev").
    async fn update_workspace(&self, workspace: &str) -> Result<()>;

    /// Name of the branch currently checked out for a project.
    async fn get_active_branch(&self, project: &str) -> Result<String>;

    /// Create a new branch from the current state of the project.
    async fn create_branch(&self, project: &str, branch: &str) -> Result<()>;

    /// Check out an existing branch.
    async fn update_branch(&self, project: &str, branch: &str) -> Result<()>;

    /// Delete a branch.
    async fn delete_branch(&self, project: &str, branch: &str) -> Result<()>;

    /// Fetch the project manifest (declared project dependencies).
    async fn get_manifest(&self, project: &str) -> Result<RawManifest>;
}

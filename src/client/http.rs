//! Reqwest-backed implementation of the modeling API gateway.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{Error, Result};

use super::types::{
    QueryHandle, RawCompileValidation, RawContentError, RawDataTest, RawDataTestResult,
    RawField, RawManifest, RawModel, RawTaskResult, TaskHandle,
};
use super::ApiClient;

/// HTTP transport for the modeling API, authenticated with a bearer token.
pub struct HttpClient {
    config: ApiConfig,
    http: Client,
    token: RwLock<Option<String>>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct CreateQueryRequest<'a> {
    model: &'a str,
    view: &'a str,
    fields: &'a [String],
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct ContentValidationResponse {
    #[serde(default)]
    content_with_errors: Vec<RawContentError>,
}

#[derive(Debug, Deserialize)]
struct ActiveBranchResponse {
    name: String,
}

impl HttpClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            http,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url(), path.trim_start_matches('/'))
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::api_connection("not authenticated"))?;
        Ok(self
            .http
            .request(method, self.url(path))
            .bearer_auth(token))
    }

    /// Surface non-success responses as connection-class errors, mining the
    /// body for a `message` detail when it is JSON.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response
            .text()
            .await
            .ok()
            .and_then(|body| serde_json::from_str::<serde_json::Value>(&body).ok())
            .and_then(|value| {
                value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(|m| m.trim().to_string())
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));
        Err(Error::api_status(status.as_u16(), detail))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path).await?.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl ApiClient for HttpClient {
    async fn authenticate(&self) -> Result<()> {
        debug!(base_url = %self.config.base_url, "authenticating");
        let response = self
            .http
            .post(self.url("login"))
            .form(&LoginRequest {
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
            })
            .send()
            .await?;
        let login: LoginResponse = Self::check(response).await?.json().await?;
        *self.token.write().await = Some(login.access_token);
        Ok(())
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn get_models(&self) -> Result<Vec<RawModel>> {
        self.get_json("lookml_models?fields=name,project_name,explores")
            .await
    }

    async fn get_fields(&self, model: &str, explore: &str) -> Result<Vec<RawField>> {
        #[derive(Debug, Deserialize)]
        struct ExploreBody {
            fields: ExploreFields,
        }
        #[derive(Debug, Deserialize)]
        struct ExploreFields {
            #[serde(default)]
            dimensions: Vec<RawField>,
        }
        let body: ExploreBody = self
            .get_json(&format!(
                "lookml_models/{model}/explores/{explore}?fields=fields(dimensions(name,type,sql,url))"
            ))
            .await?;
        Ok(body.fields.dimensions)
    }

    async fn create_query(
        &self,
        model: &str,
        explore: &str,
        fields: &[String],
    ) -> Result<QueryHandle> {
        let response = self
            .request(Method::POST, "queries?fields=id,share_url")
            .await?
            .json(&CreateQueryRequest {
                model,
                view: explore,
                fields,
                limit: 0,
            })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create_query_task(&self, query_id: i64) -> Result<TaskHandle> {
        let response = self
            .request(Method::POST, "query_tasks?fields=id&cache=false")
            .await?
            .json(&json!({
                "query_id": query_id,
                "result_format": "json_detail",
            }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get_task_statuses(
        &self,
        task_ids: &[String],
    ) -> Result<HashMap<String, RawTaskResult>> {
        let ids = task_ids.join(",");
        self.get_json(&format!(
            "query_tasks/multi_results?query_task_ids={ids}"
        ))
        .await
    }

    async fn cancel_task(&self, task_id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("running_queries/{task_id}"))
            .await?
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn content_validation(&self) -> Result<Vec<RawContentError>> {
        let body: ContentValidationResponse = self.get_json("content_validation").await?;
        Ok(body.content_with_errors)
    }

    async fn all_data_tests(&self, project: &str) -> Result<Vec<RawDataTest>> {
        self.get_json(&format!("lookml_tests?project_id={project}"))
            .await
    }

    async fn run_data_test(
        &self,
        project: &str,
        model: &str,
        test: &str,
    ) -> Result<Vec<RawDataTestResult>> {
        self.get_json(&format!(
            "lookml_tests/run?project_id={project}&model={model}&test={test}"
        ))
        .await
    }

    async fn compile_validation(&self, project: &str) -> Result<RawCompileValidation> {
        let response = self
            .request(Method::POST, &format!("projects/{project}/validate"))
            .await?
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn update_workspace(&self, workspace: &str) -> Result<()> {
        let response = self
            .request(Method::PATCH, "session")
            .await?
            .json(&json!({ "workspace_id": workspace }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_active_branch(&self, project: &str) -> Result<String> {
        let branch: ActiveBranchResponse = self
            .get_json(&format!("projects/{project}/git_branch"))
            .await?;
        Ok(branch.name)
    }

    async fn create_branch(&self, project: &str, branch: &str) -> Result<()> {
        let response = self
            .request(Method::POST, &format!("projects/{project}/git_branch"))
            .await?
            .json(&json!({ "name": branch }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update_branch(&self, project: &str, branch: &str) -> Result<()> {
        let response = self
            .request(Method::PUT, &format!("projects/{project}/git_branch"))
            .await?
            .json(&json!({ "name": branch }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_branch(&self, project: &str, branch: &str) -> Result<()> {
        let response = self
            .request(
                Method::DELETE,
                &format!("projects/{project}/git_branch/{branch}"),
            )
            .await?
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_manifest(&self, project: &str) -> Result<RawManifest> {
        self.get_json(&format!("projects/{project}/manifest")).await
    }
}

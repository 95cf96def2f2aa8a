//! Scripted in-memory [`ApiClient`] for tests.
//!
//! Fixtures are declared through [`MockClientBuilder`]; the client then
//! answers every trait method from those fixtures and records call counts
//! that tests assert on. A combined query errors whenever its field set
//! intersects the configured failing fields, which is what drives the
//! bisection tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{
    ApiClient, QueryHandle, RawCompileError, RawCompileValidation, RawContentError, RawDataTest,
    RawDataTestError, RawDataTestResult, RawExplore, RawField, RawManifest, RawManifestImport,
    RawModel, RawTaskResult, TaskHandle, TaskStatus,
};
use crate::error::{Error, Result};

const BASE_URL: &str = "https://mock.example.com";

#[derive(Default)]
struct Fixtures {
    models: Vec<RawModel>,
    fields: HashMap<(String, String), Vec<RawField>>,
    failing_fields: HashSet<String>,
    error_payload: Option<Value>,
    single_field_payloads: HashMap<String, Value>,
    never_terminal: bool,
    never_terminal_fields: HashSet<String>,
    fail_query_creation: bool,
    status_poll_failures: usize,
    data_tests: Vec<RawDataTest>,
    data_test_results: Vec<RawDataTestResult>,
    content_errors: Vec<RawContentError>,
    compile_errors: Vec<RawCompileError>,
    manifest_imports: Vec<String>,
}

/// How a created task behaves when polled, decided at creation time.
#[derive(Clone)]
struct TaskScript {
    culprits: Vec<String>,
    never_terminal: bool,
    payload: Option<Value>,
}

pub struct MockClient {
    fixtures: Fixtures,
    // query id -> field names queried
    queries: Mutex<HashMap<i64, Vec<String>>>,
    tasks: Mutex<HashMap<String, TaskScript>>,
    poll_failures_left: AtomicUsize,
    next_query_id: AtomicI64,
    next_task_id: AtomicUsize,
    field_fetches: AtomicUsize,
    query_tasks_created: AtomicUsize,
    data_tests_run: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancelled: Mutex<Vec<String>>,
    branch_log: Mutex<Vec<String>>,
    active_branches: Mutex<HashMap<String, String>>,
}

impl MockClient {
    pub fn builder() -> MockClientBuilder {
        MockClientBuilder {
            fixtures: Fixtures::default(),
        }
    }

    pub fn field_fetches(&self) -> usize {
        self.field_fetches.load(Ordering::SeqCst)
    }

    pub fn query_tasks_created(&self) -> usize {
        self.query_tasks_created.load(Ordering::SeqCst)
    }

    pub fn data_tests_run(&self) -> usize {
        self.data_tests_run.load(Ordering::SeqCst)
    }

    /// Highest number of query tasks that were outstanding at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn cancelled_tasks(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Branch operations in call order, as "op:project:branch".
    pub fn branch_log(&self) -> Vec<String> {
        self.branch_log.lock().unwrap().clone()
    }

    fn settle(&self, task_id: &str) {
        if self.tasks.lock().unwrap().remove(task_id).is_some() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ApiClient for MockClient {
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }

    async fn get_models(&self) -> Result<Vec<RawModel>> {
        Ok(self.fixtures.models.clone())
    }

    async fn get_fields(&self, model: &str, explore: &str) -> Result<Vec<RawField>> {
        self.field_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .fixtures
            .fields
            .get(&(model.to_string(), explore.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_query(
        &self,
        _model: &str,
        _explore: &str,
        fields: &[String],
    ) -> Result<QueryHandle> {
        if self.fixtures.fail_query_creation {
            return Err(Error::api_connection("connection refused"));
        }
        let id = self.next_query_id.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().insert(id, fields.to_vec());
        Ok(QueryHandle {
            id,
            share_url: None,
        })
    }

    async fn create_query_task(&self, query_id: i64) -> Result<TaskHandle> {
        let fields = self
            .queries
            .lock()
            .unwrap()
            .get(&query_id)
            .cloned()
            .ok_or_else(|| Error::api_connection("unknown query id"))?;
        let culprits: Vec<String> = fields
            .iter()
            .filter(|f| self.fixtures.failing_fields.contains(f.as_str()))
            .cloned()
            .collect();
        let never_terminal = self.fixtures.never_terminal
            || (culprits.is_empty()
                && fields
                    .iter()
                    .any(|f| self.fixtures.never_terminal_fields.contains(f.as_str())));
        // Single-field payload overrides only apply to isolation queries.
        let payload = match fields.as_slice() {
            [only] => self.fixtures.single_field_payloads.get(only).cloned(),
            _ => None,
        };
        let task_id = format!("task-{}", self.next_task_id.fetch_add(1, Ordering::SeqCst));
        self.tasks.lock().unwrap().insert(
            task_id.clone(),
            TaskScript {
                culprits,
                never_terminal,
                payload,
            },
        );
        self.query_tasks_created.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(TaskHandle { id: task_id })
    }

    async fn get_task_statuses(
        &self,
        task_ids: &[String],
    ) -> Result<HashMap<String, RawTaskResult>> {
        if self
            .poll_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::api_connection("status poll failed"));
        }
        let mut statuses = HashMap::new();
        for task_id in task_ids {
            // Drop the guard before settle() takes the same lock.
            let known = self.tasks.lock().unwrap().get(task_id).cloned();
            let script = match known {
                Some(script) => script,
                None => continue,
            };
            if script.never_terminal {
                statuses.insert(
                    task_id.clone(),
                    RawTaskResult {
                        status: TaskStatus::Running,
                        data: None,
                    },
                );
                continue;
            }
            let result = if script.culprits.is_empty() {
                RawTaskResult {
                    status: TaskStatus::Complete,
                    data: Some(json!([])),
                }
            } else {
                let data = script
                    .payload
                    .clone()
                    .or_else(|| self.fixtures.error_payload.clone())
                    .unwrap_or_else(|| {
                        json!({
                            "errors": [{"message": format!("Invalid field {}", script.culprits[0])}],
                            "sql": "SELECT 1",
                        })
                    });
                RawTaskResult {
                    status: TaskStatus::Error,
                    data: Some(data),
                }
            };
            self.settle(task_id);
            statuses.insert(task_id.clone(), result);
        }
        Ok(statuses)
    }

    async fn cancel_task(&self, task_id: &str) -> Result<()> {
        self.settle(task_id);
        self.cancelled.lock().unwrap().push(task_id.to_string());
        Ok(())
    }

    async fn content_validation(&self) -> Result<Vec<RawContentError>> {
        Ok(self.fixtures.content_errors.clone())
    }

    async fn all_data_tests(&self, _project: &str) -> Result<Vec<RawDataTest>> {
        Ok(self.fixtures.data_tests.clone())
    }

    async fn run_data_test(
        &self,
        _project: &str,
        _model: &str,
        test: &str,
    ) -> Result<Vec<RawDataTestResult>> {
        self.data_tests_run.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .fixtures
            .data_test_results
            .iter()
            .filter(|r| r.test_name == test)
            .cloned()
            .collect())
    }

    async fn compile_validation(&self, _project: &str) -> Result<RawCompileValidation> {
        Ok(RawCompileValidation {
            errors: self.fixtures.compile_errors.clone(),
        })
    }

    async fn update_workspace(&self, _workspace: &str) -> Result<()> {
        Ok(())
    }

    async fn get_active_branch(&self, project: &str) -> Result<String> {
        Ok(self
            .active_branches
            .lock()
            .unwrap()
            .get(project)
            .cloned()
            .unwrap_or_else(|| "main".to_string()))
    }

    async fn create_branch(&self, project: &str, branch: &str) -> Result<()> {
        self.branch_log
            .lock()
            .unwrap()
            .push(format!("create:{project}:{branch}"));
        self.active_branches
            .lock()
            .unwrap()
            .insert(project.to_string(), branch.to_string());
        Ok(())
    }

    async fn update_branch(&self, project: &str, branch: &str) -> Result<()> {
        self.branch_log
            .lock()
            .unwrap()
            .push(format!("update:{project}:{branch}"));
        self.active_branches
            .lock()
            .unwrap()
            .insert(project.to_string(), branch.to_string());
        Ok(())
    }

    async fn delete_branch(&self, project: &str, branch: &str) -> Result<()> {
        self.branch_log
            .lock()
            .unwrap()
            .push(format!("delete:{project}:{branch}"));
        Ok(())
    }

    async fn get_manifest(&self, _project: &str) -> Result<RawManifest> {
        Ok(RawManifest {
            imports: self
                .fixtures
                .manifest_imports
                .iter()
                .map(|name| RawManifestImport { name: name.clone() })
                .collect(),
        })
    }
}

pub struct MockClientBuilder {
    fixtures: Fixtures,
}

impl MockClientBuilder {
    pub fn model(mut self, name: &str, project_name: &str, explores: &[&str]) -> Self {
        self.fixtures.models.push(RawModel {
            name: name.to_string(),
            project_name: project_name.to_string(),
            explores: explores
                .iter()
                .map(|e| RawExplore {
                    name: e.to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn field(self, model: &str, explore: &str, name: &str, field_type: &str) -> Self {
        self.push_field(model, explore, name, field_type, None)
    }

    pub fn field_with_url(
        self,
        model: &str,
        explore: &str,
        name: &str,
        field_type: &str,
        url: &str,
    ) -> Self {
        self.push_field(model, explore, name, field_type, Some(url.to_string()))
    }

    fn push_field(
        mut self,
        model: &str,
        explore: &str,
        name: &str,
        field_type: &str,
        url: Option<String>,
    ) -> Self {
        self.fixtures
            .fields
            .entry((model.to_string(), explore.to_string()))
            .or_default()
            .push(RawField {
                name: name.to_string(),
                field_type: field_type.to_string(),
                sql: format!("${{TABLE}}.{}", name.rsplit('.').next().unwrap_or(name)),
                url,
            });
        self
    }

    /// Any query touching this field returns an error payload.
    pub fn failing_field(mut self, name: &str) -> Self {
        self.fixtures.failing_fields.insert(name.to_string());
        self
    }

    /// Override the payload returned with failing query tasks.
    pub fn error_payload(mut self, payload: Value) -> Self {
        self.fixtures.error_payload = Some(payload);
        self
    }

    /// Override the error payload for the isolation query of one field.
    pub fn field_error_payload(mut self, field: &str, payload: Value) -> Self {
        self.fixtures
            .single_field_payloads
            .insert(field.to_string(), payload);
        self
    }

    /// Query tasks report `running` forever.
    pub fn never_terminal(mut self) -> Self {
        self.fixtures.never_terminal = true;
        self
    }

    /// Query tasks touching this field (and no failing field) report
    /// `running` forever.
    pub fn never_terminal_field(mut self, name: &str) -> Self {
        self.fixtures.never_terminal_fields.insert(name.to_string());
        self
    }

    /// The next `count` status polls fail with a connection error.
    pub fn fail_status_polls(mut self, count: usize) -> Self {
        self.fixtures.status_poll_failures = count;
        self
    }

    pub fn fail_query_creation(mut self) -> Self {
        self.fixtures.fail_query_creation = true;
        self
    }

    pub fn data_test(mut self, name: &str, model: &str, explore: &str) -> Self {
        self.fixtures.data_tests.push(RawDataTest {
            name: name.to_string(),
            model_name: model.to_string(),
            explore_name: explore.to_string(),
        });
        self
    }

    pub fn data_test_result(
        mut self,
        test_name: &str,
        model: &str,
        success: bool,
        errors: &[&str],
    ) -> Self {
        self.fixtures.data_test_results.push(RawDataTestResult {
            test_name: test_name.to_string(),
            model_name: model.to_string(),
            success,
            errors: errors
                .iter()
                .map(|message| RawDataTestError {
                    message: message.to_string(),
                    file_path: None,
                    line_number: None,
                })
                .collect(),
        });
        self
    }

    pub fn content_error(
        mut self,
        model: &str,
        explore: &str,
        message: &str,
        content_type: &str,
        title: &str,
    ) -> Self {
        self.fixtures.content_errors.push(RawContentError {
            model: model.to_string(),
            explore: explore.to_string(),
            message: message.to_string(),
            content_type: content_type.to_string(),
            title: title.to_string(),
            url: None,
            field_name: None,
        });
        self
    }

    /// Empty `explore` or `field` stand for a diagnostic without that scope.
    pub fn compile_error(
        mut self,
        model: &str,
        explore: &str,
        field: &str,
        message: &str,
        file_path: &str,
        line_number: u64,
    ) -> Self {
        let optional = |s: &str| (!s.is_empty()).then(|| s.to_string());
        self.fixtures.compile_errors.push(RawCompileError {
            model_id: optional(model),
            explore: optional(explore),
            field_name: optional(field),
            message: message.to_string(),
            severity: Some("error".to_string()),
            file_path: optional(file_path),
            line_number: Some(line_number),
        });
        self
    }

    pub fn manifest_import(mut self, name: &str) -> Self {
        self.fixtures.manifest_imports.push(name.to_string());
        self
    }

    pub fn build(self) -> MockClient {
        let poll_failures_left = AtomicUsize::new(self.fixtures.status_poll_failures);
        MockClient {
            fixtures: self.fixtures,
            queries: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            poll_failures_left,
            next_query_id: AtomicI64::new(1),
            next_task_id: AtomicUsize::new(1),
            field_fetches: AtomicUsize::new(0),
            query_tasks_created: AtomicUsize::new(0),
            data_tests_run: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            cancelled: Mutex::new(Vec::new()),
            branch_log: Mutex::new(Vec::new()),
            active_branches: Mutex::new(HashMap::new()),
        }
    }
}

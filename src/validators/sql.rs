//! SQL validator: runs one combined query per explore and bisects the field
//! set of failing explores to isolate the culprit fields.
//!
//! One combined query amortizes the fixed query-task round-trip latency over
//! the whole field set; on error, divide-and-conquer isolation keeps the
//! extra round trips logarithmic per failing field instead of linear in the
//! explore's field count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::client::{ApiClient, RawTaskResult, TaskStatus};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::pool::{CancelToken, QuerySlots};
use crate::project::{
    extract_error_details, ErrorDetail, ExploreStatus, ExtractedError, Field, Project,
};
use crate::result::{ResultAggregator, ValidationResult, ValidatorKind};

/// Consecutive multi-status poll failures tolerated before the run is
/// declared connection-dead.
const MAX_POLL_FAILURES: u32 = 3;

/// Outstanding query tasks awaiting a terminal status.
#[derive(Default)]
struct PollerState {
    waiters: Mutex<HashMap<String, oneshot::Sender<Result<RawTaskResult>>>>,
}

impl PollerState {
    async fn register(&self, task_id: String) -> oneshot::Receiver<Result<RawTaskResult>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(task_id, tx);
        rx
    }

    async fn deregister(&self, task_id: &str) {
        self.waiters.lock().await.remove(task_id);
    }
}

/// Poll all outstanding task handles as one multi-status request per tick.
async fn run_poller<C: ApiClient + ?Sized>(
    client: Arc<C>,
    state: Arc<PollerState>,
    interval: Duration,
    cancel: CancelToken,
) {
    let mut consecutive_failures = 0u32;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
        let task_ids: Vec<String> = state.waiters.lock().await.keys().cloned().collect();
        if task_ids.is_empty() {
            continue;
        }
        debug!(outstanding = task_ids.len(), "polling query task statuses");
        match client.get_task_statuses(&task_ids).await {
            Ok(statuses) => {
                consecutive_failures = 0;
                let mut waiters = state.waiters.lock().await;
                for (task_id, result) in statuses {
                    debug!(%task_id, status = ?result.status, "task status");
                    if result.status.is_terminal() {
                        if let Some(tx) = waiters.remove(&task_id) {
                            let _ = tx.send(Ok(result));
                        }
                    }
                }
            }
            Err(err) => {
                consecutive_failures += 1;
                if consecutive_failures >= MAX_POLL_FAILURES {
                    warn!(error = %err, "giving up on status polling");
                    let message = err.to_string();
                    let mut waiters = state.waiters.lock().await;
                    for (_, tx) in waiters.drain() {
                        let _ = tx.send(Err(Error::api_connection(message.clone())));
                    }
                    break;
                }
                warn!(error = %err, attempt = consecutive_failures, "status poll failed, retrying");
            }
        }
    }
}

/// Snapshot of one explore handed to a worker task.
struct ExploreJob {
    model: String,
    explore: String,
    fields: Vec<Field>,
}

enum EngineEvent {
    Status {
        model: String,
        explore: String,
        status: ExploreStatus,
    },
    Done {
        model: String,
        explore: String,
        status: ExploreStatus,
        errors: Vec<ErrorDetail>,
    },
    Fatal(Error),
}

enum QueryOutcome {
    Passed,
    Errored(ExtractedError),
}

/// Shared machinery for the per-explore worker tasks.
struct ExploreContext<C: ApiClient + ?Sized> {
    client: Arc<C>,
    poller: Arc<PollerState>,
    slots: QuerySlots,
    cancel: CancelToken,
    query_timeout: Duration,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl<C: ApiClient + ?Sized> ExploreContext<C> {
    async fn run(self: Arc<Self>, job: ExploreJob) {
        let _ = self.events.send(EngineEvent::Status {
            model: job.model.clone(),
            explore: job.explore.clone(),
            status: ExploreStatus::Running,
        });
        let deadline = Instant::now() + self.query_timeout;
        let event = match self.isolate(&job, &job.fields, deadline).await {
            Ok(errors) if errors.is_empty() => EngineEvent::Done {
                model: job.model,
                explore: job.explore,
                status: ExploreStatus::Passed,
                errors,
            },
            Ok(errors) => EngineEvent::Done {
                model: job.model,
                explore: job.explore,
                status: ExploreStatus::Failed,
                errors,
            },
            Err(err) if err.is_fatal() => EngineEvent::Fatal(err),
            // Timeout- and extraction-class failures stay at the explore
            // boundary with a status distinct from a confirmed SQL failure.
            Err(err) => EngineEvent::Done {
                errors: vec![ErrorDetail::new(&job.model, &job.explore, err.to_string())],
                model: job.model,
                explore: job.explore,
                status: ExploreStatus::Error,
            },
        };
        let _ = self.events.send(event);
    }

    /// Run a combined query over `fields`; on error, recurse into both
    /// halves (stable order, floor split) until single fields are isolated
    /// or a half is exonerated by a passing query.
    fn isolate<'a>(
        &'a self,
        job: &'a ExploreJob,
        fields: &'a [Field],
        deadline: Instant,
    ) -> BoxFuture<'a, Result<Vec<ErrorDetail>>> {
        Box::pin(async move {
            let extracted = match self.run_once(job, fields, deadline).await? {
                QueryOutcome::Passed => return Ok(Vec::new()),
                QueryOutcome::Errored(extracted) => extracted,
            };
            if fields.len() <= 1 {
                return Ok(vec![self.attribute(job, fields.first(), extracted)]);
            }
            let mid = fields.len() / 2;
            let (left, right) = fields.split_at(mid);
            // join, not try_join: each half owns a query task whose
            // deregister/cancel path must run even when the sibling fails.
            let (left_result, right_result) = futures::future::join(
                self.isolate(job, left, deadline),
                self.isolate(job, right, deadline),
            )
            .await;
            let (mut errors, right_errors) = match (left_result, right_result) {
                (Ok(left), Ok(right)) => (left, right),
                (Err(err), Ok(_)) | (Ok(_), Err(err)) => return Err(err),
                (Err(left), Err(right)) => {
                    return Err(if right.is_fatal() && !left.is_fatal() {
                        right
                    } else {
                        left
                    })
                }
            };
            errors.extend(right_errors);
            if errors.is_empty() {
                // The combined query errored but both halves passed in
                // isolation; report the combined error at the explore level.
                errors.push(self.attribute(job, None, extracted));
            }
            Ok(errors)
        })
    }

    /// Submit one combined query and wait for its task to reach a terminal
    /// status via the shared poller.
    async fn run_once(
        &self,
        job: &ExploreJob,
        fields: &[Field],
        deadline: Instant,
    ) -> Result<QueryOutcome> {
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            permit = self.slots.acquire() => permit?,
        };

        let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        let query = self
            .client
            .create_query(&job.model, &job.explore, &names)
            .await?;
        let task = self.client.create_query_task(query.id).await?;
        debug!(
            model = %job.model,
            explore = %job.explore,
            fields = names.len(),
            task_id = %task.id,
            "query task created"
        );

        let rx = self.poller.register(task.id.clone()).await;
        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                self.poller.deregister(&task.id).await;
                self.try_cancel(&task.id).await;
                return Err(Error::Cancelled);
            }
            polled = timeout_at(deadline, rx) => match polled {
                Err(_) => {
                    self.poller.deregister(&task.id).await;
                    self.try_cancel(&task.id).await;
                    return Err(Error::query_timeout(
                        &task.id,
                        self.query_timeout.as_millis() as u64,
                    ));
                }
                Ok(Err(_)) => return Err(Error::Cancelled),
                Ok(Ok(result)) => result?,
            },
        };

        match result.status {
            TaskStatus::Complete => Ok(QueryOutcome::Passed),
            TaskStatus::Error => {
                let data = result.data.unwrap_or(Value::Null);
                Ok(QueryOutcome::Errored(extract_error_details(&data)?))
            }
            status => Err(Error::extraction(format!(
                "unexpected terminal task status {status:?}"
            ))),
        }
    }

    /// Best-effort remote cancellation; failure is logged, not escalated.
    async fn try_cancel(&self, task_id: &str) {
        if let Err(err) = self.client.cancel_task(task_id).await {
            warn!(%task_id, error = %err, "failed to cancel query task");
        }
    }

    fn attribute(
        &self,
        job: &ExploreJob,
        field: Option<&Field>,
        extracted: ExtractedError,
    ) -> ErrorDetail {
        ErrorDetail {
            model: job.model.clone(),
            explore: job.explore.clone(),
            field: field.map(|f| f.name.clone()),
            message: extracted.message,
            sql: extracted.sql,
            metadata: extracted.metadata,
            file_path: None,
            line_number: extracted.line_number,
            severity: None,
            url: field.and_then(|f| f.url.clone()),
        }
    }
}

/// Runs and validates the SQL of every non-skipped explore in a project.
pub struct SqlValidator<C: ApiClient + ?Sized> {
    client: Arc<C>,
    config: EngineConfig,
}

impl<C: ApiClient + ?Sized + 'static> SqlValidator<C> {
    pub fn new(client: Arc<C>, config: EngineConfig) -> Self {
        Self { client, config }
    }

    /// Validate every non-skipped explore concurrently, bounded by the
    /// configured pool size. Explores are dispatched in tree order;
    /// completion is unordered and re-sorted by the aggregator.
    pub async fn validate(
        &self,
        project: &mut Project,
        cancel: &CancelToken,
    ) -> Result<ValidationResult> {
        info!(
            project = %project.name,
            explores = project.explore_count(),
            fields = project.field_count(),
            "running SQL validation"
        );

        let mut aggregator = ResultAggregator::new();
        let mut jobs = Vec::new();
        for model in &project.models {
            for explore in &model.explores {
                if explore.status == ExploreStatus::Skipped {
                    aggregator.record(
                        &model.name,
                        &explore.name,
                        ExploreStatus::Skipped,
                        Vec::new(),
                    );
                } else {
                    jobs.push(ExploreJob {
                        model: model.name.clone(),
                        explore: explore.name.clone(),
                        fields: explore.fields.clone(),
                    });
                }
            }
        }

        let poller_state = Arc::new(PollerState::default());
        let poller = tokio::spawn(run_poller(
            Arc::clone(&self.client),
            Arc::clone(&poller_state),
            self.config.poll_interval,
            cancel.clone(),
        ));

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(ExploreContext {
            client: Arc::clone(&self.client),
            poller: poller_state,
            slots: QuerySlots::new(self.config.concurrency),
            cancel: cancel.clone(),
            query_timeout: self.config.query_timeout,
            events: events_tx,
        });

        for job in jobs {
            if let Some(explore) = project.get_explore_mut(&job.model, &job.explore) {
                explore.status = ExploreStatus::Queued;
            }
            tokio::spawn(Arc::clone(&ctx).run(job));
        }
        drop(ctx);

        let mut fatal: Option<Error> = None;
        while let Some(event) = events_rx.recv().await {
            match event {
                EngineEvent::Status {
                    model,
                    explore,
                    status,
                } => {
                    if let Some(entry) = project.get_explore_mut(&model, &explore) {
                        if !entry.status.is_terminal() {
                            entry.status = status;
                        }
                    }
                }
                EngineEvent::Done {
                    model,
                    explore,
                    status,
                    errors,
                } => {
                    if let Some(entry) = project.get_explore_mut(&model, &explore) {
                        entry.status = status;
                        entry.errors = errors.clone();
                    }
                    aggregator.record(model, explore, status, errors);
                }
                EngineEvent::Fatal(err) => {
                    cancel.cancel();
                    // Keep the root cause over secondary cancellations.
                    if fatal.is_none() || matches!(fatal, Some(Error::Cancelled)) {
                        fatal = Some(err);
                    }
                }
            }
        }
        poller.abort();

        if let Some(err) = fatal {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(aggregator.finish(ValidatorKind::Sql))
    }
}

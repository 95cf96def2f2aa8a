//! Invocation tracking port.
//!
//! The engine never talks to an analytics backend directly; the caller
//! injects an [`InvocationTracker`] and receives invocation metadata with
//! anonymized identifiers. Start and end are both always emitted, including
//! on the error path.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hash a trait (instance URL, project name) so trackers never see the raw
/// value.
pub fn anonymize(value: &str) -> String {
    let digest = Sha256::digest(value.trim_end_matches('/').as_bytes());
    format!("{digest:x}")
}

/// Metadata describing one validator invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: Uuid,
    /// Validator command name, e.g. "sql" or "content".
    pub command: String,
    /// Anonymized instance identifier.
    pub instance_hash: String,
    /// Anonymized project identifier.
    pub project_hash: String,
    pub started_at: DateTime<Utc>,
}

impl Invocation {
    pub fn new(command: impl Into<String>, base_url: &str, project: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.into(),
            instance_hash: anonymize(base_url),
            project_hash: anonymize(project),
            started_at: Utc::now(),
        }
    }
}

/// Receiver of invocation lifecycle events.
pub trait InvocationTracker: Send + Sync {
    fn invocation_started(&self, invocation: &Invocation);
    fn invocation_ended(&self, invocation: &Invocation, passed: bool);
}

/// Tracker that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracker;

impl InvocationTracker for NoopTracker {
    fn invocation_started(&self, _invocation: &Invocation) {}
    fn invocation_ended(&self, _invocation: &Invocation, _passed: bool) {}
}

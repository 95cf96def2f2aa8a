//! # spyglass-core
//!
//! A CI validation engine for BI semantic-layer projects exposed through a
//! remote modeling API.
//!
//! ## Core Components
//!
//! - **Project**: The resource tree (project, models, explores, fields)
//! - **Selector**: `model/explore` filter patterns with globs and negation
//! - **Validators**: SQL (with error isolation by bisection), content,
//!   data-test, and compile validation
//! - **Runner**: Branch management and invocation tracking around a run
//!
//! ## Example
//!
//! ```rust,ignore
//! use spyglass_core::{
//!     build_project, ApiConfig, CancelToken, EngineConfig, HttpClient, Selector,
//!     validators::SqlValidator,
//! };
//! use std::sync::Arc;
//!
//! let api = ApiConfig::new("https://bi.example.com", client_id, client_secret);
//! let client = Arc::new(HttpClient::new(api)?);
//! client.authenticate().await?;
//!
//! let selector = Selector::compile(&["*/*".into(), "-ecommerce/users".into()])?;
//! let mut project = build_project(client.as_ref(), "demo", &selector).await?;
//!
//! let validator = SqlValidator::new(client, EngineConfig::new());
//! let result = validator.validate(&mut project, &CancelToken::new()).await?;
//! println!("{}: {:?}", result.validator, result.status);
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod pool;
pub mod project;
pub mod result;
pub mod runner;
pub mod select;
pub mod tracking;
pub mod validators;

#[cfg(test)]
mod mock;

// Re-exports for convenience
pub use builder::build_project;
pub use client::{ApiClient, HttpClient};
pub use config::{ApiConfig, EngineConfig};
pub use error::{Error, Result};
pub use pool::{CancelToken, QuerySlots};
pub use project::{
    extract_error_details, ErrorDetail, Explore, ExploreStatus, ExtractedError, Field, Model,
    Project,
};
pub use result::{
    OverallStatus, ResultAggregator, TestedExplore, ValidationResult, ValidatorKind,
};
pub use runner::Runner;
pub use select::Selector;
pub use tracking::{anonymize, Invocation, InvocationTracker, NoopTracker};

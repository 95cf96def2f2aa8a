//! The validation engine: one validator per kind, all reporting through the
//! shared result aggregator.

mod compile;
mod content;
mod sql;

pub use compile::CompileValidator;
pub use content::ContentValidator;
pub use data_test::DataTestValidator;
pub use sql::SqlValidator;

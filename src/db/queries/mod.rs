//! Database queries

pub mod import_error;
pub mod job;
pub mod project;
pub mod transaction;

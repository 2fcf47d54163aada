//! Business logic services

pub mod cache;
pub mod cancellation;
pub mod csv_import;
pub mod import_runner;
pub mod jobs;
pub mod notifier;
pub mod upload;

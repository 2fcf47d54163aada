//! Type definitions

pub mod events;
pub mod import;
pub mod job;
pub mod messages;
pub mod project;

pub use events::*;
pub use import::*;
pub use job::*;
pub use messages::*;
pub use project::*;

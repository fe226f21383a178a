//! Assignment persistence and the per-ticket assignment watcher

pub mod service;
pub mod watcher;

// Re-export commonly used types
pub use service::{assignment_data_key, AssignTicketsFailure, AssignerService};
pub use watcher::AssignmentWatcher;

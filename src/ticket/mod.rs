//! Ticket lifecycle: indexing, claiming, and CRUD over the shared store

pub mod index;
pub mod service;

// Re-export commonly used types
pub use index::{TicketIndex, ALL_TICKETS_KEY, PENDING_TICKETS_KEY};
pub use service::TicketService;

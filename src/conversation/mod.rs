//! Conversation persistence service.

pub mod handlers;
pub mod persistence;


pub use handlers::{MessageCreateHandler, SessionClosedHandler};
pub use persistence::PersistenceService;

//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_relation_directory;
mod http_session_service;
mod in_memory_relation_directory;
mod tracing_notifier;

pub use http_relation_directory::{HttpRelationDirectory, SessionRefresher};
pub use http_session_service::{HttpSessionService, SessionTokens};
pub use in_memory_relation_directory::InMemoryRelationDirectory;
pub use tracing_notifier::TracingGrantNotifier;

use async_trait::async_trait;
use tracing::{info, warn};

use permitra_application::GrantNotifier;
use permitra_domain::Role;

/// Notification adapter emitting structured tracing events.
///
/// Save outcomes surface as structured log events; log shippers or the
/// gateway's trace layer pick these up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingGrantNotifier;

impl TracingGrantNotifier {
    /// Creates a new tracing notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GrantNotifier for TracingGrantNotifier {
    async fn grant_save_succeeded(&self, role: &Role, created_rows: usize, deleted_rows: usize) {
        info!(
            role_id = %role.role_id,
            role = %role.name,
            created_rows,
            deleted_rows,
            "role grants saved"
        );
    }

    async fn grant_save_failed(&self, role: &Role, reason: &str) {
        warn!(
            role_id = %role.role_id,
            role = %role.name,
            reason,
            "role grant save failed"
        );
    }
}

use std::sync::Arc;

use permitra_application::{
    GrantSnapshotService, GrantSyncService, RelationDirectory, RoleAdminService,
};
use permitra_infrastructure::HttpSessionService;

/// Shared gateway state.
#[derive(Clone)]
pub struct AppState {
    pub snapshot_service: GrantSnapshotService,
    pub sync_service: GrantSyncService,
    pub role_admin_service: RoleAdminService,
    pub directory: Arc<dyn RelationDirectory>,
    pub session_service: Option<Arc<HttpSessionService>>,
}

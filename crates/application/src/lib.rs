//! Application services and ports for the grant reconciliation engine.

#![forbid(unsafe_code)]

mod directory_ports;
mod grant_editor;
mod role_admin_service;
mod snapshot_service;
mod sync_service;

#[cfg(test)]
mod test_directory;

pub use directory_ports::{
    CreateRelationInput, CreateRoleInput, GrantNotifier, RelationDirectory,
};
pub use grant_editor::{GrantEditor, GrantEditorState};
pub use role_admin_service::RoleAdminService;
pub use snapshot_service::{GrantSnapshotService, RoleGrantSnapshot};
pub use sync_service::GrantSyncService;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures_util::try_join;
use tracing::debug;

use permitra_core::{AppResult, PermissionId, RestrictionId, RoleId, SessionContext};
use permitra_domain::{GrantAssignment, Permission, PermissionRelation, Restriction, Role};

use crate::RelationDirectory;

/// Category key used for permissions whose comment carries no tag.
const UNCATEGORIZED: &str = "general";

/// Server-confirmed view of one role's grants at a point in time.
///
/// Holds the assigned relation rows together with the permission and
/// restriction universes needed to render and edit them. Always produced by
/// a full fetch; there is no incremental cache patching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrantSnapshot {
    /// The role the snapshot belongs to.
    pub role: Role,
    /// Every relation row currently assigned to the role.
    pub relations: Vec<PermissionRelation>,
    /// Permissions visible in the role's application scope.
    pub permissions: Vec<Permission>,
    /// Global restriction catalog.
    pub restrictions: Vec<Restriction>,
}

impl RoleGrantSnapshot {
    /// Projects the relation rows into per-permission qualifier sets.
    #[must_use]
    pub fn assignment(&self) -> GrantAssignment {
        GrantAssignment::from_relations(&self.relations)
    }

    /// Returns the unique permission identifiers across assigned rows.
    #[must_use]
    pub fn assigned_permission_ids(&self) -> BTreeSet<PermissionId> {
        self.relations
            .iter()
            .map(|relation| relation.permission_id)
            .collect()
    }

    /// Returns the unique restriction identifiers across assigned rows.
    #[must_use]
    pub fn assigned_restriction_ids(&self) -> BTreeSet<RestrictionId> {
        self.relations
            .iter()
            .filter_map(|relation| relation.restriction_id)
            .collect()
    }

    /// Groups the permission universe by category tag for display.
    #[must_use]
    pub fn permissions_by_category(&self) -> BTreeMap<String, Vec<&Permission>> {
        let mut grouped: BTreeMap<String, Vec<&Permission>> = BTreeMap::new();
        for permission in &self.permissions {
            grouped
                .entry(permission.category().unwrap_or(UNCATEGORIZED).to_owned())
                .or_default()
                .push(permission);
        }

        grouped
    }
}

/// Application service producing authoritative role grant snapshots.
#[derive(Clone)]
pub struct GrantSnapshotService {
    directory: Arc<dyn RelationDirectory>,
}

impl GrantSnapshotService {
    /// Creates a new snapshot service over a directory adapter.
    #[must_use]
    pub fn new(directory: Arc<dyn RelationDirectory>) -> Self {
        Self { directory }
    }

    /// Fetches the full server-side view of a role's grants.
    ///
    /// The role is resolved first so the permission universe can be scoped to
    /// its application; the three collection fetches then run concurrently.
    /// Any single failure fails the whole snapshot, so callers never render
    /// assignments without knowing the permission universe.
    pub async fn load(
        &self,
        session: &SessionContext,
        role_id: RoleId,
    ) -> AppResult<RoleGrantSnapshot> {
        let role = self.directory.get_role(session, role_id).await?;

        let (relations, permissions, restrictions) = try_join!(
            self.directory.list_relations(session, role_id),
            self.directory
                .list_permissions(session, Some(role.application_id)),
            self.directory.list_restrictions(session),
        )?;

        debug!(
            role_id = %role_id,
            relations = relations.len(),
            permissions = permissions.len(),
            restrictions = restrictions.len(),
            "loaded role grant snapshot"
        );

        Ok(RoleGrantSnapshot {
            role,
            relations,
            permissions,
            restrictions,
        })
    }
}

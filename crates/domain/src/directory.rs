use permitra_core::{ApplicationId, PermissionId, RelationId, RestrictionId, RoleId};
use serde::{Deserialize, Serialize};

/// A grantable permission scoped to an application.
///
/// The remote reference service uses the free-form `comment` field as a loose
/// category tag for grouping permissions in administrative views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Stable permission identifier.
    pub permission_id: PermissionId,
    /// Display name.
    pub name: String,
    /// Optional category tag.
    pub comment: Option<String>,
}

impl Permission {
    /// Returns the category tag used for grouping, if any.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.comment
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// A qualifier narrowing the scope of a permission grant.
///
/// Restrictions are global; they are not scoped per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    /// Stable restriction identifier.
    pub restriction_id: RestrictionId,
    /// Display name.
    pub name: String,
    /// Optional free-form comment.
    pub comment: Option<String>,
}

/// A role owning permission grants within one application scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Stable role identifier.
    pub role_id: RoleId,
    /// Display name.
    pub name: String,
    /// Application scope the role belongs to.
    pub application_id: ApplicationId,
}

/// A single grant record linking a role, a permission, and at most one
/// restriction.
///
/// A permission may own several relation rows for the same role, one per
/// restriction value, plus optionally one row with no restriction at all.
/// Rows are never mutated in place; a changed restriction is modeled as
/// delete-old/create-new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRelation {
    /// Stable relation row identifier.
    pub relation_id: RelationId,
    /// Role owning the grant.
    pub role_id: RoleId,
    /// Granted permission.
    pub permission_id: PermissionId,
    /// Qualifying restriction; absence means an unrestricted grant.
    pub restriction_id: Option<RestrictionId>,
    /// Application scope, when the remote service reports it.
    pub application_id: Option<ApplicationId>,
}

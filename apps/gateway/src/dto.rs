use permitra_application::RoleGrantSnapshot;
use permitra_core::{ApplicationId, PermissionId, RestrictionId, RoleId};
use permitra_domain::{GrantQualifier, GrantSelection, Permission, Restriction, Role};
use permitra_infrastructure::SessionTokens;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// API representation of a role.
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role_id: RoleId,
    pub name: String,
    pub application_id: ApplicationId,
}

impl From<Role> for RoleResponse {
    fn from(value: Role) -> Self {
        Self {
            role_id: value.role_id,
            name: value.name,
            application_id: value.application_id,
        }
    }
}

/// API representation of a permission from the catalog.
#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub permission_id: PermissionId,
    pub name: String,
    pub category: Option<String>,
}

impl From<&Permission> for PermissionResponse {
    fn from(value: &Permission) -> Self {
        Self {
            permission_id: value.permission_id,
            name: value.name.clone(),
            category: value.category().map(str::to_owned),
        }
    }
}

/// API representation of a restriction from the catalog.
#[derive(Debug, Serialize)]
pub struct RestrictionResponse {
    pub restriction_id: RestrictionId,
    pub name: String,
    pub comment: Option<String>,
}

impl From<&Restriction> for RestrictionResponse {
    fn from(value: &Restriction) -> Self {
        Self {
            restriction_id: value.restriction_id,
            name: value.name.clone(),
            comment: value.comment.clone(),
        }
    }
}

/// One granted permission with the scopes it currently carries.
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub permission_id: PermissionId,
    pub unrestricted: bool,
    pub restriction_ids: Vec<RestrictionId>,
}

/// Permissions grouped by catalog category for display.
#[derive(Debug, Serialize)]
pub struct PermissionCategoryResponse {
    pub name: String,
    pub permission_ids: Vec<PermissionId>,
}

/// Full server-side view of a role's grants.
#[derive(Debug, Serialize)]
pub struct RoleGrantsResponse {
    pub role: RoleResponse,
    pub permissions: Vec<PermissionResponse>,
    pub restrictions: Vec<RestrictionResponse>,
    pub categories: Vec<PermissionCategoryResponse>,
    pub grants: Vec<GrantResponse>,
}

impl From<&RoleGrantSnapshot> for RoleGrantsResponse {
    fn from(snapshot: &RoleGrantSnapshot) -> Self {
        let assignment = snapshot.assignment();
        let grants = assignment
            .permission_ids()
            .into_iter()
            .map(|permission_id| {
                let qualifiers = assignment
                    .qualifiers_for(permission_id)
                    .cloned()
                    .unwrap_or_default();
                GrantResponse {
                    permission_id,
                    unrestricted: qualifiers.contains(&GrantQualifier::Unrestricted),
                    restriction_ids: qualifiers
                        .iter()
                        .filter_map(GrantQualifier::restriction_id)
                        .collect(),
                }
            })
            .collect();

        let categories = snapshot
            .permissions_by_category()
            .into_iter()
            .map(|(name, permissions)| PermissionCategoryResponse {
                name,
                permission_ids: permissions
                    .iter()
                    .map(|permission| permission.permission_id)
                    .collect(),
            })
            .collect();

        Self {
            role: RoleResponse::from(snapshot.role.clone()),
            permissions: snapshot.permissions.iter().map(PermissionResponse::from).collect(),
            restrictions: snapshot
                .restrictions
                .iter()
                .map(RestrictionResponse::from)
                .collect(),
            categories,
            grants,
        }
    }
}

/// One desired grant in a role grants update.
///
/// An empty `restriction_ids` list selects the permission without any
/// restriction.
#[derive(Debug, Deserialize)]
pub struct GrantSelectionRequest {
    pub permission_id: Uuid,
    #[serde(default)]
    pub restriction_ids: Vec<Uuid>,
}

/// Incoming payload replacing a role's desired grants wholesale.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleGrantsRequest {
    pub grants: Vec<GrantSelectionRequest>,
}

impl UpdateRoleGrantsRequest {
    /// Converts the transport payload into a domain selection.
    pub fn to_selection(&self) -> GrantSelection {
        let mut selection = GrantSelection::new();
        for entry in &self.grants {
            let permission_id = PermissionId::from_uuid(entry.permission_id);
            selection.select_permission(permission_id);
            for restriction_id in &entry.restriction_ids {
                selection
                    .select_restriction(permission_id, RestrictionId::from_uuid(*restriction_id));
            }
        }
        selection
    }
}

/// Incoming payload for role creation.
#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub application_id: Option<Uuid>,
}

/// Incoming payload for credential login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Incoming payload for a refresh token exchange.
#[derive(Debug, Deserialize)]
pub struct RefreshSessionRequest {
    pub refresh_token: String,
}

/// Token pair returned by the auth service.
#[derive(Debug, Serialize)]
pub struct SessionTokensResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<SessionTokens> for SessionTokensResponse {
    fn from(value: SessionTokens) -> Self {
        Self {
            access_token: value.access_token,
            refresh_token: value.refresh_token,
        }
    }
}

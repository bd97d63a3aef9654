use async_trait::async_trait;

use permitra_core::{
    AppResult, ApplicationId, NonEmptyString, PermissionId, RelationId, RestrictionId, RoleId,
    SessionContext,
};
use permitra_domain::{Permission, PermissionRelation, Restriction, Role};

/// Input payload for creating one relation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRelationInput {
    /// Role receiving the grant.
    pub role_id: RoleId,
    /// Permission to grant.
    pub permission_id: PermissionId,
    /// Qualifying restriction; `None` creates an unrestricted row.
    pub restriction_id: Option<RestrictionId>,
}

/// Input payload for creating a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique role name within the application scope.
    pub name: NonEmptyString,
    /// Application scope owning the role.
    pub application_id: ApplicationId,
}

/// Port over the remote relation/permission/restriction directory.
///
/// Every call carries the session explicitly; the adapter attaches the bearer
/// token and is responsible for transparent token-refresh replay, so callers
/// only ever observe outright success or failure.
#[async_trait]
pub trait RelationDirectory: Send + Sync {
    /// Lists every relation row assigned to the role.
    async fn list_relations(
        &self,
        session: &SessionContext,
        role_id: RoleId,
    ) -> AppResult<Vec<PermissionRelation>>;

    /// Creates one relation row.
    async fn create_relation(
        &self,
        session: &SessionContext,
        input: CreateRelationInput,
    ) -> AppResult<PermissionRelation>;

    /// Deletes one relation row.
    async fn delete_relation(
        &self,
        session: &SessionContext,
        relation_id: RelationId,
    ) -> AppResult<()>;

    /// Lists permissions visible in an application scope, or all of them.
    async fn list_permissions(
        &self,
        session: &SessionContext,
        application_id: Option<ApplicationId>,
    ) -> AppResult<Vec<Permission>>;

    /// Lists the global restriction catalog.
    async fn list_restrictions(&self, session: &SessionContext) -> AppResult<Vec<Restriction>>;

    /// Fetches one role, resolving its application scope.
    async fn get_role(&self, session: &SessionContext, role_id: RoleId) -> AppResult<Role>;

    /// Lists roles in an application scope, or all of them.
    async fn list_roles(
        &self,
        session: &SessionContext,
        application_id: Option<ApplicationId>,
    ) -> AppResult<Vec<Role>>;

    /// Creates a role.
    async fn create_role(
        &self,
        session: &SessionContext,
        input: CreateRoleInput,
    ) -> AppResult<Role>;

    /// Deletes a role. Relation rows are not cascaded by the remote service
    /// and must be deleted beforehand.
    async fn delete_role(&self, session: &SessionContext, role_id: RoleId) -> AppResult<()>;
}

/// Port for user-visible save notifications.
///
/// Notifications are advisory; they never fail the synchronization that
/// emitted them.
#[async_trait]
pub trait GrantNotifier: Send + Sync {
    /// Reports a fully applied grant synchronization.
    async fn grant_save_succeeded(&self, role: &Role, created_rows: usize, deleted_rows: usize);

    /// Reports a failed grant synchronization.
    async fn grant_save_failed(&self, role: &Role, reason: &str);
}

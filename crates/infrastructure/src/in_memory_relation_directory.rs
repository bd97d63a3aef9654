use async_trait::async_trait;
use tokio::sync::Mutex;

use permitra_application::{CreateRelationInput, CreateRoleInput, RelationDirectory};
use permitra_core::{
    AppError, AppResult, ApplicationId, PermissionId, RelationId, RestrictionId, RoleId,
    SessionContext,
};
use permitra_domain::{Permission, PermissionRelation, Restriction, Role};

/// In-memory directory adapter for local development and tests.
///
/// Mirrors the remote service's observable behavior: one relation row per
/// (role, permission, restriction) value with a uniqueness constraint, no
/// cascade on role deletion, and no in-place updates.
#[derive(Default)]
pub struct InMemoryRelationDirectory {
    roles: Mutex<Vec<Role>>,
    permissions: Mutex<Vec<(Permission, ApplicationId)>>,
    restrictions: Mutex<Vec<Restriction>>,
    relations: Mutex<Vec<PermissionRelation>>,
}

impl InMemoryRelationDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a role and returns it.
    pub async fn seed_role(&self, name: &str, application_id: ApplicationId) -> Role {
        let role = Role {
            role_id: RoleId::new(),
            name: name.to_owned(),
            application_id,
        };
        self.roles.lock().await.push(role.clone());
        role
    }

    /// Seeds a permission into an application scope and returns it.
    pub async fn seed_permission(
        &self,
        name: &str,
        comment: Option<&str>,
        application_id: ApplicationId,
    ) -> Permission {
        let permission = Permission {
            permission_id: PermissionId::new(),
            name: name.to_owned(),
            comment: comment.map(str::to_owned),
        };
        self.permissions
            .lock()
            .await
            .push((permission.clone(), application_id));
        permission
    }

    /// Seeds a restriction and returns it.
    pub async fn seed_restriction(&self, name: &str, comment: Option<&str>) -> Restriction {
        let restriction = Restriction {
            restriction_id: RestrictionId::new(),
            name: name.to_owned(),
            comment: comment.map(str::to_owned),
        };
        self.restrictions.lock().await.push(restriction.clone());
        restriction
    }

    /// Seeds a relation row directly, bypassing the uniqueness check.
    pub async fn seed_relation(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
        restriction_id: Option<RestrictionId>,
    ) -> PermissionRelation {
        let relation = PermissionRelation {
            relation_id: RelationId::new(),
            role_id,
            permission_id,
            restriction_id,
            application_id: None,
        };
        self.relations.lock().await.push(relation.clone());
        relation
    }
}

#[async_trait]
impl RelationDirectory for InMemoryRelationDirectory {
    async fn list_relations(
        &self,
        _session: &SessionContext,
        role_id: RoleId,
    ) -> AppResult<Vec<PermissionRelation>> {
        Ok(self
            .relations
            .lock()
            .await
            .iter()
            .filter(|relation| relation.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn create_relation(
        &self,
        _session: &SessionContext,
        input: CreateRelationInput,
    ) -> AppResult<PermissionRelation> {
        let mut relations = self.relations.lock().await;
        let duplicate = relations.iter().any(|relation| {
            relation.role_id == input.role_id
                && relation.permission_id == input.permission_id
                && relation.restriction_id == input.restriction_id
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "relation for permission '{}' already exists",
                input.permission_id
            )));
        }

        let relation = PermissionRelation {
            relation_id: RelationId::new(),
            role_id: input.role_id,
            permission_id: input.permission_id,
            restriction_id: input.restriction_id,
            application_id: None,
        };
        relations.push(relation.clone());
        Ok(relation)
    }

    async fn delete_relation(
        &self,
        _session: &SessionContext,
        relation_id: RelationId,
    ) -> AppResult<()> {
        let mut relations = self.relations.lock().await;
        let before = relations.len();
        relations.retain(|relation| relation.relation_id != relation_id);
        if relations.len() == before {
            return Err(AppError::NotFound(format!(
                "relation '{relation_id}' does not exist"
            )));
        }

        Ok(())
    }

    async fn list_permissions(
        &self,
        _session: &SessionContext,
        application_id: Option<ApplicationId>,
    ) -> AppResult<Vec<Permission>> {
        Ok(self
            .permissions
            .lock()
            .await
            .iter()
            .filter(|(_, owner)| application_id.is_none_or(|scope| scope == *owner))
            .map(|(permission, _)| permission.clone())
            .collect())
    }

    async fn list_restrictions(&self, _session: &SessionContext) -> AppResult<Vec<Restriction>> {
        Ok(self.restrictions.lock().await.clone())
    }

    async fn get_role(&self, _session: &SessionContext, role_id: RoleId) -> AppResult<Role> {
        self.roles
            .lock()
            .await
            .iter()
            .find(|role| role.role_id == role_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))
    }

    async fn list_roles(
        &self,
        _session: &SessionContext,
        application_id: Option<ApplicationId>,
    ) -> AppResult<Vec<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .filter(|role| application_id.is_none_or(|scope| scope == role.application_id))
            .cloned()
            .collect())
    }

    async fn create_role(
        &self,
        _session: &SessionContext,
        input: CreateRoleInput,
    ) -> AppResult<Role> {
        let mut roles = self.roles.lock().await;
        let duplicate = roles.iter().any(|role| {
            role.application_id == input.application_id && role.name == input.name.as_str()
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists in this application",
                input.name.as_str()
            )));
        }

        let role = Role {
            role_id: RoleId::new(),
            name: input.name.into(),
            application_id: input.application_id,
        };
        roles.push(role.clone());
        Ok(role)
    }

    async fn delete_role(&self, _session: &SessionContext, role_id: RoleId) -> AppResult<()> {
        let owns_relations = self
            .relations
            .lock()
            .await
            .iter()
            .any(|relation| relation.role_id == role_id);
        if owns_relations {
            return Err(AppError::Conflict(format!(
                "role '{role_id}' still owns relation rows"
            )));
        }

        let mut roles = self.roles.lock().await;
        let before = roles.len();
        roles.retain(|role| role.role_id != role_id);
        if roles.len() == before {
            return Err(AppError::NotFound(format!(
                "role '{role_id}' does not exist"
            )));
        }

        Ok(())
    }
}

//! Shared in-test fake of the directory and notifier ports.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use permitra_core::{
    AppError, AppResult, ApplicationId, PermissionId, RelationId, RestrictionId, RoleId,
    SessionContext,
};
use permitra_domain::{Permission, PermissionRelation, Restriction, Role};

use crate::{CreateRelationInput, CreateRoleInput, GrantNotifier, RelationDirectory};

/// In-memory [`RelationDirectory`] fake recording every mutating operation.
pub(crate) struct FakeDirectory {
    application_id: ApplicationId,
    roles: Mutex<Vec<Role>>,
    permissions: Mutex<Vec<(Permission, ApplicationId)>>,
    restrictions: Mutex<Vec<Restriction>>,
    relations: Mutex<Vec<PermissionRelation>>,
    operations: Mutex<Vec<String>>,
    fail_creates: Mutex<bool>,
    fail_deletes: Mutex<bool>,
    fail_next_list_restrictions: Mutex<bool>,
    create_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for FakeDirectory {
    fn default() -> Self {
        Self {
            application_id: ApplicationId::new(),
            roles: Mutex::new(Vec::new()),
            permissions: Mutex::new(Vec::new()),
            restrictions: Mutex::new(Vec::new()),
            relations: Mutex::new(Vec::new()),
            operations: Mutex::new(Vec::new()),
            fail_creates: Mutex::new(false),
            fail_deletes: Mutex::new(false),
            fail_next_list_restrictions: Mutex::new(false),
            create_gate: Mutex::new(None),
        }
    }
}

impl FakeDirectory {
    pub(crate) async fn seed_role(&self, name: &str) -> RoleId {
        let role = Role {
            role_id: RoleId::new(),
            name: name.to_owned(),
            application_id: self.application_id,
        };
        let role_id = role.role_id;
        self.roles.lock().await.push(role);
        role_id
    }

    pub(crate) async fn seed_permission(
        &self,
        name: &str,
        comment: Option<&str>,
    ) -> PermissionId {
        let permission = Permission {
            permission_id: PermissionId::new(),
            name: name.to_owned(),
            comment: comment.map(str::to_owned),
        };
        let permission_id = permission.permission_id;
        self.permissions
            .lock()
            .await
            .push((permission, self.application_id));
        permission_id
    }

    pub(crate) async fn seed_foreign_permission(&self, name: &str) -> PermissionId {
        let permission = Permission {
            permission_id: PermissionId::new(),
            name: name.to_owned(),
            comment: None,
        };
        let permission_id = permission.permission_id;
        self.permissions
            .lock()
            .await
            .push((permission, ApplicationId::new()));
        permission_id
    }

    pub(crate) async fn seed_restriction(&self, name: &str) -> RestrictionId {
        let restriction = Restriction {
            restriction_id: RestrictionId::new(),
            name: name.to_owned(),
            comment: None,
        };
        let restriction_id = restriction.restriction_id;
        self.restrictions.lock().await.push(restriction);
        restriction_id
    }

    pub(crate) async fn seed_relation(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
        restriction_id: Option<RestrictionId>,
    ) -> RelationId {
        let relation = PermissionRelation {
            relation_id: RelationId::new(),
            role_id,
            permission_id,
            restriction_id,
            application_id: Some(self.application_id),
        };
        let relation_id = relation.relation_id;
        self.relations.lock().await.push(relation);
        relation_id
    }

    pub(crate) async fn fail_creates(&self) {
        *self.fail_creates.lock().await = true;
    }

    pub(crate) async fn fail_deletes(&self) {
        *self.fail_deletes.lock().await = true;
    }

    pub(crate) async fn fail_next_list_restrictions(&self) {
        *self.fail_next_list_restrictions.lock().await = true;
    }

    /// Makes the next relation create wait until the returned handle is
    /// notified, holding its caller in flight.
    pub(crate) async fn gate_next_create(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock().await = Some(gate.clone());
        gate
    }

    pub(crate) async fn relations_for(&self, role_id: RoleId) -> Vec<PermissionRelation> {
        self.relations
            .lock()
            .await
            .iter()
            .filter(|relation| relation.role_id == role_id)
            .cloned()
            .collect()
    }

    pub(crate) async fn roles(&self) -> Vec<Role> {
        self.roles.lock().await.clone()
    }

    pub(crate) async fn operations(&self) -> Vec<String> {
        self.operations.lock().await.clone()
    }
}

#[async_trait]
impl RelationDirectory for FakeDirectory {
    async fn list_relations(
        &self,
        _session: &SessionContext,
        role_id: RoleId,
    ) -> AppResult<Vec<PermissionRelation>> {
        Ok(self.relations_for(role_id).await)
    }

    async fn create_relation(
        &self,
        _session: &SessionContext,
        input: CreateRelationInput,
    ) -> AppResult<PermissionRelation> {
        let gate = self.create_gate.lock().await.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if *self.fail_creates.lock().await {
            return Err(AppError::Upstream("relation create rejected".to_owned()));
        }

        let mut relations = self.relations.lock().await;
        let duplicate = relations.iter().any(|relation| {
            relation.role_id == input.role_id
                && relation.permission_id == input.permission_id
                && relation.restriction_id == input.restriction_id
        });
        if duplicate {
            return Err(AppError::Conflict("duplicate relation row".to_owned()));
        }

        let relation = PermissionRelation {
            relation_id: RelationId::new(),
            role_id: input.role_id,
            permission_id: input.permission_id,
            restriction_id: input.restriction_id,
            application_id: Some(self.application_id),
        };
        relations.push(relation.clone());
        self.operations.lock().await.push(format!(
            "create {}:{:?}",
            input.permission_id, input.restriction_id
        ));
        Ok(relation)
    }

    async fn delete_relation(
        &self,
        _session: &SessionContext,
        relation_id: RelationId,
    ) -> AppResult<()> {
        if *self.fail_deletes.lock().await {
            return Err(AppError::Upstream("relation delete rejected".to_owned()));
        }

        let mut relations = self.relations.lock().await;
        let before = relations.len();
        relations.retain(|relation| relation.relation_id != relation_id);
        if relations.len() == before {
            return Err(AppError::NotFound(format!(
                "relation '{relation_id}' does not exist"
            )));
        }

        self.operations
            .lock()
            .await
            .push(format!("delete {relation_id}"));
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
        let mut fail = self.fail_next_list_restrictions.lock().await;
        if *fail {
            *fail = false;
            return Err(AppError::Upstream("restriction list unavailable".to_owned()));
        }

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
                "role '{}' already exists",
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
        if !self.relations_for(role_id).await.is_empty() {
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

/// Counting [`GrantNotifier`] fake.
#[derive(Default)]
pub(crate) struct FakeNotifier {
    successes: Mutex<usize>,
    failures: Mutex<usize>,
}

impl FakeNotifier {
    pub(crate) async fn successes(&self) -> usize {
        *self.successes.lock().await
    }

    pub(crate) async fn failures(&self) -> usize {
        *self.failures.lock().await
    }
}

#[async_trait]
impl GrantNotifier for FakeNotifier {
    async fn grant_save_succeeded(&self, _role: &Role, _created_rows: usize, _deleted_rows: usize) {
        *self.successes.lock().await += 1;
    }

    async fn grant_save_failed(&self, _role: &Role, _reason: &str) {
        *self.failures.lock().await += 1;
    }
}

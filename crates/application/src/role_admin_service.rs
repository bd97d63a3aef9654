use std::sync::Arc;

use futures_util::future::join_all;
use tracing::info;

use permitra_core::{
    AppError, AppResult, ApplicationId, NonEmptyString, RoleId, SessionContext,
};
use permitra_domain::Role;

use crate::{CreateRoleInput, RelationDirectory};

/// Application service for role administration.
#[derive(Clone)]
pub struct RoleAdminService {
    directory: Arc<dyn RelationDirectory>,
}

impl RoleAdminService {
    /// Creates a new role administration service.
    #[must_use]
    pub fn new(directory: Arc<dyn RelationDirectory>) -> Self {
        Self { directory }
    }

    /// Lists roles, scoped to the session's application when one is set.
    pub async fn list_roles(&self, session: &SessionContext) -> AppResult<Vec<Role>> {
        self.directory
            .list_roles(session, session.application_id())
            .await
    }

    /// Creates a role in an application scope after validating its name.
    pub async fn create_role(
        &self,
        session: &SessionContext,
        name: &str,
        application_id: ApplicationId,
    ) -> AppResult<Role> {
        let role = self
            .directory
            .create_role(
                session,
                CreateRoleInput {
                    name: NonEmptyString::new(name)?,
                    application_id,
                },
            )
            .await?;

        info!(role_id = %role.role_id, name = %role.name, "created role");
        Ok(role)
    }

    /// Deletes a role together with every relation row it still owns.
    ///
    /// The remote service does not cascade, so the relation rows go first;
    /// a failed row delete aborts before the role itself is touched.
    pub async fn delete_role(&self, session: &SessionContext, role_id: RoleId) -> AppResult<()> {
        let relations = self.directory.list_relations(session, role_id).await?;
        let total = relations.len();

        let results = join_all(
            relations
                .iter()
                .map(|relation| self.directory.delete_relation(session, relation.relation_id)),
        )
        .await;
        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed > 0 {
            return Err(AppError::Upstream(format!(
                "{failed} of {total} relation rows could not be deleted for role '{role_id}'"
            )));
        }

        self.directory.delete_role(session, role_id).await?;
        info!(role_id = %role_id, deleted_relations = total, "deleted role");
        Ok(())
    }
}

//! Seed catalog for the in-memory directory provider.

use permitra_core::{AppError, AppResult, ApplicationId};
use permitra_infrastructure::InMemoryRelationDirectory;
use tracing::info;
use uuid::Uuid;

const DEV_SEED_APPLICATION_ID: &str = "11111111-1111-1111-1111-111111111111";

/// Populates the directory with a demo application, one role, and a small
/// permission catalog so the gateway is usable without upstream services.
pub async fn run(directory: &InMemoryRelationDirectory) -> AppResult<()> {
    let application_id = Uuid::parse_str(DEV_SEED_APPLICATION_ID)
        .map(ApplicationId::from_uuid)
        .map_err(|error| {
            AppError::Internal(format!("invalid DEV_SEED_APPLICATION_ID: {error}"))
        })?;

    let role = directory.seed_role("branch_manager", application_id).await;

    let invoices_read = directory
        .seed_permission("invoices.read", Some("billing"), application_id)
        .await;
    directory
        .seed_permission("invoices.write", Some("billing"), application_id)
        .await;
    let reports_run = directory
        .seed_permission("reports.run", Some("reporting"), application_id)
        .await;
    directory.seed_permission("audit.export", None, application_id).await;

    let own_branch = directory
        .seed_restriction("own-branch", Some("rows belonging to the caller's branch"))
        .await;
    directory
        .seed_restriction("own-region", Some("rows belonging to the caller's region"))
        .await;

    directory
        .seed_relation(role.role_id, invoices_read.permission_id, None)
        .await;
    directory
        .seed_relation(
            role.role_id,
            reports_run.permission_id,
            Some(own_branch.restriction_id),
        )
        .await;

    info!(
        application_id = %application_id,
        role_id = %role.role_id,
        "seeded in-memory relation directory"
    );

    Ok(())
}

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use permitra_core::{AppError, AppResult, RelationId, RoleId, SessionContext};
use permitra_domain::{GrantDiff, GrantQualifier};

use crate::snapshot_service::RoleGrantSnapshot;
use crate::{CreateRelationInput, GrantNotifier, RelationDirectory};

/// Relation rows to touch, resolved from a diff against a snapshot.
///
/// Deletions are resolved to concrete relation row identifiers here because
/// the diff only names permissions and qualifiers; the snapshot's rows are
/// the sole source of `relation_id` values.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyncPlan {
    doomed_permission_rows: Vec<RelationId>,
    retracted_qualifier_rows: Vec<RelationId>,
    new_permission_rows: Vec<CreateRelationInput>,
    new_qualifier_rows: Vec<CreateRelationInput>,
}

impl SyncPlan {
    fn from_diff(snapshot: &RoleGrantSnapshot, diff: &GrantDiff) -> Self {
        let role_id = snapshot.role.role_id;

        let doomed_permission_rows = snapshot
            .relations
            .iter()
            .filter(|relation| diff.permissions_to_remove.contains(&relation.permission_id))
            .map(|relation| relation.relation_id)
            .collect();

        let retracted_qualifier_rows = snapshot
            .relations
            .iter()
            .filter(|relation| {
                diff.qualifiers_to_remove
                    .get(&relation.permission_id)
                    .is_some_and(|qualifiers| {
                        qualifiers
                            .contains(&GrantQualifier::from_restriction(relation.restriction_id))
                    })
            })
            .map(|relation| relation.relation_id)
            .collect();

        let new_permission_rows = diff
            .permissions_to_add
            .iter()
            .flat_map(|(permission_id, qualifiers)| {
                qualifiers.iter().map(|qualifier| CreateRelationInput {
                    role_id,
                    permission_id: *permission_id,
                    restriction_id: qualifier.restriction_id(),
                })
            })
            .collect();

        let new_qualifier_rows = diff
            .qualifiers_to_add
            .iter()
            .flat_map(|(permission_id, qualifiers)| {
                qualifiers.iter().map(|qualifier| CreateRelationInput {
                    role_id,
                    permission_id: *permission_id,
                    restriction_id: qualifier.restriction_id(),
                })
            })
            .collect();

        Self {
            doomed_permission_rows,
            retracted_qualifier_rows,
            new_permission_rows,
            new_qualifier_rows,
        }
    }

    fn deleted_rows(&self) -> usize {
        self.doomed_permission_rows.len() + self.retracted_qualifier_rows.len()
    }

    fn created_rows(&self) -> usize {
        self.new_permission_rows.len() + self.new_qualifier_rows.len()
    }
}

/// Application service realizing a grant diff against the remote directory.
///
/// Contract: the two delete phases run strictly before the two create
/// phases, so the directory's uniqueness constraint never sees a transient
/// duplicate grant. Operations within one phase are issued concurrently and
/// awaited together. At most one synchronization runs per role at a time;
/// a second save starting while one is in flight is rejected with a
/// conflict. There is no rollback; after a failure the caller recovers by
/// refetching the snapshot, which is the authoritative state.
#[derive(Clone)]
pub struct GrantSyncService {
    directory: Arc<dyn RelationDirectory>,
    notifier: Arc<dyn GrantNotifier>,
    in_flight: Arc<Mutex<BTreeSet<RoleId>>>,
}

impl GrantSyncService {
    /// Creates a new synchronizer over a directory adapter and a
    /// notification channel.
    #[must_use]
    pub fn new(directory: Arc<dyn RelationDirectory>, notifier: Arc<dyn GrantNotifier>) -> Self {
        Self {
            directory,
            notifier,
            in_flight: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Applies the diff to the remote directory and reports the aggregate
    /// outcome through the notification channel.
    ///
    /// An empty diff is a no-op and emits no notification. A save for a role
    /// that already has one in flight is rejected with a conflict before any
    /// operation is issued. On the first failed phase no further phases are
    /// issued; earlier phases are not compensated.
    pub async fn synchronize(
        &self,
        session: &SessionContext,
        snapshot: &RoleGrantSnapshot,
        diff: &GrantDiff,
    ) -> AppResult<()> {
        if diff.is_empty() {
            return Ok(());
        }

        let role_id = snapshot.role.role_id;
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(role_id) {
                return Err(AppError::Conflict(format!(
                    "a grant save for role '{role_id}' is already in progress"
                )));
            }
        }

        let plan = SyncPlan::from_diff(snapshot, diff);
        debug!(
            role_id = %role_id,
            deletes = plan.deleted_rows(),
            creates = plan.created_rows(),
            "synchronizing role grants"
        );

        let outcome = self.run_phases(session, &plan).await;
        self.in_flight.lock().await.remove(&role_id);

        match outcome {
            Ok(()) => {
                self.notifier
                    .grant_save_succeeded(
                        &snapshot.role,
                        plan.created_rows(),
                        plan.deleted_rows(),
                    )
                    .await;
                Ok(())
            }
            Err(error) => {
                warn!(
                    role_id = %snapshot.role.role_id,
                    error = %error,
                    "grant synchronization failed"
                );
                self.notifier
                    .grant_save_failed(&snapshot.role, &error.to_string())
                    .await;
                Err(error)
            }
        }
    }

    async fn run_phases(&self, session: &SessionContext, plan: &SyncPlan) -> AppResult<()> {
        self.delete_rows(
            session,
            "deselected permissions",
            &plan.doomed_permission_rows,
        )
        .await?;
        self.delete_rows(
            session,
            "retracted qualifiers",
            &plan.retracted_qualifier_rows,
        )
        .await?;
        self.create_rows(
            session,
            "newly selected permissions",
            &plan.new_permission_rows,
        )
        .await?;
        self.create_rows(session, "added qualifiers", &plan.new_qualifier_rows)
            .await
    }

    async fn delete_rows(
        &self,
        session: &SessionContext,
        phase: &str,
        relation_ids: &[RelationId],
    ) -> AppResult<()> {
        let results = join_all(
            relation_ids
                .iter()
                .map(|relation_id| self.directory.delete_relation(session, *relation_id)),
        )
        .await;

        Self::collect_phase_outcome(phase, results)
    }

    async fn create_rows(
        &self,
        session: &SessionContext,
        phase: &str,
        inputs: &[CreateRelationInput],
    ) -> AppResult<()> {
        let results = join_all(
            inputs
                .iter()
                .map(|input| self.directory.create_relation(session, input.clone())),
        )
        .await;

        Self::collect_phase_outcome(phase, results)
    }

    fn collect_phase_outcome<T>(phase: &str, results: Vec<AppResult<T>>) -> AppResult<()> {
        let total = results.len();
        let failures: Vec<AppError> = results.into_iter().filter_map(Result::err).collect();

        match failures.first() {
            None => Ok(()),
            Some(first) => Err(AppError::Upstream(format!(
                "{} of {total} operations failed while applying {phase}: {first}",
                failures.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use permitra_core::{AppError, SessionContext};
    use permitra_domain::{GrantSelection, compute_grant_diff};

    use crate::snapshot_service::GrantSnapshotService;
    use crate::test_directory::{FakeDirectory, FakeNotifier};

    use super::GrantSyncService;

    fn session() -> SessionContext {
        SessionContext::new("token", None)
    }

    async fn services(
        directory: Arc<FakeDirectory>,
    ) -> (GrantSnapshotService, GrantSyncService, Arc<FakeNotifier>) {
        let notifier = Arc::new(FakeNotifier::default());
        (
            GrantSnapshotService::new(directory.clone()),
            GrantSyncService::new(directory, notifier.clone()),
            notifier,
        )
    }

    #[tokio::test]
    async fn selecting_unrestricted_permission_creates_exactly_one_row() {
        let directory = Arc::new(FakeDirectory::default());
        let role_id = directory.seed_role("operators").await;
        let permission_id = directory.seed_permission("users.read", None).await;
        let (snapshots, synchronizer, notifier) = services(directory.clone()).await;

        let Ok(snapshot) = snapshots.load(&session(), role_id).await else {
            panic!("snapshot must load");
        };
        let mut desired = GrantSelection::new();
        desired.select_permission(permission_id);
        let diff = compute_grant_diff(&snapshot.assignment(), &desired);

        let outcome = synchronizer.synchronize(&session(), &snapshot, &diff).await;

        assert!(outcome.is_ok());
        let rows = directory.relations_for(role_id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].permission_id, permission_id);
        assert_eq!(rows[0].restriction_id, None);
        assert_eq!(notifier.successes().await, 1);
    }

    #[tokio::test]
    async fn adding_restriction_keeps_unrelated_rows() {
        let directory = Arc::new(FakeDirectory::default());
        let role_id = directory.seed_role("operators").await;
        let permission_id = directory.seed_permission("users.read", None).await;
        let first = directory.seed_restriction("region-x").await;
        let second = directory.seed_restriction("region-y").await;
        let existing = directory
            .seed_relation(role_id, permission_id, Some(first))
            .await;
        let (snapshots, synchronizer, _) = services(directory.clone()).await;

        let Ok(snapshot) = snapshots.load(&session(), role_id).await else {
            panic!("snapshot must load");
        };
        let mut desired = GrantSelection::from_relations(&snapshot.relations);
        desired.select_restriction(permission_id, second);
        let diff = compute_grant_diff(&snapshot.assignment(), &desired);

        let outcome = synchronizer.synchronize(&session(), &snapshot, &diff).await;

        assert!(outcome.is_ok());
        let rows = directory.relations_for(role_id).await;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|row| row.relation_id == existing));
    }

    #[tokio::test]
    async fn deselecting_permission_deletes_every_owned_row() {
        let directory = Arc::new(FakeDirectory::default());
        let role_id = directory.seed_role("operators").await;
        let permission_id = directory.seed_permission("users.read", None).await;
        let first = directory.seed_restriction("region-x").await;
        let second = directory.seed_restriction("region-y").await;
        directory
            .seed_relation(role_id, permission_id, Some(first))
            .await;
        directory
            .seed_relation(role_id, permission_id, Some(second))
            .await;
        let (snapshots, synchronizer, _) = services(directory.clone()).await;

        let Ok(snapshot) = snapshots.load(&session(), role_id).await else {
            panic!("snapshot must load");
        };
        let mut desired = GrantSelection::from_relations(&snapshot.relations);
        desired.deselect_permission(permission_id);
        let diff = compute_grant_diff(&snapshot.assignment(), &desired);

        let outcome = synchronizer.synchronize(&session(), &snapshot, &diff).await;

        assert!(outcome.is_ok());
        assert!(directory.relations_for(role_id).await.is_empty());
    }

    #[tokio::test]
    async fn deletes_run_strictly_before_creates() {
        let directory = Arc::new(FakeDirectory::default());
        let role_id = directory.seed_role("operators").await;
        let permission_id = directory.seed_permission("users.read", None).await;
        let other = directory.seed_permission("users.write", None).await;
        let restriction_id = directory.seed_restriction("region-x").await;
        directory.seed_relation(role_id, permission_id, None).await;
        let (snapshots, synchronizer, _) = services(directory.clone()).await;

        let Ok(snapshot) = snapshots.load(&session(), role_id).await else {
            panic!("snapshot must load");
        };
        let mut desired = GrantSelection::from_relations(&snapshot.relations);
        desired.select_restriction(permission_id, restriction_id);
        desired.select_permission(other);
        let diff = compute_grant_diff(&snapshot.assignment(), &desired);

        let outcome = synchronizer.synchronize(&session(), &snapshot, &diff).await;

        assert!(outcome.is_ok());
        let operations = directory.operations().await;
        let last_delete = operations
            .iter()
            .rposition(|operation| operation.starts_with("delete"));
        let first_create = operations
            .iter()
            .position(|operation| operation.starts_with("create"));
        match (last_delete, first_create) {
            (Some(last_delete), Some(first_create)) => assert!(last_delete < first_create),
            _ => panic!("expected both delete and create operations"),
        }
    }

    #[tokio::test]
    async fn empty_diff_issues_no_operations_and_no_notification() {
        let directory = Arc::new(FakeDirectory::default());
        let role_id = directory.seed_role("operators").await;
        let permission_id = directory.seed_permission("users.read", None).await;
        directory.seed_relation(role_id, permission_id, None).await;
        let (snapshots, synchronizer, notifier) = services(directory.clone()).await;

        let Ok(snapshot) = snapshots.load(&session(), role_id).await else {
            panic!("snapshot must load");
        };
        let desired = GrantSelection::from_relations(&snapshot.relations);
        let diff = compute_grant_diff(&snapshot.assignment(), &desired);

        let outcome = synchronizer.synchronize(&session(), &snapshot, &diff).await;

        assert!(outcome.is_ok());
        assert!(directory.operations().await.is_empty());
        assert_eq!(notifier.successes().await, 0);
        assert_eq!(notifier.failures().await, 0);
    }

    #[tokio::test]
    async fn failed_create_surfaces_aggregate_upstream_error() {
        let directory = Arc::new(FakeDirectory::default());
        let role_id = directory.seed_role("operators").await;
        let permission_id = directory.seed_permission("users.read", None).await;
        directory.fail_creates().await;
        let (snapshots, synchronizer, notifier) = services(directory.clone()).await;

        let Ok(snapshot) = snapshots.load(&session(), role_id).await else {
            panic!("snapshot must load");
        };
        let mut desired = GrantSelection::new();
        desired.select_permission(permission_id);
        let diff = compute_grant_diff(&snapshot.assignment(), &desired);

        let outcome = synchronizer.synchronize(&session(), &snapshot, &diff).await;

        assert!(matches!(outcome, Err(AppError::Upstream(_))));
        assert_eq!(notifier.failures().await, 1);
        assert_eq!(notifier.successes().await, 0);

        // The in-flight marker is released on failure; a retry is not
        // rejected as a concurrent save.
        let retry = synchronizer.synchronize(&session(), &snapshot, &diff).await;
        assert!(matches!(retry, Err(AppError::Upstream(_))));
    }

    #[tokio::test]
    async fn concurrent_saves_for_one_role_are_rejected() {
        let directory = Arc::new(FakeDirectory::default());
        let role_id = directory.seed_role("operators").await;
        let permission_id = directory.seed_permission("users.read", None).await;
        let (snapshots, synchronizer, _) = services(directory.clone()).await;

        let Ok(snapshot) = snapshots.load(&session(), role_id).await else {
            panic!("snapshot must load");
        };
        let mut desired = GrantSelection::new();
        desired.select_permission(permission_id);
        let diff = compute_grant_diff(&snapshot.assignment(), &desired);

        let gate = directory.gate_next_create().await;
        let first = tokio::spawn({
            let synchronizer = synchronizer.clone();
            let snapshot = snapshot.clone();
            let diff = diff.clone();
            async move { synchronizer.synchronize(&session(), &snapshot, &diff).await }
        });
        // Let the first save reach its create phase and park at the gate.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let second = synchronizer.synchronize(&session(), &snapshot, &diff).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));

        gate.notify_one();
        let Ok(first) = first.await else {
            panic!("first save must run to completion");
        };
        assert!(first.is_ok());
        assert_eq!(directory.relations_for(role_id).await.len(), 1);
    }

    #[tokio::test]
    async fn failed_delete_phase_stops_before_creates() {
        let directory = Arc::new(FakeDirectory::default());
        let role_id = directory.seed_role("operators").await;
        let permission_id = directory.seed_permission("users.read", None).await;
        let other = directory.seed_permission("users.write", None).await;
        directory.seed_relation(role_id, permission_id, None).await;
        directory.fail_deletes().await;
        let (snapshots, synchronizer, _) = services(directory.clone()).await;

        let Ok(snapshot) = snapshots.load(&session(), role_id).await else {
            panic!("snapshot must load");
        };
        let mut desired = GrantSelection::from_relations(&snapshot.relations);
        desired.deselect_permission(permission_id);
        desired.select_permission(other);
        let diff = compute_grant_diff(&snapshot.assignment(), &desired);

        let outcome = synchronizer.synchronize(&session(), &snapshot, &diff).await;

        assert!(outcome.is_err());
        assert!(
            directory
                .operations()
                .await
                .iter()
                .all(|operation| !operation.starts_with("create"))
        );
    }
}

use tracing::debug;

use permitra_core::{AppError, AppResult, RoleId, SessionContext};
use permitra_domain::{GrantSelection, compute_grant_diff};

use crate::snapshot_service::{GrantSnapshotService, RoleGrantSnapshot};
use crate::sync_service::GrantSyncService;

/// Editing lifecycle phase of a [`GrantEditor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantEditorState {
    /// Displaying the committed server snapshot; no local edit state exists.
    Viewing,
    /// A local selection seeded from the snapshot is being edited.
    Editing,
    /// A save is in flight; the selection must not be mutated.
    Saving,
}

/// Drives the viewing/editing/saving lifecycle for one role's grants.
///
/// The editor owns the local edit state exclusively and enforces the
/// invariant the engine depends on: a save can only start from `Editing`, so
/// two synchronizations for the same role never overlap. Failures are
/// terminal per attempt; the editor drops back to `Editing` with the
/// selection intact and waits for an explicit retry or cancel.
pub struct GrantEditor {
    snapshots: GrantSnapshotService,
    synchronizer: GrantSyncService,
    session: SessionContext,
    snapshot: RoleGrantSnapshot,
    selection: GrantSelection,
    state: GrantEditorState,
}

impl GrantEditor {
    /// Opens an editor on a role by loading its current snapshot.
    pub async fn open(
        snapshots: GrantSnapshotService,
        synchronizer: GrantSyncService,
        session: SessionContext,
        role_id: RoleId,
    ) -> AppResult<Self> {
        let snapshot = snapshots.load(&session, role_id).await?;

        Ok(Self {
            snapshots,
            synchronizer,
            session,
            snapshot,
            selection: GrantSelection::new(),
            state: GrantEditorState::Viewing,
        })
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> GrantEditorState {
        self.state
    }

    /// Returns the last committed server snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &RoleGrantSnapshot {
        &self.snapshot
    }

    /// Starts editing by seeding the local selection from the snapshot.
    pub fn begin_editing(&mut self) -> AppResult<()> {
        if self.state != GrantEditorState::Viewing {
            return Err(AppError::Conflict(
                "grant editing is already in progress".to_owned(),
            ));
        }

        self.selection = GrantSelection::from_relations(&self.snapshot.relations);
        self.state = GrantEditorState::Editing;
        Ok(())
    }

    /// Discards the local selection and returns to viewing.
    pub fn cancel_editing(&mut self) -> AppResult<()> {
        if self.state != GrantEditorState::Editing {
            return Err(AppError::Conflict("no grant edit in progress".to_owned()));
        }

        self.selection = GrantSelection::new();
        self.state = GrantEditorState::Viewing;
        Ok(())
    }

    /// Returns the local selection for reading while editing.
    pub fn selection(&self) -> AppResult<&GrantSelection> {
        if self.state != GrantEditorState::Editing {
            return Err(AppError::Conflict("no grant edit in progress".to_owned()));
        }

        Ok(&self.selection)
    }

    /// Returns the local selection for mutation while editing.
    pub fn selection_mut(&mut self) -> AppResult<&mut GrantSelection> {
        if self.state != GrantEditorState::Editing {
            return Err(AppError::Conflict("no grant edit in progress".to_owned()));
        }

        Ok(&mut self.selection)
    }

    /// Computes the diff and synchronizes it against the remote directory.
    ///
    /// On success the snapshot is refetched and the editor returns to
    /// `Viewing`. On synchronization failure the editor returns to `Editing`
    /// with the selection retained so the user can retry without re-entering
    /// choices. If the post-save refetch itself fails, the editor still
    /// returns to `Viewing` with the stale snapshot and surfaces the error;
    /// retrying the save against a committed state would be unsafe.
    pub async fn save(&mut self) -> AppResult<()> {
        if self.state != GrantEditorState::Editing {
            return Err(AppError::Conflict(
                "no grant edit in progress to save".to_owned(),
            ));
        }

        self.state = GrantEditorState::Saving;
        let diff = compute_grant_diff(&self.snapshot.assignment(), &self.selection);
        debug!(role_id = %self.snapshot.role.role_id, empty = diff.is_empty(), "saving grant edit");

        if let Err(error) = self
            .synchronizer
            .synchronize(&self.session, &self.snapshot, &diff)
            .await
        {
            self.state = GrantEditorState::Editing;
            return Err(error);
        }

        let refetch = self
            .snapshots
            .load(&self.session, self.snapshot.role.role_id)
            .await;
        self.selection = GrantSelection::new();
        self.state = GrantEditorState::Viewing;

        match refetch {
            Ok(snapshot) => {
                self.snapshot = snapshot;
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

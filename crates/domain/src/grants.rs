use std::collections::{BTreeMap, BTreeSet};

use permitra_core::{PermissionId, RestrictionId};
use serde::{Deserialize, Serialize};

use crate::PermissionRelation;

/// One concrete grant shape backed by exactly one relation row.
///
/// The remote service stores a permission with N restrictions as N rows, one
/// per restriction, plus optionally one row with no restriction at all. A
/// qualifier names the shape of one such row, which makes the unrestricted
/// row a first-class, removable value instead of an implicit absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantQualifier {
    /// Row without a restriction; the permission applies without
    /// qualification.
    Unrestricted,
    /// Row qualified by a single restriction.
    Restricted(RestrictionId),
}

impl GrantQualifier {
    /// Builds a qualifier from a relation row's optional restriction.
    #[must_use]
    pub fn from_restriction(restriction_id: Option<RestrictionId>) -> Self {
        match restriction_id {
            Some(restriction_id) => Self::Restricted(restriction_id),
            None => Self::Unrestricted,
        }
    }

    /// Returns the restriction backing this qualifier, if any.
    #[must_use]
    pub fn restriction_id(&self) -> Option<RestrictionId> {
        match self {
            Self::Unrestricted => None,
            Self::Restricted(restriction_id) => Some(*restriction_id),
        }
    }
}

/// Desired restriction set for one selected permission.
///
/// A permission is either granted without qualification or qualified by a
/// non-empty restriction set; the two cannot coexist. Removing the last
/// restriction widens the selection back to unrestricted, so an empty
/// selection still materializes as exactly one unrestricted relation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionSelection {
    /// Grant the permission without qualification.
    Unrestricted,
    /// Grant the permission qualified by each listed restriction.
    Restricted(BTreeSet<RestrictionId>),
}

impl RestrictionSelection {
    /// Builds a selection from restriction values, normalizing an empty set
    /// to an unrestricted grant.
    #[must_use]
    pub fn from_restrictions(restrictions: impl IntoIterator<Item = RestrictionId>) -> Self {
        let restrictions: BTreeSet<RestrictionId> = restrictions.into_iter().collect();
        if restrictions.is_empty() {
            Self::Unrestricted
        } else {
            Self::Restricted(restrictions)
        }
    }

    /// Returns the relation-row qualifiers this selection materializes as.
    #[must_use]
    pub fn qualifiers(&self) -> BTreeSet<GrantQualifier> {
        match self {
            Self::Unrestricted => BTreeSet::from([GrantQualifier::Unrestricted]),
            Self::Restricted(restrictions) if restrictions.is_empty() => {
                BTreeSet::from([GrantQualifier::Unrestricted])
            }
            Self::Restricted(restrictions) => restrictions
                .iter()
                .copied()
                .map(GrantQualifier::Restricted)
                .collect(),
        }
    }

    /// Adds a restriction, narrowing an unrestricted grant.
    pub fn insert_restriction(&mut self, restriction_id: RestrictionId) {
        match self {
            Self::Unrestricted => {
                *self = Self::Restricted(BTreeSet::from([restriction_id]));
            }
            Self::Restricted(restrictions) => {
                restrictions.insert(restriction_id);
            }
        }
    }

    /// Removes a restriction, widening back to unrestricted when it was the
    /// last one.
    pub fn remove_restriction(&mut self, restriction_id: RestrictionId) {
        if let Self::Restricted(restrictions) = self {
            restrictions.remove(&restriction_id);
            if restrictions.is_empty() {
                *self = Self::Unrestricted;
            }
        }
    }
}

/// Locally edited desired grant state for one role.
///
/// Seeded from a server snapshot when editing begins, mutated freely in
/// memory, and only persisted through a computed [`GrantDiff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSelection {
    grants: BTreeMap<PermissionId, RestrictionSelection>,
}

impl GrantSelection {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a selection from the relation rows of a server snapshot.
    ///
    /// Legacy data may hold an unrestricted row next to restricted rows for
    /// the same permission. The typed selection cannot represent that
    /// coexistence; restricted rows win, so the next save retracts the
    /// leftover unrestricted row.
    #[must_use]
    pub fn from_relations(relations: &[PermissionRelation]) -> Self {
        let mut grants: BTreeMap<PermissionId, BTreeSet<RestrictionId>> = BTreeMap::new();
        for relation in relations {
            let restrictions = grants.entry(relation.permission_id).or_default();
            if let Some(restriction_id) = relation.restriction_id {
                restrictions.insert(restriction_id);
            }
        }

        Self {
            grants: grants
                .into_iter()
                .map(|(permission_id, restrictions)| {
                    (permission_id, RestrictionSelection::from_restrictions(restrictions))
                })
                .collect(),
        }
    }

    /// Selects a permission as an unrestricted grant, keeping an existing
    /// restriction selection untouched.
    pub fn select_permission(&mut self, permission_id: PermissionId) {
        self.grants
            .entry(permission_id)
            .or_insert(RestrictionSelection::Unrestricted);
    }

    /// Deselects a permission along with all of its restrictions.
    pub fn deselect_permission(&mut self, permission_id: PermissionId) {
        self.grants.remove(&permission_id);
    }

    /// Adds a restriction to a permission, selecting the permission first if
    /// needed.
    pub fn select_restriction(&mut self, permission_id: PermissionId, restriction_id: RestrictionId) {
        self.grants
            .entry(permission_id)
            .or_insert(RestrictionSelection::Unrestricted)
            .insert_restriction(restriction_id);
    }

    /// Removes a restriction from a permission; the permission itself stays
    /// selected.
    pub fn deselect_restriction(
        &mut self,
        permission_id: PermissionId,
        restriction_id: RestrictionId,
    ) {
        if let Some(selection) = self.grants.get_mut(&permission_id) {
            selection.remove_restriction(restriction_id);
        }
    }

    /// Returns whether the permission is currently selected.
    #[must_use]
    pub fn is_selected(&self, permission_id: PermissionId) -> bool {
        self.grants.contains_key(&permission_id)
    }

    /// Returns the restriction selection for a permission, if selected.
    #[must_use]
    pub fn selection_for(&self, permission_id: PermissionId) -> Option<&RestrictionSelection> {
        self.grants.get(&permission_id)
    }

    /// Returns the selected permission identifiers.
    #[must_use]
    pub fn permission_ids(&self) -> BTreeSet<PermissionId> {
        self.grants.keys().copied().collect()
    }

    /// Iterates over selected permissions and their restriction selections.
    pub fn iter(&self) -> impl Iterator<Item = (PermissionId, &RestrictionSelection)> {
        self.grants
            .iter()
            .map(|(permission_id, selection)| (*permission_id, selection))
    }

    /// Returns the relation-row qualifiers every selected permission should
    /// materialize as.
    #[must_use]
    pub fn desired_qualifiers(&self) -> BTreeMap<PermissionId, BTreeSet<GrantQualifier>> {
        self.grants
            .iter()
            .map(|(permission_id, selection)| (*permission_id, selection.qualifiers()))
            .collect()
    }
}

/// Server-confirmed grant shape for one role, keyed by permission.
///
/// Unlike [`GrantSelection`] this is a faithful projection of the relation
/// rows the server actually holds, so it can represent an unrestricted row
/// coexisting with restricted rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantAssignment {
    rows: BTreeMap<PermissionId, BTreeSet<GrantQualifier>>,
}

impl GrantAssignment {
    /// Projects relation rows into per-permission qualifier sets.
    #[must_use]
    pub fn from_relations(relations: &[PermissionRelation]) -> Self {
        let mut rows: BTreeMap<PermissionId, BTreeSet<GrantQualifier>> = BTreeMap::new();
        for relation in relations {
            rows.entry(relation.permission_id)
                .or_default()
                .insert(GrantQualifier::from_restriction(relation.restriction_id));
        }

        Self { rows }
    }

    /// Returns the assigned permission identifiers.
    #[must_use]
    pub fn permission_ids(&self) -> BTreeSet<PermissionId> {
        self.rows.keys().copied().collect()
    }

    /// Returns the qualifiers currently held for a permission.
    #[must_use]
    pub fn qualifiers_for(&self, permission_id: PermissionId) -> Option<&BTreeSet<GrantQualifier>> {
        self.rows.get(&permission_id)
    }

    /// Returns every restriction referenced by any assigned row.
    #[must_use]
    pub fn restriction_ids(&self) -> BTreeSet<RestrictionId> {
        self.rows
            .values()
            .flatten()
            .filter_map(GrantQualifier::restriction_id)
            .collect()
    }
}

/// Minimal mutation set transforming a server assignment into a desired
/// selection.
///
/// Removals of whole permissions subsume their qualifier-level changes; the
/// qualifier maps only ever name permissions present on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantDiff {
    /// Newly selected permissions with the full qualifier set to create.
    pub permissions_to_add: BTreeMap<PermissionId, BTreeSet<GrantQualifier>>,
    /// Deselected permissions; every relation row they own is deleted.
    pub permissions_to_remove: BTreeSet<PermissionId>,
    /// Qualifier rows to create on permissions selected on both sides.
    pub qualifiers_to_add: BTreeMap<PermissionId, BTreeSet<GrantQualifier>>,
    /// Qualifier rows to delete on permissions selected on both sides.
    pub qualifiers_to_remove: BTreeMap<PermissionId, BTreeSet<GrantQualifier>>,
}

impl GrantDiff {
    /// Returns whether the diff implies no remote operation at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions_to_add.is_empty()
            && self.permissions_to_remove.is_empty()
            && self.qualifiers_to_add.is_empty()
            && self.qualifiers_to_remove.is_empty()
    }

    /// Returns the number of relation rows the diff will create.
    #[must_use]
    pub fn planned_creates(&self) -> usize {
        self.permissions_to_add
            .values()
            .chain(self.qualifiers_to_add.values())
            .map(BTreeSet::len)
            .sum()
    }
}

/// Computes the minimal mutation set between the server assignment and the
/// locally edited selection.
///
/// Pure and total: no remote calls, no error path.
#[must_use]
pub fn compute_grant_diff(current: &GrantAssignment, desired: &GrantSelection) -> GrantDiff {
    let current_ids = current.permission_ids();
    let desired_ids = desired.permission_ids();

    let permissions_to_add: BTreeMap<PermissionId, BTreeSet<GrantQualifier>> = desired
        .iter()
        .filter(|(permission_id, _)| !current_ids.contains(permission_id))
        .map(|(permission_id, selection)| (permission_id, selection.qualifiers()))
        .collect();

    let permissions_to_remove: BTreeSet<PermissionId> =
        current_ids.difference(&desired_ids).copied().collect();

    let mut qualifiers_to_add: BTreeMap<PermissionId, BTreeSet<GrantQualifier>> = BTreeMap::new();
    let mut qualifiers_to_remove: BTreeMap<PermissionId, BTreeSet<GrantQualifier>> =
        BTreeMap::new();

    for permission_id in current_ids.intersection(&desired_ids).copied() {
        let held: BTreeSet<GrantQualifier> = current
            .qualifiers_for(permission_id)
            .cloned()
            .unwrap_or_default();
        let wanted = desired
            .selection_for(permission_id)
            .map(RestrictionSelection::qualifiers)
            .unwrap_or_default();

        let additions: BTreeSet<GrantQualifier> = wanted.difference(&held).copied().collect();
        let removals: BTreeSet<GrantQualifier> = held.difference(&wanted).copied().collect();

        if !additions.is_empty() {
            qualifiers_to_add.insert(permission_id, additions);
        }
        if !removals.is_empty() {
            qualifiers_to_remove.insert(permission_id, removals);
        }
    }

    GrantDiff {
        permissions_to_add,
        permissions_to_remove,
        qualifiers_to_add,
        qualifiers_to_remove,
    }
}

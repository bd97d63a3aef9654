//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod directory;
mod grants;

pub use directory::{Permission, PermissionRelation, Restriction, Role};
pub use grants::{
    GrantAssignment, GrantDiff, GrantQualifier, GrantSelection, RestrictionSelection,
    compute_grant_diff,
};

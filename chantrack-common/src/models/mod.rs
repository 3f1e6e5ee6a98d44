//! Domain model shared by the tracker service and its consumers
//!
//! An [`Entity`] is a channel or a team. Its primary listing fields are known
//! up front; the enrichable fields are grouped per [`FieldCategory`] and filled
//! in asynchronously by an enrichment run.

mod entity;
mod member;
mod run;
mod sort;

pub use entity::{
    Dashboard, Entity, EntityKind, FieldCategory, FieldState, FieldUpdate, MemberStats,
    MessageStats, PENDING_PLACEHOLDER, UNAVAILABLE_SENTINEL,
};
pub use member::{MemberCategory, MemberRecord, ResolvedMembers, BOT_SUFFIX};
pub use run::{ProgressState, RunId, RunSummary};
pub use sort::{sort_entities, SortDirection, SortKey};

//! Tracker services

pub mod dashboard;
pub mod enrichers;
pub mod identity;
pub mod member_resolver;
pub mod runs;
pub mod scheduler;
pub mod team_admin;

pub use dashboard::{DashboardSnapshot, DashboardStore, EventObserver};
pub use enrichers::{channel_enrichers, team_enrichers, Enricher};
pub use identity::{IdentityError, OperatorIdentityProvider, ProfileSource};
pub use member_resolver::{classify_team_members, IdentityLookup, MemberResolver, ResolverError};
pub use runs::{RunCoordinator, RunTicket};
pub use scheduler::{EnrichmentScheduler, EpochGuard, RunHandle, RunObserver, RunOutcome, SchedulePolicy};
pub use team_admin::{AdminError, TeamAdmin};

//! Sequential member resolution
//!
//! Channel member lists arrive as bare ids; each id needs its own identity
//! lookup. Lookups from every caller are funnelled through one worker task so
//! at most one is in flight at any time, and the worker is paced by a token
//! bucket (`lookups_per_second`).
//!
//! A failed lookup is logged and skipped; the rest of the list still resolves.
//! A job whose caller has gone away is dropped before its next lookup.

use async_trait::async_trait;
use chantrack_common::models::{MemberRecord, ResolvedMembers};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::{BackendApi, TeamMember};

const QUEUE_CAPACITY: usize = 32;

/// Identity fields needed to classify a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub display_name: String,
    pub email: Option<String>,
    pub is_bot: bool,
}

/// Looks up one member id
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup(&self, member_id: &str) -> Option<ResolvedIdentity>;
}

#[async_trait]
impl IdentityLookup for BackendApi {
    async fn lookup(&self, member_id: &str) -> Option<ResolvedIdentity> {
        let user = self.user_info(member_id).await?;
        Some(ResolvedIdentity {
            display_name: user.display_name(member_id),
            email: user.email(),
            is_bot: user.is_automation(),
        })
    }
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Member resolver worker is not running")]
    WorkerStopped,
}

struct ResolveJob {
    member_ids: Vec<String>,
    reply: oneshot::Sender<ResolvedMembers>,
}

/// Handle to the member resolution worker
#[derive(Clone)]
pub struct MemberResolver {
    jobs: mpsc::Sender<ResolveJob>,
}

impl MemberResolver {
    /// Spawn the worker on the current tokio runtime
    ///
    /// `lookups_per_second == 0` disables pacing.
    pub fn spawn(
        lookup: Arc<dyn IdentityLookup>,
        internal_domain: impl Into<String>,
        lookups_per_second: u32,
    ) -> Self {
        let (jobs, queue) = mpsc::channel(QUEUE_CAPACITY);
        let limiter = NonZeroU32::new(lookups_per_second)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate).allow_burst(NonZeroU32::MIN)));

        let worker = Worker {
            lookup,
            internal_domain: internal_domain.into(),
            limiter,
        };
        tokio::spawn(worker.run(queue));

        Self { jobs }
    }

    /// Resolve `member_ids` into sorted internal and external name lists
    pub async fn resolve_members(&self, member_ids: Vec<String>) -> Result<ResolvedMembers, ResolverError> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(ResolveJob { member_ids, reply })
            .await
            .map_err(|_| ResolverError::WorkerStopped)?;
        response.await.map_err(|_| ResolverError::WorkerStopped)
    }
}

struct Worker {
    lookup: Arc<dyn IdentityLookup>,
    internal_domain: String,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl Worker {
    async fn run(self, mut queue: mpsc::Receiver<ResolveJob>) {
        debug!("Member resolver worker started");
        while let Some(job) = queue.recv().await {
            let Some(resolved) = self.resolve(job.member_ids, &job.reply).await else {
                debug!("Member resolution caller went away, job abandoned");
                continue;
            };
            if job.reply.send(resolved).is_err() {
                debug!("Member resolution caller went away");
            }
        }
        debug!("Member resolver worker stopped");
    }

    /// Returns `None` once `reply` is closed; no further lookups are made
    async fn resolve(
        &self,
        member_ids: Vec<String>,
        reply: &oneshot::Sender<ResolvedMembers>,
    ) -> Option<ResolvedMembers> {
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(member_ids.len());
        let mut failed = 0usize;

        for member_id in member_ids {
            if !seen.insert(member_id.clone()) {
                continue;
            }
            if reply.is_closed() {
                return None;
            }
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            if reply.is_closed() {
                return None;
            }

            match self.lookup.lookup(&member_id).await {
                Some(identity) => records.push(MemberRecord::classify(
                    member_id,
                    identity.display_name,
                    identity.email,
                    identity.is_bot,
                    &self.internal_domain,
                )),
                None => {
                    warn!(member_id = %member_id, "Member lookup failed, skipping");
                    failed += 1;
                }
            }
        }

        let resolved = ResolvedMembers::from_records(records);
        info!(
            internal = resolved.internal.len(),
            external = resolved.external.len(),
            failed,
            "Members resolved"
        );
        Some(resolved)
    }
}

/// Classify team members, which arrive with their identity attached
pub fn classify_team_members(members: Vec<TeamMember>, internal_domain: &str) -> ResolvedMembers {
    let records = members.into_iter().filter_map(|member| {
        let id = member.id.unwrap_or_default();
        let display_name = member
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or_else(|| member.email.clone())
            .or_else(|| (!id.is_empty()).then(|| id.clone()))?;
        Some(MemberRecord::classify(
            id,
            display_name,
            member.email,
            member.is_bot,
            internal_domain,
        ))
    });
    ResolvedMembers::from_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeDirectory {
        users: HashMap<String, ResolvedIdentity>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeDirectory {
        fn new(users: &[(&str, &str, Option<&str>, bool)]) -> Self {
            Self {
                users: users
                    .iter()
                    .map(|(id, name, email, is_bot)| {
                        (
                            id.to_string(),
                            ResolvedIdentity {
                                display_name: name.to_string(),
                                email: email.map(str::to_string),
                                is_bot: *is_bot,
                            },
                        )
                    })
                    .collect(),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdentityLookup for FakeDirectory {
        async fn lookup(&self, member_id: &str) -> Option<ResolvedIdentity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.users.get(member_id).cloned()
        }
    }

    fn directory() -> Arc<FakeDirectory> {
        Arc::new(FakeDirectory::new(&[
            ("U1", "A", Some("a@adobe.com"), false),
            ("U2", "B", Some("b@gmail.com"), false),
            ("U3", "C", Some("c@vendor.io"), true),
            ("U4", "dana", Some("Dana@ADOBE.COM"), false),
        ]))
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_internal_external_and_bot_labels() {
        let resolver = MemberResolver::spawn(directory(), "adobe.com", 0);

        let resolved = resolver.resolve_members(ids(&["U3", "U2", "U1"])).await.unwrap();

        assert_eq!(resolved.internal, vec!["A"]);
        assert_eq!(resolved.external, vec!["B", "C (bot)"]);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_skipped() {
        let resolver = MemberResolver::spawn(directory(), "adobe.com", 0);

        let resolved = resolver
            .resolve_members(ids(&["U4", "U-missing", "U1"]))
            .await
            .unwrap();

        assert_eq!(resolved.internal, vec!["A", "dana"]);
        assert!(resolved.external.is_empty());
    }

    #[tokio::test]
    async fn test_lookups_are_sequential_across_callers() {
        let directory = directory();
        let resolver = MemberResolver::spawn(directory.clone(), "adobe.com", 0);

        let (first, second) = tokio::join!(
            resolver.resolve_members(ids(&["U1", "U2", "U3"])),
            resolver.resolve_members(ids(&["U4", "U1"])),
        );

        assert_eq!(first.unwrap().total(), 3);
        assert_eq!(second.unwrap().total(), 2);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 5);
        assert_eq!(directory.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_looked_up_once() {
        let directory = directory();
        let resolver = MemberResolver::spawn(directory.clone(), "adobe.com", 0);

        let resolved = resolver.resolve_members(ids(&["U2", "U2", "U2"])).await.unwrap();

        assert_eq!(resolved.external, vec!["B"]);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_paced_lookups_still_resolve() {
        let resolver = MemberResolver::spawn(directory(), "adobe.com", 1000);
        let resolved = resolver.resolve_members(ids(&["U1", "U2"])).await.unwrap();
        assert_eq!(resolved.total(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_job_stops_looking_up() {
        let many: Vec<(String, String)> = (0..50).map(|i| (format!("U{i}"), format!("user{i}"))).collect();
        let entries: Vec<(&str, &str, Option<&str>, bool)> = many
            .iter()
            .map(|(id, name)| (id.as_str(), name.as_str(), None, false))
            .collect();
        let directory = Arc::new(FakeDirectory::new(&entries));
        let resolver = MemberResolver::spawn(directory.clone(), "adobe.com", 0);

        let all_ids: Vec<String> = many.iter().map(|(id, _)| id.clone()).collect();
        let abandoned = tokio::time::timeout(Duration::from_millis(10), resolver.resolve_members(all_ids)).await;
        assert!(abandoned.is_err());

        // The next job only runs once the worker has dropped the abandoned one
        let resolved = resolver.resolve_members(ids(&["U0"])).await.unwrap();
        assert_eq!(resolved.external, vec!["user0"]);

        let calls = directory.calls.load(Ordering::SeqCst);
        assert!(calls < 50, "abandoned job kept looking up: {calls} calls");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(directory.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_classify_team_members() {
        let members: Vec<TeamMember> = serde_json::from_value(serde_json::json!([
            {"id": "1", "displayName": "zed", "email": "zed@adobe.com"},
            {"id": "2", "displayName": "Amy", "email": "amy@adobe.com"},
            {"id": "3", "displayName": "Helper", "email": "helper@bots.example", "isBot": true},
            {"id": "4", "email": "guest@partner.example"}
        ]))
        .unwrap();

        let resolved = classify_team_members(members, "adobe.com");

        assert_eq!(resolved.internal, vec!["Amy", "zed"]);
        assert_eq!(resolved.external, vec!["guest@partner.example", "Helper (bot)"]);
    }
}

//! Batch enrichment scheduler
//!
//! Fans enrichment calls for a list of entities out under one of two policies:
//!
//! - **Chunked:** fixed-size waves; every call in a wave runs concurrently, the
//!   whole wave is awaited, then the scheduler pauses before the next wave
//!   (never after the last one)
//! - **Pool:** at most `max_active` entities in flight; each completion frees a
//!   slot for the next entity
//!
//! The scheduler task is the only mutator of a run's entities and progress
//! counters. Every requested field group ends the run either loaded or
//! unavailable, never pending.
//!
//! Each run takes an epoch from an [`EpochGuard`]. Starting a newer run makes
//! the older one stale: its in-flight results are discarded as they complete
//! and it stops scheduling work.

use chantrack_common::config::{PolicyKind, ScheduleConfig};
use chantrack_common::models::{
    Entity, FieldCategory, FieldUpdate, ProgressState, RunId, RunSummary,
};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::enrichers::Enricher;
use crate::client::Sleeper;

/// Concurrency policy of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    Chunked { chunk_size: usize, pause: Duration },
    Pool { max_active: usize },
}

impl SchedulePolicy {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        match config.policy {
            PolicyKind::Chunked => SchedulePolicy::Chunked {
                chunk_size: config.chunk_size.max(1),
                pause: Duration::from_millis(config.pause_ms),
            },
            PolicyKind::Pool => SchedulePolicy::Pool {
                max_active: config.max_active.max(1),
            },
        }
    }
}

/// Monotonic run counter; only the latest epoch is current
#[derive(Debug, Clone, Default)]
pub struct EpochGuard {
    current: Arc<AtomicU64>,
}

impl EpochGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new epoch, making every earlier one stale
    pub fn begin(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}

/// Identity of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: RunId,
    pub epoch: u64,
}

/// Receives run notifications from the scheduler task
pub trait RunObserver: Send + Sync {
    /// Called after each unit of work (a wave or a single entity)
    fn on_progress(&self, run: &RunHandle, progress: ProgressState);

    /// Called after an entity's results were applied
    fn on_entity_updated(&self, run: &RunHandle, entity: &Entity);

    /// Called once when every entity is settled
    fn on_run_complete(&self, run: &RunHandle, summary: &RunSummary);

    fn on_run_superseded(&self, _run: &RunHandle, _progress: ProgressState) {}
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        entities: Vec<Entity>,
        summary: RunSummary,
    },
    Superseded {
        run: RunHandle,
        progress: ProgressState,
    },
}

impl RunOutcome {
    pub fn is_superseded(&self) -> bool {
        matches!(self, RunOutcome::Superseded { .. })
    }
}

type EntityResults = Vec<(FieldCategory, Option<FieldUpdate>)>;

/// Mutable state of one run, owned by the scheduler task
struct RunState {
    handle: RunHandle,
    entities: Vec<Entity>,
    progress: ProgressState,
    started: Instant,
}

impl RunState {
    fn new(handle: RunHandle, entities: Vec<Entity>) -> Self {
        let progress = ProgressState::new(entities.len());
        Self {
            handle,
            entities,
            progress,
            started: Instant::now(),
        }
    }

    fn apply(&mut self, index: usize, results: EntityResults, observer: &dyn RunObserver) {
        let Some(entity) = self.entities.get_mut(index) else {
            return;
        };
        for (category, update) in results {
            match update {
                Some(update) => entity.apply(update),
                None => {
                    debug!(
                        run_id = %self.handle.run_id,
                        entity_id = %entity.id,
                        category = category.as_str(),
                        "Enrichment unavailable"
                    );
                    entity.mark_unavailable(category);
                }
            }
        }
        observer.on_entity_updated(&self.handle, entity);
    }

    fn advance(&mut self, units: usize, observer: &dyn RunObserver) {
        self.progress.advance(units);
        observer.on_progress(&self.handle, self.progress);
    }

    fn superseded(self, observer: &dyn RunObserver) -> RunOutcome {
        info!(
            run_id = %self.handle.run_id,
            epoch = self.handle.epoch,
            loaded = self.progress.loaded,
            total = self.progress.total,
            "Run superseded, discarding remaining results"
        );
        observer.on_run_superseded(&self.handle, self.progress);
        RunOutcome::Superseded {
            run: self.handle,
            progress: self.progress,
        }
    }

    fn complete(self, enrichers: &[Arc<dyn Enricher>], observer: &dyn RunObserver) -> RunOutcome {
        let fully_loaded = self
            .entities
            .iter()
            .filter(|e| {
                enrichers
                    .iter()
                    .all(|en| !e.is_pending(en.category()) && !e.is_unavailable(en.category()))
            })
            .count();
        let with_unavailable = self
            .entities
            .iter()
            .filter(|e| enrichers.iter().any(|en| e.is_unavailable(en.category())))
            .count();

        let summary = RunSummary {
            run_id: self.handle.run_id,
            epoch: self.handle.epoch,
            progress: self.progress,
            fully_loaded,
            with_unavailable,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        };

        info!(
            run_id = %summary.run_id,
            epoch = summary.epoch,
            total = summary.progress.total,
            fully_loaded,
            with_unavailable,
            elapsed_ms = summary.elapsed_ms,
            "Enrichment run complete"
        );
        observer.on_run_complete(&self.handle, &summary);

        RunOutcome::Completed {
            entities: self.entities,
            summary,
        }
    }
}

/// Run every enricher for one entity concurrently
async fn enrich_entity(entity_id: String, enrichers: &[Arc<dyn Enricher>]) -> EntityResults {
    join_all(enrichers.iter().map(|enricher| {
        let entity_id = &entity_id;
        async move { (enricher.category(), enricher.enrich(entity_id).await) }
    }))
    .await
}

pub struct EnrichmentScheduler {
    policy: SchedulePolicy,
    sleeper: Arc<dyn Sleeper>,
    epochs: EpochGuard,
}

impl EnrichmentScheduler {
    pub fn new(policy: SchedulePolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            policy,
            sleeper,
            epochs: EpochGuard::new(),
        }
    }

    /// Share an epoch counter with other holders
    pub fn with_epochs(mut self, epochs: EpochGuard) -> Self {
        self.epochs = epochs;
        self
    }

    /// Allocate the identity of a new run, superseding any active one
    pub fn begin_run(&self) -> RunHandle {
        RunHandle {
            run_id: RunId::new(),
            epoch: self.epochs.begin(),
        }
    }

    /// Whether `handle` still identifies the newest run
    pub fn is_current(&self, handle: &RunHandle) -> bool {
        self.epochs.is_current(handle.epoch)
    }

    /// Enrich `entities` with every enricher under the configured policy
    pub async fn run(
        &self,
        handle: RunHandle,
        entities: Vec<Entity>,
        enrichers: &[Arc<dyn Enricher>],
        observer: &dyn RunObserver,
    ) -> RunOutcome {
        let mut state = RunState::new(handle, entities);
        info!(
            run_id = %handle.run_id,
            epoch = handle.epoch,
            total = state.progress.total,
            policy = ?self.policy,
            "Enrichment run started"
        );

        if !self.is_current(&handle) {
            return state.superseded(observer);
        }

        if state.entities.is_empty() {
            observer.on_progress(&handle, state.progress);
            return state.complete(enrichers, observer);
        }

        let finished = match self.policy {
            SchedulePolicy::Chunked { chunk_size, pause } => {
                self.run_chunked(&mut state, chunk_size, pause, enrichers, observer)
                    .await
            }
            SchedulePolicy::Pool { max_active } => {
                self.run_pool(&mut state, max_active, enrichers, observer).await
            }
        };

        if finished {
            state.complete(enrichers, observer)
        } else {
            state.superseded(observer)
        }
    }

    /// Returns false when the run was superseded
    async fn run_chunked(
        &self,
        state: &mut RunState,
        chunk_size: usize,
        pause: Duration,
        enrichers: &[Arc<dyn Enricher>],
        observer: &dyn RunObserver,
    ) -> bool {
        let total = state.entities.len();
        let chunk_size = chunk_size.max(1);

        for start in (0..total).step_by(chunk_size) {
            if !self.epochs.is_current(state.handle.epoch) {
                return false;
            }

            let end = (start + chunk_size).min(total);
            let wave = join_all((start..end).map(|index| {
                let entity_id = state.entities[index].id.clone();
                async move { (index, enrich_entity(entity_id, enrichers).await) }
            }))
            .await;

            if !self.epochs.is_current(state.handle.epoch) {
                return false;
            }

            for (index, results) in wave {
                state.apply(index, results, observer);
            }
            state.advance(end - start, observer);
            debug!(
                run_id = %state.handle.run_id,
                wave_start = start,
                wave_len = end - start,
                loaded = state.progress.loaded,
                "Wave complete"
            );

            if end < total {
                self.sleeper.sleep(pause).await;
            }
        }

        true
    }

    /// Returns false when the run was superseded
    async fn run_pool(
        &self,
        state: &mut RunState,
        max_active: usize,
        enrichers: &[Arc<dyn Enricher>],
        observer: &dyn RunObserver,
    ) -> bool {
        let work: Vec<(usize, String)> = state
            .entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (index, entity.id.clone()))
            .collect();

        let mut completions = stream::iter(work)
            .map(|(index, entity_id)| async move { (index, enrich_entity(entity_id, enrichers).await) })
            .buffer_unordered(max_active.max(1));

        while let Some((index, results)) = completions.next().await {
            if !self.epochs.is_current(state.handle.epoch) {
                return false;
            }
            state.apply(index, results, observer);
            state.advance(1, observer);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::RecordingSleeper;
    use async_trait::async_trait;
    use chantrack_common::models::{EntityKind, MemberStats, MessageStats};
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn entities(n: usize) -> Vec<Entity> {
        (0..n)
            .map(|i| Entity::new(EntityKind::Channel, format!("C{}", i), format!("channel-{}", i)))
            .collect()
    }

    /// Enricher answering from the entity id, failing for selected ids
    struct FakeMessages {
        failing: HashSet<String>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        delay: Duration,
    }

    impl FakeMessages {
        fn new() -> Self {
            Self {
                failing: HashSet::new(),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Enricher for FakeMessages {
        fn category(&self) -> FieldCategory {
            FieldCategory::Messages
        }

        async fn enrich(&self, entity_id: &str) -> Option<FieldUpdate> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(entity_id) {
                return None;
            }
            Some(FieldUpdate::Messages(MessageStats {
                message_count: entity_id.len() as u64,
                recent_count: None,
                question_count: None,
                last_message: None,
            }))
        }
    }

    struct FakeMembers;

    #[async_trait]
    impl Enricher for FakeMembers {
        fn category(&self) -> FieldCategory {
            FieldCategory::Members
        }

        async fn enrich(&self, _entity_id: &str) -> Option<FieldUpdate> {
            Some(FieldUpdate::Members(MemberStats { member_count: 3 }))
        }
    }

    /// Enricher that starts a newer epoch on its first call
    struct Superseder {
        epochs: EpochGuard,
        fired: AtomicUsize,
    }

    #[async_trait]
    impl Enricher for Superseder {
        fn category(&self) -> FieldCategory {
            FieldCategory::Messages
        }

        async fn enrich(&self, _entity_id: &str) -> Option<FieldUpdate> {
            if self.fired.fetch_add(1, Ordering::SeqCst) == 0 {
                self.epochs.begin();
            }
            None
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        progress: Mutex<Vec<ProgressState>>,
        updated: Mutex<Vec<String>>,
        completed: Mutex<Vec<RunSummary>>,
        superseded: AtomicUsize,
    }

    impl RunObserver for RecordingObserver {
        fn on_progress(&self, _run: &RunHandle, progress: ProgressState) {
            self.progress.lock().unwrap().push(progress);
        }

        fn on_entity_updated(&self, _run: &RunHandle, entity: &Entity) {
            self.updated.lock().unwrap().push(entity.id.clone());
        }

        fn on_run_complete(&self, _run: &RunHandle, summary: &RunSummary) {
            self.completed.lock().unwrap().push(*summary);
        }

        fn on_run_superseded(&self, _run: &RunHandle, _progress: ProgressState) {
            self.superseded.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn chunked(chunk_size: usize, sleeper: Arc<RecordingSleeper>) -> EnrichmentScheduler {
        EnrichmentScheduler::new(
            SchedulePolicy::Chunked {
                chunk_size,
                pause: Duration::from_secs(1),
            },
            sleeper,
        )
    }

    #[tokio::test]
    async fn test_chunked_waves_and_pauses() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let scheduler = chunked(20, sleeper.clone());
        let enrichers: Vec<Arc<dyn Enricher>> = vec![Arc::new(FakeMessages::new()), Arc::new(FakeMembers)];
        let observer = RecordingObserver::default();

        let handle = scheduler.begin_run();
        let outcome = scheduler.run(handle, entities(45), &enrichers, &observer).await;

        let loaded: Vec<usize> = observer.progress.lock().unwrap().iter().map(|p| p.loaded).collect();
        assert_eq!(loaded, vec![20, 40, 45]);
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(1); 2]);
        assert_eq!(observer.updated.lock().unwrap().len(), 45);

        match outcome {
            RunOutcome::Completed { entities, summary } => {
                assert_eq!(summary.progress, ProgressState { loaded: 45, total: 45 });
                assert_eq!(summary.fully_loaded, 45);
                assert!(entities.iter().all(|e| e.messages.loaded().is_some() && e.members.loaded().is_some()));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_item_gets_sentinel_and_run_completes() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let scheduler = chunked(4, sleeper);
        let mut messages = FakeMessages::new();
        messages.failing.insert("C2".to_string());
        let enrichers: Vec<Arc<dyn Enricher>> = vec![Arc::new(messages), Arc::new(FakeMembers)];
        let observer = RecordingObserver::default();

        let handle = scheduler.begin_run();
        let outcome = scheduler.run(handle, entities(6), &enrichers, &observer).await;

        let RunOutcome::Completed { entities, summary } = outcome else {
            panic!("run should complete");
        };
        assert!(entities[2].messages.is_unavailable());
        assert_eq!(entities[2].message_count_cell(), "-");
        assert!(entities[2].members.loaded().is_some());
        for (i, entity) in entities.iter().enumerate().filter(|(i, _)| *i != 2) {
            assert!(entity.messages.loaded().is_some(), "entity {} should be loaded", i);
        }
        assert_eq!(summary.with_unavailable, 1);
        assert_eq!(summary.fully_loaded, 5);

        let progress = observer.progress.lock().unwrap();
        let complete = progress.iter().filter(|p| p.is_complete()).count();
        assert_eq!(complete, 1);
        assert_eq!(observer.completed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pool_respects_capacity() {
        let scheduler = EnrichmentScheduler::new(
            SchedulePolicy::Pool { max_active: 5 },
            Arc::new(RecordingSleeper::default()),
        );
        let mut messages = FakeMessages::new();
        messages.delay = Duration::from_millis(5);
        let messages = Arc::new(messages);
        let enrichers: Vec<Arc<dyn Enricher>> = vec![messages.clone()];
        let observer = RecordingObserver::default();

        let handle = scheduler.begin_run();
        let outcome = scheduler.run(handle, entities(23), &enrichers, &observer).await;

        assert!(!outcome.is_superseded());
        let peak = messages.max_active.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak concurrency {} exceeds pool size", peak);
        assert!(peak >= 2, "pool should run entities concurrently");

        let progress = observer.progress.lock().unwrap();
        assert_eq!(progress.len(), 23);
        assert!(progress.windows(2).all(|w| w[0].loaded < w[1].loaded));
        assert_eq!(progress.last().map(|p| p.loaded), Some(23));
    }

    #[tokio::test]
    async fn test_pool_failed_item_gets_sentinel_and_run_completes() {
        let scheduler = EnrichmentScheduler::new(
            SchedulePolicy::Pool { max_active: 5 },
            Arc::new(RecordingSleeper::default()),
        );
        let mut messages = FakeMessages::new();
        messages.failing.insert("C7".to_string());
        messages.delay = Duration::from_millis(1);
        let enrichers: Vec<Arc<dyn Enricher>> = vec![Arc::new(messages), Arc::new(FakeMembers)];
        let observer = RecordingObserver::default();

        let handle = scheduler.begin_run();
        let outcome = scheduler.run(handle, entities(12), &enrichers, &observer).await;

        let RunOutcome::Completed { entities, summary } = outcome else {
            panic!("run should complete");
        };
        assert!(entities[7].messages.is_unavailable());
        assert_eq!(entities[7].message_count_cell(), "-");
        assert!(entities[7].members.loaded().is_some());
        for (i, entity) in entities.iter().enumerate().filter(|(i, _)| *i != 7) {
            assert!(entity.messages.loaded().is_some(), "entity {} should be loaded", i);
        }
        assert_eq!(summary.with_unavailable, 1);
        assert_eq!(summary.fully_loaded, 11);

        let progress = observer.progress.lock().unwrap();
        let complete: Vec<&ProgressState> = progress.iter().filter(|p| p.is_complete()).collect();
        assert_eq!(complete, vec![&ProgressState { loaded: 12, total: 12 }]);
        assert_eq!(observer.completed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_run_discards_results() {
        let epochs = EpochGuard::new();
        let scheduler = chunked(2, Arc::new(RecordingSleeper::default())).with_epochs(epochs.clone());
        let enrichers: Vec<Arc<dyn Enricher>> = vec![Arc::new(Superseder {
            epochs: epochs.clone(),
            fired: AtomicUsize::new(0),
        })];
        let observer = RecordingObserver::default();

        let handle = scheduler.begin_run();
        let outcome = scheduler.run(handle, entities(6), &enrichers, &observer).await;

        assert!(outcome.is_superseded());
        assert!(observer.updated.lock().unwrap().is_empty());
        assert!(observer.completed.lock().unwrap().is_empty());
        assert_eq!(observer.superseded.load(Ordering::SeqCst), 1);
        assert_eq!(epochs.current(), handle.epoch + 1);
    }

    #[tokio::test]
    async fn test_stale_handle_never_starts() {
        let scheduler = chunked(2, Arc::new(RecordingSleeper::default()));
        let stale = scheduler.begin_run();
        let _newer = scheduler.begin_run();
        let observer = RecordingObserver::default();

        let outcome = scheduler.run(stale, entities(3), &[], &observer).await;
        assert!(outcome.is_superseded());
        assert!(observer.progress.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_run_reports_zero_of_zero_once() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let scheduler = chunked(20, sleeper.clone());
        let enrichers: Vec<Arc<dyn Enricher>> = vec![Arc::new(FakeMembers)];
        let observer = RecordingObserver::default();

        let handle = scheduler.begin_run();
        let outcome = scheduler.run(handle, Vec::new(), &enrichers, &observer).await;

        assert!(!outcome.is_superseded());
        assert_eq!(*observer.progress.lock().unwrap(), vec![ProgressState { loaded: 0, total: 0 }]);
        assert_eq!(observer.completed.lock().unwrap().len(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = ScheduleConfig::default();
        config.policy = PolicyKind::Pool;
        config.max_active = 5;
        assert_eq!(SchedulePolicy::from_config(&config), SchedulePolicy::Pool { max_active: 5 });

        config.policy = PolicyKind::Chunked;
        config.chunk_size = 20;
        config.pause_ms = 1000;
        assert_eq!(
            SchedulePolicy::from_config(&config),
            SchedulePolicy::Chunked { chunk_size: 20, pause: Duration::from_secs(1) }
        );
    }
}

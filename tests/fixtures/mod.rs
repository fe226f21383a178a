//! Test fixtures and instrumented doubles for integration testing

use async_trait::async_trait;
use scrimmage::assignment::service::AssignerService;
use scrimmage::assignment::watcher::AssignmentWatcher;
use scrimmage::error::Result;
use scrimmage::metrics::MetricsCollector;
use scrimmage::pipeline::director::MatchPipeline;
use scrimmage::pipeline::functions::{Assigner, Evaluator, RandomAssigner};
use scrimmage::store::adapter::{StoreAdapter, StoreCmd, StoreResult};
use scrimmage::store::lock::{FetchLock, StoreFetchLock};
use scrimmage::store::memory::MemoryStore;
use scrimmage::ticket::index::TicketIndex;
use scrimmage::ticket::service::TicketService;
use scrimmage::types::{AssignmentGroup, Match, SearchFields, Ticket};
use scrimmage::utils::{current_timestamp, generate_ticket_id};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Store wrapper counting assignment-record reads (for watcher poll tests)
#[derive(Clone)]
pub struct CountingStore {
    inner: MemoryStore,
    assignment_gets: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            assignment_gets: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn assignment_get_count(&self) -> usize {
        self.assignment_gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreAdapter for CountingStore {
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        if key.starts_with("assign:") {
            self.assignment_gets.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.get(key).await
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.inner.mget(keys).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.inner.del(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.inner.sadd(key, members).await
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.inner.srem(key, members).await
    }

    async fn srandmember(&self, key: &str, count: i64) -> StoreResult<Vec<String>> {
        self.inner.srandmember(key, count).await
    }

    async fn zadd(&self, key: &str, entries: &[(f64, String)]) -> StoreResult<()> {
        self.inner.zadd(key, entries).await
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
        self.inner.zrangebyscore(key, min, max).await
    }

    async fn zrem(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.inner.zrem(key, members).await
    }

    async fn do_multi(&self, cmds: Vec<StoreCmd>) -> StoreResult<Vec<StoreResult<()>>> {
        self.inner.do_multi(cmds).await
    }
}

/// Assigner that signals when invoked, then stalls before delegating to the
/// random assigner (for shutdown-mid-tick tests)
pub struct SlowAssigner {
    pub started: Arc<Notify>,
    pub delay: Duration,
    inner: RandomAssigner,
}

impl SlowAssigner {
    pub fn new(delay: Duration) -> Self {
        Self {
            started: Arc::new(Notify::new()),
            delay,
            inner: RandomAssigner,
        }
    }
}

#[async_trait]
impl Assigner for SlowAssigner {
    async fn assign(&self, matches: &[Match]) -> Result<Vec<AssignmentGroup>> {
        // notify_one stores a permit, so a waiter that registers late still
        // observes the call.
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.assign(matches).await
    }
}

/// Complete engine wiring over a given store
pub struct TestSystem {
    pub ticket_service: TicketService,
    pub assigner_service: AssignerService,
    pub watcher: AssignmentWatcher,
    pub pipeline: Arc<MatchPipeline>,
}

/// Wire ticket service, assigner service, watcher, and pipeline over
/// `store` the way the composition root does.
pub fn build_system(
    store: Arc<dyn StoreAdapter>,
    assigner: Arc<dyn Assigner>,
    evaluator: Option<Arc<dyn Evaluator>>,
) -> TestSystem {
    let lock: Arc<dyn FetchLock> =
        Arc::new(StoreFetchLock::new(store.clone(), Duration::from_secs(1)));
    let index = TicketIndex::new(store.clone(), lock.clone(), Duration::from_secs(60));
    let ticket_service = TicketService::new(store.clone(), lock, index);
    let assigner_service =
        AssignerService::new(store, ticket_service.clone(), Duration::from_secs(60));
    let watcher = AssignmentWatcher::new(
        Arc::new(assigner_service.clone()),
        Duration::from_millis(100),
    );
    let pipeline = Arc::new(MatchPipeline::new(
        assigner,
        evaluator,
        ticket_service.clone(),
        assigner_service.clone(),
        Arc::new(MetricsCollector::new().expect("metrics collector")),
        10_000,
        Duration::from_millis(50),
    ));

    TestSystem {
        ticket_service,
        assigner_service,
        watcher,
        pipeline,
    }
}

/// Insert a ticket shaped like the canonical 1v1 client request.
pub async fn create_1v1_ticket(tickets: &TicketService) -> Ticket {
    let ticket = Ticket {
        id: generate_ticket_id(),
        assignment: None,
        search_fields: SearchFields {
            double_args: HashMap::new(),
            string_args: HashMap::from([("mode".to_string(), "1vs1".to_string())]),
            tags: vec!["casual".to_string()],
        },
        extensions: Vec::new(),
        persistent_field: HashMap::new(),
        created_at: current_timestamp(),
    };
    tickets
        .insert(&ticket, Duration::from_secs(600))
        .await
        .expect("insert ticket");
    ticket
}

mod account_sets;
mod database_scan;
mod ordered_blocking;
mod ordered_priorities;
mod ordered_tags;
mod peer_scoring;
mod priority;
mod throttle;

pub use account_sets::AccountSetsConfig;
pub use ordered_tags::{AsyncTag, OrderedTags, QueryType};
pub use priority::Priority;

use self::{
    account_sets::AccountSets, database_scan::DatabaseScan, peer_scoring::PeerScoring,
    throttle::Throttle,
};
use crate::{
    block_processing::{BlockContext, BlockProcessor, BlockSource, ObserverHandle},
    stats::{DetailType, Direction, Sample, StatType, Stats},
    transport::MessagePublisher,
    utils::ObserverSet,
};
use num::integer::sqrt;
use opal_core::{Account, BlockHash, HashOrAccount};
use opal_ledger::{BlockStatus, Ledger, LedgerReadTxn};
use opal_messages::{
    AccountInfoAckPayload, AccountInfoReqPayload, BlocksAckPayload, BlocksReqPayload, Frontier,
    HashType, Message, PullRequest, PullRequestType, PullResponse, PullResponsePayload,
};
use opal_network::{ChannelId, ChannelInfo, DropPolicy, Network, RateLimiter, TrafficType};
use opal_nullable_clock::SteadyClock;
use rand::{thread_rng, RngCore};
use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::JoinHandle,
    time::Duration,
};
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapConfig {
    /// Maximum number of un-responded requests per channel
    pub requests_limit: u32,
    /// Maximum number of tracked in-flight requests overall
    pub max_requests: usize,
    /// Rate limit on accounts taken from the database scan
    pub database_requests_limit: usize,
    /// Blocks requested per pull
    pub pull_count: u8,
    /// In-flight requests expire after this long
    pub timeout: Duration,
    pub throttle_coefficient: usize,
    pub throttle_wait: Duration,
    /// Wait while the block processor has more than this many blocks queued
    pub block_wait_count: usize,
    /// Minimum accepted protocol version used when bootstrapping
    pub min_protocol_version: u8,
    /// Peers silent for longer than this are dropped from scoring
    pub peer_timeout: Duration,
    pub account_sets: AccountSetsConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            requests_limit: 64,
            max_requests: 1024,
            database_requests_limit: 1024,
            pull_count: BlocksAckPayload::MAX_BLOCKS as u8,
            timeout: Duration::from_secs(3),
            throttle_coefficient: 16,
            throttle_wait: Duration::from_millis(100),
            block_wait_count: 1000,
            min_protocol_version: 0x14,
            peer_timeout: Duration::from_secs(60),
            account_sets: AccountSetsConfig::default(),
        }
    }
}

enum VerifyResult {
    Ok,
    NothingNew,
    Invalid,
}

/// Catches the local ledger up with the network by pulling account chains
/// from peers, prioritized by what the ledger is missing. Runs three
/// workers: priorities (block pulls), dependencies (account info queries
/// for missing sources) and timeouts.
pub struct BootstrapService {
    block_processor: Arc<BlockProcessor>,
    ledger: Arc<Ledger>,
    stats: Arc<Stats>,
    network: Arc<Network>,
    clock: Arc<SteadyClock>,
    message_publisher: MessagePublisher,
    priorities_thread: Mutex<Option<JoinHandle<()>>>,
    dependencies_thread: Mutex<Option<JoinHandle<()>>>,
    timeout_thread: Mutex<Option<JoinHandle<()>>>,
    batch_observer: Mutex<Option<ObserverHandle>>,
    mutex: Mutex<BootstrapServiceImpl>,
    condition: Condvar,
    config: BootstrapConfig,
    /// Database scans have a much lower hitrate than priority pulls; a
    /// separate limiter keeps them from starving the priority path
    database_limiter: RateLimiter,
    on_timeout: ObserverSet<AsyncTag>,
    on_frontiers: ObserverSet<Vec<Frontier>>,
}

impl BootstrapService {
    pub fn new(
        block_processor: Arc<BlockProcessor>,
        ledger: Arc<Ledger>,
        stats: Arc<Stats>,
        network: Arc<Network>,
        clock: Arc<SteadyClock>,
        message_publisher: MessagePublisher,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            mutex: Mutex::new(BootstrapServiceImpl {
                stopped: false,
                accounts: AccountSets::new(
                    Arc::clone(&stats),
                    Arc::clone(&clock),
                    config.account_sets.clone(),
                ),
                scoring: PeerScoring::new(config.clone(), Arc::clone(&clock)),
                database_scan: DatabaseScan::new(Arc::clone(&ledger)),
                tags: OrderedTags::default(),
                throttle: Throttle::new(compute_throttle_size(&ledger, &config)),
            }),
            condition: Condvar::new(),
            priorities_thread: Mutex::new(None),
            dependencies_thread: Mutex::new(None),
            timeout_thread: Mutex::new(None),
            batch_observer: Mutex::new(None),
            database_limiter: RateLimiter::new(config.database_requests_limit),
            config,
            block_processor,
            ledger,
            stats,
            network,
            clock,
            message_publisher,
            on_timeout: ObserverSet::new(),
            on_frontiers: ObserverSet::new(),
        }
    }

    pub fn stop(&self) {
        self.mutex.lock().unwrap().stopped = true;
        self.condition.notify_all();
        for thread in [
            &self.priorities_thread,
            &self.dependencies_thread,
            &self.timeout_thread,
        ] {
            let handle = thread.lock().unwrap().take();
            if let Some(handle) = handle {
                handle.join().unwrap();
            }
        }
        if let Some(handle) = self.batch_observer.lock().unwrap().take() {
            self.block_processor.remove_batch_processed_observer(handle);
        }
    }

    /// Expired tags are handed to these observers by the timeouts worker
    pub fn on_timeout(&self, observer: impl Fn(&AsyncTag) + Send + Sync + 'static) {
        self.on_timeout.add(observer);
    }

    /// Subscription point for frontier responses. The service itself does
    /// not act on them.
    pub fn on_frontiers(&self, observer: impl Fn(&Vec<Frontier>) + Send + Sync + 'static) {
        self.on_frontiers.add(observer);
    }

    pub fn priority_len(&self) -> usize {
        self.mutex.lock().unwrap().accounts.priority_len()
    }

    pub fn blocked_len(&self) -> usize {
        self.mutex.lock().unwrap().accounts.blocked_len()
    }

    pub fn score_len(&self) -> usize {
        self.mutex.lock().unwrap().scoring.len()
    }

    pub fn request_len(&self) -> usize {
        self.mutex.lock().unwrap().tags.len()
    }

    /// Entry point for pull responses coming from the network ingress
    pub fn process(&self, response: &PullResponse, channel_id: ChannelId) {
        let tag = {
            let mut guard = self.mutex.lock().unwrap();
            let Some(tag) = guard.tags.take(response.id) else {
                drop(guard);
                // Reply arrived after its tag expired
                self.stats.inc(StatType::Bootstrap, DetailType::MissingTag);
                return;
            };

            self.stats.inc(StatType::Bootstrap, DetailType::Reply);
            self.stats.sample(
                Sample::BootstrapTagDuration,
                (self.clock.now() - tag.timestamp).as_millis() as i64,
                (0, self.config.timeout.as_millis() as i64),
            );

            guard.scoring.received_message(channel_id);
            tag
        };

        self.condition.notify_all();

        match &response.payload {
            PullResponsePayload::Blocks(blocks) => self.process_blocks(blocks, &tag),
            PullResponsePayload::AccountInfo(info) => self.process_account_info(info, &tag),
            PullResponsePayload::Frontiers(frontiers) => {
                self.stats.inc(StatType::Bootstrap, DetailType::Frontiers);
                self.on_frontiers.notify(frontiers);
            }
            PullResponsePayload::Empty => {
                debug_assert!(false, "empty payload");
                self.stats.inc(StatType::Bootstrap, DetailType::EmptyPayload);
            }
        }
    }

    fn process_blocks(&self, response: &BlocksAckPayload, tag: &AsyncTag) {
        self.stats.inc(StatType::Bootstrap, DetailType::Process);

        match self.verify(response, tag) {
            VerifyResult::Ok => {
                self.stats.add_dir(
                    StatType::Bootstrap,
                    DetailType::Blocks,
                    Direction::In,
                    response.blocks().len() as u64,
                );

                for block in response.blocks() {
                    self.block_processor.add(
                        block.clone(),
                        BlockSource::Bootstrap,
                        ChannelId::LOOPBACK,
                    );
                }

                let mut guard = self.mutex.lock().unwrap();
                guard.throttle.add(true);
            }
            VerifyResult::NothingNew => {
                self.stats.inc(StatType::Bootstrap, DetailType::NothingNew);

                let mut guard = self.mutex.lock().unwrap();
                guard.accounts.priority_down(&tag.account);
                guard.throttle.add(false);
            }
            VerifyResult::Invalid => {
                self.stats.inc(StatType::Bootstrap, DetailType::Invalid);
                debug!(account = %tag.account, "Invalid blocks response");
            }
        }
    }

    fn process_account_info(&self, response: &AccountInfoAckPayload, _tag: &AsyncTag) {
        if response.account.is_zero() {
            self.stats
                .inc(StatType::Bootstrap, DetailType::AccountInfoEmpty);
            return;
        }

        self.stats.inc(StatType::Bootstrap, DetailType::AccountInfo);

        // Prioritize the account that owns the awaited dependency
        let mut guard = self.mutex.lock().unwrap();
        guard.accounts.priority_up(&response.account);
    }

    /// - invalid: blocks do not correspond to the requested hash/account or
    ///   do not form a chain
    /// - nothing_new: the peer has nothing beyond what we already have
    /// - ok: otherwise
    fn verify(&self, response: &BlocksAckPayload, tag: &AsyncTag) -> VerifyResult {
        let blocks = response.blocks();
        if blocks.is_empty() {
            return VerifyResult::NothingNew;
        }
        if blocks.len() == 1 && blocks[0].hash() == BlockHash::from(tag.start) {
            return VerifyResult::NothingNew;
        }

        let first = &blocks[0];
        match tag.query_type {
            QueryType::BlocksByHash => {
                if first.hash() != BlockHash::from(tag.start) {
                    return VerifyResult::Invalid;
                }
            }
            QueryType::BlocksByAccount => {
                if first.account_field() != Some(Account::from(tag.start)) {
                    return VerifyResult::Invalid;
                }
            }
            QueryType::AccountInfoByHash | QueryType::Invalid => {
                return VerifyResult::Invalid;
            }
        }

        let mut previous = first.hash();
        for block in &blocks[1..] {
            if block.previous() != previous {
                return VerifyResult::Invalid;
            }
            previous = block.hash();
        }

        VerifyResult::Ok
    }

    fn send(&self, channel: &Arc<ChannelInfo>, tag: &AsyncTag) {
        let req_type = match tag.query_type {
            QueryType::BlocksByHash | QueryType::BlocksByAccount => {
                self.stats.inc_dir(
                    StatType::Bootstrap,
                    DetailType::RequestBlocks,
                    Direction::Out,
                );
                PullRequestType::Blocks(BlocksReqPayload {
                    start: tag.start,
                    start_type: if tag.query_type == QueryType::BlocksByHash {
                        HashType::Block
                    } else {
                        HashType::Account
                    },
                    count: self.config.pull_count,
                })
            }
            QueryType::AccountInfoByHash => {
                self.stats.inc_dir(
                    StatType::Bootstrap,
                    DetailType::RequestAccountInfo,
                    Direction::Out,
                );
                PullRequestType::AccountInfo(AccountInfoReqPayload {
                    target: tag.start,
                    target_type: HashType::Block,
                })
            }
            QueryType::Invalid => {
                debug_assert!(false, "invalid query type");
                return;
            }
        };

        let request = Message::PullRequest(PullRequest {
            id: tag.id,
            req_type,
        });

        self.stats
            .inc_dir(StatType::Bootstrap, DetailType::Request, Direction::Out);

        self.message_publisher.try_send(
            channel.channel_id(),
            &request,
            DropPolicy::CanDrop,
            TrafficType::Bootstrap,
        );
    }

    fn track(&self, tag: AsyncTag) {
        self.stats.inc(StatType::Bootstrap, DetailType::Track);

        let mut guard = self.mutex.lock().unwrap();
        debug_assert!(!guard.tags.contains(tag.id));
        guard.tags.insert(tag);
    }

    /// Picks the pull shape for an account: resume from the local head when
    /// the account is known, otherwise pull the chain from its start
    fn request(&self, account: Account, channel: &Arc<ChannelInfo>) -> bool {
        let info = {
            let tx = self.ledger.read_txn();
            tx.account_info(&account)
        };

        let (query_type, start) = match info {
            Some(info) => (QueryType::BlocksByHash, HashOrAccount::from(info.head)),
            None => (QueryType::BlocksByAccount, HashOrAccount::from(account)),
        };

        let tag = AsyncTag {
            id: thread_rng().next_u64(),
            query_type,
            start,
            account,
            timestamp: self.clock.now(),
        };

        self.track(tag.clone());
        self.send(channel, &tag);
        true
    }

    fn request_info(&self, dependency: BlockHash, channel: &Arc<ChannelInfo>) -> bool {
        let tag = AsyncTag {
            id: thread_rng().next_u64(),
            query_type: QueryType::AccountInfoByHash,
            start: HashOrAccount::from(dependency),
            account: Account::zero(),
            timestamp: self.clock.now(),
        };

        self.track(tag.clone());
        self.send(channel, &tag);
        true
    }

    fn wait_blockprocessor(&self) {
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped
            && self.block_processor.queue_len(BlockSource::Bootstrap) > self.config.block_wait_count
        {
            // The block processor is relatively slow; a timed sleep beats
            // wiring a condition through it
            guard = self
                .condition
                .wait_timeout_while(guard, self.config.throttle_wait, |g| !g.stopped)
                .unwrap()
                .0;
        }
    }

    fn wait_tags(&self) {
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped && guard.tags.len() >= self.config.max_requests {
            guard = self
                .condition
                .wait_timeout_while(guard, self.config.throttle_wait, |g| !g.stopped)
                .unwrap()
                .0;
        }
    }

    fn wait_available_channel(&self) -> Option<Arc<ChannelInfo>> {
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped {
            if let Some(channel) = guard.scoring.channel() {
                return Some(channel);
            }
            guard = self
                .condition
                .wait_timeout_while(guard, self.config.throttle_wait, |g| !g.stopped)
                .unwrap()
                .0;
        }
        None
    }

    fn wait_available_account(&self) -> Account {
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped {
            let account = guard.available_account(&self.stats, &self.database_limiter);
            if !account.is_zero() {
                guard.accounts.timestamp(&account, false);
                return account;
            }
            guard = self
                .condition
                .wait_timeout_while(guard, Duration::from_millis(100), |g| !g.stopped)
                .unwrap()
                .0;
        }
        Account::zero()
    }

    fn wait_available_dependency(&self) -> BlockHash {
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped {
            let dependency = guard.accounts.next_blocking();
            if !dependency.is_zero() {
                self.stats
                    .inc(StatType::Bootstrap, DetailType::NextDependency);
                return dependency;
            }
            guard = self
                .condition
                .wait_timeout_while(guard, Duration::from_millis(100), |g| !g.stopped)
                .unwrap()
                .0;
        }
        BlockHash::zero()
    }

    fn run_one_priority(&self) -> bool {
        // Ensure there is room in the block processor for the pulled blocks
        self.wait_blockprocessor();
        self.wait_tags();

        let Some(channel) = self.wait_available_channel() else {
            return false;
        };

        let account = self.wait_available_account();
        if account.is_zero() {
            return false;
        }

        self.request(account, &channel)
    }

    fn run_priorities(&self) {
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped {
            drop(guard);
            self.stats.inc(StatType::Bootstrap, DetailType::Loop);
            self.run_one_priority();
            guard = self.mutex.lock().unwrap();
            guard = self.throttle_if_needed(guard);
        }
    }

    fn throttle_if_needed<'a>(
        &'a self,
        guard: MutexGuard<'a, BootstrapServiceImpl>,
    ) -> MutexGuard<'a, BootstrapServiceImpl> {
        // Never throttle while the database scan is still warming up
        if guard.database_scan.warmed_up() && guard.throttle.throttled() {
            self.stats.inc(StatType::Bootstrap, DetailType::Throttled);
            self.condition
                .wait_timeout_while(guard, self.config.throttle_wait, |g| !g.stopped)
                .unwrap()
                .0
        } else {
            guard
        }
    }

    fn run_one_dependency(&self) -> bool {
        self.wait_blockprocessor();
        self.wait_tags();

        let Some(channel) = self.wait_available_channel() else {
            return false;
        };

        let dependency = self.wait_available_dependency();
        if dependency.is_zero() {
            return false;
        }

        self.request_info(dependency, &channel)
    }

    fn run_dependencies(&self) {
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped {
            drop(guard);
            self.stats
                .inc(StatType::Bootstrap, DetailType::LoopDependencies);
            self.run_one_dependency();
            guard = self.mutex.lock().unwrap();
        }
    }

    fn run_timeouts(&self) {
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped {
            drop(guard);
            self.timeouts_pass();
            guard = self.mutex.lock().unwrap();
            guard = self
                .condition
                .wait_timeout_while(guard, Duration::from_secs(1), |g| !g.stopped)
                .unwrap()
                .0;
        }
    }

    /// One tick of the timeouts worker: reconcile peer scores, adapt the
    /// throttle to ledger growth and expire overdue tags
    fn timeouts_pass(&self) {
        let expired = {
            let mut guard = self.mutex.lock().unwrap();
            guard
                .scoring
                .sync(&self.network.list(self.config.min_protocol_version));
            guard.scoring.timeout();
            guard
                .throttle
                .resize(compute_throttle_size(&self.ledger, &self.config));
            guard.tags.expire(self.clock.now(), self.config.timeout)
        };

        for tag in &expired {
            self.stats.inc(StatType::Bootstrap, DetailType::Timeout);
            self.on_timeout.notify(tag);
        }
    }

    fn batch_processed(&self, batch: &[(BlockStatus, Arc<BlockContext>)]) {
        {
            let mut guard = self.mutex.lock().unwrap();
            let tx = self.ledger.read_txn();
            for (status, context) in batch {
                guard.inspect(&tx, *status, context);
            }
        }
        self.condition.notify_all();
    }
}

impl Drop for BootstrapService {
    fn drop(&mut self) {
        // All workers must be joined before destruction
        debug_assert!(self.priorities_thread.lock().unwrap().is_none());
        debug_assert!(self.dependencies_thread.lock().unwrap().is_none());
        debug_assert!(self.timeout_thread.lock().unwrap().is_none());
    }
}

pub trait BootstrapServiceExt {
    fn start(&self);
}

impl BootstrapServiceExt for Arc<BootstrapService> {
    fn start(&self) {
        debug_assert!(self.priorities_thread.lock().unwrap().is_none());
        debug_assert!(self.dependencies_thread.lock().unwrap().is_none());
        debug_assert!(self.timeout_thread.lock().unwrap().is_none());

        let self_w = Arc::downgrade(self);
        let handle = self
            .block_processor
            .add_batch_processed_observer(Box::new(move |batch| {
                if let Some(self_l) = self_w.upgrade() {
                    self_l.batch_processed(batch);
                }
            }));
        *self.batch_observer.lock().unwrap() = Some(handle);

        let self_l = Arc::clone(self);
        *self.priorities_thread.lock().unwrap() = Some(
            std::thread::Builder::new()
                .name("Bootstrap".to_string())
                .spawn(move || self_l.run_priorities())
                .unwrap(),
        );

        let self_l = Arc::clone(self);
        *self.dependencies_thread.lock().unwrap() = Some(
            std::thread::Builder::new()
                .name("Bootstrap deps".to_string())
                .spawn(move || self_l.run_dependencies())
                .unwrap(),
        );

        let self_l = Arc::clone(self);
        *self.timeout_thread.lock().unwrap() = Some(
            std::thread::Builder::new()
                .name("Bootstrap time".to_string())
                .spawn(move || self_l.run_timeouts())
                .unwrap(),
        );
    }
}

struct BootstrapServiceImpl {
    stopped: bool,
    accounts: AccountSets,
    scoring: PeerScoring,
    database_scan: DatabaseScan,
    tags: OrderedTags,
    throttle: Throttle,
}

impl BootstrapServiceImpl {
    fn available_account(&mut self, stats: &Stats, database_limiter: &RateLimiter) -> Account {
        {
            let account = self.accounts.next_priority();
            if !account.is_zero() {
                stats.inc(StatType::Bootstrap, DetailType::NextPriority);
                return account;
            }
        }

        if database_limiter.should_pass(1) {
            let Self {
                accounts,
                database_scan,
                ..
            } = self;
            let account =
                database_scan.next(|a| !accounts.prioritized(a) && !accounts.blocked(a));
            if !account.is_zero() {
                stats.inc(StatType::Bootstrap, DetailType::NextDatabase);
                return account;
            }
        }

        stats.inc(StatType::Bootstrap, DetailType::NextNone);
        Account::zero()
    }

    /// Feedback from the block processor:
    /// - progress unblocks and boosts the account, and for sends opens the
    ///   destination chain
    /// - gap_source parks the account on the missing dependency
    fn inspect(&mut self, tx: &LedgerReadTxn, status: BlockStatus, context: &BlockContext) {
        let block = &context.block;
        let hash = block.hash();

        match status {
            BlockStatus::Progress => {
                let saved = context.saved_block.lock().unwrap().clone();
                let Some(saved) = saved else {
                    debug_assert!(false, "progress without saved block");
                    return;
                };
                let account = saved.account;

                // Inserting any block into an account unmarks it as blocked
                self.accounts.unblock(account, None);
                self.accounts.priority_up(&account);
                self.accounts.timestamp(&account, /* reset */ true);

                if block.is_send() {
                    if let Some(destination) = block.destination() {
                        // Unblocking inserts the destination into the
                        // priority set, pulling chains we learn about from
                        // send blocks
                        self.accounts.unblock(destination, Some(hash));
                        self.accounts.priority_up(&destination);
                    }
                }
            }
            BlockStatus::GapSource => {
                let account = if block.previous().is_zero() {
                    block.account_field().unwrap_or_default()
                } else {
                    tx.block_account(&block.previous()).unwrap_or_default()
                };
                if account.is_zero() {
                    debug_assert!(false, "gap_source with unknown account");
                    return;
                }
                let source = block.source_or_link();

                // No point pulling this account until the source arrives
                self.accounts.block(account, source);
            }
            BlockStatus::Old | BlockStatus::GapPrevious => {}
            _ => {}
        }
    }
}

fn compute_throttle_size(ledger: &Ledger, config: &BootstrapConfig) -> usize {
    // Scales with the square root of the ledger so large ledgers tolerate
    // longer unproductive streaks before backing off
    let size = config.throttle_coefficient * sqrt(ledger.block_count()) as usize;
    std::cmp::max(size, 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_processing::BlockProcessor;
    use opal_core::{AccountInfo, Amount, Block, OpenBlock, SendBlock};
    use opal_ledger::SavedBlock;
    use opal_network::TEST_ENDPOINT_1;
    use std::time::Instant;

    struct TestContext {
        service: Arc<BootstrapService>,
        publisher: MessagePublisher,
        network: Arc<Network>,
        stats: Arc<Stats>,
        clock: Arc<SteadyClock>,
        ledger: Arc<Ledger>,
        block_processor: Arc<BlockProcessor>,
    }

    fn test_context() -> TestContext {
        test_context_with(Ledger::new_null(), BootstrapConfig::default())
    }

    fn test_context_with(ledger: Ledger, config: BootstrapConfig) -> TestContext {
        let ledger = Arc::new(ledger);
        let stats = Arc::new(Stats::default());
        let clock = Arc::new(SteadyClock::new_null());
        let network = Arc::new(Network::new());
        let block_processor = Arc::new(BlockProcessor::new_test_instance(Arc::clone(&ledger)));
        let publisher = MessagePublisher::new(Arc::clone(&network));
        let service = Arc::new(BootstrapService::new(
            Arc::clone(&block_processor),
            Arc::clone(&ledger),
            Arc::clone(&stats),
            Arc::clone(&network),
            Arc::clone(&clock),
            publisher.clone(),
            config,
        ));
        TestContext {
            service,
            publisher,
            network,
            stats,
            clock,
            ledger,
            block_processor,
        }
    }

    fn progress_context(block: Block, account: Account) -> BlockContext {
        let context = BlockContext::new(block.clone(), BlockSource::Bootstrap, ChannelId::LOOPBACK);
        *context.saved_block.lock().unwrap() = Some(SavedBlock {
            hash: block.hash(),
            account,
            balance: Amount::zero(),
            height: 2,
            block,
        });
        context
    }

    fn track_tag(ctx: &TestContext, tag: AsyncTag) {
        ctx.service.mutex.lock().unwrap().tags.insert(tag);
    }

    #[test]
    fn fresh_account_discovery() {
        let mut config = BootstrapConfig::default();
        config.account_sets.consideration_count = 64;
        let ctx = test_context_with(Ledger::new_null(), config);
        let account = Account::from(1);
        let destination = Account::from(2);

        let send = Block::Send(SendBlock {
            previous: BlockHash::from(100),
            destination,
            balance: Amount::zero(),
        });
        let context = progress_context(send, account);

        let mut guard = ctx.service.mutex.lock().unwrap();
        let tx = ctx.ledger.read_txn();
        guard.inspect(&tx, BlockStatus::Progress, &context);

        assert_eq!(guard.accounts.priority(&account), 2.0);
        assert_eq!(guard.accounts.priority(&destination), 2.0);
        assert_eq!(guard.accounts.blocked_len(), 0);

        // Both accounts are handed out, in some order
        let first = guard.accounts.next_priority();
        assert!(!first.is_zero());
        guard.accounts.timestamp(&first, false);
        let second = guard.accounts.next_priority();
        assert!(!second.is_zero());
        assert_ne!(first, second);
        assert!([account, destination].contains(&first));
        assert!([account, destination].contains(&second));
    }

    #[test]
    fn send_to_unknown_account_opens_recipient() {
        let ctx = test_context();
        let destination = Account::from(7);

        let send = Block::Send(SendBlock {
            previous: BlockHash::from(100),
            destination,
            balance: Amount::zero(),
        });
        let context = progress_context(send, Account::from(1));

        let mut guard = ctx.service.mutex.lock().unwrap();
        let tx = ctx.ledger.read_txn();
        guard.inspect(&tx, BlockStatus::Progress, &context);

        assert!(guard.accounts.prioritized(&destination));
    }

    #[test]
    fn send_unblocks_waiting_destination() {
        let ctx = test_context();
        let destination = Account::from(7);

        let send = Block::Send(SendBlock {
            previous: BlockHash::from(100),
            destination,
            balance: Amount::zero(),
        });
        let hash = send.hash();
        let context = progress_context(send, Account::from(1));

        let mut guard = ctx.service.mutex.lock().unwrap();
        guard.accounts.block(destination, hash);

        let tx = ctx.ledger.read_txn();
        guard.inspect(&tx, BlockStatus::Progress, &context);

        assert!(!guard.accounts.blocked(&destination));
        assert!(guard.accounts.prioritized(&destination));
    }

    #[test]
    fn gap_source_blocks_account() {
        let account = Account::from(3);
        let missing_source = BlockHash::from(4);
        let ctx = test_context();

        // An open block missing its source; the account comes from the
        // block itself
        let open = Block::Open(OpenBlock {
            source: missing_source,
            representative: Account::from(1),
            account,
        });
        let context = BlockContext::new(open, BlockSource::Bootstrap, ChannelId::LOOPBACK);

        let mut guard = ctx.service.mutex.lock().unwrap();
        let tx = ctx.ledger.read_txn();
        guard.inspect(&tx, BlockStatus::GapSource, &context);

        assert!(guard.accounts.blocked(&account));
        assert!(!guard.accounts.prioritized(&account));
        assert_eq!(guard.accounts.next_blocking(), missing_source);
    }

    #[test]
    fn gap_source_resolves_account_through_ledger() {
        let account = Account::from(3);
        let head = BlockHash::from(100);
        let ledger = Ledger::new_null_builder()
            .account(
                account,
                AccountInfo {
                    head,
                    open_block: head,
                    block_count: 1,
                    balance: Amount::raw(10),
                },
            )
            .block(SavedBlock {
                block: Block::Open(OpenBlock {
                    source: BlockHash::from(99),
                    representative: account,
                    account,
                }),
                hash: head,
                account,
                balance: Amount::raw(10),
                height: 1,
            })
            .finish();
        let ctx = test_context_with(ledger, BootstrapConfig::default());

        let missing_source = BlockHash::from(5);
        let receive = Block::Receive(opal_core::ReceiveBlock {
            previous: head,
            source: missing_source,
        });
        let context = BlockContext::new(receive, BlockSource::Bootstrap, ChannelId::LOOPBACK);

        let mut guard = ctx.service.mutex.lock().unwrap();
        let tx = ctx.ledger.read_txn();
        guard.inspect(&tx, BlockStatus::GapSource, &context);

        assert!(guard.accounts.blocked(&account));
    }

    #[test]
    fn nothing_new_throttling() {
        let ctx = test_context();
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);
        ctx.service
            .mutex
            .lock()
            .unwrap()
            .scoring
            .sync(&ctx.network.list(0));

        for i in 0..32u64 {
            let account = Account::from(i + 1);
            {
                let mut guard = ctx.service.mutex.lock().unwrap();
                guard.accounts.priority_up(&account);
            }

            // The peer acknowledges the head we already have
            let head = Block::Send(SendBlock {
                previous: BlockHash::from(1000 + i),
                destination: Account::from(99),
                balance: Amount::zero(),
            });
            track_tag(
                &ctx,
                AsyncTag {
                    id: i,
                    query_type: QueryType::BlocksByHash,
                    start: HashOrAccount::from(head.hash()),
                    account,
                    timestamp: ctx.clock.now(),
                },
            );
            let response = PullResponse {
                id: i,
                payload: PullResponsePayload::Blocks(BlocksAckPayload::new(vec![head])),
            };
            ctx.service.process(&response, channel.channel_id());
        }

        assert_eq!(
            ctx.stats
                .count(StatType::Bootstrap, DetailType::NothingNew, Direction::In),
            32
        );
        let guard = ctx.service.mutex.lock().unwrap();
        assert_eq!(guard.throttle.successes(), 0);
        assert!(guard.throttle.throttled());
        // Every account was halved from 2.0 to the cutoff and erased
        assert_eq!(guard.accounts.priority_len(), 0);
    }

    #[test]
    fn broken_chain_is_rejected() {
        let ctx = test_context();
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);
        let account = Account::from(1);

        let b0 = Block::Send(SendBlock {
            previous: BlockHash::from(100),
            destination: Account::from(2),
            balance: Amount::zero(),
        });
        let b1 = Block::Send(SendBlock {
            previous: BlockHash::from(12345), // not b0.hash()
            destination: Account::from(2),
            balance: Amount::zero(),
        });

        track_tag(
            &ctx,
            AsyncTag {
                id: 1,
                query_type: QueryType::BlocksByHash,
                start: HashOrAccount::from(b0.hash()),
                account,
                timestamp: ctx.clock.now(),
            },
        );
        let response = PullResponse {
            id: 1,
            payload: PullResponsePayload::Blocks(BlocksAckPayload::new(vec![b0, b1])),
        };
        ctx.service.process(&response, channel.channel_id());

        assert_eq!(
            ctx.stats
                .count(StatType::Bootstrap, DetailType::Invalid, Direction::In),
            1
        );
        // Nothing was forwarded to the block processor and no priorities
        // were touched
        assert_eq!(ctx.block_processor.total_queue_len(), 0);
        assert_eq!(ctx.service.priority_len(), 0);
        let guard = ctx.service.mutex.lock().unwrap();
        assert_eq!(guard.throttle.len(), 0);
    }

    #[test]
    fn valid_chain_feeds_block_processor() {
        let ctx = test_context();
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);

        let b0 = Block::Send(SendBlock {
            previous: BlockHash::from(100),
            destination: Account::from(2),
            balance: Amount::raw(5),
        });
        let b1 = Block::Send(SendBlock {
            previous: b0.hash(),
            destination: Account::from(3),
            balance: Amount::raw(4),
        });

        track_tag(
            &ctx,
            AsyncTag {
                id: 1,
                query_type: QueryType::BlocksByHash,
                start: HashOrAccount::from(b0.hash()),
                account: Account::from(1),
                timestamp: ctx.clock.now(),
            },
        );
        let response = PullResponse {
            id: 1,
            payload: PullResponsePayload::Blocks(BlocksAckPayload::new(vec![b0, b1])),
        };
        ctx.service.process(&response, channel.channel_id());

        assert_eq!(ctx.block_processor.total_queue_len(), 2);
        let guard = ctx.service.mutex.lock().unwrap();
        assert_eq!(guard.throttle.successes(), 1);
    }

    #[test]
    fn blocks_by_account_requires_matching_open() {
        let ctx = test_context();
        let account = Account::from(1);

        let tag = AsyncTag {
            id: 1,
            query_type: QueryType::BlocksByAccount,
            start: HashOrAccount::from(account),
            account,
            timestamp: ctx.clock.now(),
        };

        // First block belongs to a different account
        let wrong = Block::Open(OpenBlock {
            source: BlockHash::from(9),
            representative: account,
            account: Account::from(2),
        });
        let follow_up = Block::Send(SendBlock {
            previous: wrong.hash(),
            destination: Account::from(3),
            balance: Amount::zero(),
        });
        let payload = BlocksAckPayload::new(vec![wrong, follow_up]);
        assert!(matches!(
            ctx.service.verify(&payload, &tag),
            VerifyResult::Invalid
        ));

        // And one that matches
        let open = Block::Open(OpenBlock {
            source: BlockHash::from(9),
            representative: account,
            account,
        });
        let follow_up = Block::Send(SendBlock {
            previous: open.hash(),
            destination: Account::from(3),
            balance: Amount::zero(),
        });
        let payload = BlocksAckPayload::new(vec![open, follow_up]);
        assert!(matches!(ctx.service.verify(&payload, &tag), VerifyResult::Ok));
    }

    #[test]
    fn empty_blocks_response_is_nothing_new() {
        let ctx = test_context();
        let tag = AsyncTag {
            id: 1,
            query_type: QueryType::BlocksByAccount,
            start: HashOrAccount::from(Account::from(1)),
            account: Account::from(1),
            timestamp: ctx.clock.now(),
        };
        let payload = BlocksAckPayload::new(Vec::new());
        assert!(matches!(
            ctx.service.verify(&payload, &tag),
            VerifyResult::NothingNew
        ));
    }

    #[test]
    fn account_info_reply_prioritizes_owner() {
        let ctx = test_context();
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);
        let owner = Account::from(42);

        track_tag(
            &ctx,
            AsyncTag {
                id: 5,
                query_type: QueryType::AccountInfoByHash,
                start: HashOrAccount::from(BlockHash::from(17)),
                account: Account::zero(),
                timestamp: ctx.clock.now(),
            },
        );
        let response = PullResponse {
            id: 5,
            payload: PullResponsePayload::AccountInfo(AccountInfoAckPayload {
                account: owner,
                account_open: BlockHash::from(1),
                account_head: BlockHash::from(2),
                account_block_count: 2,
            }),
        };
        ctx.service.process(&response, channel.channel_id());

        assert!(ctx.service.mutex.lock().unwrap().accounts.prioritized(&owner));
        assert_eq!(
            ctx.stats
                .count(StatType::Bootstrap, DetailType::AccountInfo, Direction::In),
            1
        );
    }

    #[test]
    fn empty_account_info_reply_changes_nothing() {
        let ctx = test_context();
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);

        track_tag(
            &ctx,
            AsyncTag {
                id: 5,
                query_type: QueryType::AccountInfoByHash,
                start: HashOrAccount::from(BlockHash::from(17)),
                account: Account::zero(),
                timestamp: ctx.clock.now(),
            },
        );
        let response = PullResponse {
            id: 5,
            payload: PullResponsePayload::AccountInfo(AccountInfoAckPayload::default()),
        };
        ctx.service.process(&response, channel.channel_id());

        assert_eq!(ctx.service.priority_len(), 0);
        assert_eq!(
            ctx.stats.count(
                StatType::Bootstrap,
                DetailType::AccountInfoEmpty,
                Direction::In
            ),
            1
        );
    }

    #[test]
    fn tag_expires_and_late_reply_is_dropped() {
        let ctx = test_context();
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);

        let expired_tags = Arc::new(Mutex::new(Vec::new()));
        let expired_l = Arc::clone(&expired_tags);
        ctx.service.on_timeout(move |tag| {
            expired_l.lock().unwrap().push(tag.id);
        });

        track_tag(
            &ctx,
            AsyncTag {
                id: 9,
                query_type: QueryType::BlocksByAccount,
                start: HashOrAccount::from(Account::from(1)),
                account: Account::from(1),
                timestamp: ctx.clock.now(),
            },
        );
        assert_eq!(ctx.service.request_len(), 1);

        ctx.clock
            .advance(BootstrapConfig::default().timeout + Duration::from_secs(1));
        ctx.service.timeouts_pass();

        assert_eq!(ctx.service.request_len(), 0);
        assert_eq!(*expired_tags.lock().unwrap(), vec![9]);
        assert_eq!(
            ctx.stats
                .count(StatType::Bootstrap, DetailType::Timeout, Direction::In),
            1
        );

        // The reply still arrives, but its tag is gone
        let response = PullResponse {
            id: 9,
            payload: PullResponsePayload::Blocks(BlocksAckPayload::new(Vec::new())),
        };
        ctx.service.process(&response, channel.channel_id());
        assert_eq!(
            ctx.stats
                .count(StatType::Bootstrap, DetailType::MissingTag, Direction::In),
            1
        );
    }

    #[test]
    fn young_tags_survive_the_timeouts_pass() {
        let ctx = test_context();
        track_tag(
            &ctx,
            AsyncTag {
                id: 9,
                query_type: QueryType::BlocksByAccount,
                start: HashOrAccount::from(Account::from(1)),
                account: Account::from(1),
                timestamp: ctx.clock.now(),
            },
        );
        ctx.clock.advance(Duration::from_secs(1));
        ctx.service.timeouts_pass();
        assert_eq!(ctx.service.request_len(), 1);
    }

    #[test]
    fn frontiers_reply_reaches_subscribers() {
        let ctx = test_context();
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_l = Arc::clone(&received);
        ctx.service.on_frontiers(move |frontiers| {
            received_l.lock().unwrap().extend(frontiers.iter().copied());
        });

        track_tag(
            &ctx,
            AsyncTag {
                id: 3,
                query_type: QueryType::BlocksByAccount,
                start: HashOrAccount::from(Account::from(1)),
                account: Account::from(1),
                timestamp: ctx.clock.now(),
            },
        );
        let response = PullResponse {
            id: 3,
            payload: PullResponsePayload::Frontiers(vec![Frontier::new(
                Account::from(1),
                BlockHash::from(2),
            )]),
        };
        ctx.service.process(&response, channel.channel_id());

        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn request_pulls_by_hash_for_known_accounts() {
        let account = Account::from(1);
        let head = BlockHash::from(100);
        let ledger = Ledger::new_null_builder()
            .account(
                account,
                AccountInfo {
                    head,
                    open_block: head,
                    block_count: 1,
                    balance: Amount::raw(10),
                },
            )
            .finish();
        let ctx = test_context_with(ledger, BootstrapConfig::default());
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);

        assert!(ctx.service.request(account, &channel));

        let sent = ctx.publisher.take_sent(channel.channel_id());
        assert_eq!(sent.len(), 1);
        let Message::PullRequest(request) = &sent[0] else {
            panic!("expected a pull request");
        };
        let PullRequestType::Blocks(payload) = &request.req_type else {
            panic!("expected a blocks request");
        };
        assert_eq!(payload.start, HashOrAccount::from(head));
        assert_eq!(payload.start_type, HashType::Block);
        assert!(ctx.service.mutex.lock().unwrap().tags.contains(request.id));
    }

    #[test]
    fn request_pulls_by_account_for_unknown_accounts() {
        let ctx = test_context();
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);
        let account = Account::from(1);

        assert!(ctx.service.request(account, &channel));

        let sent = ctx.publisher.take_sent(channel.channel_id());
        let Message::PullRequest(request) = &sent[0] else {
            panic!("expected a pull request");
        };
        let PullRequestType::Blocks(payload) = &request.req_type else {
            panic!("expected a blocks request");
        };
        assert_eq!(payload.start, HashOrAccount::from(account));
        assert_eq!(payload.start_type, HashType::Account);
    }

    #[test]
    fn request_info_queries_by_dependency_hash() {
        let ctx = test_context();
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);
        let dependency = BlockHash::from(77);

        assert!(ctx.service.request_info(dependency, &channel));

        let sent = ctx.publisher.take_sent(channel.channel_id());
        let Message::PullRequest(request) = &sent[0] else {
            panic!("expected a pull request");
        };
        let PullRequestType::AccountInfo(payload) = &request.req_type else {
            panic!("expected an account info request");
        };
        assert_eq!(payload.target, HashOrAccount::from(dependency));
        assert_eq!(payload.target_type, HashType::Block);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let ctx = test_context();
        ctx.service.start();
        ctx.service.stop();
        ctx.service.stop();
    }

    #[test]
    fn pulls_database_accounts_end_to_end() {
        // A populated ledger, one peer and running workers: the service
        // must come up with a pull request on its own
        let account = Account::from(1);
        let head = BlockHash::from(100);
        let ledger = Ledger::new_null_builder()
            .account(
                account,
                AccountInfo {
                    head,
                    open_block: head,
                    block_count: 1,
                    balance: Amount::raw(10),
                },
            )
            .finish();
        let ctx = test_context_with(ledger, BootstrapConfig::default());
        let channel = ctx.network.add(TEST_ENDPOINT_1, 0x14);

        ctx.service.start();

        let start = Instant::now();
        loop {
            let requests = ctx
                .stats
                .count(StatType::Bootstrap, DetailType::Request, Direction::Out);
            if requests > 0 {
                break;
            }
            assert!(
                start.elapsed() < Duration::from_secs(5),
                "no request was sent"
            );
            std::thread::sleep(Duration::from_millis(10));
        }

        ctx.service.stop();
        let sent = ctx.publisher.take_sent(channel.channel_id());
        assert!(!sent.is_empty());
    }
}

use crate::stats::{DetailType, StatType, Stats};
use opal_core::Block;
use opal_ledger::{BlockStatus, Ledger, SavedBlock};
use opal_network::ChannelId;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread::JoinHandle,
};
use tracing::{debug, trace};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockSource {
    Live,
    Bootstrap,
    Local,
}

impl From<BlockStatus> for DetailType {
    fn from(value: BlockStatus) -> Self {
        match value {
            BlockStatus::Progress => DetailType::Progress,
            BlockStatus::Old => DetailType::Old,
            BlockStatus::Fork => DetailType::Fork,
            BlockStatus::GapPrevious => DetailType::GapPrevious,
            BlockStatus::GapSource => DetailType::GapSource,
            BlockStatus::Unreceivable => DetailType::Unreceivable,
            BlockStatus::NegativeSpend => DetailType::NegativeSpend,
            BlockStatus::BalanceMismatch => DetailType::BalanceMismatch,
        }
    }
}

/// A block queued for processing together with where it came from
pub struct BlockContext {
    pub block: Block,
    pub source: BlockSource,
    pub channel_id: ChannelId,
    /// Chain state attached once the block was inserted successfully
    pub saved_block: Mutex<Option<SavedBlock>>,
}

impl BlockContext {
    pub fn new(block: Block, source: BlockSource, channel_id: ChannelId) -> Self {
        Self {
            block,
            source,
            channel_id,
            saved_block: Mutex::new(None),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockProcessorConfig {
    /// Maximum number of blocks to queue from network peers
    pub max_peer_queue: usize,
    /// Maximum number of blocks to queue from system components (bootstrap, local)
    pub max_system_queue: usize,
    pub batch_size: usize,
}

impl Default for BlockProcessorConfig {
    fn default() -> Self {
        Self {
            max_peer_queue: 128,
            max_system_queue: 16 * 1024,
            batch_size: 256,
        }
    }
}

type BatchProcessedCallback = Box<dyn Fn(&[(BlockStatus, Arc<BlockContext>)]) + Send + Sync>;

/// Identifies a registered observer so it can be removed again
#[derive(PartialEq, Eq, Debug)]
pub struct ObserverHandle(u64);

/// Processes queued blocks against the ledger on a dedicated thread and
/// notifies batch observers with the results
pub struct BlockProcessor {
    thread: Mutex<Option<JoinHandle<()>>>,
    processor_loop: Arc<BlockProcessorLoop>,
}

impl BlockProcessor {
    pub fn new(config: BlockProcessorConfig, ledger: Arc<Ledger>, stats: Arc<Stats>) -> Self {
        Self {
            thread: Mutex::new(None),
            processor_loop: Arc::new(BlockProcessorLoop {
                mutex: Mutex::new(BlockProcessorImpl {
                    queue: VecDeque::new(),
                    queued_per_source: [0; SOURCE_COUNT],
                    stopped: false,
                }),
                condition: Condvar::new(),
                ledger,
                stats,
                config,
                batch_processed: Mutex::new(Vec::new()),
                next_observer_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn new_test_instance(ledger: Arc<Ledger>) -> Self {
        Self::new(
            BlockProcessorConfig::default(),
            ledger,
            Arc::new(Stats::default()),
        )
    }

    pub fn start(&self) {
        debug_assert!(self.thread.lock().unwrap().is_none());
        let processor_loop = Arc::clone(&self.processor_loop);
        *self.thread.lock().unwrap() = Some(
            std::thread::Builder::new()
                .name("Blck processing".to_string())
                .spawn(move || processor_loop.run())
                .unwrap(),
        );
    }

    pub fn stop(&self) {
        self.processor_loop.mutex.lock().unwrap().stopped = true;
        self.processor_loop.condition.notify_all();
        let handle = self.thread.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.join().unwrap();
        }
    }

    /// Returns false when the queue for this source is full
    pub fn add(&self, block: Block, source: BlockSource, channel_id: ChannelId) -> bool {
        self.processor_loop.add(block, source, channel_id)
    }

    pub fn queue_len(&self, source: BlockSource) -> usize {
        self.processor_loop.mutex.lock().unwrap().queue_len(source)
    }

    pub fn total_queue_len(&self) -> usize {
        self.processor_loop.mutex.lock().unwrap().queue.len()
    }

    pub fn add_batch_processed_observer(&self, observer: BatchProcessedCallback) -> ObserverHandle {
        let id = self
            .processor_loop
            .next_observer_id
            .fetch_add(1, Ordering::SeqCst);
        self.processor_loop
            .batch_processed
            .lock()
            .unwrap()
            .push((id, observer));
        ObserverHandle(id)
    }

    pub fn remove_batch_processed_observer(&self, handle: ObserverHandle) {
        self.processor_loop
            .batch_processed
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != handle.0);
    }
}

impl Drop for BlockProcessor {
    fn drop(&mut self) {
        // Thread must be stopped before destruction
        debug_assert!(self.thread.lock().unwrap().is_none());
    }
}

const SOURCE_COUNT: usize = 3;

fn source_index(source: BlockSource) -> usize {
    match source {
        BlockSource::Live => 0,
        BlockSource::Bootstrap => 1,
        BlockSource::Local => 2,
    }
}

struct BlockProcessorLoop {
    mutex: Mutex<BlockProcessorImpl>,
    condition: Condvar,
    ledger: Arc<Ledger>,
    stats: Arc<Stats>,
    config: BlockProcessorConfig,
    batch_processed: Mutex<Vec<(u64, BatchProcessedCallback)>>,
    next_observer_id: AtomicU64,
}

struct BlockProcessorImpl {
    queue: VecDeque<Arc<BlockContext>>,
    queued_per_source: [usize; SOURCE_COUNT],
    stopped: bool,
}

impl BlockProcessorImpl {
    fn queue_len(&self, source: BlockSource) -> usize {
        self.queued_per_source[source_index(source)]
    }
}

impl BlockProcessorLoop {
    fn add(&self, block: Block, source: BlockSource, channel_id: ChannelId) -> bool {
        let max_queue = match source {
            BlockSource::Live => self.config.max_peer_queue,
            BlockSource::Bootstrap | BlockSource::Local => self.config.max_system_queue,
        };

        {
            let mut guard = self.mutex.lock().unwrap();
            if guard.queue_len(source) >= max_queue {
                self.stats.inc(StatType::BlockProcessor, DetailType::Overfill);
                return false;
            }
            guard
                .queue
                .push_back(Arc::new(BlockContext::new(block, source, channel_id)));
            guard.queued_per_source[source_index(source)] += 1;
        }
        self.condition.notify_one();
        true
    }

    fn run(&self) {
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped {
            if !guard.queue.is_empty() {
                let batch = self.next_batch(&mut guard);
                drop(guard);

                trace!(len = batch.len(), "Processing block batch");
                let processed = self.process_batch(batch);
                self.notify_batch_processed(&processed);

                guard = self.mutex.lock().unwrap();
            } else {
                guard = self.condition.wait(guard).unwrap();
            }
        }
    }

    fn next_batch(
        &self,
        guard: &mut MutexGuard<BlockProcessorImpl>,
    ) -> Vec<Arc<BlockContext>> {
        let count = std::cmp::min(guard.queue.len(), self.config.batch_size);
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            let context = guard.queue.pop_front().unwrap();
            guard.queued_per_source[source_index(context.source)] -= 1;
            batch.push(context);
        }
        batch
    }

    fn process_batch(
        &self,
        batch: Vec<Arc<BlockContext>>,
    ) -> Vec<(BlockStatus, Arc<BlockContext>)> {
        let mut tx = self.ledger.write_txn();
        let mut processed = Vec::with_capacity(batch.len());
        for context in batch {
            let status = match self.ledger.process(&mut tx, &context.block) {
                Ok(saved) => {
                    *context.saved_block.lock().unwrap() = Some(saved);
                    BlockStatus::Progress
                }
                Err(status) => {
                    debug!(hash = %context.block.hash(), ?status, "Block not processed");
                    status
                }
            };
            self.stats
                .inc(StatType::BlockProcessor, DetailType::from(status));
            processed.push((status, context));
        }
        processed
    }

    fn notify_batch_processed(&self, processed: &[(BlockStatus, Arc<BlockContext>)]) {
        let observers = self.batch_processed.lock().unwrap();
        for (_, observer) in observers.iter() {
            observer(processed);
        }
    }
}

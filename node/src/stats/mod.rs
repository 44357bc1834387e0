mod stats_enums;
pub use stats_enums::{DetailType, Direction, Sample, StatType};

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{atomic::AtomicU64, atomic::Ordering, Mutex, RwLock},
};
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub struct StatsConfig {
    /// Maximum number of samples to keep per sampler
    pub max_samples: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { max_samples: 1024 }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct CounterKey {
    stat_type: StatType,
    detail: DetailType,
    dir: Direction,
}

impl CounterKey {
    fn new(stat_type: StatType, detail: DetailType, dir: Direction) -> Self {
        Self {
            stat_type,
            detail,
            dir,
        }
    }
}

#[derive(Default)]
struct CounterEntry(AtomicU64);

impl CounterEntry {
    fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

struct SamplerEntry {
    samples: Mutex<VecDeque<i64>>,
    max_samples: usize,
    /// Hint for presentation layers
    pub expected_min_max: (i64, i64),
}

impl SamplerEntry {
    fn new(max_samples: usize, expected_min_max: (i64, i64)) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            max_samples,
            expected_min_max,
        }
    }

    fn add(&self, value: i64) {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() >= self.max_samples {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    fn collect(&self) -> Vec<i64> {
        let mut samples = self.samples.lock().unwrap();
        samples.drain(..).collect()
    }
}

/// Fire-and-forget counters and histograms keyed by (type, detail, direction)
pub struct Stats {
    counters: RwLock<BTreeMap<CounterKey, CounterEntry>>,
    samplers: RwLock<BTreeMap<Sample, SamplerEntry>>,
    config: StatsConfig,
    enable_logging: bool,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new(StatsConfig::default())
    }
}

impl Stats {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            samplers: RwLock::new(BTreeMap::new()),
            config,
            enable_logging: std::env::var("OPAL_LOG_STATS").is_ok(),
        }
    }

    pub fn inc(&self, stat_type: StatType, detail: DetailType) {
        self.add_dir(stat_type, detail, Direction::In, 1)
    }

    pub fn inc_dir(&self, stat_type: StatType, detail: DetailType, dir: Direction) {
        self.add_dir(stat_type, detail, dir, 1)
    }

    pub fn add(&self, stat_type: StatType, detail: DetailType, value: u64) {
        self.add_dir(stat_type, detail, Direction::In, value)
    }

    pub fn add_dir(&self, stat_type: StatType, detail: DetailType, dir: Direction, value: u64) {
        if value == 0 {
            return;
        }

        if self.enable_logging {
            debug!("Stat: {:?}::{:?}::{:?} += {}", stat_type, detail, dir, value);
        }

        let key = CounterKey::new(stat_type, detail, dir);

        // Two-step to avoid exclusively locking in the common case
        {
            let lock = self.counters.read().unwrap();
            if let Some(counter) = lock.get(&key) {
                counter.add(value);
                return;
            }
        }
        {
            let mut lock = self.counters.write().unwrap();
            lock.entry(key).or_default().add(value);
        }
    }

    pub fn sample(&self, sample: Sample, value: i64, expected_min_max: (i64, i64)) {
        {
            let lock = self.samplers.read().unwrap();
            if let Some(sampler) = lock.get(&sample) {
                sampler.add(value);
                return;
            }
        }
        {
            let mut lock = self.samplers.write().unwrap();
            lock.entry(sample)
                .or_insert_with(|| SamplerEntry::new(self.config.max_samples, expected_min_max))
                .add(value);
        }
    }

    pub fn count(&self, stat_type: StatType, detail: DetailType, dir: Direction) -> u64 {
        self.counters
            .read()
            .unwrap()
            .get(&CounterKey::new(stat_type, detail, dir))
            .map(|c| c.count())
            .unwrap_or_default()
    }

    /// The (min, max) hint the sampler was created with
    pub fn sample_range(&self, sample: Sample) -> Option<(i64, i64)> {
        self.samplers
            .read()
            .unwrap()
            .get(&sample)
            .map(|s| s.expected_min_max)
    }

    /// Removes and returns the accumulated samples
    pub fn samples(&self, sample: Sample) -> Vec<i64> {
        self.samplers
            .read()
            .unwrap()
            .get(&sample)
            .map(|s| s.collect())
            .unwrap_or_default()
    }
}

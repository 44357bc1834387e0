use super::{
    ordered_blocking::{BlockingEntry, OrderedBlocking},
    ordered_priorities::{ChangePriorityResult, OrderedPriorities, PriorityEntry},
    priority::Priority,
};
use crate::stats::{DetailType, StatType, Stats};
use opal_core::{Account, BlockHash};
use opal_nullable_clock::SteadyClock;
use rand::{thread_rng, Rng};
use std::{sync::Arc, time::Duration};

#[derive(Clone, Debug, PartialEq)]
pub struct AccountSetsConfig {
    /// Number of weighted draws per selection before giving up on finding
    /// an account outside its cooldown
    pub consideration_count: usize,
    pub priorities_max: usize,
    pub blocking_max: usize,
    /// Wait before the same account can be handed out again
    pub cooldown: Duration,
}

impl Default for AccountSetsConfig {
    fn default() -> Self {
        Self {
            consideration_count: 4,
            priorities_max: 256 * 1024,
            blocking_max: 256 * 1024,
            cooldown: Duration::from_secs(3),
        }
    }
}

/// Shared working set of the bootstrap threads: accounts worth pulling and
/// accounts parked on a missing dependency. An account is in at most one of
/// the two sets at any time.
pub struct AccountSets {
    stats: Arc<Stats>,
    clock: Arc<SteadyClock>,
    config: AccountSetsConfig,
    priorities: OrderedPriorities,
    blocking: OrderedBlocking,
}

impl AccountSets {
    pub const PRIORITY_INITIAL: Priority = Priority::new(2.0);
    pub const PRIORITY_INCREASE: f64 = 1.0;
    pub const PRIORITY_MAX: Priority = Priority::new(32.0);
    pub const PRIORITY_CUTOFF: Priority = Priority::new(1.0);

    pub fn new(stats: Arc<Stats>, clock: Arc<SteadyClock>, config: AccountSetsConfig) -> Self {
        Self {
            stats,
            clock,
            config,
            priorities: OrderedPriorities::default(),
            blocking: OrderedBlocking::default(),
        }
    }

    pub fn priority_up(&mut self, account: &Account) {
        if self.blocked(account) {
            // Remember the boost for when the dependency resolves
            self.blocking.change_original_priority(account, |prio| {
                Self::clamp(Priority::new(prio.as_f64() + Self::PRIORITY_INCREASE))
            });
            self.stats
                .inc(StatType::BootstrapAccountSets, DetailType::Prioritize);
            return;
        }

        match self.priorities.change_priority(account, |prio| {
            Some(Self::clamp(Priority::new(
                prio.as_f64() + Self::PRIORITY_INCREASE,
            )))
        }) {
            ChangePriorityResult::Updated => {
                self.stats
                    .inc(StatType::BootstrapAccountSets, DetailType::Prioritize);
            }
            ChangePriorityResult::NotFound => {
                if self.priorities.len() < self.config.priorities_max {
                    self.priorities
                        .insert(PriorityEntry::new(*account, Self::PRIORITY_INITIAL));
                    self.stats
                        .inc(StatType::BootstrapAccountSets, DetailType::PriorityInsert);
                } else {
                    self.stats.inc(
                        StatType::BootstrapAccountSets,
                        DetailType::PriorityInsertFailed,
                    );
                }
            }
            ChangePriorityResult::Deleted => unreachable!(),
        }
    }

    pub fn priority_down(&mut self, account: &Account) {
        let result = self.priorities.change_priority(account, |prio| {
            let halved = prio.halved();
            if halved <= Self::PRIORITY_CUTOFF {
                None
            } else {
                Some(halved)
            }
        });
        match result {
            ChangePriorityResult::Updated => {
                self.stats
                    .inc(StatType::BootstrapAccountSets, DetailType::Deprioritize);
            }
            ChangePriorityResult::Deleted => {
                self.stats
                    .inc(StatType::BootstrapAccountSets, DetailType::Deprioritize);
                self.stats.inc(
                    StatType::BootstrapAccountSets,
                    DetailType::PriorityEraseThreshold,
                );
            }
            ChangePriorityResult::NotFound => {
                self.stats.inc(
                    StatType::BootstrapAccountSets,
                    DetailType::DeprioritizeFailed,
                );
            }
        }
    }

    /// Parks the account until `dependency` is processed. The current
    /// priority is carried over and restored on unblock.
    pub fn block(&mut self, account: Account, dependency: BlockHash) {
        self.stats
            .inc(StatType::BootstrapAccountSets, DetailType::Block);

        let entry = self
            .priorities
            .remove(&account)
            .unwrap_or_else(|| PriorityEntry::new(account, Self::PRIORITY_CUTOFF));
        self.stats
            .inc(StatType::BootstrapAccountSets, DetailType::PriorityEraseBlock);

        if self.blocking.len() >= self.config.blocking_max && !self.blocking.contains(&account) {
            // Full; the account is dropped and will be rediscovered later
            self.stats
                .inc(StatType::BootstrapAccountSets, DetailType::BlockingOverflow);
            return;
        }

        self.blocking.insert(BlockingEntry {
            account,
            dependency,
            original_entry: entry,
        });
        self.stats
            .inc(StatType::BootstrapAccountSets, DetailType::BlockingInsert);
    }

    /// Moves the account back into the priority set, but only if `hash` is
    /// absent or matches the awaited dependency
    pub fn unblock(&mut self, account: Account, hash: Option<BlockHash>) {
        if let Some(existing) = self.blocking.get(&account) {
            let hash_matches = hash.map(|h| h == existing.dependency).unwrap_or(true);
            if hash_matches {
                debug_assert!(!self.priorities.contains(&account));
                let entry = self.blocking.remove(&account).unwrap();
                if self.priorities.len() < self.config.priorities_max {
                    self.priorities.insert(entry.original_entry);
                } else {
                    self.stats.inc(
                        StatType::BootstrapAccountSets,
                        DetailType::PriorityInsertFailed,
                    );
                }
                self.stats
                    .inc(StatType::BootstrapAccountSets, DetailType::Unblock);
                return;
            }
        }
        self.stats
            .inc(StatType::BootstrapAccountSets, DetailType::UnblockFailed);
    }

    /// reset = true clears the cooldown, reset = false starts it
    pub fn timestamp(&mut self, account: &Account, reset: bool) {
        let timestamp = if reset { None } else { Some(self.clock.now()) };
        self.priorities.change_timestamp(account, timestamp);
    }

    /// Weighted random selection over the priority set, restricted to
    /// accounts outside their cooldown. Zero when nothing is eligible.
    pub fn next_priority(&self) -> Account {
        if self.priorities.is_empty() {
            return Account::zero();
        }

        let now = self.clock.now();
        let mut rng = thread_rng();
        for _ in 0..self.config.consideration_count {
            let total = self.priorities.total_weight();
            if total <= 0.0 {
                break;
            }
            let target = rng.gen_range(0.0..total);
            let Some(entry) = self.priorities.weighted_sample(target) else {
                break;
            };
            let cooled_down = entry
                .timestamp
                .map(|ts| ts.elapsed(now) >= self.config.cooldown)
                .unwrap_or(true);
            if cooled_down {
                return entry.account;
            }
        }

        Account::zero()
    }

    /// Uniform random draw over the awaited dependency hashes; zero if the
    /// blocking set is empty
    pub fn next_blocking(&self) -> BlockHash {
        if self.blocking.is_empty() {
            return BlockHash::zero();
        }
        let index = thread_rng().gen_range(0..self.blocking.len());
        self.blocking
            .sample(index)
            .map(|entry| entry.dependency)
            .unwrap_or_default()
    }

    pub fn blocked(&self, account: &Account) -> bool {
        self.blocking.contains(account)
    }

    pub fn prioritized(&self, account: &Account) -> bool {
        self.priorities.contains(account)
    }

    pub fn priority_len(&self) -> usize {
        self.priorities.len()
    }

    pub fn blocked_len(&self) -> usize {
        self.blocking.len()
    }

    /// Current priority of an account, the cutoff base value when untracked
    /// and zero while blocked
    pub fn priority(&self, account: &Account) -> f64 {
        if self.blocked(account) {
            return 0.0;
        }
        match self.priorities.get(account) {
            Some(entry) => entry.priority.as_f64(),
            None => Self::PRIORITY_CUTOFF.as_f64(),
        }
    }

    fn clamp(priority: Priority) -> Priority {
        std::cmp::min(priority, Self::PRIORITY_MAX)
    }
}

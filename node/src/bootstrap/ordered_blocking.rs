use super::{ordered_priorities::PriorityEntry, priority::Priority};
use opal_core::{Account, BlockHash};
use std::collections::HashMap;

/// An account that cannot make progress until `dependency` arrives
#[derive(Clone, Debug)]
pub struct BlockingEntry {
    pub account: Account,
    pub dependency: BlockHash,
    /// Priority state restored when the account is unblocked
    pub original_entry: PriorityEntry,
}

/// Accounts parked on a missing dependency, with uniform random draws over
/// the dependency hashes
#[derive(Default)]
pub struct OrderedBlocking {
    by_account: HashMap<Account, BlockingEntry>,
    sequenced: Vec<Account>,
}

impl OrderedBlocking {
    pub fn len(&self) -> usize {
        self.sequenced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequenced.is_empty()
    }

    pub fn contains(&self, account: &Account) -> bool {
        self.by_account.contains_key(account)
    }

    pub fn get(&self, account: &Account) -> Option<&BlockingEntry> {
        self.by_account.get(account)
    }

    /// Inserts or overwrites the entry for `entry.account`
    pub fn insert(&mut self, entry: BlockingEntry) {
        let account = entry.account;
        if self.by_account.insert(account, entry).is_none() {
            self.sequenced.push(account);
        }
    }

    pub fn remove(&mut self, account: &Account) -> Option<BlockingEntry> {
        let entry = self.by_account.remove(account)?;
        // Draw order does not matter, so a swap remove is fine
        if let Some(position) = self.sequenced.iter().position(|a| a == account) {
            self.sequenced.swap_remove(position);
        }
        Some(entry)
    }

    pub fn change_original_priority(
        &mut self,
        account: &Account,
        f: impl FnOnce(Priority) -> Priority,
    ) -> bool {
        match self.by_account.get_mut(account) {
            Some(entry) => {
                entry.original_entry.priority = f(entry.original_entry.priority);
                true
            }
            None => false,
        }
    }

    /// Entry at `index` in draw order; callers pick the index at random
    pub fn sample(&self, index: usize) -> Option<&BlockingEntry> {
        let account = self.sequenced.get(index)?;
        self.by_account.get(account)
    }
}

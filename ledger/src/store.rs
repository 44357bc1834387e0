use opal_core::{Account, AccountInfo, Amount, Block, BlockHash, PendingInfo, PendingKey};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{RwLockReadGuard, RwLockWriteGuard},
};

/// A block together with the chain state derived when it was inserted
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SavedBlock {
    pub block: Block,
    pub hash: BlockHash,
    pub account: Account,
    pub balance: Amount,
    pub height: u64,
}

impl SavedBlock {
    pub fn new_test_instance() -> Self {
        let block = Block::new_test_instance();
        Self {
            hash: block.hash(),
            account: Account::from(500),
            balance: Amount::raw(3),
            height: 2,
            block,
        }
    }
}

#[derive(Default)]
pub(crate) struct StoreInner {
    pub accounts: BTreeMap<Account, AccountInfo>,
    pub blocks: HashMap<BlockHash, SavedBlock>,
    pub pending: BTreeMap<PendingKey, PendingInfo>,
}

impl StoreInner {
    fn block_account(&self, hash: &BlockHash) -> Option<Account> {
        self.blocks.get(hash).map(|b| b.account)
    }
}

/// Snapshot view of the store. All reads made through one transaction are
/// consistent with each other.
pub struct LedgerReadTxn<'a> {
    pub(crate) store: RwLockReadGuard<'a, StoreInner>,
}

impl<'a> LedgerReadTxn<'a> {
    pub fn account_info(&self, account: &Account) -> Option<AccountInfo> {
        self.store.accounts.get(account).cloned()
    }

    pub fn block(&self, hash: &BlockHash) -> Option<SavedBlock> {
        self.store.blocks.get(hash).cloned()
    }

    pub fn block_exists(&self, hash: &BlockHash) -> bool {
        self.store.blocks.contains_key(hash)
    }

    pub fn block_account(&self, hash: &BlockHash) -> Option<Account> {
        self.store.block_account(hash)
    }

    pub fn pending_exists(&self, key: &PendingKey) -> bool {
        self.store.pending.contains_key(key)
    }

    /// Accounts in key order starting at `start` (inclusive)
    pub fn accounts_range(
        &self,
        start: Account,
    ) -> impl Iterator<Item = (&Account, &AccountInfo)> + '_ {
        self.store.accounts.range(start..)
    }

    /// Receivable entries in key order starting at `start` (inclusive)
    pub fn pending_range(
        &self,
        start: PendingKey,
    ) -> impl Iterator<Item = (&PendingKey, &PendingInfo)> + '_ {
        self.store.pending.range(start..)
    }
}

pub struct LedgerWriteTxn<'a> {
    pub(crate) store: RwLockWriteGuard<'a, StoreInner>,
}

impl<'a> LedgerWriteTxn<'a> {
    pub fn account_info(&self, account: &Account) -> Option<AccountInfo> {
        self.store.accounts.get(account).cloned()
    }

    pub fn block(&self, hash: &BlockHash) -> Option<SavedBlock> {
        self.store.blocks.get(hash).cloned()
    }

    pub fn block_exists(&self, hash: &BlockHash) -> bool {
        self.store.blocks.contains_key(hash)
    }

    pub fn pending(&self, key: &PendingKey) -> Option<PendingInfo> {
        self.store.pending.get(key).cloned()
    }

    pub(crate) fn insert_block(&mut self, saved: SavedBlock) {
        self.store.blocks.insert(saved.hash, saved);
    }

    pub(crate) fn set_account_info(&mut self, account: Account, info: AccountInfo) {
        self.store.accounts.insert(account, info);
    }

    pub(crate) fn insert_pending(&mut self, key: PendingKey, info: PendingInfo) {
        self.store.pending.insert(key, info);
    }

    pub(crate) fn remove_pending(&mut self, key: &PendingKey) -> Option<PendingInfo> {
        self.store.pending.remove(key)
    }
}

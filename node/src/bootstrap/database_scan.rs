use opal_core::{Account, BlockHash, PendingKey};
use opal_ledger::{Ledger, LedgerReadTxn};
use std::{collections::VecDeque, sync::Arc};

const BATCH_SIZE: usize = 512;

/// Secondary source of accounts to pull, used when the priority set runs
/// dry. Walks the account and pending tables in key order and wraps around
/// at the end. Each refill uses a single read transaction.
pub struct DatabaseScan {
    queue: VecDeque<Account>,
    accounts_iterator: AccountDatabaseIterator,
    pending_iterator: PendingDatabaseIterator,
    ledger: Arc<Ledger>,
}

impl DatabaseScan {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            queue: VecDeque::new(),
            accounts_iterator: AccountDatabaseIterator::new(),
            pending_iterator: PendingDatabaseIterator::new(),
            ledger,
        }
    }

    pub fn next(&mut self, filter: impl Fn(&Account) -> bool) -> Account {
        if self.queue.is_empty() {
            self.fill();
        }

        while let Some(result) = self.queue.pop_front() {
            if filter(&result) {
                return result;
            }
        }

        Account::zero()
    }

    /// False until both table walks completed a full cycle. Used to
    /// suppress throttling during initial catch-up.
    pub fn warmed_up(&self) -> bool {
        self.accounts_iterator.warmed_up() && self.pending_iterator.warmed_up()
    }

    fn fill(&mut self) {
        let tx = self.ledger.read_txn();
        let batch1 = self.accounts_iterator.next_batch(&tx, BATCH_SIZE / 2);
        let batch2 = self.pending_iterator.next_batch(&tx, BATCH_SIZE / 2);
        self.queue.extend(batch1);
        self.queue.extend(batch2);
    }
}

struct AccountDatabaseIterator {
    next: Account,
    completed: usize,
}

impl AccountDatabaseIterator {
    fn new() -> Self {
        Self {
            next: Account::zero(),
            completed: 0,
        }
    }

    fn next_batch(&mut self, tx: &LedgerReadTxn, batch_size: usize) -> Vec<Account> {
        let mut result = Vec::new();
        let mut end_reached = true;
        for (account, _) in tx.accounts_range(self.next) {
            if result.len() >= batch_size {
                end_reached = false;
                break;
            }
            result.push(*account);
            self.next = account.inc().unwrap_or_default();
        }

        if end_reached {
            // Wrap around for the next ledger iteration
            self.next = Account::zero();
            self.completed += 1;
        }
        result
    }

    fn warmed_up(&self) -> bool {
        self.completed > 0
    }
}

struct PendingDatabaseIterator {
    next: PendingKey,
    completed: usize,
}

impl PendingDatabaseIterator {
    fn new() -> Self {
        Self {
            next: PendingKey::default(),
            completed: 0,
        }
    }

    fn next_batch(&mut self, tx: &LedgerReadTxn, batch_size: usize) -> Vec<Account> {
        let mut result = Vec::new();
        let mut it = tx.pending_range(self.next);
        let mut current = it.next();
        let mut end_reached = true;

        while let Some((key, _)) = current {
            if result.len() >= batch_size {
                end_reached = false;
                break;
            }
            let account = key.receiving_account;
            result.push(account);
            self.next = PendingKey::new(account.inc().unwrap_or_default(), BlockHash::zero());

            // Skip the remaining receivables of this account
            current = it.next();
            while let Some((next_key, _)) = current {
                if next_key.receiving_account != account {
                    break;
                }
                current = it.next();
            }
        }

        if end_reached {
            // Wrap around for the next ledger iteration
            self.next = PendingKey::default();
            self.completed += 1;
        }
        result
    }

    fn warmed_up(&self) -> bool {
        self.completed > 0
    }
}

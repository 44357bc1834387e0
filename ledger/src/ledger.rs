use crate::{
    store::StoreInner, BlockStatus, LedgerReadTxn, LedgerWriteTxn, SavedBlock,
};
use opal_core::{Account, AccountInfo, Block, BlockHash, PendingInfo, PendingKey};
use std::sync::RwLock;

/// In-memory ledger: account, block and receivable tables plus the rules
/// for applying new blocks
pub struct Ledger {
    store: RwLock<StoreInner>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(StoreInner::default()),
        }
    }

    pub fn new_null() -> Self {
        Self::new()
    }

    pub fn new_null_builder() -> NullLedgerBuilder {
        NullLedgerBuilder {
            inner: StoreInner::default(),
        }
    }

    pub fn read_txn(&self) -> LedgerReadTxn<'_> {
        LedgerReadTxn {
            store: self.store.read().unwrap(),
        }
    }

    pub fn write_txn(&self) -> LedgerWriteTxn<'_> {
        LedgerWriteTxn {
            store: self.store.write().unwrap(),
        }
    }

    pub fn block_count(&self) -> u64 {
        self.store.read().unwrap().blocks.len() as u64
    }

    pub fn account_count(&self) -> u64 {
        self.store.read().unwrap().accounts.len() as u64
    }

    /// Applies `block` to the ledger. Mutations happen only when the result
    /// is `Ok`; every error leaves the store untouched.
    pub fn process(
        &self,
        tx: &mut LedgerWriteTxn,
        block: &Block,
    ) -> Result<SavedBlock, BlockStatus> {
        let hash = block.hash();
        if tx.block_exists(&hash) {
            return Err(BlockStatus::Old);
        }

        match block {
            Block::Send(send) => {
                let prev = tx.block(&send.previous).ok_or(BlockStatus::GapPrevious)?;
                let info = tx
                    .account_info(&prev.account)
                    .ok_or(BlockStatus::GapPrevious)?;
                if info.head != send.previous {
                    return Err(BlockStatus::Fork);
                }
                let amount = prev
                    .balance
                    .checked_sub(send.balance)
                    .ok_or(BlockStatus::NegativeSpend)?;

                let saved = SavedBlock {
                    block: block.clone(),
                    hash,
                    account: prev.account,
                    balance: send.balance,
                    height: prev.height + 1,
                };
                tx.insert_block(saved.clone());
                tx.set_account_info(
                    prev.account,
                    AccountInfo {
                        head: hash,
                        open_block: info.open_block,
                        block_count: info.block_count + 1,
                        balance: send.balance,
                    },
                );
                tx.insert_pending(
                    PendingKey::new(send.destination, hash),
                    PendingInfo::new(prev.account, amount),
                );
                Ok(saved)
            }
            Block::Receive(receive) => {
                let prev = tx
                    .block(&receive.previous)
                    .ok_or(BlockStatus::GapPrevious)?;
                let info = tx
                    .account_info(&prev.account)
                    .ok_or(BlockStatus::GapPrevious)?;
                if info.head != receive.previous {
                    return Err(BlockStatus::Fork);
                }
                if !tx.block_exists(&receive.source) {
                    return Err(BlockStatus::GapSource);
                }
                let key = PendingKey::new(prev.account, receive.source);
                let pending = tx.pending(&key).ok_or(BlockStatus::Unreceivable)?;
                let balance = prev
                    .balance
                    .checked_add(pending.amount)
                    .ok_or(BlockStatus::BalanceMismatch)?;

                let saved = SavedBlock {
                    block: block.clone(),
                    hash,
                    account: prev.account,
                    balance,
                    height: prev.height + 1,
                };
                tx.remove_pending(&key);
                tx.insert_block(saved.clone());
                tx.set_account_info(
                    prev.account,
                    AccountInfo {
                        head: hash,
                        open_block: info.open_block,
                        block_count: info.block_count + 1,
                        balance,
                    },
                );
                Ok(saved)
            }
            Block::Open(open) => {
                if tx.account_info(&open.account).is_some() {
                    return Err(BlockStatus::Fork);
                }
                if !tx.block_exists(&open.source) {
                    return Err(BlockStatus::GapSource);
                }
                let key = PendingKey::new(open.account, open.source);
                let pending = tx.pending(&key).ok_or(BlockStatus::Unreceivable)?;

                let saved = SavedBlock {
                    block: block.clone(),
                    hash,
                    account: open.account,
                    balance: pending.amount,
                    height: 1,
                };
                tx.remove_pending(&key);
                tx.insert_block(saved.clone());
                tx.set_account_info(
                    open.account,
                    AccountInfo {
                        head: hash,
                        open_block: hash,
                        block_count: 1,
                        balance: pending.amount,
                    },
                );
                Ok(saved)
            }
            Block::Change(change) => {
                let prev = tx.block(&change.previous).ok_or(BlockStatus::GapPrevious)?;
                let info = tx
                    .account_info(&prev.account)
                    .ok_or(BlockStatus::GapPrevious)?;
                if info.head != change.previous {
                    return Err(BlockStatus::Fork);
                }

                let saved = SavedBlock {
                    block: block.clone(),
                    hash,
                    account: prev.account,
                    balance: prev.balance,
                    height: prev.height + 1,
                };
                tx.insert_block(saved.clone());
                tx.set_account_info(
                    prev.account,
                    AccountInfo {
                        head: hash,
                        open_block: info.open_block,
                        block_count: info.block_count + 1,
                        balance: prev.balance,
                    },
                );
                Ok(saved)
            }
        }
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembles a ledger pre-populated with arbitrary table contents, bypassing
/// block validation. Test infrastructure.
pub struct NullLedgerBuilder {
    inner: StoreInner,
}

impl NullLedgerBuilder {
    pub fn account(mut self, account: Account, info: AccountInfo) -> Self {
        self.inner.accounts.insert(account, info);
        self
    }

    pub fn block(mut self, saved: SavedBlock) -> Self {
        self.inner.blocks.insert(saved.hash, saved);
        self
    }

    pub fn pending(mut self, key: PendingKey, info: PendingInfo) -> Self {
        self.inner.pending.insert(key, info);
        self
    }

    pub fn finish(self) -> Ledger {
        Ledger {
            store: RwLock::new(self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::{Amount, OpenBlock, ReceiveBlock, SendBlock};

    fn seeded_ledger() -> (Ledger, Account, BlockHash) {
        // One account with a single open-equivalent block as its head
        let account = Account::from(1);
        let head = BlockHash::from(100);
        let saved = SavedBlock {
            block: Block::Open(OpenBlock {
                source: BlockHash::from(99),
                representative: Account::from(1),
                account,
            }),
            hash: head,
            account,
            balance: Amount::raw(1000),
            height: 1,
        };
        let ledger = Ledger::new_null_builder()
            .account(
                account,
                AccountInfo {
                    head,
                    open_block: head,
                    block_count: 1,
                    balance: Amount::raw(1000),
                },
            )
            .block(saved)
            .finish();
        (ledger, account, head)
    }

    #[test]
    fn process_send_progress() {
        let (ledger, account, head) = seeded_ledger();
        let send = Block::Send(SendBlock {
            previous: head,
            destination: Account::from(2),
            balance: Amount::raw(400),
        });

        let mut tx = ledger.write_txn();
        let saved = ledger.process(&mut tx, &send).unwrap();

        assert_eq!(saved.account, account);
        assert_eq!(saved.height, 2);
        assert_eq!(saved.balance, Amount::raw(400));
        assert_eq!(tx.account_info(&account).unwrap().head, send.hash());
        assert_eq!(
            tx.pending(&PendingKey::new(Account::from(2), send.hash())),
            Some(PendingInfo::new(account, Amount::raw(600)))
        );
    }

    #[test]
    fn process_send_twice_is_old() {
        let (ledger, _, head) = seeded_ledger();
        let send = Block::Send(SendBlock {
            previous: head,
            destination: Account::from(2),
            balance: Amount::raw(400),
        });

        let mut tx = ledger.write_txn();
        ledger.process(&mut tx, &send).unwrap();
        assert_eq!(ledger.process(&mut tx, &send), Err(BlockStatus::Old));
    }

    #[test]
    fn process_gap_previous() {
        let (ledger, _, _) = seeded_ledger();
        let send = Block::Send(SendBlock {
            previous: BlockHash::from(7777),
            destination: Account::from(2),
            balance: Amount::raw(400),
        });

        let mut tx = ledger.write_txn();
        assert_eq!(ledger.process(&mut tx, &send), Err(BlockStatus::GapPrevious));
    }

    #[test]
    fn process_negative_spend() {
        let (ledger, _, head) = seeded_ledger();
        let send = Block::Send(SendBlock {
            previous: head,
            destination: Account::from(2),
            balance: Amount::raw(2000),
        });

        let mut tx = ledger.write_txn();
        assert_eq!(
            ledger.process(&mut tx, &send),
            Err(BlockStatus::NegativeSpend)
        );
    }

    #[test]
    fn process_open_gap_source() {
        let (ledger, _, _) = seeded_ledger();
        let open = Block::Open(OpenBlock {
            source: BlockHash::from(12345),
            representative: Account::from(3),
            account: Account::from(3),
        });

        let mut tx = ledger.write_txn();
        assert_eq!(ledger.process(&mut tx, &open), Err(BlockStatus::GapSource));
    }

    #[test]
    fn process_send_then_open_destination() {
        let (ledger, _, head) = seeded_ledger();
        let destination = Account::from(2);
        let send = Block::Send(SendBlock {
            previous: head,
            destination,
            balance: Amount::raw(400),
        });
        let open = Block::Open(OpenBlock {
            source: send.hash(),
            representative: destination,
            account: destination,
        });

        let mut tx = ledger.write_txn();
        ledger.process(&mut tx, &send).unwrap();
        let saved = ledger.process(&mut tx, &open).unwrap();

        assert_eq!(saved.balance, Amount::raw(600));
        assert_eq!(saved.height, 1);
        assert!(tx.pending(&PendingKey::new(destination, send.hash())).is_none());
    }

    #[test]
    fn process_receive_unreceivable() {
        let (ledger, account, head) = seeded_ledger();
        // Source exists but nothing is pending for this account
        let receive = Block::Receive(ReceiveBlock {
            previous: head,
            source: head,
        });

        let mut tx = ledger.write_txn();
        assert_eq!(
            ledger.process(&mut tx, &receive),
            Err(BlockStatus::Unreceivable)
        );
        assert_eq!(tx.account_info(&account).unwrap().block_count, 1);
    }

    #[test]
    fn process_fork() {
        let (ledger, _, head) = seeded_ledger();
        let send1 = Block::Send(SendBlock {
            previous: head,
            destination: Account::from(2),
            balance: Amount::raw(400),
        });
        let send2 = Block::Send(SendBlock {
            previous: head,
            destination: Account::from(3),
            balance: Amount::raw(500),
        });

        let mut tx = ledger.write_txn();
        ledger.process(&mut tx, &send1).unwrap();
        assert_eq!(ledger.process(&mut tx, &send2), Err(BlockStatus::Fork));
    }

    #[test]
    fn block_count() {
        let (ledger, _, _) = seeded_ledger();
        assert_eq!(ledger.block_count(), 1);
    }
}

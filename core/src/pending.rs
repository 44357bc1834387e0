use crate::{Account, Amount, BlockHash};

/// Key into the pending (receivable) table. Ordering is account major so
/// that all receivables of one account are adjacent.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct PendingKey {
    pub receiving_account: Account,
    pub send_block_hash: BlockHash,
}

impl PendingKey {
    pub fn new(receiving_account: Account, send_block_hash: BlockHash) -> Self {
        Self {
            receiving_account,
            send_block_hash,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PendingInfo {
    pub source: Account,
    pub amount: Amount,
}

impl PendingInfo {
    pub fn new(source: Account, amount: Amount) -> Self {
        Self { source, amount }
    }
}

use crate::{Amount, BlockHash};

/// Latest state of an account chain as stored in the account table
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct AccountInfo {
    pub head: BlockHash,
    pub open_block: BlockHash,
    pub block_count: u64,
    pub balance: Amount,
}

impl AccountInfo {
    pub fn new_test_instance() -> Self {
        Self {
            head: BlockHash::from(1),
            open_block: BlockHash::from(2),
            block_count: 3,
            balance: Amount::raw(42),
        }
    }
}

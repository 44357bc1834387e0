use opal_core::{Account, Block, BlockHash};

#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct BlocksAckPayload(Vec<Block>);

impl BlocksAckPayload {
    /* Header allows for 16 bit extensions; 65535 bytes / 500 bytes (block size with some future margin) ~ 131 */
    pub const MAX_BLOCKS: usize = 128;

    pub fn new(blocks: Vec<Block>) -> Self {
        debug_assert!(blocks.len() <= Self::MAX_BLOCKS);
        Self(blocks)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.0
    }
}

#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct AccountInfoAckPayload {
    pub account: Account,
    pub account_open: BlockHash,
    pub account_head: BlockHash,
    pub account_block_count: u64,
}

impl AccountInfoAckPayload {
    pub fn new_test_instance() -> Self {
        Self {
            account: Account::from(1),
            account_open: BlockHash::from(2),
            account_head: BlockHash::from(3),
            account_block_count: 4,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Frontier {
    pub account: Account,
    pub hash: BlockHash,
}

impl Frontier {
    pub fn new(account: Account, hash: BlockHash) -> Self {
        Self { account, hash }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PullResponsePayload {
    Blocks(BlocksAckPayload),
    AccountInfo(AccountInfoAckPayload),
    Frontiers(Vec<Frontier>),
    Empty,
}

/// Response to a [`crate::PullRequest`], correlated by `id`
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PullResponse {
    pub id: u64,
    pub payload: PullResponsePayload,
}

impl PullResponse {
    pub fn new_test_instance_blocks() -> Self {
        Self {
            id: 12345,
            payload: PullResponsePayload::Blocks(BlocksAckPayload(vec![
                Block::new_test_instance(),
            ])),
        }
    }

    pub fn new_test_instance_account() -> Self {
        Self {
            id: 12345,
            payload: PullResponsePayload::AccountInfo(AccountInfoAckPayload::new_test_instance()),
        }
    }
}

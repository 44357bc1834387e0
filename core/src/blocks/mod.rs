mod change_block;
mod open_block;
mod receive_block;
mod send_block;

pub use change_block::ChangeBlock;
pub use open_block::OpenBlock;
pub use receive_block::ReceiveBlock;
pub use send_block::SendBlock;

use crate::{Account, Amount, BlockHash};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum BlockType {
    Send,
    Receive,
    Open,
    Change,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Block::Send(_) => BlockType::Send,
            Block::Receive(_) => BlockType::Receive,
            Block::Open(_) => BlockType::Open,
            Block::Change(_) => BlockType::Change,
        }
    }

    pub fn hash(&self) -> BlockHash {
        match self {
            Block::Send(block) => block.hash(),
            Block::Receive(block) => block.hash(),
            Block::Open(block) => block.hash(),
            Block::Change(block) => block.hash(),
        }
    }

    /// Zero for open blocks, which start a chain
    pub fn previous(&self) -> BlockHash {
        match self {
            Block::Send(block) => block.previous,
            Block::Receive(block) => block.previous,
            Block::Open(_) => BlockHash::zero(),
            Block::Change(block) => block.previous,
        }
    }

    /// Only open blocks carry the owning account explicitly
    pub fn account_field(&self) -> Option<Account> {
        match self {
            Block::Open(block) => Some(block.account),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<Account> {
        match self {
            Block::Send(block) => Some(block.destination),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<BlockHash> {
        match self {
            Block::Receive(block) => Some(block.source),
            Block::Open(block) => Some(block.source),
            _ => None,
        }
    }

    /// The block this one depends on besides `previous`; zero when there is none
    pub fn source_or_link(&self) -> BlockHash {
        self.source().unwrap_or_default()
    }

    pub fn balance_field(&self) -> Option<Amount> {
        match self {
            Block::Send(block) => Some(block.balance),
            _ => None,
        }
    }

    pub fn is_send(&self) -> bool {
        matches!(self, Block::Send(_))
    }

    pub fn new_test_instance() -> Self {
        Block::Send(SendBlock {
            previous: BlockHash::from(1),
            destination: Account::from(2),
            balance: Amount::raw(3),
        })
    }
}

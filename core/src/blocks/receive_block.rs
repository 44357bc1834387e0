use crate::{BlockHash, BlockHashBuilder};

/// Credits the owning chain with the amount sent by the `source` block
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReceiveBlock {
    pub previous: BlockHash,
    pub source: BlockHash,
}

impl ReceiveBlock {
    pub fn hash(&self) -> BlockHash {
        BlockHashBuilder::new()
            .update(self.previous.as_bytes())
            .update(self.source.as_bytes())
            .build()
    }
}

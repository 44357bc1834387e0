use crate::{Account, BlockHash, BlockHashBuilder};

/// First block of an account chain. Receives the `source` block.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OpenBlock {
    pub source: BlockHash,
    pub representative: Account,
    pub account: Account,
}

impl OpenBlock {
    pub fn hash(&self) -> BlockHash {
        BlockHashBuilder::new()
            .update(self.source.as_bytes())
            .update(self.representative.as_bytes())
            .update(self.account.as_bytes())
            .build()
    }
}

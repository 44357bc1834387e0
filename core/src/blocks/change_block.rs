use crate::{Account, BlockHash, BlockHashBuilder};

/// Changes the representative of the owning chain
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChangeBlock {
    pub previous: BlockHash,
    pub representative: Account,
}

impl ChangeBlock {
    pub fn hash(&self) -> BlockHash {
        BlockHashBuilder::new()
            .update(self.previous.as_bytes())
            .update(self.representative.as_bytes())
            .build()
    }
}

use crate::{Account, Amount, BlockHash, BlockHashBuilder};

/// Debits the owning chain and makes the amount receivable by `destination`.
/// `balance` is the balance of the chain after the debit.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SendBlock {
    pub previous: BlockHash,
    pub destination: Account,
    pub balance: Amount,
}

impl SendBlock {
    pub fn hash(&self) -> BlockHash {
        BlockHashBuilder::new()
            .update(self.previous.as_bytes())
            .update(self.destination.as_bytes())
            .update(self.balance.number().to_be_bytes())
            .build()
    }
}

/// Outcome of processing one block against the ledger
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockStatus {
    /// Block was inserted
    Progress,
    /// Block is already in the ledger
    Old,
    /// Previous block exists but is not the head of its chain
    Fork,
    /// Previous block is not in the ledger yet
    GapPrevious,
    /// Source block of a receive or open is not in the ledger yet
    GapSource,
    /// Source block exists but there is no matching receivable entry
    Unreceivable,
    /// Send block does not leave a non-negative balance
    NegativeSpend,
    /// Resulting balance does not add up
    BalanceMismatch,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum StatType {
    Bootstrap,
    BootstrapAccountSets,
    BlockProcessor,
    Message,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum DetailType {
    // bootstrap
    Loop,
    LoopDependencies,
    Request,
    RequestBlocks,
    RequestAccountInfo,
    Reply,
    Process,
    Track,
    Timeout,
    Throttled,
    MissingTag,
    NothingNew,
    Invalid,
    Blocks,
    AccountInfo,
    AccountInfoEmpty,
    Frontiers,
    EmptyPayload,
    NextPriority,
    NextDatabase,
    NextDependency,
    NextNone,

    // bootstrap account sets
    Prioritize,
    Deprioritize,
    DeprioritizeFailed,
    PriorityInsert,
    PriorityEraseThreshold,
    PriorityEraseBlock,
    PriorityInsertFailed,
    Block,
    BlockingInsert,
    BlockingOverflow,
    Unblock,
    UnblockFailed,

    // block processor
    Progress,
    Old,
    Fork,
    GapPrevious,
    GapSource,
    Unreceivable,
    NegativeSpend,
    BalanceMismatch,
    Overfill,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Direction {
    In,
    Out,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Sample {
    BootstrapTagDuration,
}

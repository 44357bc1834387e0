use opal_core::HashOrAccount;

/// Disambiguates what the 32 byte `start`/`target` field contains
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HashType {
    Account,
    Block,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlocksReqPayload {
    pub start: HashOrAccount,
    pub start_type: HashType,
    pub count: u8,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AccountInfoReqPayload {
    pub target: HashOrAccount,
    pub target_type: HashType,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PullRequestType {
    Blocks(BlocksReqPayload),
    AccountInfo(AccountInfoReqPayload),
}

/// Pull request sent to a peer. The peer echoes `id` verbatim in its response.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PullRequest {
    pub id: u64,
    pub req_type: PullRequestType,
}

impl PullRequest {
    pub fn new_test_instance_blocks() -> Self {
        Self {
            id: 12345,
            req_type: PullRequestType::Blocks(BlocksReqPayload {
                start: HashOrAccount::from(1),
                start_type: HashType::Account,
                count: 128,
            }),
        }
    }
}

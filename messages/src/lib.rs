mod pull_req;
pub use pull_req::{AccountInfoReqPayload, BlocksReqPayload, HashType, PullRequest, PullRequestType};

mod pull_ack;
pub use pull_ack::{AccountInfoAckPayload, BlocksAckPayload, Frontier, PullResponse, PullResponsePayload};

/// Framed message as handed to / received from the transport layer.
/// Wire encoding happens in the transport layer and is not modelled here.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Message {
    PullRequest(PullRequest),
    PullResponse(PullResponse),
}

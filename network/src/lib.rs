mod channel_info;
pub use channel_info::{ChannelId, ChannelInfo, WriteQueueAdapter, TEST_ENDPOINT_1};

mod network;
pub use network::Network;

mod token_bucket;
pub use token_bucket::TokenBucket;

mod rate_limiter;
pub use rate_limiter::RateLimiter;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrafficType {
    Generic,
    /// Ascending bootstrap (asc_pull_ack, asc_pull_req) traffic
    Bootstrap,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DropPolicy {
    /// Message will be dropped if the write queue is full
    CanDrop,
    /// Block the sender until there is room in the write queue
    ShouldNotDrop,
}

use crate::TrafficType;
use std::{
    fmt::Display,
    net::{Ipv6Addr, SocketAddrV6},
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ChannelId(usize);

impl ChannelId {
    pub const LOOPBACK: Self = Self(0);
    pub const MIN: Self = Self(usize::MIN);
    pub const MAX: Self = Self(usize::MAX);

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<usize> for ChannelId {
    fn from(value: usize) -> Self {
        ChannelId(value)
    }
}

/// Lets a channel ask the owner of its write queue about backlog without
/// depending on the message layer
pub trait WriteQueueAdapter: Send + Sync {
    fn is_queue_full(&self, traffic_type: TrafficType) -> bool;
}

/// Transport independent information about a peer channel. The actual
/// byte stream is owned by the transport layer.
pub struct ChannelInfo {
    channel_id: ChannelId,
    peer_addr: SocketAddrV6,
    protocol_version: u8,
    closed: AtomicBool,
    write_queue: RwLock<Option<Box<dyn WriteQueueAdapter>>>,
}

pub const TEST_ENDPOINT_1: SocketAddrV6 =
    SocketAddrV6::new(Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0x0a00, 0x0101), 1111, 0, 0);

impl ChannelInfo {
    pub fn new(channel_id: ChannelId, peer_addr: SocketAddrV6, protocol_version: u8) -> Self {
        Self {
            channel_id,
            peer_addr,
            protocol_version,
            closed: AtomicBool::new(false),
            write_queue: RwLock::new(None),
        }
    }

    pub fn new_null() -> Self {
        Self::new_null_with_id(42)
    }

    pub fn new_null_with_id(id: impl Into<ChannelId>) -> Self {
        Self::new(id.into(), TEST_ENDPOINT_1, u8::MAX)
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn peer_addr(&self) -> SocketAddrV6 {
        self.peer_addr
    }

    pub fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    pub fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn set_write_queue(&self, queue: Box<dyn WriteQueueAdapter>) {
        *self.write_queue.write().unwrap() = Some(queue);
    }

    pub fn is_queue_full(&self, traffic_type: TrafficType) -> bool {
        match self.write_queue.read().unwrap().as_ref() {
            Some(queue) => queue.is_queue_full(traffic_type),
            None => false,
        }
    }
}

impl Display for ChannelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.peer_addr.fmt(f)
    }
}

use crate::{ChannelId, ChannelInfo};
use std::{
    collections::HashMap,
    net::SocketAddrV6,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// Registry of the currently connected peer channels
pub struct Network {
    channels: Mutex<HashMap<ChannelId, Arc<ChannelInfo>>>,
    next_channel_id: AtomicUsize,
}

impl Network {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            // LOOPBACK is reserved for blocks the node submits to itself
            next_channel_id: AtomicUsize::new(1),
        }
    }

    pub fn add(&self, peer_addr: SocketAddrV6, protocol_version: u8) -> Arc<ChannelInfo> {
        let id = ChannelId::from(self.next_channel_id.fetch_add(1, Ordering::SeqCst));
        let channel = Arc::new(ChannelInfo::new(id, peer_addr, protocol_version));
        self.channels.lock().unwrap().insert(id, channel.clone());
        channel
    }

    pub fn find(&self, channel_id: ChannelId) -> Option<Arc<ChannelInfo>> {
        self.channels.lock().unwrap().get(&channel_id).cloned()
    }

    /// Live channels speaking at least `min_protocol_version`
    pub fn list(&self, min_protocol_version: u8) -> Vec<Arc<ChannelInfo>> {
        self.channels
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.is_alive() && c.protocol_version() >= min_protocol_version)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops channels whose transport has gone away
    pub fn purge_dead(&self) {
        self.channels.lock().unwrap().retain(|_, c| c.is_alive());
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_info::TEST_ENDPOINT_1;

    #[test]
    fn add_and_list() {
        let network = Network::new();
        let channel = network.add(TEST_ENDPOINT_1, 0x14);
        assert_eq!(network.len(), 1);
        assert_eq!(network.list(0).len(), 1);
        assert_eq!(network.find(channel.channel_id()).unwrap().channel_id(), channel.channel_id());
    }

    #[test]
    fn list_filters_protocol_version() {
        let network = Network::new();
        network.add(TEST_ENDPOINT_1, 0x10);
        network.add(TEST_ENDPOINT_1, 0x14);
        assert_eq!(network.list(0x14).len(), 1);
    }

    #[test]
    fn closed_channels_are_not_listed() {
        let network = Network::new();
        let channel = network.add(TEST_ENDPOINT_1, 0x14);
        channel.close();
        assert!(network.list(0).is_empty());
        network.purge_dead();
        assert!(network.is_empty());
    }
}

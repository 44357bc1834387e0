use opal_messages::Message;
use opal_network::{ChannelId, ChannelInfo, DropPolicy, Network, TrafficType, WriteQueueAdapter};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, Weak},
};
use tracing::debug;

const MAX_QUEUE_SIZE: usize = 128;

/// Queues outbound messages per channel for the transport layer to drain.
/// Cloning yields a handle to the same queues, which tests use to inspect
/// what was published.
#[derive(Clone)]
pub struct MessagePublisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    network: Arc<Network>,
    outboxes: Mutex<HashMap<ChannelId, Arc<Outbox>>>,
}

struct Outbox {
    queue: Mutex<VecDeque<Message>>,
}

impl Outbox {
    fn is_full(&self) -> bool {
        self.queue.lock().unwrap().len() >= MAX_QUEUE_SIZE
    }
}

struct OutboxQueueAdapter(Weak<Outbox>);

impl WriteQueueAdapter for OutboxQueueAdapter {
    fn is_queue_full(&self, _traffic_type: TrafficType) -> bool {
        match self.0.upgrade() {
            Some(outbox) => outbox.is_full(),
            None => true,
        }
    }
}

impl MessagePublisher {
    pub fn new(network: Arc<Network>) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                network,
                outboxes: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn try_send(
        &self,
        channel_id: ChannelId,
        message: &Message,
        drop_policy: DropPolicy,
        traffic_type: TrafficType,
    ) -> bool {
        let Some(channel) = self.inner.network.find(channel_id) else {
            return false;
        };
        if !channel.is_alive() {
            return false;
        }

        let outbox = self.outbox_for(&channel);
        if drop_policy == DropPolicy::CanDrop && outbox.is_full() {
            debug!(%channel_id, ?traffic_type, "Dropping message, write queue full");
            return false;
        }

        outbox.queue.lock().unwrap().push_back(message.clone());
        true
    }

    /// Removes and returns everything queued for `channel_id`
    pub fn take_sent(&self, channel_id: ChannelId) -> Vec<Message> {
        let outboxes = self.inner.outboxes.lock().unwrap();
        match outboxes.get(&channel_id) {
            Some(outbox) => outbox.queue.lock().unwrap().drain(..).collect(),
            None => Vec::new(),
        }
    }

    fn outbox_for(&self, channel: &Arc<ChannelInfo>) -> Arc<Outbox> {
        let mut outboxes = self.inner.outboxes.lock().unwrap();
        outboxes
            .entry(channel.channel_id())
            .or_insert_with(|| {
                let outbox = Arc::new(Outbox {
                    queue: Mutex::new(VecDeque::new()),
                });
                channel.set_write_queue(Box::new(OutboxQueueAdapter(Arc::downgrade(&outbox))));
                outbox
            })
            .clone()
    }
}

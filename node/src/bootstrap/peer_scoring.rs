use super::BootstrapConfig;
use opal_network::{ChannelId, ChannelInfo, TrafficType};
use opal_nullable_clock::{SteadyClock, Timestamp};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Weak},
};

/// Tracks in-flight request counts and responsiveness per peer and selects
/// the channel for the next outbound request
pub struct PeerScoring {
    scoring: Scoring,
    clock: Arc<SteadyClock>,
    config: BootstrapConfig,
}

impl PeerScoring {
    pub fn new(config: BootstrapConfig, clock: Arc<SteadyClock>) -> Self {
        Self {
            scoring: Scoring::default(),
            clock,
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.scoring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scoring.len() == 0
    }

    pub fn received_message(&mut self, channel_id: ChannelId) {
        let now = self.clock.now();
        self.scoring.modify(channel_id, |score| {
            score.outstanding = score.outstanding.saturating_sub(1);
            score.response_count_total += 1;
            score.last_response = now;
        });
    }

    /// Channel with the fewest outstanding requests, most recently
    /// responsive on ties. Channels at the per-channel cap or with a full
    /// send queue are skipped. Reserves one outstanding slot on success.
    pub fn channel(&mut self) -> Option<Arc<ChannelInfo>> {
        let channel = self.next_channel()?;
        self.scoring.modify(channel.channel_id(), |score| {
            score.outstanding += 1;
            score.request_count_total += 1;
        });
        Some(channel)
    }

    fn next_channel(&self) -> Option<Arc<ChannelInfo>> {
        self.scoring
            .buckets_by_outstanding()
            .find_map(|scores| {
                scores
                    .iter()
                    .filter_map(|id| self.scoring.get(*id))
                    .filter(|score| score.outstanding < self.config.requests_limit)
                    .filter_map(|score| {
                        score
                            .channel
                            .upgrade()
                            .map(|channel| (channel, score.last_response))
                    })
                    .filter(|(channel, _)| {
                        channel.is_alive() && !channel.is_queue_full(TrafficType::Bootstrap)
                    })
                    .max_by_key(|(_, last_response)| *last_response)
                    .map(|(channel, _)| channel)
            })
    }

    /// Prunes peers whose channel is gone or that have been silent past the
    /// configured threshold. Pruned peers are re-added by the next sync.
    pub fn timeout(&mut self) {
        let now = self.clock.now();
        let cutoff = self.config.peer_timeout;
        self.scoring
            .retain(|score| score.is_alive() && now - score.last_response <= cutoff);
    }

    /// Reconciles the scoring map with the current live channel set
    pub fn sync(&mut self, channels: &[Arc<ChannelInfo>]) {
        self.scoring
            .retain(|score| channels.iter().any(|c| c.channel_id() == score.channel_id));

        let now = self.clock.now();
        for channel in channels {
            if channel.protocol_version() >= self.config.min_protocol_version
                && !self.scoring.contains(channel.channel_id())
            {
                self.scoring.insert(PeerScore::new(channel, now));
            }
        }
    }
}

struct PeerScore {
    channel_id: ChannelId,
    channel: Weak<ChannelInfo>,
    /// Requests sent but not yet answered
    outstanding: u32,
    last_response: Timestamp,
    request_count_total: u64,
    response_count_total: u64,
}

impl PeerScore {
    fn new(channel: &Arc<ChannelInfo>, now: Timestamp) -> Self {
        Self {
            channel_id: channel.channel_id(),
            channel: Arc::downgrade(channel),
            outstanding: 0,
            last_response: now,
            request_count_total: 0,
            response_count_total: 0,
        }
    }

    fn is_alive(&self) -> bool {
        self.channel
            .upgrade()
            .map(|c| c.is_alive())
            .unwrap_or(false)
    }
}

/// Primary map plus a by-outstanding secondary index, maintained together
/// on every mutation
#[derive(Default)]
struct Scoring {
    by_channel: HashMap<ChannelId, PeerScore>,
    by_outstanding: BTreeMap<u32, Vec<ChannelId>>,
}

impl Scoring {
    fn len(&self) -> usize {
        self.by_channel.len()
    }

    fn get(&self, channel_id: ChannelId) -> Option<&PeerScore> {
        self.by_channel.get(&channel_id)
    }

    fn contains(&self, channel_id: ChannelId) -> bool {
        self.by_channel.contains_key(&channel_id)
    }

    fn insert(&mut self, score: PeerScore) {
        let channel_id = score.channel_id;
        let outstanding = score.outstanding;
        if let Some(old) = self.by_channel.insert(channel_id, score) {
            self.remove_outstanding(channel_id, old.outstanding);
        }
        self.insert_outstanding(channel_id, outstanding);
    }

    fn modify(&mut self, channel_id: ChannelId, f: impl FnOnce(&mut PeerScore)) {
        if let Some(score) = self.by_channel.get_mut(&channel_id) {
            let old_outstanding = score.outstanding;
            f(score);
            let new_outstanding = score.outstanding;
            if new_outstanding != old_outstanding {
                self.remove_outstanding(channel_id, old_outstanding);
                self.insert_outstanding(channel_id, new_outstanding);
            }
        }
    }

    fn retain(&mut self, f: impl Fn(&PeerScore) -> bool) {
        let to_delete: Vec<ChannelId> = self
            .by_channel
            .values()
            .filter(|score| !f(score))
            .map(|score| score.channel_id)
            .collect();
        for channel_id in to_delete {
            if let Some(score) = self.by_channel.remove(&channel_id) {
                self.remove_outstanding(channel_id, score.outstanding);
            }
        }
    }

    /// Score buckets in ascending outstanding order
    fn buckets_by_outstanding(&self) -> impl Iterator<Item = &Vec<ChannelId>> {
        self.by_outstanding.values()
    }

    fn insert_outstanding(&mut self, channel_id: ChannelId, outstanding: u32) {
        self.by_outstanding
            .entry(outstanding)
            .or_default()
            .push(channel_id);
    }

    fn remove_outstanding(&mut self, channel_id: ChannelId, outstanding: u32) {
        let ids = self.by_outstanding.get_mut(&outstanding).unwrap();
        if ids.len() > 1 {
            ids.retain(|id| *id != channel_id);
        } else {
            self.by_outstanding.remove(&outstanding);
        }
    }
}

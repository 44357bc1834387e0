use opal_core::{Account, HashOrAccount};
use opal_nullable_clock::Timestamp;
use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

#[derive(Default, PartialEq, Eq, Debug, Clone, Copy)]
pub enum QueryType {
    #[default]
    Invalid,
    BlocksByHash,
    BlocksByAccount,
    AccountInfoByHash,
}

/// Local context of one in-flight request, keyed by the id echoed back by
/// the peer
#[derive(Clone, Debug)]
pub struct AsyncTag {
    pub id: u64,
    pub query_type: QueryType,
    pub start: HashOrAccount,
    /// Zero for dependency queries, which are not account specific
    pub account: Account,
    pub timestamp: Timestamp,
}

/// In-flight requests, indexed by id and in insertion order for expiry
#[derive(Default)]
pub struct OrderedTags {
    by_id: HashMap<u64, AsyncTag>,
    sequenced: VecDeque<u64>,
}

impl OrderedTags {
    pub fn len(&self) -> usize {
        self.sequenced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequenced.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Precondition: no tag with the same id is tracked
    pub fn insert(&mut self, tag: AsyncTag) {
        let id = tag.id;
        let old = self.by_id.insert(id, tag);
        debug_assert!(old.is_none());
        self.sequenced.push_back(id);
    }

    /// Removes and returns the tag for `id`, if any
    pub fn take(&mut self, id: u64) -> Option<AsyncTag> {
        let tag = self.by_id.remove(&id)?;
        self.sequenced.retain(|i| *i != id);
        Some(tag)
    }

    /// Removes and returns every tag older than `threshold`, oldest first
    pub fn expire(&mut self, now: Timestamp, threshold: Duration) -> Vec<AsyncTag> {
        let mut expired = Vec::new();
        while let Some(id) = self.sequenced.front() {
            let tag = self.by_id.get(id).unwrap();
            if now - tag.timestamp <= threshold {
                break;
            }
            let id = self.sequenced.pop_front().unwrap();
            expired.push(self.by_id.remove(&id).unwrap());
        }
        expired
    }
}

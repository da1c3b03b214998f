//! In-memory cache of cluster, broker and topic metadata.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::events::{ClientEvent, EventBus};
use crate::protocol::messages::MetadataResponse;

/// Address of a single broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Pool key. IPv6 hosts are kept unbracketed, so `[::1]:9092` and
    /// `::1:9092` in the bootstrap list map to the same connection.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr())
    }
}

/// Leadership data for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Node ID of the current leader, `-1` while the partition has none.
    pub leader: i32,

    /// All replicas hosting the partition.
    pub replicas: Vec<i32>,

    /// The in-sync subset of the replicas.
    pub isr: Vec<i32>,
}

/// Cached cluster view, replaced (never expired) by metadata refreshes.
#[derive(Debug)]
pub(crate) struct MetadataStore {
    brokers: RwLock<HashMap<i32, BrokerEndpoint>>,
    topics: RwLock<HashMap<String, HashMap<i32, PartitionInfo>>>,
    controller_id: RwLock<Option<i32>>,
    events: EventBus,
}

impl MetadataStore {
    pub(crate) fn new(events: EventBus) -> Self {
        Self {
            brokers: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            controller_id: RwLock::new(None),
            events,
        }
    }

    /// Apply a metadata response, replacing the broker map and either
    /// replacing or merging the topic map.
    pub(crate) fn update(&self, response: &MetadataResponse, replace_topics: bool) {
        let new_brokers: HashMap<i32, BrokerEndpoint> = response
            .brokers
            .iter()
            .map(|b| {
                (
                    b.node_id,
                    BrokerEndpoint::new(b.host.clone(), b.port as u16),
                )
            })
            .collect();
        self.set_brokers(new_brokers);

        if let Some(id) = response.controller_id {
            self.set_controller(Some(id));
        }

        let mut topics = self.topics.write();
        if replace_topics {
            topics.clear();
        }
        for topic in &response.topics {
            // a topic the broker reported an error for (unknown, invalid)
            // must not be cached as existing
            if topic.error.is_some() {
                continue;
            }
            let partitions = topics.entry(topic.name.clone()).or_default();
            for partition in &topic.partitions {
                partitions.insert(
                    partition.partition_index,
                    PartitionInfo {
                        leader: partition.leader_id,
                        replicas: partition.replica_nodes.clone(),
                        isr: partition.isr_nodes.clone(),
                    },
                );
            }
        }
    }

    /// Replace the broker map; a change to a previously non-empty map is
    /// announced with [`ClientEvent::BrokersChanged`].
    pub(crate) fn set_brokers(&self, new: HashMap<i32, BrokerEndpoint>) {
        let changed = {
            let mut brokers = self.brokers.write();
            let changed = !brokers.is_empty() && *brokers != new;
            if changed {
                info!(
                    old = brokers.len(),
                    new = new.len(),
                    "broker set changed with metadata refresh",
                );
            }
            *brokers = new;
            changed
        };
        if changed {
            self.events.send(ClientEvent::BrokersChanged);
        }
    }

    /// `None` marks the cached controller as stale.
    pub(crate) fn set_controller(&self, id: Option<i32>) {
        debug!(controller = ?id, "updating cached controller");
        *self.controller_id.write() = id;
    }

    pub(crate) fn controller_id(&self) -> Option<i32> {
        *self.controller_id.read()
    }

    pub(crate) fn endpoint_of(&self, node_id: i32) -> Option<BrokerEndpoint> {
        self.brokers.read().get(&node_id).cloned()
    }

    pub(crate) fn broker_endpoints(&self) -> Vec<BrokerEndpoint> {
        self.brokers.read().values().cloned().collect()
    }

    /// True iff a leader is known for the partition.
    pub(crate) fn has_leader(&self, topic: &str, partition: i32) -> bool {
        self.leader_for(topic, partition).is_some()
    }

    pub(crate) fn leader_for(&self, topic: &str, partition: i32) -> Option<i32> {
        self.topics
            .read()
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .map(|info| info.leader)
            .filter(|leader| *leader >= 0)
    }

    pub(crate) fn has_topic(&self, topic: &str) -> bool {
        self.topics.read().contains_key(topic)
    }

    /// Pool keys of every broker currently in the cluster; connections to
    /// anything else are dead and get reaped after a refresh.
    pub(crate) fn valid_addrs(&self) -> HashSet<String> {
        self.brokers.read().values().map(|b| b.addr()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::messages::{
        MetadataResponseBroker, MetadataResponsePartition, MetadataResponseTopic,
    };

    fn response(
        brokers: &[(i32, &str, i32)],
        controller: Option<i32>,
        topics: &[(&str, &[(i32, i32)])],
    ) -> MetadataResponse {
        MetadataResponse {
            brokers: brokers
                .iter()
                .map(|(id, host, port)| MetadataResponseBroker {
                    node_id: *id,
                    host: (*host).to_owned(),
                    port: *port,
                    rack: None,
                })
                .collect(),
            controller_id: controller,
            topics: topics
                .iter()
                .map(|(name, partitions)| MetadataResponseTopic {
                    error: None,
                    name: (*name).to_owned(),
                    is_internal: None,
                    partitions: partitions
                        .iter()
                        .map(|(index, leader)| MetadataResponsePartition {
                            error: None,
                            partition_index: *index,
                            leader_id: *leader,
                            replica_nodes: vec![*leader],
                            isr_nodes: vec![*leader],
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_update_replaces_brokers() {
        let store = MetadataStore::new(EventBus::new());
        store.update(
            &response(&[(1, "a", 9092), (2, "b", 9092)], Some(1), &[]),
            true,
        );

        assert_eq!(store.endpoint_of(1), Some(BrokerEndpoint::new("a", 9092)));
        assert_eq!(store.controller_id(), Some(1));
        assert_eq!(
            store.valid_addrs(),
            HashSet::from(["a:9092".to_owned(), "b:9092".to_owned()])
        );

        store.update(&response(&[(2, "b", 9092)], Some(2), &[]), true);
        assert_eq!(store.endpoint_of(1), None);
        assert_eq!(store.controller_id(), Some(2));
    }

    #[test]
    fn test_brokers_changed_emitted_on_change_only() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let store = MetadataStore::new(events);

        // first population: no event
        store.update(&response(&[(1, "a", 9092)], None, &[]), true);
        assert!(rx.try_recv().is_err());

        // same set again: no event
        store.update(&response(&[(1, "a", 9092)], None, &[]), true);
        assert!(rx.try_recv().is_err());

        // a broker disappears: event
        store.update(&response(&[(2, "b", 9092)], None, &[]), true);
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::BrokersChanged);
    }

    #[test]
    fn test_leader_lookup() {
        let store = MetadataStore::new(EventBus::new());
        store.update(
            &response(
                &[(1, "a", 9092)],
                None,
                &[("greetings", &[(0, 1), (1, -1)])],
            ),
            true,
        );

        assert_eq!(store.leader_for("greetings", 0), Some(1));
        assert!(store.has_leader("greetings", 0));
        // leaderless partition
        assert_eq!(store.leader_for("greetings", 1), None);
        assert!(!store.has_leader("greetings", 1));
        // unknown topic/partition
        assert!(!store.has_leader("other", 0));
        assert!(store.has_topic("greetings"));
        assert!(!store.has_topic("other"));
    }

    #[test]
    fn test_topic_merge_vs_replace() {
        let store = MetadataStore::new(EventBus::new());
        store.update(
            &response(&[(1, "a", 9092)], None, &[("one", &[(0, 1)])]),
            true,
        );
        store.update(
            &response(&[(1, "a", 9092)], None, &[("two", &[(0, 1)])]),
            false,
        );
        assert!(store.has_leader("one", 0));
        assert!(store.has_leader("two", 0));

        store.update(
            &response(&[(1, "a", 9092)], None, &[("three", &[(0, 1)])]),
            true,
        );
        assert!(!store.has_leader("one", 0));
        assert!(store.has_leader("three", 0));
    }

    #[test]
    fn test_stale_controller() {
        let store = MetadataStore::new(EventBus::new());
        store.update(&response(&[(1, "a", 9092)], Some(1), &[]), true);
        assert_eq!(store.controller_id(), Some(1));

        store.set_controller(None);
        assert_eq!(store.controller_id(), None);

        // a refresh without controller information leaves the cache alone
        store.update(&response(&[(1, "a", 9092)], None, &[]), true);
        assert_eq!(store.controller_id(), None);
    }
}

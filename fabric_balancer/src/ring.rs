//! Hash ring backing [`crate::ConsistentHashBalancer`], translated from
//! `original_source/common/hash/{consistenthash,hash}.go`.

use std::collections::{HashMap, HashSet};

use md5::{Digest, Md5};

/// Floor on replicas per node; requesting fewer is silently rounded up,
/// matching the original's `minReplicas` clamp.
pub const MIN_REPLICAS: usize = 100;
/// Upper bound accepted by [`ConsistentHash::add_with_weight`]'s weight.
pub const TOP_WEIGHT: u32 = 100;
const SECONDARY_HASH_PRIME: u32 = 16777619;

/// FNV-1a, 32-bit variant — Rust's `fnv` crate only ships the 64-bit
/// one, so this mirrors Go's `hash/fnv.New32a()` directly.
fn fnv1a_32(data: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn ring_hash(data: &[u8]) -> u32 {
    let digest = Md5::digest(data);
    fnv1a_32(&digest)
}

/// A consistent-hash ring mapping arbitrary string keys onto a set of
/// string-identified nodes, each placed at `replicas` points on the
/// ring for even distribution.
pub struct ConsistentHash {
    replicas: usize,
    keys: Vec<u32>,
    slots: HashMap<u32, Vec<String>>,
    nodes: HashSet<String>,
}

impl Default for ConsistentHash {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistentHash {
    pub fn new() -> Self {
        Self::with_replicas(MIN_REPLICAS)
    }

    pub fn with_replicas(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(MIN_REPLICAS),
            keys: Vec::new(),
            slots: HashMap::new(),
            nodes: HashSet::new(),
        }
    }

    /// Adds `node` at the ring's configured replica count. A later call
    /// for the same node overwrites its earlier replica placement.
    pub fn add(&mut self, node: impl Into<String>) {
        self.add_with_replicas(node, self.replicas);
    }

    /// Adds `node` at `replicas = ring_replicas * weight / 100`,
    /// `weight` expected in `[1, 100]`.
    pub fn add_with_weight(&mut self, node: impl Into<String>, weight: u32) {
        let replicas = (self.replicas as u32 * weight / TOP_WEIGHT) as usize;
        self.add_with_replicas(node, replicas);
    }

    pub fn add_with_replicas(&mut self, node: impl Into<String>, replicas: usize) {
        let node = node.into();
        self.remove(&node);
        let replicas = replicas.min(self.replicas);

        self.nodes.insert(node.clone());
        for i in 0..replicas {
            let hash = ring_hash(format!("{node}{i}").as_bytes());
            self.keys.push(hash);
            self.slots.entry(hash).or_default().push(node.clone());
        }
        self.keys.sort_unstable();
    }

    pub fn remove(&mut self, node: &str) {
        if !self.nodes.remove(node) {
            return;
        }

        for i in 0..self.replicas {
            let hash = ring_hash(format!("{node}{i}").as_bytes());
            if let Ok(index) = self.keys.binary_search(&hash) {
                self.keys.remove(index);
            }
            if let Some(nodes) = self.slots.get_mut(&hash) {
                nodes.retain(|n| n != node);
                if nodes.is_empty() {
                    self.slots.remove(&hash);
                }
            }
        }
    }

    /// Finds the node owning `key`'s position on the ring. When several
    /// nodes collide on the same slot, disambiguates with a secondary
    /// hash of `"<prime>:<key>"`.
    pub fn get(&self, key: &str) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }

        let hash = ring_hash(key.as_bytes());
        let index = self.keys.partition_point(|&k| k < hash) % self.keys.len();
        let slot = self.keys[index];
        let nodes = self.slots.get(&slot)?;

        match nodes.len() {
            0 => None,
            1 => Some(nodes[0].clone()),
            _ => {
                let inner = ring_hash(format!("{SECONDARY_HASH_PRIME}:{key}").as_bytes());
                Some(nodes[inner as usize % nodes.len()].clone())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_returns_none() {
        let ring = ConsistentHash::new();
        assert_eq!(ring.get("anything"), None);
    }

    #[test]
    fn single_node_always_wins() {
        let mut ring = ConsistentHash::new();
        ring.add("node-a");
        assert_eq!(ring.get("key-1").as_deref(), Some("node-a"));
        assert_eq!(ring.get("key-2").as_deref(), Some("node-a"));
    }

    #[test]
    fn same_key_routes_to_same_node_across_calls() {
        let mut ring = ConsistentHash::new();
        ring.add("node-a");
        ring.add("node-b");
        ring.add("node-c");

        let first = ring.get("stable-key");
        for _ in 0..10 {
            assert_eq!(ring.get("stable-key"), first);
        }
    }

    #[test]
    fn removing_a_node_redistributes_its_keys() {
        let mut ring = ConsistentHash::new();
        ring.add("node-a");
        ring.add("node-b");

        let before: Vec<_> = (0..50)
            .map(|i| ring.get(&format!("key-{i}")))
            .collect();
        ring.remove("node-a");
        let after: Vec<_> = (0..50)
            .map(|i| ring.get(&format!("key-{i}")))
            .collect();

        assert!(after.iter().all(|n| n.as_deref() == Some("node-b")));
        assert_ne!(before, after);
    }

    #[test]
    fn weighted_replicas_scale_with_weight() {
        let mut ring = ConsistentHash::with_replicas(100);
        ring.add_with_weight("light", 10);
        ring.add_with_weight("heavy", 100);

        let mut light_count = 0;
        let mut heavy_count = 0;
        for i in 0..2000 {
            match ring.get(&format!("probe-{i}")).as_deref() {
                Some("light") => light_count += 1,
                Some("heavy") => heavy_count += 1,
                _ => {}
            }
        }
        assert!(heavy_count > light_count);
    }
}

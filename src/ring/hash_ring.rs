use super::types::{RingError, VirtualNode, VirtualNodeId};

use sha2::{Digest, Sha256};

/// Separator between entries in the ring text form.
const ENTRY_SEPARATOR: &str = ":";

/// Places `input` on a ring of size `modulus`.
///
/// The SHA-256 digest is read as one big-endian integer and reduced modulo `modulus`.
pub fn ring_hash(input: &str, modulus: u64) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    let modulus = modulus.max(1) as u128;
    digest
        .iter()
        .fold(0u128, |acc, byte| (acc * 256 + *byte as u128) % modulus) as u64
}

/// Sorted set of virtual-node positions.
///
/// Entries are kept ordered by `(hash, server, index)`. Lookups are linear or
/// logarithmic in `servers x virtual nodes`, which stays small.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRing {
    entries: Vec<VirtualNode>,
    modulus: u64,
}

impl HashRing {
    pub fn new(modulus: u64) -> Self {
        Self {
            entries: Vec::new(),
            modulus: modulus.max(1),
        }
    }

    /// Builds a ring with `virtual_nodes` positions for each server in `server_ids`.
    pub fn build(
        server_ids: impl IntoIterator<Item = u32>,
        virtual_nodes: u32,
        modulus: u64,
    ) -> Self {
        let mut ring = Self::new(modulus);
        for server_id in server_ids {
            ring.push_server(server_id, virtual_nodes);
        }
        ring.sort();
        ring
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[VirtualNode] {
        &self.entries
    }

    pub fn hash_key(&self, key: &str) -> u64 {
        ring_hash(key, self.modulus)
    }

    /// The virtual node responsible for `key`.
    pub fn responsible_node(&self, key: &str) -> Option<VirtualNodeId> {
        self.responsible_for_hash(self.hash_key(key))
    }

    /// First entry whose hash is >= `hash`, wrapping to the first entry.
    pub fn responsible_for_hash(&self, hash: u64) -> Option<VirtualNodeId> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = self.entries.partition_point(|node| node.hash < hash);
        let idx = if idx == self.entries.len() { 0 } else { idx };
        Some(self.entries[idx].id)
    }

    pub fn position(&self, id: VirtualNodeId) -> Option<usize> {
        self.entries.iter().position(|node| node.id == id)
    }

    pub fn get(&self, id: VirtualNodeId) -> Option<&VirtualNode> {
        self.entries.iter().find(|node| node.id == id)
    }

    pub fn successor(&self, id: VirtualNodeId) -> Option<VirtualNodeId> {
        let idx = self.position(id)?;
        Some(self.entries[(idx + 1) % self.entries.len()].id)
    }

    pub fn predecessor(&self, id: VirtualNodeId) -> Option<VirtualNodeId> {
        let idx = self.position(id)?;
        let len = self.entries.len();
        Some(self.entries[(idx + len - 1) % len].id)
    }

    /// The `count` ring successors of `primary`, in ring order.
    ///
    /// Never includes `primary` itself, so at most `len - 1` entries come back.
    pub fn nodes_for_replication(&self, primary: VirtualNodeId, count: usize) -> Vec<VirtualNodeId> {
        let Some(idx) = self.position(primary) else {
            return Vec::new();
        };
        let len = self.entries.len();
        (1..len)
            .take(count)
            .map(|offset| self.entries[(idx + offset) % len].id)
            .collect()
    }

    /// Responsible node for `key` followed by its `replicas` successors.
    pub fn preference_list(&self, key: &str, replicas: usize) -> Vec<VirtualNodeId> {
        let Some(primary) = self.responsible_node(key) else {
            return Vec::new();
        };
        let mut nodes = vec![primary];
        nodes.extend(self.nodes_for_replication(primary, replicas));
        nodes
    }

    /// Adds the positions of `server_id`. Returns false if the server was already present.
    pub fn add_server(&mut self, server_id: u32, virtual_nodes: u32) -> bool {
        if self.contains_server(server_id) {
            return false;
        }
        self.push_server(server_id, virtual_nodes);
        self.sort();
        true
    }

    /// Removes every position of `server_id`. Returns false if it had none.
    pub fn remove_server(&mut self, server_id: u32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|node| node.server_id() != server_id);
        self.sort();
        self.entries.len() != before
    }

    pub fn contains_server(&self, server_id: u32) -> bool {
        self.entries.iter().any(|node| node.server_id() == server_id)
    }

    /// Distinct physical servers on the ring, ascending.
    pub fn servers(&self) -> Vec<u32> {
        let mut servers: Vec<u32> = self.entries.iter().map(VirtualNode::server_id).collect();
        servers.sort_unstable();
        servers.dedup();
        servers
    }

    /// Positions owned by `server_id`, ordered by virtual index.
    pub fn virtual_nodes_of(&self, server_id: u32) -> Vec<VirtualNodeId> {
        let mut nodes: Vec<VirtualNodeId> = self
            .entries
            .iter()
            .filter(|node| node.server_id() == server_id)
            .map(|node| node.id)
            .collect();
        nodes.sort_by_key(|id| id.index);
        nodes
    }

    /// Text form: `"<vnode>,<hash>"` entries joined by `:`.
    pub fn encode(&self) -> String {
        self.entries
            .iter()
            .map(VirtualNode::to_string)
            .collect::<Vec<_>>()
            .join(ENTRY_SEPARATOR)
    }

    /// Parses the text form produced by [`HashRing::encode`]. Empty segments are skipped.
    pub fn decode(text: &str, modulus: u64) -> Result<Self, RingError> {
        let mut ring = Self::new(modulus);
        for part in text.split(ENTRY_SEPARATOR) {
            if part.trim().is_empty() {
                continue;
            }
            ring.entries.push(part.parse()?);
        }
        ring.sort();
        Ok(ring)
    }

    fn push_server(&mut self, server_id: u32, virtual_nodes: u32) {
        for index in 1..=virtual_nodes {
            let id = VirtualNodeId::new(server_id, index);
            let hash = ring_hash(&id.to_string(), self.modulus);
            self.entries.push(VirtualNode { id, hash });
        }
    }

    fn sort(&mut self) {
        self.entries.sort_by_key(|node| (node.hash, node.id));
        self.entries.dedup_by_key(|node| node.id);
    }
}

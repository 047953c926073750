use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors produced while decoding ring text.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RingError {
    #[error("invalid virtual node id: {0:?}")]
    InvalidVirtualNode(String),
    #[error("invalid ring entry: {0:?}")]
    InvalidEntry(String),
}

/// Identity of a position on the ring: physical server plus virtual index (1-based).
///
/// Rendered as `S<server>V<index>`, which is also the text hashed to place it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct VirtualNodeId {
    pub server_id: u32,
    pub index: u32,
}

impl VirtualNodeId {
    pub fn new(server_id: u32, index: u32) -> Self {
        Self { server_id, index }
    }
}

impl fmt::Display for VirtualNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}V{}", self.server_id, self.index)
    }
}

impl FromStr for VirtualNodeId {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RingError::InvalidVirtualNode(s.to_string());
        let rest = s.strip_prefix('S').ok_or_else(invalid)?;
        let (server, index) = rest.split_once('V').ok_or_else(invalid)?;
        let server_id = server.parse().map_err(|_| invalid())?;
        let index = index.parse().map_err(|_| invalid())?;
        Ok(Self { server_id, index })
    }
}

impl From<VirtualNodeId> for String {
    fn from(id: VirtualNodeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for VirtualNodeId {
    type Error = RingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A virtual node placed on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualNode {
    pub id: VirtualNodeId,
    pub hash: u64,
}

impl VirtualNode {
    pub fn server_id(&self) -> u32 {
        self.id.server_id
    }
}

impl fmt::Display for VirtualNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.id, self.hash)
    }
}

impl FromStr for VirtualNode {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, hash) = s
            .split_once(',')
            .ok_or_else(|| RingError::InvalidEntry(s.to_string()))?;
        let id = id.trim().parse()?;
        let hash = hash
            .trim()
            .parse()
            .map_err(|_| RingError::InvalidEntry(s.to_string()))?;
        Ok(Self { id, hash })
    }
}

//! Wire Messages
//!
//! Every request and reply exchanged between clients, routers and replicas is a
//! single JSON object whose `method` field selects the variant. Payload fields keep
//! their historical camelCase names (`listUUID`, `virtualNode`, `hashRing`, ...).

use crate::crdt::MapCrdt;
use crate::ring::VirtualNodeId;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The only HTTP endpoint exposed by routers and replicas.
pub const ENDPOINT_MESSAGE: &str = "/message";

/// Position of a stored copy in its key's replica set.
///
/// Level 0 is the primary's copy; level `n` lives on the `n`-th ring successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicationLevel(pub u8);

impl ReplicationLevel {
    pub const PRIMARY: Self = Self(0);

    /// Level held by the `slot`-th successor (0-based).
    pub fn successor(slot: usize) -> Self {
        Self(u8::try_from(slot + 1).unwrap_or(u8::MAX))
    }

    pub fn is_primary(self) -> bool {
        self == Self::PRIMARY
    }
}

impl fmt::Display for ReplicationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client write (`createList` / `updateList`).
///
/// `virtual_node` is empty when a client sends it and stamped by the router
/// before forwarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListWrite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_node: Option<VirtualNodeId>,
    #[serde(rename = "listUUID")]
    pub list_uuid: Uuid,
    #[serde(default)]
    pub list_name: String,
    #[serde(default)]
    pub list_content: MapCrdt,
}

/// Read request (`getList`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_node: Option<VirtualNodeId>,
    #[serde(rename = "listUUID")]
    pub list_uuid: Uuid,
}

/// Reply to `getList`. Missing content means the list is not stored there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReply {
    #[serde(rename = "listUUID")]
    pub list_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_content: Option<MapCrdt>,
}

impl ListReply {
    pub fn not_found(list_uuid: Uuid) -> Self {
        Self {
            list_uuid,
            list_name: None,
            list_content: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.list_content.is_some()
    }
}

/// Copy of a list pushed to a successor during replication or handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaWrite {
    pub virtual_node: VirtualNodeId,
    #[serde(rename = "listUUID")]
    pub list_uuid: Uuid,
    #[serde(default)]
    pub list_name: String,
    #[serde(default)]
    pub list_content: MapCrdt,
    pub replication_level: ReplicationLevel,
    /// Canonical owner this copy stands in for, when written as a hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hinted_handoff: Option<VirtualNodeId>,
}

/// One list in a bulk key transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    #[serde(rename = "listUUID")]
    pub list_uuid: Uuid,
    #[serde(default)]
    pub list_name: String,
    #[serde(default)]
    pub list_content: MapCrdt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Message {
    /// Liveness probe; answered with `hello`.
    Hello,
    /// Bootstrap request from a replica; the router answers with the ring filled in.
    CreateHashRing {
        #[serde(rename = "hashRing", default, skip_serializing_if = "Option::is_none")]
        hash_ring: Option<String>,
    },
    JoinHashRing {
        #[serde(rename = "serverId")]
        server_id: u32,
    },
    LeaveHashRing {
        #[serde(rename = "serverId")]
        server_id: u32,
    },
    AddServerToHashRing {
        #[serde(rename = "hashRing")]
        hash_ring: String,
        #[serde(rename = "serverId")]
        server_id: u32,
        #[serde(rename = "nrVirtualNodes")]
        nr_virtual_nodes: u32,
    },
    RemoveServerFromHashRing {
        #[serde(rename = "hashRing")]
        hash_ring: String,
        #[serde(rename = "serverId")]
        server_id: u32,
    },
    CreateList(ListWrite),
    UpdateList(ListWrite),
    GetList(ListQuery),
    List(ListReply),
    ReplicateList(ReplicaWrite),
    ReplicateCreationList(ReplicaWrite),
    ReplicateUpdateList(ReplicaWrite),
    /// Asks for every list stored under `virtualNode` at `replicationLevel`.
    GetKeys {
        #[serde(rename = "virtualNode")]
        virtual_node: VirtualNodeId,
        #[serde(rename = "replicationLevel")]
        replication_level: ReplicationLevel,
    },
    Keys {
        keys: Vec<KeyRecord>,
    },
    DeleteKeys,
    ReplicateKeys,
    Ack {
        #[serde(default)]
        detail: String,
    },
    Error {
        reason: String,
    },
}

impl Message {
    pub fn ack(detail: impl Into<String>) -> Self {
        Self::Ack {
            detail: detail.into(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Decodes a request body. Anything that is not a known method becomes an
    /// `error` reply starting with `unhandled`.
    pub fn decode(body: &[u8]) -> Result<Self, Self> {
        serde_json::from_slice(body).map_err(|e| Self::error(format!("unhandled message: {}", e)))
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Wire name of the variant, for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::CreateHashRing { .. } => "createHashRing",
            Self::JoinHashRing { .. } => "joinHashRing",
            Self::LeaveHashRing { .. } => "leaveHashRing",
            Self::AddServerToHashRing { .. } => "addServerToHashRing",
            Self::RemoveServerFromHashRing { .. } => "removeServerFromHashRing",
            Self::CreateList(_) => "createList",
            Self::UpdateList(_) => "updateList",
            Self::GetList(_) => "getList",
            Self::List(_) => "list",
            Self::ReplicateList(_) => "replicateList",
            Self::ReplicateCreationList(_) => "replicateCreationList",
            Self::ReplicateUpdateList(_) => "replicateUpdateList",
            Self::GetKeys { .. } => "getKeys",
            Self::Keys { .. } => "keys",
            Self::DeleteKeys => "deleteKeys",
            Self::ReplicateKeys => "replicateKeys",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
        }
    }
}

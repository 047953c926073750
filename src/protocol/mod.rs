//! Cluster Protocol
//!
//! Typed messages and the request/reply transport shared by routers and replicas.
//!
//! ## Core Concepts
//! - **Message**: one tagged union keyed by `method`, one variant per operation.
//!   Replies are messages too (`hello`, `list`, `keys`, `ack`, `error`).
//! - **Transport**: async trait for "send a message to a peer and wait for its reply
//!   within a timeout". Production code uses `HttpTransport` (JSON over `POST /message`);
//!   tests plug in an in-process transport.
//! - **Discovery**: routers are found by probing a fixed candidate port list with `hello`.

pub mod message;
pub mod transport;

pub use message::{
    ENDPOINT_MESSAGE, KeyRecord, ListQuery, ListReply, ListWrite, Message, ReplicaWrite,
    ReplicationLevel,
};
pub use transport::{Endpoint, HttpTransport, Transport, discover_router};

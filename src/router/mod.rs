//! Router
//!
//! Stateless front door between clients and replicas.
//!
//! ## Core Concepts
//! - **Routing**: writes go to the virtual node responsible for the list, stamped with
//!   its id; reads try the responsible node and then its successors until one has the list.
//! - **Membership**: joins and leaves update the router's ring and are broadcast to every
//!   server, followed by a `deleteKeys` and a `replicateKeys` sweep.
//! - **Deadlines**: every outbound call has a timeout and every inbound request is bounded,
//!   so a stuck replica turns into an `error` reply instead of a hung client.

pub mod handlers;
pub mod service;

pub use service::{ReadOutcome, RouterService};

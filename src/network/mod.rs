//! Publish/subscribe gossip between nodes
//!
//! Nodes share chains, transactions and status text through a broker. The
//! gossip layer is transport-agnostic: NATS in production, an in-process broker
//! for tests and local simulations.

pub mod envelope;
pub mod gossip;
pub mod memory;
pub mod nats;
pub mod transport;

pub use envelope::{Envelope, GossipMessage, Topic};
pub use gossip::{ConnectionState, Gossip, GossipSettings, MessageHandler};
pub use memory::MemoryBroker;
pub use nats::{NatsTransport, DEFAULT_NATS_URL};
pub use transport::{Connection, Inbox, Transport};

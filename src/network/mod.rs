//! Peer-to-peer networking
//!
//! Nodes talk over TCP with one JSON request and one JSON response per
//! connection. A node that learns about a newer head reconciles through
//! `sync::PeerSync`.

pub mod client;
pub mod messages;
pub mod node;
pub mod server;
pub mod sync;

pub use client::PeerClient;
pub use messages::{Request, Response, SyncReport};
pub use node::{Node, Nodes};
pub use server::Server;
pub use sync::{BlockSource, PeerSync, SyncOutcome};

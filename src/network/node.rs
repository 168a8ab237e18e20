use crate::error::Result;
use crate::network::client::PeerClient;
use log::error;
use std::sync::RwLock;

/// A known peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    addr: String,
}

impl Node {
    fn new(addr: String) -> Node {
        Node { addr }
    }

    pub fn get_addr(&self) -> &str {
        self.addr.as_str()
    }

    pub fn client(&self) -> Result<PeerClient> {
        PeerClient::new(&self.addr)
    }
}

/// Peers this node talks to: the configured list plus every peer that has
/// announced a block to us
pub struct Nodes {
    inner: RwLock<Vec<Node>>,
}

impl Default for Nodes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nodes {
    pub fn new() -> Nodes {
        Nodes {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn from_addrs<I: IntoIterator<Item = String>>(addrs: I) -> Nodes {
        let nodes = Nodes::new();
        for addr in addrs {
            nodes.add_node(addr);
        }
        nodes
    }

    pub fn add_node(&self, addr: String) {
        match self.inner.write() {
            Ok(mut inner) => {
                if !inner.iter().any(|x| x.get_addr() == addr) {
                    inner.push(Node::new(addr));
                }
            }
            Err(_) => error!("Failed to acquire write lock on nodes"),
        }
    }

    pub fn evict_node(&self, addr: &str) {
        match self.inner.write() {
            Ok(mut inner) => inner.retain(|x| x.get_addr() != addr),
            Err(_) => error!("Failed to acquire write lock on nodes"),
        }
    }

    pub fn get_nodes(&self) -> Vec<Node> {
        match self.inner.read() {
            Ok(inner) => inner.to_vec(),
            Err(_) => {
                error!("Failed to acquire read lock on nodes");
                vec![]
            }
        }
    }

    pub fn len(&self) -> usize {
        self.get_nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node_is_known(&self, addr: &str) -> bool {
        self.get_nodes().iter().any(|x| x.get_addr() == addr)
    }
}

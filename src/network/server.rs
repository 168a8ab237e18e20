use crate::core::blockchain::Blockchain;
use crate::core::proof_of_work::ProofOfWork;
use crate::error::{BlockchainError, Result};
use crate::network::client::PeerClient;
use crate::network::messages::{decode_block, encode_block, Request, Response, SyncReport};
use crate::network::node::Nodes;
use crate::network::sync::{PeerSync, SyncOutcome};
use crate::storage::BlockStore;
use crate::utils::from_hex;
use log::{error, info, warn};
use serde_json::Deserializer;
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TCP_READ_TIMEOUT_SECS: u64 = 60;

/// Serves the chain to peers, one request per connection
pub struct Server<S: BlockStore + 'static, P: ProofOfWork + 'static> {
    chain: Arc<Blockchain<S, P>>,
    nodes: Arc<Nodes>,
    node_addr: String,
}

impl<S: BlockStore + 'static, P: ProofOfWork + 'static> Server<S, P> {
    pub fn new(chain: Arc<Blockchain<S, P>>, nodes: Arc<Nodes>, node_addr: &str) -> Self {
        Server {
            chain,
            nodes,
            node_addr: node_addr.to_string(),
        }
    }

    /// Binds the node address, catches up with known peers and serves forever
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.node_addr).map_err(|e| {
            BlockchainError::Network(format!("Failed to bind to {}: {e}", self.node_addr))
        })?;
        info!("Server listening on {}", self.node_addr);

        self.catch_up();
        if let Err(e) = self.broadcast_latest() {
            warn!("Failed to announce head: {e}");
        }
        self.serve(listener)
    }

    /// Accepts connections on `listener`, one handler thread each
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };

                    let chain = Arc::clone(&self.chain);
                    let nodes = Arc::clone(&self.nodes);
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(chain, nodes, stream, peer_addr) {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
        Ok(())
    }

    /// Asks every known peer for its head and reconciles with it. Peers that
    /// cannot hand over a head are dropped from the list.
    pub fn catch_up(&self) {
        for node in self.nodes.get_nodes() {
            let head = node
                .client()
                .and_then(|client| client.get_latest_block().map(|latest| (client, latest)));
            let (client, latest) = match head {
                Ok(head) => head,
                Err(e) => {
                    warn!("Evicting unreachable peer {}: {e}", node.get_addr());
                    self.nodes.evict_node(node.get_addr());
                    continue;
                }
            };
            let sync = PeerSync::new(self.chain.as_ref());
            let result = sync.reconcile(latest).and_then(|outcome| match outcome {
                SyncOutcome::Ambiguous => sync.resolve_ambiguous(&client).map(|_| ()),
                _ => Ok(()),
            });
            if let Err(e) = result {
                warn!("Could not sync with {}: {e}", node.get_addr());
            }
        }
    }

    /// Announces the local head to every known peer
    pub fn broadcast_latest(&self) -> Result<()> {
        let head = self.chain.last_block()?;
        for node in self.nodes.get_nodes() {
            match node
                .client()
                .and_then(|client| client.put_latest_block(&self.node_addr, &head))
            {
                Ok(report) => info!("{} answered {report:?}", node.get_addr()),
                Err(e) => warn!("Failed to announce head to {}: {e}", node.get_addr()),
            }
        }
        Ok(())
    }

    fn handle_connection(
        chain: Arc<Blockchain<S, P>>,
        nodes: Arc<Nodes>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_secs(TCP_READ_TIMEOUT_SECS)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        let request = Deserializer::from_reader(reader)
            .into_iter::<Request>()
            .next()
            .ok_or_else(|| BlockchainError::Network(format!("{peer_addr} sent no request")))?;

        let response = match request {
            Ok(request) => {
                info!("Received request from {peer_addr}: {request:?}");
                Self::process_request(&chain, &nodes, request)
            }
            Err(e) => Response::Error {
                message: format!("Malformed request: {e}"),
            },
        };

        let mut writer = &stream;
        serde_json::to_writer(&mut writer, &response)
            .map_err(|e| BlockchainError::Network(format!("Failed to send response: {e}")))?;
        writer.flush()?;
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            warn!("Failed to close connection to {peer_addr}: {e}");
        }
        Ok(())
    }

    fn process_request(chain: &Arc<Blockchain<S, P>>, nodes: &Nodes, request: Request) -> Response {
        let result = match request {
            Request::GetBlocks => Self::all_blocks(chain),
            Request::GetLatestBlock => chain
                .last_block()
                .and_then(|b| encode_block(&b))
                .map(|block| Response::Block { block }),
            Request::GetBlockByHash { hash } => from_hex(&hash)
                .and_then(|hash| chain.block_by_hash(&hash))
                .and_then(Self::optional_block),
            Request::GetBlockByIndex { index } => {
                chain.block_by_index(index).and_then(Self::optional_block)
            }
            Request::PutLatestBlock { addr_from, block } => {
                Self::put_latest_block(chain, nodes, addr_from, &block)
            }
        };
        result.unwrap_or_else(|e| Response::Error {
            message: e.to_string(),
        })
    }

    fn all_blocks(chain: &Blockchain<S, P>) -> Result<Response> {
        let blocks = chain
            .blocks()?
            .map(|block| block.and_then(|b| encode_block(&b)))
            .collect::<Result<Vec<String>>>()?;
        Ok(Response::Blocks { blocks })
    }

    fn optional_block(block: Option<crate::core::block::Block>) -> Result<Response> {
        match block {
            Some(block) => Ok(Response::Block {
                block: encode_block(&block)?,
            }),
            None => Ok(Response::NotFound),
        }
    }

    fn put_latest_block(
        chain: &Arc<Blockchain<S, P>>,
        nodes: &Nodes,
        addr_from: String,
        block: &str,
    ) -> Result<Response> {
        let candidate = decode_block(block)?;
        if !nodes.node_is_known(&addr_from) {
            info!("New peer {addr_from}");
            nodes.add_node(addr_from.clone());
        }

        let outcome = PeerSync::new(chain.as_ref()).reconcile(candidate)?;
        if outcome == SyncOutcome::Ambiguous {
            // Fetching the peer's chain can take a while; answer first
            let chain = Arc::clone(chain);
            thread::spawn(move || {
                let result = PeerClient::new(&addr_from)
                    .and_then(|client| PeerSync::new(chain.as_ref()).resolve_ambiguous(&client));
                match result {
                    Ok(appended) => info!("Took {appended} blocks from {addr_from}"),
                    Err(e) => warn!("Could not take the chain of {addr_from}: {e}"),
                }
            });
        }
        Ok(Response::Sync {
            outcome: SyncReport::from(&outcome),
        })
    }
}

use crate::core::block::Block;
use crate::error::{BlockchainError, Result};
use crate::network::messages::{decode_block, encode_block, Request, Response, SyncReport};
use crate::network::sync::BlockSource;
use crate::utils::to_hex;
use log::debug;
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

pub const TCP_TIMEOUT_MS: u64 = 5000;

/// Talks to one peer; every call opens a fresh connection
#[derive(Debug, Clone)]
pub struct PeerClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl PeerClient {
    pub fn new(addr: &str) -> Result<PeerClient> {
        let addr = addr
            .parse::<SocketAddr>()
            .map_err(|e| BlockchainError::Network(format!("Invalid peer address {addr}: {e}")))?;
        Ok(PeerClient {
            addr,
            timeout: Duration::from_millis(TCP_TIMEOUT_MS),
        })
    }

    pub fn get_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends one request and waits for its response
    pub fn request(&self, request: &Request) -> Result<Response> {
        debug!("Sending request to {}: {request:?}", self.addr);
        let stream = TcpStream::connect_timeout(&self.addr, self.timeout).map_err(|e| {
            BlockchainError::Network(format!("Failed to connect to {}: {e}", self.addr))
        })?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

        serde_json::to_writer(&stream, request)
            .map_err(|e| BlockchainError::Network(format!("Failed to send request: {e}")))?;
        stream
            .shutdown(Shutdown::Write)
            .map_err(|e| BlockchainError::Network(format!("Failed to finish request: {e}")))?;

        let response = serde_json::from_reader(BufReader::new(&stream))
            .map_err(|e| BlockchainError::Network(format!("Failed to read response: {e}")))?;
        match response {
            Response::Error { message } => Err(BlockchainError::Network(format!(
                "Peer {} answered with an error: {message}",
                self.addr
            ))),
            other => Ok(other),
        }
    }

    pub fn get_blocks(&self) -> Result<Vec<Block>> {
        match self.request(&Request::GetBlocks)? {
            Response::Blocks { blocks } => blocks.iter().map(|b| decode_block(b)).collect(),
            other => Err(unexpected(&other)),
        }
    }

    pub fn get_latest_block(&self) -> Result<Block> {
        match self.request(&Request::GetLatestBlock)? {
            Response::Block { block } => decode_block(&block),
            other => Err(unexpected(&other)),
        }
    }

    pub fn get_block_by_hash(&self, hash: &[u8]) -> Result<Option<Block>> {
        self.optional_block(&Request::GetBlockByHash { hash: to_hex(hash) })
    }

    pub fn get_block_by_index(&self, index: u64) -> Result<Option<Block>> {
        self.optional_block(&Request::GetBlockByIndex { index })
    }

    /// Announces `block` as our head; `addr_from` is where the peer can reach us
    pub fn put_latest_block(&self, addr_from: &str, block: &Block) -> Result<SyncReport> {
        let request = Request::PutLatestBlock {
            addr_from: addr_from.to_string(),
            block: encode_block(block)?,
        };
        match self.request(&request)? {
            Response::Sync { outcome } => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    fn optional_block(&self, request: &Request) -> Result<Option<Block>> {
        match self.request(request)? {
            Response::Block { block } => decode_block(&block).map(Some),
            Response::NotFound => Ok(None),
            other => Err(unexpected(&other)),
        }
    }
}

impl BlockSource for PeerClient {
    fn fetch_blocks(&self) -> Result<Vec<Block>> {
        self.get_blocks()
    }

    fn describe(&self) -> String {
        self.addr.to_string()
    }
}

fn unexpected(response: &Response) -> BlockchainError {
    BlockchainError::Network(format!("Unexpected response: {response:?}"))
}

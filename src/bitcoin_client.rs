//! Bitcoin full-node client interface: best-block and by-height lookups,
//! block-header parsing.

use async_trait::async_trait;
use bitcoin::consensus::encode::deserialize;
use bitcoin::block::Header as CBlockHeader;
use bitcoin::hashes::Hash;
use bitcoincore_rpc::{Auth, Client, RpcApi};

use crate::error::{Result, SqueaknodeError};

#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub block_height: u64,
    pub block_hash: [u8; 32],
    pub block_header: Vec<u8>,
}

/// Parses a raw block header buffer into a `CBlockHeader`.
pub fn parse_block_header(bytes: &[u8]) -> Result<CBlockHeader> {
    deserialize(bytes)
        .map_err(|e| SqueaknodeError::ChainUnavailable(format!("bad block header: {e}")))
}

#[async_trait]
pub trait BitcoinClient: Send + Sync {
    async fn get_best_block_info(&self) -> Result<BlockInfo>;
    async fn get_block_info_by_height(&self, height: u64) -> Result<BlockInfo>;
}

/// Production client wrapping `bitcoincore_rpc` against a reachable Bitcoin
/// Core JSON-RPC endpoint.
pub struct RpcBitcoinClient {
    client: Client,
}

impl RpcBitcoinClient {
    pub fn new(rpc_url: &str, rpc_user: &str, rpc_password: &str) -> Result<Self> {
        let auth = Auth::UserPass(rpc_user.to_string(), rpc_password.to_string());
        let client = Client::new(rpc_url, auth)
            .map_err(|e| SqueaknodeError::ChainUnavailable(format!("rpc connect failed: {e}")))?;
        Ok(Self { client })
    }

    fn block_info_for_hash(&self, hash: bitcoin::BlockHash, height: u64) -> Result<BlockInfo> {
        let header = self
            .client
            .get_block_header(&hash)
            .map_err(|e| SqueaknodeError::ChainUnavailable(format!("get_block_header: {e}")))?;
        Ok(BlockInfo {
            block_height: height,
            block_hash: hash.to_byte_array(),
            block_header: bitcoin::consensus::encode::serialize(&header),
        })
    }
}

#[async_trait]
impl BitcoinClient for RpcBitcoinClient {
    async fn get_best_block_info(&self) -> Result<BlockInfo> {
        let hash = self
            .client
            .get_best_block_hash()
            .map_err(|e| SqueaknodeError::ChainUnavailable(format!("get_best_block_hash: {e}")))?;
        let height = self
            .client
            .get_block_info(&hash)
            .map_err(|e| SqueaknodeError::ChainUnavailable(format!("get_block_info: {e}")))?
            .height as u64;
        self.block_info_for_hash(hash, height)
    }

    async fn get_block_info_by_height(&self, height: u64) -> Result<BlockInfo> {
        let hash = self
            .client
            .get_block_hash(height)
            .map_err(|e| SqueaknodeError::ChainUnavailable(format!("get_block_hash: {e}")))?;
        self.block_info_for_hash(hash, height)
    }
}

/// Deterministic fake for tests: a fixed chain tip, no real network calls.
pub struct FakeBitcoinClient {
    pub height: u64,
    pub hash: [u8; 32],
}

impl FakeBitcoinClient {
    pub fn new(height: u64, hash: [u8; 32]) -> Self {
        Self { height, hash }
    }
}

#[async_trait]
impl BitcoinClient for FakeBitcoinClient {
    async fn get_best_block_info(&self) -> Result<BlockInfo> {
        Ok(BlockInfo {
            block_height: self.height,
            block_hash: self.hash,
            block_header: vec![0u8; 80],
        })
    }

    async fn get_block_info_by_height(&self, height: u64) -> Result<BlockInfo> {
        if height == self.height {
            Ok(BlockInfo {
                block_height: self.height,
                block_hash: self.hash,
                block_header: vec![0u8; 80],
            })
        } else {
            Err(SqueaknodeError::ChainUnavailable(format!(
                "no such block at height {height}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_client_returns_best_block() {
        let client = FakeBitcoinClient::new(800_000, [9u8; 32]);
        let info = client.get_best_block_info().await.unwrap();
        assert_eq!(info.block_height, 800_000);
        assert_eq!(info.block_hash, [9u8; 32]);
    }

    #[tokio::test]
    async fn fake_client_rejects_unknown_height() {
        let client = FakeBitcoinClient::new(800_000, [9u8; 32]);
        assert!(client.get_block_info_by_height(1).await.is_err());
    }
}

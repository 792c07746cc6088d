//! A record of a payment the local node made to buy a squeak's key.

use serde::{Deserialize, Serialize};

use crate::peer_address::PeerAddress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentPayment {
    pub id: Option<i64>,
    pub created_time_ms: u64,
    pub peer_address: PeerAddress,
    pub squeak_hash: [u8; 32],
    pub payment_hash: [u8; 32],
    pub secret_key: [u8; 32],
    pub price_msat: u64,
    pub node_pubkey: String,
    pub valid: bool,
}

//! Seller-side record of a single sale proposal.

use serde::{Deserialize, Serialize};

use crate::peer_address::PeerAddress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentOffer {
    pub id: Option<i64>,
    pub squeak_hash: [u8; 32],
    pub payment_hash: [u8; 32],
    /// The tweaked preimage, `tweak_add(original_secret_key, nonce)`.
    pub secret_key: [u8; 32],
    pub nonce: [u8; 32],
    pub price_msat: u64,
    pub payment_request: String,
    pub invoice_time: u64,
    pub invoice_expiry: u64,
    pub peer_address: PeerAddress,
    pub paid: bool,
    pub settle_index: Option<u64>,
}

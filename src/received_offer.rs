//! Buyer-side record of a single sale proposal.

use serde::{Deserialize, Serialize};

use crate::lightning_address::LightningAddressHostPort;
use crate::peer_address::PeerAddress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedOffer {
    pub id: Option<i64>,
    pub squeak_hash: [u8; 32],
    pub price_msat: u64,
    pub payment_hash: [u8; 32],
    pub nonce: [u8; 32],
    /// The squeak's published payment point, carried forward unchecked
    /// (see DESIGN.md, Open Question 1).
    pub payment_point: [u8; 33],
    pub invoice_timestamp: u64,
    pub invoice_expiry: u64,
    pub payment_request: String,
    pub destination: String,
    pub lightning_address: LightningAddressHostPort,
    pub peer_address: PeerAddress,
}

//! The wire message sent from seller to buyer. Carries no plaintext key.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub squeak_hash: [u8; 32],
    pub nonce: [u8; 32],
    pub payment_request: String,
    pub host: String,
    pub port: u16,
}

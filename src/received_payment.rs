//! A record of a payment the local node received for a key it sold.
//!
//! There is exactly one `ReceivedPayment` type in this crate: both
//! `SqueakCore::get_received_payments` and `SentOffersVerifier` use it (see
//! DESIGN.md — the original codebase had two incompatible namespaces for
//! this entity, which is a bug this rewrite does not repeat).

use serde::{Deserialize, Serialize};

use crate::peer_address::PeerAddress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedPayment {
    pub id: Option<i64>,
    pub created_time_ms: u64,
    pub squeak_hash: [u8; 32],
    pub payment_hash: [u8; 32],
    pub price_msat: u64,
    pub settle_index: u64,
    pub peer_address: PeerAddress,
}

//! Error types for the squeak exchange engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqueaknodeError {
    #[error("Invalid squeak: {0}")]
    InvalidSqueak(String),

    #[error("Can't author a squeak with a contact profile, a signing key is required")]
    ProfileNotSigning,

    #[error("Squeak hash in offer does not match squeak hash")]
    OfferHashMismatch,

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Secret key does not match the squeak's payment point")]
    InvalidKey,

    #[error("Bitcoin chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("Invoice subscription error: {0}")]
    InvoiceSubscriptionError(String),

    #[error("Peer {0} is already connected")]
    DuplicatePeer(String),

    #[error("Peer echoed a local version nonce, likely a self-connection")]
    DuplicateNonce,

    #[error("No such peer: {0}")]
    MissingPeer(String),

    #[error("Lightning node error: {0}")]
    LightningError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Admin request error: {0}")]
    AdminError(String),
}

pub type Result<T> = std::result::Result<T, SqueaknodeError>;

//! Squeak exchange engine: a decentralized social-posting network where
//! reading a post requires a Lightning micro-payment. A squeak's content is
//! encrypted under a one-time secret key; a seller's signed offer commits to
//! that key via a Lightning HODL invoice, and the payment preimage tweak
//! trick (see `crypto::tweak_add`/`tweak_sub`) lets the buyer recover the key
//! atomically with settling the invoice.

pub mod admin;
pub mod bitcoin_client;
pub mod connection_manager;
pub mod crypto;
pub mod error;
pub mod lightning_address;
pub mod lightning_client;
pub mod offer;
pub mod peer_address;
pub mod profile;
pub mod received_offer;
pub mod received_payment;
pub mod sent_offer;
pub mod sent_offers_verifier;
pub mod sent_payment;
pub mod squeak;
pub mod squeak_core;
pub mod storage;

pub use error::{Result, SqueaknodeError};

pub use bitcoin_client::{BitcoinClient, BlockInfo, FakeBitcoinClient, RpcBitcoinClient};
pub use connection_manager::{
    AutoconnectReconciler, ConnectionManager, Peer, PeerDialer, PeerVersion,
};
pub use lightning_client::{
    FakeLightningClient, GetInfoResponse, Invoice, InvoiceSubscription, LightningClient,
    LndRestLightningClient,
};
pub use offer::Offer;
pub use peer_address::PeerAddress;
pub use profile::SqueakProfile;
pub use received_offer::ReceivedOffer;
pub use received_payment::ReceivedPayment;
pub use sent_offer::SentOffer;
pub use sent_offers_verifier::SentOffersVerifier;
pub use sent_payment::SentPayment;
pub use squeak::Squeak;
pub use squeak_core::{ReceivedPaymentsStream, SentOfferLookup, SqueakCore};
pub use storage::{InMemoryStorage, PeerRecord, Storage};

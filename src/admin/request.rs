//! The tagged request/response enums the admin surface dispatches on (§9
//! redesign: one enum, one `handle()` method, instead of one handler per
//! RPC method as the original protobuf service defined it).
//!
//! Every endpoint name in the original admin surface gets a variant here
//! for wire-name compatibility, even where `AdminHandler` only implements a
//! thin passthrough or declines with `AdminError`.

use serde::{Deserialize, Serialize};

use crate::peer_address::PeerAddress;
use crate::profile::SqueakProfile;
use crate::received_payment::ReceivedPayment;
use crate::sent_offer::SentOffer;
use crate::sent_payment::SentPayment;
use crate::storage::PeerRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum AdminRequest {
    // --- Profiles ---
    GetSqueakProfile { profile_id: i64 },
    GetProfiles,
    GetSigningProfiles,
    GetContactProfiles,
    CreateSigningProfile { name: String },
    CreateContactProfile { name: String, address: String },
    RenameSqueakProfile { profile_id: i64, name: String },
    SetSqueakProfileFollowing { profile_id: i64, following: bool },
    SetSqueakProfileUseCustomPrice { profile_id: i64, use_custom_price: bool },
    SetSqueakProfileCustomPrice { profile_id: i64, custom_price_msat: u64 },
    DeleteProfile { profile_id: i64 },
    GetSqueakProfileByAddress { address: String },
    ImportSigningProfile { name: String, private_key_hex: String },
    SetSqueakProfileImage { profile_id: i64, image_hex: String },
    ClearSqueakProfileImage { profile_id: i64 },
    GetSqueakProfilePrivateKey { profile_id: i64 },

    // --- Peers ---
    GetPeers,
    GetPeer { host: String, port: u16 },
    GetPeerByAddress { host: String, port: u16 },
    CreatePeer { host: String, port: u16, name: Option<String> },
    RenamePeer { host: String, port: u16, name: String },
    SetPeerAutoconnect { host: String, port: u16, autoconnect: bool },
    SetPeerDownloading { host: String, port: u16, downloading: bool },
    SetPeerUploading { host: String, port: u16, uploading: bool },
    DeletePeer { host: String, port: u16 },
    ConnectPeer { host: String, port: u16 },
    DisconnectPeer { host: String, port: u16 },
    GetConnectedPeers,
    GetConnectedPeer { host: String, port: u16 },

    // --- Squeaks / offers / payments ---
    MakeSqueakRequest { profile_id: i64, content: String, reply_to_hash_hex: Option<String> },
    GetSqueakDisplay { squeak_hash_hex: String },
    GetSqueakDetails { squeak_hash_hex: String },
    DeleteSqueak { squeak_hash_hex: String },
    PayOffer { received_offer_id: i64 },
    GetBuyOffers { squeak_hash_hex: String },
    GetBuyOffer { received_offer_id: i64 },
    GetSentPayments,
    GetSentOffers,
    GetReceivedPayments,
    LikeSqueak { squeak_hash_hex: String },
    UnlikeSqueak { squeak_hash_hex: String },
    GetLikedSqueakDisplays,
    GetExternalAddress,
    GetPaymentSummary,
    ReprocessReceivedPayments,

    // --- Timeline / search / sync (no display-layer counterpart in this core) ---
    GetTimelineSqueakDisplays,
    GetAncestorSqueakDisplays { squeak_hash_hex: String },
    GetReplySqueakDisplays { squeak_hash_hex: String },
    GetAddressSqueakDisplays { address: String },
    GetSearchSqueakDisplays { search_text: String },
    SyncSqueak { squeak_hash_hex: String },
    DownloadSqueak { squeak_hash_hex: String },
    DownloadOffers { squeak_hash_hex: String },
    DownloadReplies { squeak_hash_hex: String },
    DownloadAddressSqueaks { address: String },
    GetNetwork,

    // --- lnd/bitcoind thin passthroughs ---
    LndGetInfo,
    LndWalletBalance,
    LndGetTransactions,
    LndListPeers,
    LndListChannels,
    LndPendingChannels,
    LndConnectPeer { pubkey: String, host: String },
    LndDisconnectPeer { pubkey: String },
    LndOpenChannelSync { pubkey: String, local_funding_amount_sat: u64 },
    LndCloseChannel { channel_point: String },
    LndNewAddress,
    LndSendCoins { address: String, amount_sat: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AdminResponse {
    Unit,
    Id(i64),
    Bool(bool),
    Profile(SqueakProfile),
    Profiles(Vec<SqueakProfile>),
    Peer(PeerRecord),
    Peers(Vec<PeerRecord>),
    ConnectedPeers(Vec<PeerAddress>),
    SqueakHashHex(String),
    SqueakHashes(Vec<String>),
    SentPayments(Vec<SentPayment>),
    SentOffers(Vec<SentOffer>),
    ReceivedPayments(Vec<ReceivedPayment>),
    ExternalAddress(Option<(String, u16)>),
    LightningUris(Vec<String>),
    PaymentSummary { sent_msat: u64, received_msat: u64 },
    Json(serde_json::Value),
}

//! `Storage`: the persistence boundary. Modeled as an object-safe trait so
//! the exchange engine never depends on a concrete database; `InMemoryStorage`
//! backs tests and the `main.rs` demo wiring.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, SqueaknodeError};
use crate::peer_address::PeerAddress;
use crate::profile::SqueakProfile;
use crate::received_offer::ReceivedOffer;
use crate::received_payment::ReceivedPayment;
use crate::sent_offer::SentOffer;
use crate::sent_payment::SentPayment;
use crate::squeak::Squeak;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PeerRecord {
    pub address: PeerAddress,
    pub name: Option<String>,
    pub autoconnect: bool,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_latest_settle_index(&self) -> Result<Option<u64>>;
    async fn set_latest_settle_index(&self, settle_index: u64) -> Result<()>;

    async fn get_sent_offer_by_preimage_hash(&self, payment_hash: &[u8; 32]) -> Result<SentOffer>;
    async fn insert_sent_offer(&self, sent_offer: SentOffer) -> Result<i64>;

    /// Idempotent: inserting a `ReceivedPayment` for a `settle_index` already
    /// on file is a silent no-op.
    async fn insert_received_payment(&self, received_payment: ReceivedPayment) -> Result<()>;
    async fn get_received_payments(&self) -> Result<Vec<ReceivedPayment>>;

    async fn insert_profile(&self, profile: SqueakProfile) -> Result<i64>;
    async fn get_profile(&self, profile_id: i64) -> Result<SqueakProfile>;
    async fn get_profiles(&self) -> Result<Vec<SqueakProfile>>;
    async fn set_profile_following(&self, profile_id: i64, following: bool) -> Result<()>;
    async fn set_profile_use_custom_price(&self, profile_id: i64, use_custom_price: bool) -> Result<()>;
    async fn set_profile_custom_price(&self, profile_id: i64, custom_price_msat: u64) -> Result<()>;
    async fn rename_profile(&self, profile_id: i64, name: String) -> Result<()>;
    async fn delete_profile(&self, profile_id: i64) -> Result<()>;

    async fn insert_peer(&self, peer: PeerRecord) -> Result<()>;
    async fn get_peer(&self, address: &PeerAddress) -> Result<PeerRecord>;
    async fn get_peers(&self) -> Result<Vec<PeerRecord>>;
    async fn rename_peer(&self, address: &PeerAddress, name: String) -> Result<()>;
    async fn set_peer_autoconnect(&self, address: &PeerAddress, autoconnect: bool) -> Result<()>;
    async fn delete_peer(&self, address: &PeerAddress) -> Result<()>;

    async fn insert_squeak(&self, squeak: Squeak) -> Result<()>;
    async fn get_squeak(&self, squeak_hash: &[u8; 32]) -> Result<Squeak>;
    async fn delete_squeak(&self, squeak_hash: &[u8; 32]) -> Result<()>;

    async fn insert_received_offer(&self, offer: ReceivedOffer) -> Result<i64>;
    async fn get_received_offer(&self, id: i64) -> Result<ReceivedOffer>;
    async fn get_received_offers_for_squeak(&self, squeak_hash: &[u8; 32]) -> Result<Vec<ReceivedOffer>>;

    async fn insert_sent_payment(&self, payment: SentPayment) -> Result<i64>;
    async fn get_sent_payments(&self) -> Result<Vec<SentPayment>>;

    async fn like_squeak(&self, squeak_hash: &[u8; 32]) -> Result<()>;
    async fn unlike_squeak(&self, squeak_hash: &[u8; 32]) -> Result<()>;
    async fn get_liked_squeak_hashes(&self) -> Result<Vec<[u8; 32]>>;
}

#[derive(Default)]
struct Tables {
    latest_settle_index: Option<u64>,
    sent_offers_by_hash: HashMap<[u8; 32], SentOffer>,
    next_sent_offer_id: i64,
    received_payments_by_settle_index: HashMap<u64, ReceivedPayment>,
    profiles: HashMap<i64, SqueakProfile>,
    next_profile_id: i64,
    peers: HashMap<PeerAddress, PeerRecord>,
    squeaks: HashMap<[u8; 32], Squeak>,
    received_offers: HashMap<i64, ReceivedOffer>,
    next_received_offer_id: i64,
    sent_payments: HashMap<i64, SentPayment>,
    next_sent_payment_id: i64,
    liked_squeaks: std::collections::HashSet<[u8; 32]>,
}

/// A straightforward mutex-guarded in-memory implementation of `Storage`.
/// Not meant to survive a restart; exists for tests and the demo wiring in
/// `main.rs`.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_latest_settle_index(&self) -> Result<Option<u64>> {
        Ok(self.tables.lock().unwrap().latest_settle_index)
    }

    async fn set_latest_settle_index(&self, settle_index: u64) -> Result<()> {
        self.tables.lock().unwrap().latest_settle_index = Some(settle_index);
        Ok(())
    }

    async fn get_sent_offer_by_preimage_hash(&self, payment_hash: &[u8; 32]) -> Result<SentOffer> {
        self.tables
            .lock()
            .unwrap()
            .sent_offers_by_hash
            .get(payment_hash)
            .cloned()
            .ok_or_else(|| SqueaknodeError::StorageError("no sent offer for payment hash".into()))
    }

    async fn insert_sent_offer(&self, mut sent_offer: SentOffer) -> Result<i64> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_sent_offer_id;
        tables.next_sent_offer_id += 1;
        sent_offer.id = Some(id);
        tables.sent_offers_by_hash.insert(sent_offer.payment_hash, sent_offer);
        Ok(id)
    }

    async fn insert_received_payment(&self, received_payment: ReceivedPayment) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .received_payments_by_settle_index
            .entry(received_payment.settle_index)
            .or_insert(received_payment);
        Ok(())
    }

    async fn get_received_payments(&self) -> Result<Vec<ReceivedPayment>> {
        let tables = self.tables.lock().unwrap();
        let mut payments: Vec<_> = tables.received_payments_by_settle_index.values().cloned().collect();
        payments.sort_by_key(|p| p.settle_index);
        Ok(payments)
    }

    async fn insert_profile(&self, mut profile: SqueakProfile) -> Result<i64> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_profile_id;
        tables.next_profile_id += 1;
        profile.profile_id = Some(id);
        tables.profiles.insert(id, profile);
        Ok(id)
    }

    async fn get_profile(&self, profile_id: i64) -> Result<SqueakProfile> {
        self.tables
            .lock()
            .unwrap()
            .profiles
            .get(&profile_id)
            .cloned()
            .ok_or_else(|| SqueaknodeError::StorageError(format!("no profile {profile_id}")))
    }

    async fn get_profiles(&self) -> Result<Vec<SqueakProfile>> {
        Ok(self.tables.lock().unwrap().profiles.values().cloned().collect())
    }

    async fn set_profile_following(&self, profile_id: i64, following: bool) -> Result<()> {
        self.with_profile_mut(profile_id, |p| p.following = following)
    }

    async fn set_profile_use_custom_price(&self, profile_id: i64, use_custom_price: bool) -> Result<()> {
        self.with_profile_mut(profile_id, |p| p.use_custom_price = use_custom_price)
    }

    async fn set_profile_custom_price(&self, profile_id: i64, custom_price_msat: u64) -> Result<()> {
        self.with_profile_mut(profile_id, |p| p.custom_price_msat = Some(custom_price_msat))
    }

    async fn rename_profile(&self, profile_id: i64, name: String) -> Result<()> {
        self.with_profile_mut(profile_id, move |p| p.name = name)
    }

    async fn delete_profile(&self, profile_id: i64) -> Result<()> {
        self.tables.lock().unwrap().profiles.remove(&profile_id);
        Ok(())
    }

    async fn insert_peer(&self, peer: PeerRecord) -> Result<()> {
        self.tables.lock().unwrap().peers.insert(peer.address.clone(), peer);
        Ok(())
    }

    async fn get_peer(&self, address: &PeerAddress) -> Result<PeerRecord> {
        self.tables
            .lock()
            .unwrap()
            .peers
            .get(address)
            .cloned()
            .ok_or_else(|| SqueaknodeError::MissingPeer(address.to_string()))
    }

    async fn get_peers(&self) -> Result<Vec<PeerRecord>> {
        Ok(self.tables.lock().unwrap().peers.values().cloned().collect())
    }

    async fn rename_peer(&self, address: &PeerAddress, name: String) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let peer = tables
            .peers
            .get_mut(address)
            .ok_or_else(|| SqueaknodeError::MissingPeer(address.to_string()))?;
        peer.name = Some(name);
        Ok(())
    }

    async fn set_peer_autoconnect(&self, address: &PeerAddress, autoconnect: bool) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let peer = tables
            .peers
            .get_mut(address)
            .ok_or_else(|| SqueaknodeError::MissingPeer(address.to_string()))?;
        peer.autoconnect = autoconnect;
        Ok(())
    }

    async fn delete_peer(&self, address: &PeerAddress) -> Result<()> {
        self.tables.lock().unwrap().peers.remove(address);
        Ok(())
    }

    async fn insert_squeak(&self, squeak: Squeak) -> Result<()> {
        let hash = squeak.squeak_hash();
        self.tables.lock().unwrap().squeaks.insert(hash, squeak);
        Ok(())
    }

    async fn get_squeak(&self, squeak_hash: &[u8; 32]) -> Result<Squeak> {
        self.tables
            .lock()
            .unwrap()
            .squeaks
            .get(squeak_hash)
            .cloned()
            .ok_or_else(|| SqueaknodeError::StorageError("no such squeak".into()))
    }

    async fn delete_squeak(&self, squeak_hash: &[u8; 32]) -> Result<()> {
        self.tables.lock().unwrap().squeaks.remove(squeak_hash);
        Ok(())
    }

    async fn insert_received_offer(&self, mut offer: ReceivedOffer) -> Result<i64> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_received_offer_id;
        tables.next_received_offer_id += 1;
        offer.id = Some(id);
        tables.received_offers.insert(id, offer);
        Ok(id)
    }

    async fn get_received_offer(&self, id: i64) -> Result<ReceivedOffer> {
        self.tables
            .lock()
            .unwrap()
            .received_offers
            .get(&id)
            .cloned()
            .ok_or_else(|| SqueaknodeError::StorageError(format!("no received offer {id}")))
    }

    async fn get_received_offers_for_squeak(&self, squeak_hash: &[u8; 32]) -> Result<Vec<ReceivedOffer>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .received_offers
            .values()
            .filter(|o| &o.squeak_hash == squeak_hash)
            .cloned()
            .collect())
    }

    async fn insert_sent_payment(&self, mut payment: SentPayment) -> Result<i64> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_sent_payment_id;
        tables.next_sent_payment_id += 1;
        payment.id = Some(id);
        tables.sent_payments.insert(id, payment);
        Ok(id)
    }

    async fn get_sent_payments(&self) -> Result<Vec<SentPayment>> {
        Ok(self.tables.lock().unwrap().sent_payments.values().cloned().collect())
    }

    async fn like_squeak(&self, squeak_hash: &[u8; 32]) -> Result<()> {
        self.tables.lock().unwrap().liked_squeaks.insert(*squeak_hash);
        Ok(())
    }

    async fn unlike_squeak(&self, squeak_hash: &[u8; 32]) -> Result<()> {
        self.tables.lock().unwrap().liked_squeaks.remove(squeak_hash);
        Ok(())
    }

    async fn get_liked_squeak_hashes(&self) -> Result<Vec<[u8; 32]>> {
        Ok(self.tables.lock().unwrap().liked_squeaks.iter().cloned().collect())
    }
}

impl InMemoryStorage {
    fn with_profile_mut(&self, profile_id: i64, f: impl FnOnce(&mut SqueakProfile)) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let profile = tables
            .profiles
            .get_mut(&profile_id)
            .ok_or_else(|| SqueaknodeError::StorageError(format!("no profile {profile_id}")))?;
        f(profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKey;

    #[tokio::test]
    async fn latest_settle_index_round_trips() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.get_latest_settle_index().await.unwrap(), None);
        storage.set_latest_settle_index(42).await.unwrap();
        assert_eq!(storage.get_latest_settle_index().await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn received_payment_insert_is_idempotent() {
        let storage = InMemoryStorage::new();
        let payment = ReceivedPayment {
            id: None,
            created_time_ms: 0,
            squeak_hash: [1u8; 32],
            payment_hash: [2u8; 32],
            price_msat: 1000,
            settle_index: 7,
            peer_address: PeerAddress::new("peer.example", 8336),
        };
        storage.insert_received_payment(payment.clone()).await.unwrap();
        let mut other = payment.clone();
        other.price_msat = 9999;
        storage.insert_received_payment(other).await.unwrap();
        let all = storage.get_received_payments().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].price_msat, 1000);
    }

    #[tokio::test]
    async fn profile_crud() {
        let storage = InMemoryStorage::new();
        let key = SigningKey::generate();
        let id = storage
            .insert_profile(SqueakProfile::new_signing("alice", &key))
            .await
            .unwrap();
        storage.set_profile_following(id, true).await.unwrap();
        let profile = storage.get_profile(id).await.unwrap();
        assert!(profile.following);
        storage.delete_profile(id).await.unwrap();
        assert!(storage.get_profile(id).await.is_err());
    }

    #[tokio::test]
    async fn peer_crud() {
        let storage = InMemoryStorage::new();
        let address = PeerAddress::new("peer.example", 8336);
        storage
            .insert_peer(PeerRecord {
                address: address.clone(),
                name: None,
                autoconnect: false,
            })
            .await
            .unwrap();
        storage.set_peer_autoconnect(&address, true).await.unwrap();
        let peer = storage.get_peer(&address).await.unwrap();
        assert!(peer.autoconnect);
        storage.delete_peer(&address).await.unwrap();
        assert!(storage.get_peer(&address).await.is_err());
    }
}

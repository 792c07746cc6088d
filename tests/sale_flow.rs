//! End-to-end coverage across `SqueakCore`, `Storage`, and
//! `SentOffersVerifier`: a seller posts a squeak, sells its key over a
//! shared fake Lightning backend, and the verifier background task
//! observes the settlement and records it without polling storage
//! directly from the test.

use std::sync::Arc;
use std::time::Duration;

use squeaknode_core::bitcoin_client::FakeBitcoinClient;
use squeaknode_core::connection_manager::ConnectionManager;
use squeaknode_core::crypto::SigningKey;
use squeaknode_core::error::SqueaknodeError;
use squeaknode_core::lightning_client::FakeLightningClient;
use squeaknode_core::peer_address::PeerAddress;
use squeaknode_core::profile::SqueakProfile;
use squeaknode_core::sent_offers_verifier::SentOffersVerifier;
use squeaknode_core::squeak_core::SqueakCore;
use squeaknode_core::storage::{InMemoryStorage, Storage};

fn chain() -> Arc<FakeBitcoinClient> {
    Arc::new(FakeBitcoinClient::new(800_000, [7u8; 32]))
}

#[tokio::test]
async fn settlement_is_recorded_by_the_background_verifier() {
    let lightning = Arc::new(FakeLightningClient::new());
    let seller_storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let seller_core = Arc::new(SqueakCore::new(chain(), lightning.clone()));

    let key = SigningKey::generate();
    let profile = SqueakProfile::new_signing("seller", &key);
    let (squeak, secret_key) = seller_core
        .make_squeak(&profile, "buy my key", None)
        .await
        .unwrap();

    let buyer_address = PeerAddress::new("buyer.example", 8336);
    let sent_offer = seller_core
        .create_offer(&squeak, &secret_key, &buyer_address, 5000)
        .await
        .unwrap();
    let payment_hash = sent_offer.payment_hash;
    seller_storage.insert_sent_offer(sent_offer.clone()).await.unwrap();

    let verifier = Arc::new(SentOffersVerifier::new(seller_storage.clone(), seller_core.clone()));
    let stop = verifier.stop_handle();
    let task = {
        let verifier = verifier.clone();
        tokio::spawn(async move { verifier.process_subscribed_invoices().await })
    };

    // The buyer pays through the same fake backend the seller registered
    // the invoice with.
    let offer = seller_core.package_offer(&sent_offer, None).await.unwrap();
    let buyer_core = SqueakCore::new(chain(), lightning.clone());
    let received_offer = buyer_core
        .unpack_offer(&squeak, &offer, &buyer_address)
        .await
        .unwrap();
    let sent_payment = buyer_core.pay_offer(&received_offer).await.unwrap();
    assert!(sent_payment.valid);

    let recorded = wait_for_received_payment(&seller_storage, payment_hash).await;
    assert_eq!(recorded.price_msat, 5000);
    assert_eq!(recorded.squeak_hash, squeak.squeak_hash());

    stop.cancel();
    task.await.unwrap();
}

async fn wait_for_received_payment(
    storage: &Arc<dyn Storage>,
    payment_hash: [u8; 32],
) -> squeaknode_core::received_payment::ReceivedPayment {
    for _ in 0..200 {
        let payments = storage.get_received_payments().await.unwrap();
        if let Some(p) = payments.into_iter().find(|p| p.payment_hash == payment_hash) {
            return p;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("received payment for {} was never recorded", hex::encode(payment_hash));
}

#[tokio::test]
async fn paying_a_tampered_payment_request_fails_cleanly() {
    let lightning = Arc::new(FakeLightningClient::new());
    let seller_core = SqueakCore::new(chain(), lightning.clone());
    let key = SigningKey::generate();
    let profile = SqueakProfile::new_signing("seller", &key);
    let (squeak, secret_key) = seller_core.make_squeak(&profile, "hi", None).await.unwrap();
    let buyer_address = PeerAddress::new("buyer.example", 8336);
    let sent_offer = seller_core
        .create_offer(&squeak, &secret_key, &buyer_address, 1000)
        .await
        .unwrap();
    let mut offer = seller_core.package_offer(&sent_offer, None).await.unwrap();
    offer.payment_request.push_str("garbage");

    let buyer_core = SqueakCore::new(chain(), lightning);
    let err = buyer_core
        .unpack_offer(&squeak, &offer, &buyer_address)
        .await
        .unwrap_err();
    assert!(matches!(err, SqueaknodeError::LightningError(_)));
}

#[test]
fn connection_manager_rejects_duplicate_peer_across_the_whole_lifecycle() {
    use squeaknode_core::connection_manager::{Peer, PeerVersion};

    let manager = ConnectionManager::new();
    let address = PeerAddress::new("peer.example", 8336);
    let peer = Peer::new(address.clone(), Some(PeerVersion { nonce: 1 }), None, Arc::new(|| {}));
    manager.add_peer(peer).unwrap();
    assert!(manager.has_connection(&address));

    let duplicate = Peer::new(address.clone(), Some(PeerVersion { nonce: 2 }), None, Arc::new(|| {}));
    let err = manager.add_peer(duplicate).unwrap_err();
    assert!(matches!(err, SqueaknodeError::DuplicatePeer(_)));

    manager.remove_peer(&address).unwrap();
    assert!(!manager.has_connection(&address));
}

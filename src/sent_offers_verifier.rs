//! Long-running consumer of Lightning invoice settlements. Ported from
//! `original_source/squeaknode/node/sent_offers_verifier.py`: watches the
//! settle-index stream for sent offers, retries on transport failure, and
//! persists a `ReceivedPayment` per settlement.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::received_payment::ReceivedPayment;
use crate::squeak_core::{SentOfferLookup, SqueakCore};
use crate::storage::Storage;

const LND_CONNECT_RETRY_S: u64 = 10;

pub struct SentOffersVerifier {
    storage: Arc<dyn Storage>,
    squeak_core: Arc<SqueakCore>,
    stop: CancellationToken,
}

impl SentOffersVerifier {
    pub fn new(storage: Arc<dyn Storage>, squeak_core: Arc<SqueakCore>) -> Self {
        Self {
            storage,
            squeak_core,
            stop: CancellationToken::new(),
        }
    }

    /// A cooperative stop handle: calling it cancels the in-flight invoice
    /// stream and short-circuits the retry sleep.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Runs until `stop_handle()` is triggered, retrying on any non-cancel
    /// error after `LND_CONNECT_RETRY_S` seconds.
    pub async fn process_subscribed_invoices(&self) {
        while !self.stop.is_cancelled() {
            self.try_processing().await;
        }
    }

    async fn try_processing(&self) {
        let latest_settle_index = self
            .storage
            .get_latest_settle_index()
            .await
            .unwrap_or(None)
            .unwrap_or(0);
        info!(latest_settle_index, "sent offers verifier: resuming subscription");

        let storage = self.storage.clone();
        let lookup: SentOfferLookup = Arc::new(move |payment_hash: [u8; 32]| {
            let storage = storage.clone();
            Box::pin(async move { storage.get_sent_offer_by_preimage_hash(&payment_hash).await })
        });

        let received = self.squeak_core.get_received_payments(latest_settle_index, lookup);

        tokio::select! {
            _ = self.stop.cancelled() => {
                received.cancel();
            }
            result = self.drain(received) => {
                if let Err(e) = result {
                    error!(
                        error = %e,
                        "sent offers verifier: unable to subscribe invoices, retrying in {LND_CONNECT_RETRY_S}s"
                    );
                    tokio::select! {
                        _ = self.stop.cancelled() => {}
                        _ = tokio::time::sleep(Duration::from_secs(LND_CONNECT_RETRY_S)) => {}
                    }
                }
            }
        }
    }

    async fn drain(
        &self,
        received: crate::squeak_core::ReceivedPaymentsStream,
    ) -> crate::error::Result<()> {
        use futures::StreamExt;
        let mut stream = received.stream;
        while let Some(item) = stream.next().await {
            let payment: ReceivedPayment = item?;
            info!(
                squeak_hash = %hex::encode(payment.squeak_hash),
                settle_index = payment.settle_index,
                "sent offers verifier: recording received payment"
            );
            self.storage.insert_received_payment(payment.clone()).await?;
            self.storage.set_latest_settle_index(payment.settle_index).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin_client::FakeBitcoinClient;
    use crate::crypto::SigningKey;
    use crate::lightning_client::{FakeLightningClient, LightningClient};
    use crate::peer_address::PeerAddress;
    use crate::profile::SqueakProfile;
    use crate::storage::InMemoryStorage;

    #[tokio::test]
    async fn verifier_records_settled_payment_and_advances_settle_index() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let bitcoin = Arc::new(FakeBitcoinClient::new(800_000, [1u8; 32]));
        let lightning = Arc::new(FakeLightningClient::new());
        let squeak_core = Arc::new(SqueakCore::new(bitcoin, lightning.clone()));

        let key = SigningKey::generate();
        let profile = SqueakProfile::new_signing("seller", &key);
        let (squeak, secret_key) = squeak_core.make_squeak(&profile, "hi", None).await.unwrap();
        let peer_address = PeerAddress::new("buyer.example", 8336);
        let sent_offer = squeak_core
            .create_offer(&squeak, &secret_key, &peer_address, 1000)
            .await
            .unwrap();
        storage.insert_sent_offer(sent_offer.clone()).await.unwrap();

        let verifier = Arc::new(SentOffersVerifier::new(storage.clone(), squeak_core));
        let stop = verifier.stop_handle();
        let verifier_task = {
            let verifier = verifier.clone();
            tokio::spawn(async move { verifier.process_subscribed_invoices().await })
        };

        // Give the verifier a moment to subscribe before the invoice settles.
        tokio::time::sleep(Duration::from_millis(20)).await;
        lightning.pay_invoice_sync(&sent_offer.payment_request).await.unwrap();

        // Poll until the payment lands, bounded to avoid hanging the suite.
        for _ in 0..200 {
            if !storage.get_received_payments().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        stop.cancel();
        let _ = verifier_task.await;

        let payments = storage.get_received_payments().await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].squeak_hash, squeak.squeak_hash());
        assert_eq!(storage.get_latest_settle_index().await.unwrap(), Some(payments[0].settle_index));
    }
}

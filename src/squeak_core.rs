//! `SqueakCore`: make/check/decrypt squeaks; create/package/unpack offers;
//! pay offers; stream received payments.
//!
//! Ported from `original_source/squeaknode/core/squeak_core.py`, kept as a
//! thin orchestration layer over the crypto, Bitcoin, and Lightning
//! collaborators — it owns no state of its own.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::Stream;
use tracing::{debug, info};

use crate::bitcoin_client::BitcoinClient;
use crate::crypto::{scalar_to_point, tweak_add, tweak_sub, Scalar};
use crate::error::{Result, SqueaknodeError};
use crate::lightning_address::LightningAddressHostPort;
use crate::lightning_client::LightningClient;
use crate::offer::Offer;
use crate::peer_address::PeerAddress;
use crate::profile::SqueakProfile;
use crate::received_offer::ReceivedOffer;
use crate::received_payment::ReceivedPayment;
use crate::sent_offer::SentOffer;
use crate::sent_payment::SentPayment;
use crate::squeak::{self, Squeak};

/// Callback the caller supplies to `get_received_payments` to map a settled
/// invoice's payment hash back to the `SentOffer` it paid for.
pub type SentOfferLookup =
    Arc<dyn Fn([u8; 32]) -> Pin<Box<dyn Future<Output = Result<SentOffer>> + Send>> + Send + Sync>;

pub struct ReceivedPaymentsStream {
    pub stream: Pin<Box<dyn Stream<Item = Result<ReceivedPayment>> + Send>>,
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl ReceivedPaymentsStream {
    pub fn cancel(&self) {
        (self.cancel)()
    }
}

pub struct SqueakCore {
    bitcoin_client: Arc<dyn BitcoinClient>,
    lightning_client: Arc<dyn LightningClient>,
}

impl SqueakCore {
    pub fn new(bitcoin_client: Arc<dyn BitcoinClient>, lightning_client: Arc<dyn LightningClient>) -> Self {
        Self {
            bitcoin_client,
            lightning_client,
        }
    }

    /// Creates a new squeak authored by `signing_profile`, anchored to the
    /// current best block and wall-clock time.
    pub async fn make_squeak(
        &self,
        signing_profile: &SqueakProfile,
        content_str: &str,
        reply_to_hash: Option<[u8; 32]>,
    ) -> Result<(Squeak, Scalar)> {
        if signing_profile.private_key.is_none() {
            return Err(SqueaknodeError::ProfileNotSigning);
        }
        let block_info = self.bitcoin_client.get_best_block_info().await?;
        let timestamp = now_secs();
        squeak::make_squeak(
            signing_profile,
            content_str,
            block_info.block_height,
            block_info.block_hash,
            timestamp,
            reply_to_hash,
        )
    }

    /// Validates signature and canonical form only; does not check the
    /// block-hash anchor (see `check_block_anchor`).
    pub fn check_squeak(&self, squeak: &Squeak) -> Result<()> {
        squeak.check()
    }

    /// Validates that `squeak.block_hash` equals the real hash of the block
    /// at `squeak.block_height` in the consulted chain.
    pub async fn check_block_anchor(&self, squeak: &Squeak) -> Result<()> {
        let block_info = self
            .bitcoin_client
            .get_block_info_by_height(squeak.block_height)
            .await?;
        if block_info.block_hash != squeak.block_hash {
            return Err(SqueaknodeError::InvalidSqueak(
                "block hash incorrect for block height".into(),
            ));
        }
        Ok(())
    }

    pub fn get_decrypted_content(&self, squeak: &Squeak, secret_key: &Scalar) -> Result<String> {
        squeak.decrypt(secret_key)
    }

    /// Creates an offer to sell `squeak`'s key to `peer_address` for
    /// `price_msat`. Generates a fresh nonce, tweaks `secret_key` by it, and
    /// opens a HODL invoice whose preimage *is* the tweaked value.
    pub async fn create_offer(
        &self,
        squeak: &Squeak,
        secret_key: &Scalar,
        peer_address: &PeerAddress,
        price_msat: u64,
    ) -> Result<SentOffer> {
        let squeak_hash = squeak.squeak_hash();
        let nonce = crate::crypto::generate_tweak();
        let preimage = tweak_add(secret_key, &nonce)?;

        let add_invoice_response = self.lightning_client.add_invoice(&preimage, price_msat).await?;
        let payment_hash = add_invoice_response.r_hash;
        let payment_request = add_invoice_response.payment_request;

        let lookup = self
            .lightning_client
            .lookup_invoice(&hex::encode(payment_hash))
            .await?;

        info!(
            squeak_hash = %hex::encode(squeak_hash),
            payment_hash = %hex::encode(payment_hash),
            price_msat,
            "created offer"
        );

        Ok(SentOffer {
            id: None,
            squeak_hash,
            payment_hash,
            secret_key: preimage,
            nonce,
            price_msat,
            payment_request,
            invoice_time: lookup.creation_date,
            invoice_expiry: lookup.expiry,
            peer_address: peer_address.clone(),
            paid: false,
            settle_index: None,
        })
    }

    /// Resolves this node's externally reachable Lightning address from the
    /// first `get_info().uris` entry, if any.
    pub async fn get_lnd_external_address(&self) -> Result<Option<LightningAddressHostPort>> {
        let info = self.lightning_client.get_info().await?;
        for uri in &info.uris {
            if let Some((_, address)) = uri.split_once('@') {
                if let Some((host, port_str)) = address.split_once(':') {
                    if let Ok(port) = port_str.parse() {
                        return Ok(Some(LightningAddressHostPort {
                            host: host.to_string(),
                            port,
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Packages `sent_offer` for transport to the buyer.
    pub async fn package_offer(
        &self,
        sent_offer: &SentOffer,
        lnd_external_address: Option<LightningAddressHostPort>,
    ) -> Result<Offer> {
        let address = match lnd_external_address {
            Some(addr) => Some(addr),
            None => self.get_lnd_external_address().await?,
        };
        Ok(Offer {
            squeak_hash: sent_offer.squeak_hash,
            nonce: sent_offer.nonce,
            payment_request: sent_offer.payment_request.clone(),
            host: address.as_ref().map(|a| a.host.clone()).unwrap_or_default(),
            port: address.as_ref().map(|a| a.port).unwrap_or(0),
        })
    }

    /// Unpacks an offer received from the seller. Fails with
    /// `OfferHashMismatch` if the offer's hash disagrees with the squeak.
    /// `payment_point` is carried forward unverified (see DESIGN.md §9
    /// decision 1); validation happens implicitly in `pay_offer`.
    pub async fn unpack_offer(
        &self,
        squeak: &Squeak,
        offer: &Offer,
        peer_address: &PeerAddress,
    ) -> Result<ReceivedOffer> {
        let squeak_hash = squeak.squeak_hash();
        if squeak_hash != offer.squeak_hash {
            return Err(SqueaknodeError::OfferHashMismatch);
        }
        let pay_req = self.lightning_client.decode_pay_req(&offer.payment_request).await?;

        let lightning_address = LightningAddressHostPort {
            host: if offer.host.is_empty() {
                peer_address.host.clone()
            } else {
                offer.host.clone()
            },
            port: offer.port,
        };

        Ok(ReceivedOffer {
            id: None,
            squeak_hash,
            price_msat: pay_req.num_msat,
            payment_hash: pay_req.payment_hash,
            nonce: offer.nonce,
            payment_point: squeak.payment_point,
            invoice_timestamp: pay_req.timestamp,
            invoice_expiry: pay_req.expiry,
            payment_request: offer.payment_request.clone(),
            destination: pay_req.destination,
            lightning_address,
            peer_address: peer_address.clone(),
        })
    }

    /// Pays the invoice in `received_offer` and recovers the secret key
    /// from the revealed preimage. The record is produced even when
    /// `valid` is false — the payment happened either way.
    pub async fn pay_offer(&self, received_offer: &ReceivedOffer) -> Result<SentPayment> {
        let payment = self
            .lightning_client
            .pay_invoice_sync(&received_offer.payment_request)
            .await?;
        if payment.payment_preimage.is_empty() {
            return Err(SqueaknodeError::PaymentFailed(
                payment.payment_error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let mut preimage = [0u8; 32];
        if payment.payment_preimage.len() != 32 {
            return Err(SqueaknodeError::PaymentFailed(
                "preimage was not 32 bytes".to_string(),
            ));
        }
        preimage.copy_from_slice(&payment.payment_preimage);

        let secret_key = tweak_sub(&preimage, &received_offer.nonce)?;
        let point = scalar_to_point(&secret_key)?;
        let valid = point == received_offer.payment_point;

        debug!(valid, "paid offer");

        Ok(SentPayment {
            id: None,
            created_time_ms: now_millis(),
            peer_address: received_offer.peer_address.clone(),
            squeak_hash: received_offer.squeak_hash,
            payment_hash: received_offer.payment_hash,
            secret_key,
            price_msat: received_offer.price_msat,
            node_pubkey: received_offer.destination.clone(),
            valid,
        })
    }

    /// Subscribes to settled invoices strictly after `latest_settle_index`,
    /// yielding a `ReceivedPayment` for each by resolving its `SentOffer`
    /// via `lookup`.
    pub fn get_received_payments(
        &self,
        latest_settle_index: u64,
        lookup: SentOfferLookup,
    ) -> ReceivedPaymentsStream {
        let subscription = self.lightning_client.subscribe_invoices(latest_settle_index);
        let cancel_token = subscription.cancel_token();
        let cancel: Arc<dyn Fn() + Send + Sync> = Arc::new(move || cancel_token.cancel());

        use futures::StreamExt;
        let stream = subscription.stream.filter_map(move |item| {
            let lookup = lookup.clone();
            async move {
                match item {
                    Ok(invoice) if invoice.settled => {
                        let sent_offer = match lookup(invoice.r_hash).await {
                            Ok(o) => o,
                            Err(e) => return Some(Err(e)),
                        };
                        Some(Ok(ReceivedPayment {
                            id: None,
                            created_time_ms: now_millis(),
                            squeak_hash: sent_offer.squeak_hash,
                            payment_hash: sent_offer.payment_hash,
                            price_msat: sent_offer.price_msat,
                            settle_index: invoice.settle_index,
                            peer_address: sent_offer.peer_address,
                        }))
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            }
        });

        ReceivedPaymentsStream {
            stream: Box::pin(stream),
            cancel,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin_client::FakeBitcoinClient;
    use crate::crypto::SigningKey;
    use crate::lightning_client::FakeLightningClient;

    fn core() -> (SqueakCore, Arc<FakeLightningClient>) {
        let bitcoin = Arc::new(FakeBitcoinClient::new(800_000, [1u8; 32]));
        let lightning = Arc::new(FakeLightningClient::new());
        (SqueakCore::new(bitcoin, lightning.clone()), lightning)
    }

    #[tokio::test]
    async fn happy_path_sale() {
        let (seller_core, seller_ln) = core();
        let key = SigningKey::generate();
        let profile = SqueakProfile::new_signing("seller", &key);
        let (squeak, secret_key) = seller_core
            .make_squeak(&profile, "hello buyer", None)
            .await
            .unwrap();

        let peer_address = PeerAddress::new("buyer.example", 8336);
        let sent_offer = seller_core
            .create_offer(&squeak, &secret_key, &peer_address, 1000)
            .await
            .unwrap();
        let offer = seller_core.package_offer(&sent_offer, None).await.unwrap();

        // The buyer pays through the same Lightning backend the seller
        // registered the invoice with, as it would in reality route
        // through the shared network rather than two disjoint fakes.
        let buyer_core = SqueakCore::new(Arc::new(FakeBitcoinClient::new(800_000, [1u8; 32])), seller_ln);
        let received_offer = buyer_core
            .unpack_offer(&squeak, &offer, &peer_address)
            .await
            .unwrap();
        let sent_payment = buyer_core.pay_offer(&received_offer).await.unwrap();

        assert_eq!(sent_payment.secret_key, secret_key);
        assert!(sent_payment.valid);
        assert_eq!(
            buyer_core.get_decrypted_content(&squeak, &sent_payment.secret_key).unwrap(),
            "hello buyer"
        );
    }

    #[tokio::test]
    async fn tampered_offer_hash_rejected() {
        let (seller_core, seller_ln) = core();
        let key = SigningKey::generate();
        let profile = SqueakProfile::new_signing("seller", &key);
        let (squeak, secret_key) = seller_core.make_squeak(&profile, "hi", None).await.unwrap();
        let peer_address = PeerAddress::new("buyer.example", 8336);
        let sent_offer = seller_core
            .create_offer(&squeak, &secret_key, &peer_address, 1000)
            .await
            .unwrap();
        let mut offer = seller_core.package_offer(&sent_offer, None).await.unwrap();
        offer.squeak_hash[0] ^= 0xff;

        let buyer_core = SqueakCore::new(Arc::new(FakeBitcoinClient::new(800_000, [1u8; 32])), seller_ln);
        let err = buyer_core
            .unpack_offer(&squeak, &offer, &peer_address)
            .await
            .unwrap_err();
        assert!(matches!(err, SqueaknodeError::OfferHashMismatch));
    }

    #[tokio::test]
    async fn package_offer_falls_back_to_empty_address() {
        let bitcoin = Arc::new(FakeBitcoinClient::new(800_000, [1u8; 32]));
        let lightning = Arc::new(FakeLightningClient::with_uris(vec![]));
        let seller_core = SqueakCore::new(bitcoin, lightning);
        let key = SigningKey::generate();
        let profile = SqueakProfile::new_signing("seller", &key);
        let (squeak, secret_key) = seller_core.make_squeak(&profile, "hi", None).await.unwrap();
        let peer_address = PeerAddress::new("buyer.example", 8336);
        let sent_offer = seller_core
            .create_offer(&squeak, &secret_key, &peer_address, 1000)
            .await
            .unwrap();
        let offer = seller_core.package_offer(&sent_offer, None).await.unwrap();
        assert_eq!(offer.host, "");
        assert_eq!(offer.port, 0);
    }
}

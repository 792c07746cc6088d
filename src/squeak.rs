//! `Squeak`: an authenticated, encrypted, block-anchored social post.

use serde::{Deserialize, Serialize};

use crate::crypto::{
    self, decrypt_content, encrypt_content, hash_bytes, scalar_to_point, Point, Scalar, SigningKey,
};
use crate::error::{Result, SqueaknodeError};
use crate::profile::SqueakProfile;

const SQUEAK_VERSION: u32 = 1;

/// Canonical, immutable squeak record. Identity is `squeak_hash`, the digest
/// of its canonical serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Squeak {
    pub version: u32,
    pub author_address: String,
    pub content_ciphertext: Vec<u8>,
    pub block_height: u64,
    pub block_hash: [u8; 32],
    pub timestamp: u64,
    pub reply_to_hash: Option<[u8; 32]>,
    pub payment_point: Point,
    pub signature: [u8; 64],
    pub author_pubkey: Point,
}

impl Squeak {
    /// The bytes that are hashed for `squeak_hash` and signed for
    /// authorship. Every field but the signature participates.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(self.author_address.as_bytes());
        buf.extend_from_slice(&self.content_ciphertext);
        buf.extend_from_slice(&self.block_height.to_be_bytes());
        buf.extend_from_slice(&self.block_hash);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        if let Some(reply) = &self.reply_to_hash {
            buf.extend_from_slice(reply);
        }
        buf.extend_from_slice(&self.payment_point);
        buf
    }

    /// `squeak_hash(squeak) = H(canonical-serialization)`.
    pub fn squeak_hash(&self) -> [u8; 32] {
        hash_bytes(&self.canonical_bytes())
    }

    /// Checks signature, canonical form, and well-formedness of the payment
    /// point. Does not check the block-hash anchor (that requires a
    /// `BitcoinClient` round trip, done separately).
    pub fn check(&self) -> Result<()> {
        let digest = hash_bytes(&self.canonical_bytes());
        let valid = SigningKey::verify_address(
            &digest,
            &self.signature,
            &self.author_pubkey,
            &self.author_address,
        )?;
        if !valid {
            return Err(SqueaknodeError::InvalidSqueak(
                "signature does not verify against author_address".into(),
            ));
        }
        if secp256k1::PublicKey::from_slice(&self.payment_point).is_err() {
            return Err(SqueaknodeError::InvalidSqueak(
                "payment_point is not a valid compressed point".into(),
            ));
        }
        Ok(())
    }

    /// Decrypts content with `secret_key`, failing with `InvalidKey` if it
    /// does not match this squeak's `payment_point`.
    pub fn decrypt(&self, secret_key: &Scalar) -> Result<String> {
        let point = scalar_to_point(secret_key)?;
        if point != self.payment_point {
            return Err(SqueaknodeError::InvalidKey);
        }
        decrypt_content(secret_key, &self.content_ciphertext)
    }
}

/// Creates a new squeak authored by `signing_profile`, anchored to
/// `(block_height, block_hash)` and the given wall-clock `timestamp`
/// (seconds). Returns the squeak and its 32-byte decryption secret_key.
///
/// Fails with `ProfileNotSigning` if `signing_profile` has no private key.
pub fn make_squeak(
    signing_profile: &SqueakProfile,
    content_str: &str,
    block_height: u64,
    block_hash: [u8; 32],
    timestamp: u64,
    reply_to_hash: Option<[u8; 32]>,
) -> Result<(Squeak, Scalar)> {
    let private_key = signing_profile
        .private_key
        .ok_or(SqueaknodeError::ProfileNotSigning)?;
    let signing_key = SigningKey::from_bytes(&private_key)?;

    let secret_key = crypto::generate_tweak();
    let payment_point = scalar_to_point(&secret_key)?;
    let content_ciphertext = encrypt_content(&secret_key, content_str)?;

    let mut squeak = Squeak {
        version: SQUEAK_VERSION,
        author_address: signing_profile.address.clone(),
        content_ciphertext,
        block_height,
        block_hash,
        timestamp,
        reply_to_hash,
        payment_point,
        signature: [0u8; 64],
        author_pubkey: signing_key.public_key(),
    };
    let digest = hash_bytes(&squeak.canonical_bytes());
    squeak.signature = signing_key.sign(&digest)?;

    Ok((squeak, secret_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKey;

    fn signing_profile() -> (SqueakProfile, SigningKey) {
        let key = SigningKey::generate();
        (SqueakProfile::new_signing("alice", &key), key)
    }

    #[test]
    fn make_squeak_requires_signing_profile() {
        let contact = SqueakProfile::new_contact("bob", "someaddr");
        let err = make_squeak(&contact, "hi", 100, [0u8; 32], 1000, None).unwrap_err();
        assert!(matches!(err, SqueaknodeError::ProfileNotSigning));
    }

    #[test]
    fn make_squeak_round_trips_content() {
        let (profile, _key) = signing_profile();
        let (squeak, secret_key) =
            make_squeak(&profile, "hello world", 100, [7u8; 32], 12345, None).unwrap();
        squeak.check().unwrap();
        assert_eq!(squeak.decrypt(&secret_key).unwrap(), "hello world");
    }

    #[test]
    fn decrypt_with_wrong_key_is_invalid() {
        let (profile, _key) = signing_profile();
        let (squeak, _secret_key) =
            make_squeak(&profile, "hello world", 100, [7u8; 32], 12345, None).unwrap();
        let wrong_key = crypto::generate_tweak();
        assert!(matches!(
            squeak.decrypt(&wrong_key),
            Err(SqueaknodeError::InvalidKey)
        ));
    }

    #[test]
    fn tampered_squeak_fails_check() {
        let (profile, _key) = signing_profile();
        let (mut squeak, _secret_key) =
            make_squeak(&profile, "hello world", 100, [7u8; 32], 12345, None).unwrap();
        squeak.timestamp += 1;
        assert!(squeak.check().is_err());
    }

    #[test]
    fn squeak_hash_is_stable() {
        let (profile, _key) = signing_profile();
        let (squeak, _secret_key) =
            make_squeak(&profile, "hello world", 100, [7u8; 32], 12345, None).unwrap();
        assert_eq!(squeak.squeak_hash(), squeak.squeak_hash());
    }
}

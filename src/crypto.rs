//! Scalar-tweak arithmetic, payment points, squeak hashing, and content
//! encryption.
//!
//! The sale protocol hinges on one algebraic fact: tweaking a secret key by
//! a nonce and later untweaking it by the same nonce recovers the original
//! key. `tweak_add`/`tweak_sub` are addition/subtraction mod the secp256k1
//! curve order; `scalar_to_point` publishes the corresponding public
//! commitment.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::error::{Result, SqueaknodeError};

/// A 32-byte scalar: secret key, nonce, or preimage, depending on context.
pub type Scalar = [u8; 32];

/// A 33-byte compressed secp256k1 point.
pub type Point = [u8; 33];

/// `tweak_add(a, b) = a + b mod n`.
pub fn tweak_add(a: &Scalar, b: &Scalar) -> Result<Scalar> {
    let a = SecretKey::from_slice(a)
        .map_err(|e| SqueaknodeError::InvalidSqueak(format!("bad scalar: {e}")))?;
    let a = a
        .add_tweak(&secp256k1::Scalar::from_be_bytes(*b).map_err(|e| {
            SqueaknodeError::InvalidSqueak(format!("bad tweak: {e}"))
        })?)
        .map_err(|e| SqueaknodeError::InvalidSqueak(format!("tweak add overflow: {e}")))?;
    Ok(a.secret_bytes())
}

/// `tweak_sub(a, b) = a - b mod n`.
pub fn tweak_sub(a: &Scalar, b: &Scalar) -> Result<Scalar> {
    let neg_b = SecretKey::from_slice(b)
        .map_err(|e| SqueaknodeError::InvalidSqueak(format!("bad scalar: {e}")))?
        .negate();
    tweak_add(a, &neg_b.secret_bytes())
}

/// A fresh, uniformly random, non-zero scalar in the curve's valid range.
pub fn generate_tweak() -> Scalar {
    loop {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        if SecretKey::from_slice(&bytes).is_ok() {
            return bytes;
        }
    }
}

/// `scalar_to_point(s) = G * s`, compressed.
pub fn scalar_to_point(s: &Scalar) -> Result<Point> {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(s)
        .map_err(|e| SqueaknodeError::InvalidSqueak(format!("bad scalar: {e}")))?;
    let public = PublicKey::from_secret_key(&secp, &secret);
    Ok(public.serialize())
}

/// Digest of an already-canonicalized buffer. Callers pass the canonical
/// serialization of a `Squeak`; this is intentionally a free function over
/// bytes rather than over the `Squeak` type so it has no dependency on the
/// squeak module.
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let first = hasher.finalize();
    let mut hasher = Sha256::new();
    hasher.update(first);
    hasher.finalize().into()
}

/// SHA256 once, as used for Lightning payment hashes (`r_hash = SHA256(preimage)`).
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derives the base58check-free address used to identify a `SqueakProfile`:
/// hex of SHA256(pubkey). Kept simple and deterministic; the wire format for
/// addresses is not otherwise constrained by the spec.
pub fn address_from_pubkey(pubkey: &Point) -> String {
    hex::encode(sha256(pubkey))
}

/// Wraps a secp256k1 signing key for squeak authorship.
pub struct SigningKey {
    secret: SecretKey,
}

impl SigningKey {
    pub fn from_bytes(bytes: &Scalar) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| SqueaknodeError::InvalidSqueak(format!("bad signing key: {e}")))?;
        Ok(Self { secret })
    }

    pub fn generate() -> Self {
        let mut bytes = generate_tweak();
        loop {
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return Self { secret };
            }
            bytes = generate_tweak();
        }
    }

    pub fn to_bytes(&self) -> Scalar {
        self.secret.secret_bytes()
    }

    pub fn public_key(&self) -> Point {
        let secp = Secp256k1::new();
        PublicKey::from_secret_key(&secp, &self.secret).serialize()
    }

    pub fn address(&self) -> String {
        address_from_pubkey(&self.public_key())
    }

    /// Signs a 32-byte message digest, returning a compact signature.
    pub fn sign(&self, msg32: &[u8; 32]) -> Result<[u8; 64]> {
        let secp = Secp256k1::new();
        let message = secp256k1::Message::from_digest_slice(msg32)
            .map_err(|e| SqueaknodeError::InvalidSqueak(format!("bad message: {e}")))?;
        let sig = secp.sign_ecdsa(&message, &self.secret);
        Ok(sig.serialize_compact())
    }

    /// Verifies that `sig` over `msg32` was produced by the key whose
    /// address is `address`.
    pub fn verify_address(msg32: &[u8; 32], sig: &[u8; 64], pubkey: &Point, address: &str) -> Result<bool> {
        if address_from_pubkey(pubkey) != address {
            return Ok(false);
        }
        let secp = Secp256k1::new();
        let message = secp256k1::Message::from_digest_slice(msg32)
            .map_err(|e| SqueaknodeError::InvalidSqueak(format!("bad message: {e}")))?;
        let public = PublicKey::from_slice(pubkey)
            .map_err(|e| SqueaknodeError::InvalidSqueak(format!("bad pubkey: {e}")))?;
        let signature = secp256k1::ecdsa::Signature::from_compact(sig)
            .map_err(|e| SqueaknodeError::InvalidSqueak(format!("bad signature: {e}")))?;
        Ok(secp.verify_ecdsa(&message, &signature, &public).is_ok())
    }
}

/// Encrypts squeak content with the squeak's secret key. Every squeak gets a
/// freshly generated secret_key used to encrypt exactly one ciphertext, so a
/// fixed nonce never sees key reuse (see DESIGN.md, Open Question 3).
pub fn encrypt_content(secret_key: &Scalar, plaintext: &str) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(secret_key));
    let nonce = Nonce::default();
    cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| SqueaknodeError::InvalidSqueak(format!("encryption failed: {e}")))
}

/// Decrypts squeak content, failing with `InvalidKey` on AEAD tag mismatch.
pub fn decrypt_content(secret_key: &Scalar, ciphertext: &[u8]) -> Result<String> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(secret_key));
    let nonce = Nonce::default();
    let plaintext = cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|_| SqueaknodeError::InvalidKey)?;
    String::from_utf8(plaintext).map_err(|_| SqueaknodeError::InvalidKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tweak_round_trip() {
        let a = SigningKey::generate().to_bytes();
        let t = generate_tweak();
        let added = tweak_add(&a, &t).unwrap();
        let recovered = tweak_sub(&added, &t).unwrap();
        assert_eq!(a, recovered);
    }

    #[test]
    fn scalar_to_point_is_deterministic() {
        let key = SigningKey::generate();
        let p1 = scalar_to_point(&key.to_bytes()).unwrap();
        let p2 = scalar_to_point(&key.to_bytes()).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(p1, key.public_key());
    }

    #[test]
    fn sign_and_verify() {
        let key = SigningKey::generate();
        let msg = hash_bytes(b"hello squeak");
        let sig = key.sign(&msg).unwrap();
        assert!(SigningKey::verify_address(&msg, &sig, &key.public_key(), &key.address()).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_address() {
        let key = SigningKey::generate();
        let other = SigningKey::generate();
        let msg = hash_bytes(b"hello squeak");
        let sig = key.sign(&msg).unwrap();
        assert!(!SigningKey::verify_address(&msg, &sig, &key.public_key(), &other.address()).unwrap());
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = SigningKey::generate().to_bytes();
        let ciphertext = encrypt_content(&key, "hello world").unwrap();
        let plaintext = decrypt_content(&key, &ciphertext).unwrap();
        assert_eq!(plaintext, "hello world");
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key = SigningKey::generate().to_bytes();
        let other = SigningKey::generate().to_bytes();
        let ciphertext = encrypt_content(&key, "hello world").unwrap();
        assert!(matches!(
            decrypt_content(&other, &ciphertext),
            Err(SqueaknodeError::InvalidKey)
        ));
    }
}

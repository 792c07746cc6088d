//! `SqueakProfile`: a local identity, either able to author squeaks
//! (a signing profile, carrying a private key) or only to receive/follow
//! them (a contact profile).

use serde::{Deserialize, Serialize};

use crate::crypto::Scalar;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqueakProfile {
    pub profile_id: Option<i64>,
    pub name: String,
    pub address: String,
    /// Present only for a signing profile.
    pub private_key: Option<Scalar>,
    pub following: bool,
    pub use_custom_price: bool,
    pub custom_price_msat: Option<u64>,
    pub image: Option<Vec<u8>>,
}

impl SqueakProfile {
    pub fn is_signing(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn new_contact(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            profile_id: None,
            name: name.into(),
            address: address.into(),
            private_key: None,
            following: false,
            use_custom_price: false,
            custom_price_msat: None,
            image: None,
        }
    }

    pub fn new_signing(name: impl Into<String>, signing_key: &crate::crypto::SigningKey) -> Self {
        Self {
            profile_id: None,
            name: name.into(),
            address: signing_key.address(),
            private_key: Some(signing_key.to_bytes()),
            following: false,
            use_custom_price: false,
            custom_price_msat: None,
            image: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKey;

    #[test]
    fn signing_profile_has_private_key() {
        let key = SigningKey::generate();
        let profile = SqueakProfile::new_signing("alice", &key);
        assert!(profile.is_signing());
        assert_eq!(profile.address, key.address());
    }

    #[test]
    fn contact_profile_has_no_private_key() {
        let profile = SqueakProfile::new_contact("bob", "deadbeef");
        assert!(!profile.is_signing());
    }
}

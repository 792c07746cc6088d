//! Value-typed peer address, used as a `HashMap` key by the connection
//! manager.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn usable_as_map_key() {
        let mut map = HashMap::new();
        map.insert(PeerAddress::new("10.0.0.1", 8333), "peer-a");
        assert_eq!(map.get(&PeerAddress::new("10.0.0.1", 8333)), Some(&"peer-a"));
        assert_eq!(map.get(&PeerAddress::new("10.0.0.1", 8334)), None);
    }
}

//! Host/port of a Lightning node, as advertised in `get_info().uris` or
//! carried on an `Offer`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningAddressHostPort {
    pub host: String,
    pub port: u16,
}

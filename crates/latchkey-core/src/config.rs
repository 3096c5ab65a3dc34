//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default safety buffer subtracted from token expiry, absorbing clock
/// skew and request latency.
pub const DEFAULT_EXPIRY_BUFFER_SECS: u64 = 10;

/// Tunables for a [`crate::SessionEngine`] instance.
///
/// Serde-derived so hosts can embed it in their own config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds before actual expiry at which an access token is already
    /// treated as expired.
    pub expiry_buffer_secs: u64,
    /// Prefix for storage keys, isolating multiple SDK instances sharing
    /// one storage area.
    pub storage_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
            storage_namespace: "latchkey".to_string(),
        }
    }
}

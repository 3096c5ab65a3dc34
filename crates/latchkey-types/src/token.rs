//! Token pair issued by the platform.

use serde::{Deserialize, Serialize};

/// An access/refresh token pair as returned by authenticate and refresh
/// operations. The access token is short-lived and tab-scoped; the refresh
/// token is long-lived and durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    /// Absent when the platform rotates refresh tokens out of band.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

/// Returns a masked version of a token for display (first 12 chars + ...).
///
/// Tokens are never logged or displayed in full.
pub fn mask_token(token: &str) -> String {
    if token.len() <= 16 {
        return "***".to_string();
    }
    format!("{}...", &token[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: token masking.
    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("lk-at-long-token-goes-here"), "lk-at-long-t...");
        assert_eq!(mask_token("short"), "***");
    }

    /// Test: refresh token omitted from serialized form when absent.
    #[test]
    fn test_token_pair_serialization() {
        let pair = TokenPair::new("access", None);
        let json = serde_json::to_string(&pair).unwrap();
        assert!(!json.contains("refresh_token"));

        let pair = TokenPair::new("access", Some("refresh".to_string()));
        let back: TokenPair = serde_json::from_str(&serde_json::to_string(&pair).unwrap()).unwrap();
        assert_eq!(back, pair);
    }
}

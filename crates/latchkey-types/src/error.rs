//! Error codes and the discriminated remote-call error type.

use serde::{Deserialize, Serialize};

/// Stable error codes returned by the platform (wire form: snake_case).
///
/// Codes written by a newer platform version deserialize to [`ErrorCode::Unknown`]
/// instead of failing, so an SDK never chokes on a code it does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidEmail,
    InvalidPassword,
    InvalidCode,
    InvalidResetToken,
    /// Soft error: a magic code was issued recently; carries a resend timer.
    MagicCodeRecentlyCreated,
    /// The server-side sign-in attempt no longer exists.
    SignInNotFound,
    /// The server-side sign-in attempt has expired.
    SignInExpired,
    AccountLocked,
    /// Social sign-in completed but required profile fields are missing.
    MissingFields,
    /// The account exists under another brand and must be connected first.
    ConnectBrand,
    /// Synthesized locally for transport failures; never sent on the wire.
    ConnectivityError,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    /// Session-fatal codes: the referenced server-side sign-in attempt is
    /// gone, so continuing would re-submit against a dead session id. They
    /// force a full session reset (preserving only the typed email) instead
    /// of being surfaced as a field error.
    pub fn is_session_fatal(self) -> bool {
        matches!(
            self,
            ErrorCode::SignInNotFound | ErrorCode::SignInExpired | ErrorCode::AccountLocked
        )
    }
}

/// Error outcome of a remote operation.
///
/// Expected failure modes (wrong password, expired code) are values of this
/// type, never panics. Transport failures are a distinct variant so callers
/// can tell "the user's input was wrong" from "the network was wrong".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The platform rejected the request with a known error body.
    #[error("platform error: {code:?}")]
    Platform {
        code: ErrorCode,
        /// Present on `magic_code_recently_created`: seconds until a resend
        /// is allowed.
        resend_after_seconds: Option<u64>,
    },
    /// The request never produced a decodable platform response.
    #[error("connectivity failure: {0}")]
    Connectivity(String),
    /// The response arrived but its payload could not be decoded.
    #[error("payload decode failure: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn platform(code: ErrorCode) -> Self {
        ApiError::Platform {
            code,
            resend_after_seconds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: codes deserialize from snake_case, unknown codes degrade.
    #[test]
    fn test_error_code_wire_form() {
        let code: ErrorCode = serde_json::from_str(r#""sign_in_expired""#).unwrap();
        assert_eq!(code, ErrorCode::SignInExpired);

        let code: ErrorCode = serde_json::from_str(r#""brand_new_failure_mode""#).unwrap();
        assert_eq!(code, ErrorCode::Unknown);
    }

    /// Test: exactly the three dead-session codes are fatal.
    #[test]
    fn test_session_fatal_codes() {
        assert!(ErrorCode::SignInNotFound.is_session_fatal());
        assert!(ErrorCode::SignInExpired.is_session_fatal());
        assert!(ErrorCode::AccountLocked.is_session_fatal());
        assert!(!ErrorCode::InvalidPassword.is_session_fatal());
        assert!(!ErrorCode::MagicCodeRecentlyCreated.is_session_fatal());
    }
}

//! The remote service contract the engine consumes.
//!
//! Transport and per-endpoint schemas are external collaborators; the
//! engine only sees this narrow async interface. `latchkey-client`
//! provides the reqwest implementation; tests script their own.

use async_trait::async_trait;

use latchkey_types::{ApiError, MagicCodeAck, SignInOutcome, TokenPair};

/// Remote identity-platform operations. Every expected failure mode is an
/// [`ApiError`] value; implementations never panic on platform responses.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Starts (or short-circuits) a sign-in. Overloaded by which optional
    /// argument is present: a password attempts single-login, and
    /// `send_magic_code` requests a code together with the sign-in.
    async fn create_sign_in(
        &self,
        email: &str,
        password: Option<&str>,
        send_magic_code: bool,
    ) -> Result<SignInOutcome, ApiError>;

    async fn send_magic_code(&self, session_id: &str) -> Result<MagicCodeAck, ApiError>;

    async fn authenticate_with_password(
        &self,
        session_id: &str,
        password: &str,
    ) -> Result<TokenPair, ApiError>;

    async fn authenticate_with_magic_code(
        &self,
        session_id: &str,
        code: &str,
    ) -> Result<TokenPair, ApiError>;

    async fn refresh_token(
        &self,
        session_id: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, ApiError>;

    /// Idempotent: deleting an already-deleted sign-in succeeds.
    async fn sign_out(&self, session_id: &str) -> Result<(), ApiError>;

    async fn send_reset_password_email(&self, email: &str) -> Result<(), ApiError>;

    async fn validate_reset_password_token(&self, token: &str) -> Result<(), ApiError>;

    async fn reset_password(
        &self,
        session_id: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), ApiError>;

    /// Cookie-based session probe, used only by the magic-link recovery
    /// branch.
    async fn signed_in(&self) -> Result<TokenPair, ApiError>;
}

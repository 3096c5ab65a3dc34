//! Steps of the sign-in and registration flow.

use serde::{Deserialize, Serialize};

/// A named position in the multi-stage sign-in/registration flow.
///
/// The set is closed: the reducer only ever moves between these values.
/// `Authenticated` is terminal for a session but reachable from several
/// predecessors (password, magic code, social callback, recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Collecting the user's email address. Initial step of the default flow.
    Email,
    /// Email accepted; choosing between the enabled authentication methods.
    Verification,
    /// Entering a password.
    Password,
    /// Entering a one-time magic code.
    MagicCode,
    /// Signed in. Terminal.
    Authenticated,
    /// Reset-password side branch.
    ResetPassword,
    /// Social sign-in returned without required profile fields.
    MissingFields,
    /// Account exists under another brand and must be connected first.
    ConnectBrand,
    /// Registration side branch.
    Registration,
    /// Degenerate flow: email and password collected on a single screen.
    SingleLogin,
}

impl Step {
    /// Steps eligible for restoration after a page reload.
    ///
    /// This is a fixed allow-list, not a general resume: every other step
    /// is either trivially redone (`Email`) or already captured through
    /// the persisted tokens (`Authenticated`).
    pub fn is_recoverable(self) -> bool {
        matches!(self, Step::Verification | Step::MagicCode)
    }

    /// Stable string form used for the persisted recoverable-step marker.
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Email => "email",
            Step::Verification => "verification",
            Step::Password => "password",
            Step::MagicCode => "magic_code",
            Step::Authenticated => "authenticated",
            Step::ResetPassword => "reset_password",
            Step::MissingFields => "missing_fields",
            Step::ConnectBrand => "connect_brand",
            Step::Registration => "registration",
            Step::SingleLogin => "single_login",
        }
    }

    /// Parses the persisted string form. Unknown values yield `None` so a
    /// marker written by a newer SDK version degrades to a cold start.
    pub fn parse(value: &str) -> Option<Self> {
        let step = match value {
            "email" => Step::Email,
            "verification" => Step::Verification,
            "password" => Step::Password,
            "magic_code" => Step::MagicCode,
            "authenticated" => Step::Authenticated,
            "reset_password" => Step::ResetPassword,
            "missing_fields" => Step::MissingFields,
            "connect_brand" => Step::ConnectBrand,
            "registration" => Step::Registration,
            "single_login" => Step::SingleLogin,
            _ => return None,
        };
        Some(step)
    }
}

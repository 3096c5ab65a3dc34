//! Discriminated outcomes of remote operations.
//!
//! `createSignIn` is overloaded on the server by which optional argument is
//! present; on this side every shape is one variant of a tagged union so an
//! unhandled outcome is a compile-time gap, not a silent fallthrough.

use serde::{Deserialize, Serialize};

use crate::options::LoginOptions;
use crate::token::TokenPair;

/// Successful outcome of `create_sign_in`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    /// A sign-in session was created; verification comes next.
    SessionCreated {
        session_id: String,
        login_options: LoginOptions,
    },
    /// Single-login shortcut: email and password were accepted together.
    Authenticated { tokens: TokenPair },
    /// A magic code was requested together with the sign-in.
    MagicCodeSent {
        session_id: String,
        ack: MagicCodeAck,
    },
}

/// Acknowledgement of a magic-code send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicCodeAck {
    /// Seconds until another send is allowed.
    #[serde(default)]
    pub resend_after_seconds: u64,
}

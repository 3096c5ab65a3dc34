//! Login options: which authentication methods an identity may use.

use serde::{Deserialize, Serialize};

/// Capability set describing which authentication methods are enabled for
/// an identity. Informs which affordances a UI renders, and which recovery
/// branches are legal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOptions {
    #[serde(default)]
    pub password: bool,
    #[serde(default)]
    pub magic_link: bool,
    /// Passkeys are an opaque platform capability; this flag only controls
    /// whether the affordance is offered.
    #[serde(default)]
    pub passkey: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub social_providers: Vec<String>,
}

impl LoginOptions {
    /// True when no method is enabled; treated as a fresh identity that
    /// still has to register.
    pub fn is_empty(&self) -> bool {
        !self.password && !self.magic_link && !self.passkey && self.social_providers.is_empty()
    }
}

//! The session aggregate: one user's position in the sign-in flow.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::options::LoginOptions;
use crate::step::Step;
use crate::token::TokenPair;

/// Phases of the nested magic-code and reset-password sub-machines.
///
/// `Idle → Requested → Sent [→ Completed]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Requested,
    Sent,
    Completed,
}

/// Magic-code sub-state nested inside [`Session`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicCodeState {
    pub phase: Phase,
    /// Seconds until a resend is allowed, when the platform told us.
    pub resend_after_seconds: Option<u64>,
}

/// Reset-password sub-state nested inside [`Session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetPasswordState {
    pub phase: Phase,
    /// Reset token carried in from the email link, if any.
    pub token: Option<String>,
}

/// Input field an error code can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Email,
    Password,
    MagicCode,
    ResetPassword,
    Global,
}

/// Per-field error codes. Cleared atomically on every step transition: an
/// error never survives into the step that superseded it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors {
    pub email: Option<ErrorCode>,
    pub password: Option<ErrorCode>,
    pub magic_code: Option<ErrorCode>,
    pub reset_password: Option<ErrorCode>,
    /// Non-field failures, e.g. connectivity.
    pub global: Option<ErrorCode>,
}

impl FieldErrors {
    pub fn get(&self, field: Field) -> Option<ErrorCode> {
        match field {
            Field::Email => self.email,
            Field::Password => self.password,
            Field::MagicCode => self.magic_code,
            Field::ResetPassword => self.reset_password,
            Field::Global => self.global,
        }
    }

    pub fn set(&mut self, field: Field, code: Option<ErrorCode>) {
        match field {
            Field::Email => self.email = code,
            Field::Password => self.password = code,
            Field::MagicCode => self.magic_code = code,
            Field::ResetPassword => self.reset_password = code,
            Field::Global => self.global = code,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == FieldErrors::default()
    }
}

/// The session aggregate root, held in memory and mirrored to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Current position in the flow.
    pub step: Step,
    /// Previously visited steps, consumed only by back-navigation.
    /// Never contains the current step as its own tail element.
    pub step_history: Vec<Step>,
    /// First step of this flow, captured once at flow start and never
    /// overwritten. Restart returns here.
    pub initial_step: Step,
    pub email: Option<String>,
    /// Server-assigned id of the in-progress sign-in attempt. Required
    /// before any authenticate or magic-code submission.
    pub sign_in_session_id: Option<String>,
    pub login_options: Option<LoginOptions>,
    /// Absence implies unauthenticated. Presence implies `step` is
    /// `Authenticated`, except transiently during a refresh race.
    pub tokens: Option<TokenPair>,
    pub magic_code: MagicCodeState,
    pub reset_password: ResetPasswordState,
    pub errors: FieldErrors,
    /// True exactly while a network operation initiated by the current
    /// step is outstanding.
    pub loading: bool,
}

impl Session {
    /// A fresh session at the default initial step.
    pub fn fresh() -> Self {
        Self::with_initial(Step::Email)
    }

    /// A fresh session for a flow that starts elsewhere (e.g. single-login).
    pub fn with_initial(step: Step) -> Self {
        Self {
            step,
            step_history: Vec::new(),
            initial_step: step,
            email: None,
            sign_in_session_id: None,
            login_options: None,
            tokens: None,
            magic_code: MagicCodeState::default(),
            reset_password: ResetPasswordState::default(),
            errors: FieldErrors::default(),
            loading: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Everything held in durable storage, read back as one atomic unit.
///
/// The cross-tab synchronizer republishes this snapshot rather than per-key
/// events so observers never see a torn intermediate state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableSnapshot {
    pub refresh_token: Option<String>,
    pub session_id: Option<String>,
    pub email: Option<String>,
    pub login_options: Option<LoginOptions>,
    pub recoverable_step: Option<Step>,
}

impl DurableSnapshot {
    /// True when no sign-in attempt or credential survives in storage:
    /// the signed-out shape.
    pub fn is_signed_out(&self) -> bool {
        self.refresh_token.is_none() && self.session_id.is_none()
    }
}

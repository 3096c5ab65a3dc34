//! The session state machine: a pure reducer over the flow steps.
//!
//! `reduce` performs no I/O and touches no clocks; given the same session
//! and event it always produces the same next session. Persistence and
//! remote calls live in [`crate::engine`], which observes reducer output
//! and applies the matching effects.

use latchkey_types::{
    DurableSnapshot, ErrorCode, Field, FieldErrors, LoginOptions, MagicCodeState, Phase,
    ResetPasswordState, Session, Step, TokenPair,
};

/// Everything that can happen to a session. Local user actions, folded
/// network outcomes, recovery dispatches, and cross-tab snapshots all
/// arrive through this one type, so their handling is indistinguishable.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Move to a step directly (user navigation).
    SetStep(Step),
    /// Pop the last history entry and return to it.
    GoBack,
    /// Clear history and return to the flow's recorded initial step.
    Restart,
    SetEmail(String),
    /// Mark a network operation outstanding (or settled).
    Loading(bool),
    /// Persist the sign-in session id without changing step. Used by the
    /// magic-link recovery branch before the cookie probe.
    SetSignInSession(String),
    /// `create_sign_in` produced a server-side sign-in attempt.
    SignInCreated {
        session_id: String,
        login_options: LoginOptions,
    },
    /// Tokens arrived: authenticate, refresh, social callback, or
    /// recovery hydration. `session_id` is set when the source knows it.
    Authenticated {
        tokens: TokenPair,
        session_id: Option<String>,
    },
    MagicCodeRequested,
    MagicCodeSent {
        resend_after_seconds: u64,
    },
    /// Soft error: a code was issued recently; same resend timer applies.
    MagicCodeThrottled {
        resend_after_seconds: Option<u64>,
    },
    ResetPasswordRequested,
    ResetPasswordSent,
    /// A reset token arrived from the email link and validated.
    ResetPasswordTokenReceived {
        token: String,
    },
    ResetPasswordCompleted,
    /// User-correctable error scoped to one input.
    FieldError {
        field: Field,
        code: ErrorCode,
    },
    /// The network was wrong, not the user's input.
    ConnectivityError,
    /// The referenced server-side sign-in no longer exists: full reset
    /// preserving only the typed email.
    SessionFatal {
        code: ErrorCode,
    },
    SignedOut,
    /// Restore non-sensitive context without changing step.
    HydrateContext {
        email: Option<String>,
        login_options: Option<LoginOptions>,
    },
    /// Resume a persisted recoverable step with its session id.
    ResumeStep {
        step: Step,
        session_id: String,
    },
    /// Durable state changed in another browsing context.
    ExternalSnapshot(DurableSnapshot),
}

/// Applies one event to a session snapshot, producing the next snapshot.
pub fn reduce(session: &Session, event: &Event) -> Session {
    let mut next = session.clone();
    match event {
        Event::SetStep(step) => transition(&mut next, *step),
        Event::GoBack => {
            if let Some(previous) = next.step_history.pop() {
                next.step = previous;
                next.errors = FieldErrors::default();
                next.loading = false;
            }
        }
        Event::Restart => {
            let email = next.email.take();
            next = Session::with_initial(session.initial_step);
            next.email = email;
        }
        Event::SetEmail(email) => {
            next.email = Some(email.clone());
            next.errors.set(Field::Email, None);
        }
        Event::Loading(loading) => next.loading = *loading,
        Event::SetSignInSession(session_id) => {
            next.sign_in_session_id = Some(session_id.clone());
        }
        Event::SignInCreated {
            session_id,
            login_options,
        } => {
            next.sign_in_session_id = Some(session_id.clone());
            next.login_options = Some(login_options.clone());
            next.magic_code = MagicCodeState::default();
            next.reset_password = ResetPasswordState::default();
            transition(&mut next, Step::Verification);
        }
        Event::Authenticated { tokens, session_id } => {
            next.tokens = Some(tokens.clone());
            if session_id.is_some() {
                next.sign_in_session_id = session_id.clone();
            }
            if next.magic_code.phase == Phase::Sent {
                next.magic_code.phase = Phase::Completed;
            }
            transition(&mut next, Step::Authenticated);
        }
        Event::MagicCodeRequested => {
            next.magic_code.phase = Phase::Requested;
            next.loading = true;
        }
        Event::MagicCodeSent {
            resend_after_seconds,
        } => {
            transition(&mut next, Step::MagicCode);
            next.magic_code.phase = Phase::Sent;
            next.magic_code.resend_after_seconds = Some(*resend_after_seconds);
        }
        Event::MagicCodeThrottled {
            resend_after_seconds,
        } => {
            // Loading drops before the error lands; a code already exists
            // server-side, so the flow still sits at the magic-code step.
            next.loading = false;
            transition(&mut next, Step::MagicCode);
            next.magic_code.phase = Phase::Sent;
            // A throttle without a timer must not erase a known one.
            next.magic_code.resend_after_seconds =
                resend_after_seconds.or(next.magic_code.resend_after_seconds);
            next.errors
                .set(Field::MagicCode, Some(ErrorCode::MagicCodeRecentlyCreated));
        }
        Event::ResetPasswordRequested => {
            next.reset_password.phase = Phase::Requested;
            next.loading = true;
        }
        Event::ResetPasswordSent => {
            next.reset_password.phase = Phase::Sent;
            next.loading = false;
        }
        Event::ResetPasswordTokenReceived { token } => {
            transition(&mut next, Step::ResetPassword);
            next.reset_password.phase = Phase::Sent;
            next.reset_password.token = Some(token.clone());
        }
        Event::ResetPasswordCompleted => {
            next.reset_password.phase = Phase::Completed;
            next.reset_password.token = None;
            next.loading = false;
        }
        Event::FieldError { field, code } => {
            next.loading = false;
            next.errors.set(*field, Some(*code));
        }
        Event::ConnectivityError => {
            next.loading = false;
            next.errors.set(Field::Global, Some(ErrorCode::ConnectivityError));
        }
        Event::SessionFatal { .. } => {
            let email = next.email.take();
            next = Session::with_initial(session.initial_step);
            next.email = email;
        }
        Event::SignedOut => {
            next = Session::with_initial(session.initial_step);
        }
        Event::HydrateContext {
            email,
            login_options,
        } => {
            if email.is_some() {
                next.email = email.clone();
            }
            if login_options.is_some() {
                next.login_options = login_options.clone();
            }
        }
        Event::ResumeStep { step, session_id } => {
            next.sign_in_session_id = Some(session_id.clone());
            transition(&mut next, *step);
        }
        Event::ExternalSnapshot(snapshot) => {
            if snapshot.is_signed_out() {
                if session.is_authenticated() || session.sign_in_session_id.is_some() {
                    // Another tab signed out; this one follows.
                    next = Session::with_initial(session.initial_step);
                    next.email = snapshot.email.clone();
                } else {
                    next.email = snapshot.email.clone().or(next.email);
                    next.login_options = snapshot.login_options.clone().or(next.login_options);
                }
            } else {
                if snapshot.email.is_some() {
                    next.email = snapshot.email.clone();
                }
                if snapshot.login_options.is_some() {
                    next.login_options = snapshot.login_options.clone();
                }
                if snapshot.session_id.is_some() {
                    next.sign_in_session_id = snapshot.session_id.clone();
                }
            }
        }
    }
    next
}

/// Moves to `step`, recording the departed step in history. No entry is
/// recorded when the step does not change, so history never holds the
/// current step as its own tail. Errors are cleared atomically with the
/// transition.
fn transition(session: &mut Session, step: Step) {
    if session.step != step {
        let previous = session.step;
        session.step_history.push(previous);
        session.step = step;
    }
    session.errors = FieldErrors::default();
    session.loading = false;
}

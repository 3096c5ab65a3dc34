//! Orchestration: dispatching events, folding remote outcomes, and
//! applying storage effects.
//!
//! One engine is constructed per client instance and passed by reference
//! to every consumer; there is no module-level shared state. The reducer
//! stays pure: this layer observes the transition output and performs the
//! matching store writes.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use latchkey_types::{
    ApiError, DurableSnapshot, ErrorCode, Field, LoginOptions, Session, SignInOutcome, Step,
};

use crate::config::EngineConfig;
use crate::lifecycle::TokenManager;
use crate::machine::{Event, reduce};
use crate::service::AuthService;
use crate::store::{Slot, Store};

/// Programmer errors: a precondition the caller owns was violated. These
/// are never produced by remote failures, which fold into the session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no sign-in session id: create a sign-in before authenticating")]
    MissingSignInSession,
    #[error("no email on the session: collect one before this operation")]
    MissingEmail,
    #[error("no reset-password token on the session")]
    MissingResetToken,
}

/// The session engine: owns the current [`Session`], the token lifecycle,
/// and the persistence effects.
pub struct SessionEngine<S> {
    service: Arc<S>,
    store: Arc<Store>,
    tokens: TokenManager<S>,
    state: Mutex<Session>,
    snapshots: watch::Sender<Session>,
}

impl<S: AuthService + 'static> SessionEngine<S> {
    pub fn new(service: Arc<S>, store: Arc<Store>, config: &EngineConfig) -> Self {
        Self::with_session(service, store, config, Session::fresh())
    }

    /// Starts from a non-default session, e.g. a single-login flow.
    pub fn with_session(
        service: Arc<S>,
        store: Arc<Store>,
        config: &EngineConfig,
        session: Session,
    ) -> Self {
        let tokens = TokenManager::new(
            Arc::clone(&service),
            Arc::clone(&store),
            config.expiry_buffer_secs,
        );
        let (snapshots, _) = watch::channel(session.clone());
        Self {
            service,
            store,
            tokens,
            state: Mutex::new(session),
            snapshots,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub(crate) fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Current session snapshot.
    pub async fn snapshot(&self) -> Session {
        self.state.lock().await.clone()
    }

    /// Watch channel carrying every applied snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.snapshots.subscribe()
    }

    /// Applies one event against the *latest* snapshot (never one
    /// captured before an await) and performs the matching store writes.
    pub async fn dispatch(&self, event: Event) -> Session {
        self.dispatch_inner(event, true).await
    }

    /// Folds a snapshot that originated in another browsing context. No
    /// storage effects: the storage already reflects it.
    pub(crate) async fn apply_external(&self, snapshot: DurableSnapshot) -> Session {
        self.dispatch_inner(Event::ExternalSnapshot(snapshot), false)
            .await
    }

    async fn dispatch_inner(&self, event: Event, effects: bool) -> Session {
        let mut state = self.state.lock().await;
        let next = reduce(&state, &event);
        if effects {
            self.apply_effects(&state, &next);
        }
        tracing::debug!(step = next.step.as_str(), loading = next.loading, "event applied");
        *state = next.clone();
        let _ = self.snapshots.send(next.clone());
        next
    }

    /// Diffs two snapshots and mirrors the difference into the store.
    /// The recoverable-step marker only persists for the fixed allow-list
    /// and only while a sign-in session exists.
    fn apply_effects(&self, old: &Session, new: &Session) {
        let mut writes: Vec<(Slot, Option<String>)> = Vec::new();

        if old.email != new.email {
            writes.push((Slot::Email, new.email.clone()));
        }
        if old.login_options != new.login_options {
            let encoded = new
                .login_options
                .as_ref()
                .and_then(|options| serde_json::to_string(options).ok());
            writes.push((Slot::LoginOptions, encoded));
        }
        if old.sign_in_session_id != new.sign_in_session_id {
            writes.push((Slot::SessionId, new.sign_in_session_id.clone()));
        }
        if old.tokens != new.tokens {
            writes.push((
                Slot::AccessToken,
                new.tokens.as_ref().map(|t| t.access_token.clone()),
            ));
            match &new.tokens {
                Some(pair) => {
                    if let Some(refresh) = &pair.refresh_token {
                        writes.push((Slot::RefreshToken, Some(refresh.clone())));
                    }
                }
                None => writes.push((Slot::RefreshToken, None)),
            }
        }

        let marker = |session: &Session| {
            (session.step.is_recoverable() && session.sign_in_session_id.is_some())
                .then(|| session.step.as_str().to_string())
        };
        let new_marker = marker(new);
        if marker(old) != new_marker {
            writes.push((Slot::RecoverableStep, new_marker));
        }

        // A destroyed session purges credentials synchronously, even ones
        // the in-memory snapshot never carried (e.g. a stale refresh token
        // left over from a previous authentication).
        let destroyed = new.sign_in_session_id.is_none()
            && new.tokens.is_none()
            && (old.sign_in_session_id.is_some() || old.tokens.is_some());
        if destroyed {
            writes.push((Slot::AccessToken, None));
            writes.push((Slot::RefreshToken, None));
            writes.push((Slot::SessionId, None));
            writes.push((Slot::RecoverableStep, None));
        }

        self.store.set_many(&writes);
    }

    // ---- flow operations -------------------------------------------------

    /// Submits the email step: creates a server-side sign-in attempt.
    pub async fn submit_email(&self, email: &str) -> Session {
        self.dispatch(Event::SetEmail(email.to_string())).await;
        self.dispatch(Event::Loading(true)).await;
        match self.service.create_sign_in(email, None, false).await {
            Ok(outcome) => self.fold_sign_in_outcome(outcome).await,
            Err(err) => self.fold_error(err, Field::Email).await,
        }
    }

    /// Submits the email step and requests a magic code in the same call,
    /// for flows that skip the method-selection screen.
    pub async fn submit_email_with_magic_code(&self, email: &str) -> Session {
        self.dispatch(Event::SetEmail(email.to_string())).await;
        self.dispatch(Event::Loading(true)).await;
        match self.service.create_sign_in(email, None, true).await {
            Ok(outcome) => self.fold_sign_in_outcome(outcome).await,
            Err(err) => self.fold_error(err, Field::Email).await,
        }
    }

    /// Single-login: email and password collected on one screen.
    pub async fn submit_email_and_password(&self, email: &str, password: &str) -> Session {
        self.dispatch(Event::SetEmail(email.to_string())).await;
        self.dispatch(Event::Loading(true)).await;
        match self.service.create_sign_in(email, Some(password), false).await {
            Ok(outcome) => self.fold_sign_in_outcome(outcome).await,
            Err(err) => self.fold_error(err, Field::Password).await,
        }
    }

    async fn fold_sign_in_outcome(&self, outcome: SignInOutcome) -> Session {
        match outcome {
            SignInOutcome::SessionCreated {
                session_id,
                login_options,
            } => {
                self.dispatch(Event::SignInCreated {
                    session_id,
                    login_options,
                })
                .await
            }
            SignInOutcome::Authenticated { tokens } => {
                self.dispatch(Event::Authenticated {
                    tokens,
                    session_id: None,
                })
                .await
            }
            SignInOutcome::MagicCodeSent { session_id, ack } => {
                // No login options travel with this shape; magic link is
                // implied by the ack itself.
                self.dispatch(Event::SignInCreated {
                    session_id,
                    login_options: LoginOptions {
                        magic_link: true,
                        ..LoginOptions::default()
                    },
                })
                .await;
                self.dispatch(Event::MagicCodeSent {
                    resend_after_seconds: ack.resend_after_seconds,
                })
                .await
            }
        }
    }

    /// Moves to the password entry step.
    pub async fn choose_password(&self) -> Session {
        self.dispatch(Event::SetStep(Step::Password)).await
    }

    pub async fn authenticate_with_password(&self, password: &str) -> Result<Session, EngineError> {
        let session_id = self.require_session_id().await?;
        self.dispatch(Event::Loading(true)).await;
        let snapshot = match self
            .service
            .authenticate_with_password(&session_id, password)
            .await
        {
            Ok(tokens) => {
                self.dispatch(Event::Authenticated {
                    tokens,
                    session_id: None,
                })
                .await
            }
            Err(err) => self.fold_error(err, Field::Password).await,
        };
        Ok(snapshot)
    }

    pub async fn send_magic_code(&self) -> Result<Session, EngineError> {
        let session_id = self.require_session_id().await?;
        self.dispatch(Event::MagicCodeRequested).await;
        let snapshot = match self.service.send_magic_code(&session_id).await {
            Ok(ack) => {
                self.dispatch(Event::MagicCodeSent {
                    resend_after_seconds: ack.resend_after_seconds,
                })
                .await
            }
            Err(err) => self.fold_error(err, Field::MagicCode).await,
        };
        Ok(snapshot)
    }

    pub async fn submit_magic_code(&self, code: &str) -> Result<Session, EngineError> {
        let session_id = self.require_session_id().await?;
        self.dispatch(Event::Loading(true)).await;
        let snapshot = match self
            .service
            .authenticate_with_magic_code(&session_id, code)
            .await
        {
            Ok(tokens) => {
                self.dispatch(Event::Authenticated {
                    tokens,
                    session_id: None,
                })
                .await
            }
            Err(err) => self.fold_error(err, Field::MagicCode).await,
        };
        Ok(snapshot)
    }

    /// Enters the reset-password side branch.
    pub async fn begin_reset_password(&self) -> Session {
        self.dispatch(Event::SetStep(Step::ResetPassword)).await
    }

    pub async fn send_reset_password_email(&self) -> Result<Session, EngineError> {
        let email = self
            .snapshot()
            .await
            .email
            .ok_or(EngineError::MissingEmail)?;
        self.dispatch(Event::ResetPasswordRequested).await;
        let snapshot = match self.service.send_reset_password_email(&email).await {
            Ok(()) => self.dispatch(Event::ResetPasswordSent).await,
            Err(err) => self.fold_error(err, Field::ResetPassword).await,
        };
        Ok(snapshot)
    }

    /// Validates a reset token from an email link and, when valid, stores
    /// it on the session at the reset-password step.
    pub async fn accept_reset_password_token(&self, token: &str) -> Session {
        self.dispatch(Event::Loading(true)).await;
        match self.service.validate_reset_password_token(token).await {
            Ok(()) => {
                self.dispatch(Event::ResetPasswordTokenReceived {
                    token: token.to_string(),
                })
                .await
            }
            Err(err) => self.fold_error(err, Field::ResetPassword).await,
        }
    }

    pub async fn reset_password(&self, new_password: &str) -> Result<Session, EngineError> {
        let session_id = self.require_session_id().await?;
        let token = self
            .snapshot()
            .await
            .reset_password
            .token
            .ok_or(EngineError::MissingResetToken)?;
        self.dispatch(Event::Loading(true)).await;
        let snapshot = match self
            .service
            .reset_password(&session_id, &token, new_password)
            .await
        {
            Ok(()) => self.dispatch(Event::ResetPasswordCompleted).await,
            Err(err) => self.fold_error(err, Field::ResetPassword).await,
        };
        Ok(snapshot)
    }

    /// Enters the registration side branch.
    pub async fn begin_registration(&self) -> Session {
        self.dispatch(Event::SetStep(Step::Registration)).await
    }

    pub async fn go_back(&self) -> Session {
        self.dispatch(Event::GoBack).await
    }

    pub async fn restart(&self) -> Session {
        self.dispatch(Event::Restart).await
    }

    /// Signs out: best-effort remote revocation, unconditional local
    /// reset and purge.
    pub async fn sign_out(&self) -> Session {
        let session_id = {
            let state = self.state.lock().await;
            state.sign_in_session_id.clone()
        }
        .or_else(|| self.store.get(Slot::SessionId));
        if let Some(session_id) = session_id {
            if let Err(err) = self.service.sign_out(&session_id).await {
                tracing::warn!(error = %err, "remote sign-out failed; clearing local session anyway");
            }
        }
        self.dispatch(Event::SignedOut).await
    }

    /// Returns a fresh-enough access token, refreshing at most once.
    /// `None` means the session is not refreshable; persisted token state
    /// is already cleared and the caller owns the UI transition.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        self.tokens.get_valid_access_token().await
    }

    pub(crate) fn token_manager(&self) -> &TokenManager<S> {
        &self.tokens
    }

    async fn require_session_id(&self) -> Result<String, EngineError> {
        self.state
            .lock()
            .await
            .sign_in_session_id
            .clone()
            .ok_or(EngineError::MissingSignInSession)
    }

    /// Maps a remote error into the session: fatal codes reset, the
    /// magic-code throttle stays soft, everything else lands on `field`.
    pub(crate) async fn fold_error(&self, err: ApiError, field: Field) -> Session {
        match err {
            ApiError::Platform {
                code,
                resend_after_seconds,
            } => {
                if code.is_session_fatal() {
                    tracing::warn!(?code, "session-fatal platform error; resetting session");
                    self.dispatch(Event::SessionFatal { code }).await
                } else if code == ErrorCode::MagicCodeRecentlyCreated {
                    self.dispatch(Event::MagicCodeThrottled {
                        resend_after_seconds,
                    })
                    .await
                } else {
                    self.dispatch(Event::FieldError { field, code }).await
                }
            }
            ApiError::Connectivity(detail) => {
                tracing::warn!(detail, "connectivity failure");
                self.dispatch(Event::ConnectivityError).await
            }
            ApiError::Decode(detail) => {
                tracing::warn!(detail, "response decode failure");
                self.dispatch(Event::FieldError {
                    field: Field::Global,
                    code: ErrorCode::Unknown,
                })
                .await
            }
        }
    }
}

//! Page-load recovery: reconciling URL artifacts with persisted state.
//!
//! Runs once at the start of a component's lifecycle. The branches are
//! evaluated in a fixed priority order and are mutually exclusive: the
//! first one that applies dispatches its events and returns. The caller
//! receives the URL with every consumed parameter stripped and is
//! responsible for the non-navigating history replace, so a page refresh
//! never re-triggers the same branch.

use base64::prelude::*;
use url::Url;

use latchkey_types::{ErrorCode, Field, Step, TokenPair};

use crate::claims;
use crate::engine::SessionEngine;
use crate::machine::Event;
use crate::service::AuthService;
use crate::store::Slot;

/// Which recovery branch fired. Mostly useful for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Branch 1: social-auth callback parameters in the URL.
    SocialCallback,
    /// Branch 2: bare `sid` (magic-link landing), cookie probe.
    MagicLink,
    /// Reset-password link with a token to validate.
    ResetPassword,
    /// Branch 3: a cached access token that is still fresh.
    CachedToken,
    /// Branch 4: hydrated through one refresh call.
    Refreshed,
    /// Branch 5: resumed a persisted recoverable step.
    ResumedStep,
    /// Branch 6: nothing to recover beyond non-sensitive context.
    ColdStart,
}

/// Transient auth artifacts carried in the URL.
#[derive(Debug, Default)]
struct UrlArtifacts {
    sid: Option<String>,
    auth_payload: Option<String>,
    error: Option<ErrorCode>,
    fields: Vec<String>,
    reset_password_token: Option<String>,
}

/// Pulls the consumed parameters out of `url`, returning the artifacts
/// and the URL without them. Unrelated query parameters survive.
fn extract_artifacts(url: &Url) -> (UrlArtifacts, Url) {
    let mut artifacts = UrlArtifacts::default();
    let mut kept: Vec<(String, String)> = Vec::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "sid" => artifacts.sid = Some(value.into_owned()),
            "auth_payload" => artifacts.auth_payload = Some(value.into_owned()),
            "error" => artifacts.error = Some(parse_error_code(&value)),
            "fields" => {
                artifacts.fields = value
                    .split(',')
                    .filter(|field| !field.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "reset_password_token" => artifacts.reset_password_token = Some(value.into_owned()),
            _ => kept.push((key.into_owned(), value.into_owned())),
        }
    }
    let mut stripped = url.clone();
    stripped.set_query(None);
    if !kept.is_empty() {
        stripped.query_pairs_mut().extend_pairs(kept);
    }
    (artifacts, stripped)
}

fn parse_error_code(raw: &str) -> ErrorCode {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .unwrap_or(ErrorCode::Unknown)
}

/// Decodes the social-callback payload: base64url JSON carrying tokens.
fn decode_auth_payload(payload: &str) -> Result<TokenPair, String> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| err.to_string())?;
    serde_json::from_slice(&bytes).map_err(|err| err.to_string())
}

/// Runs the recovery protocol once, driving `engine` into the correct
/// step without user interaction.
pub async fn recover<S: AuthService + 'static>(
    engine: &SessionEngine<S>,
    url: &Url,
) -> (RecoveryOutcome, Url) {
    let (artifacts, stripped) = extract_artifacts(url);
    let store = engine.store();

    // Branch 1: social-auth callback. Terminal either way; later branches
    // must not run after this dispatches.
    if let Some(sid) = artifacts.sid.clone() {
        if let Some(payload) = &artifacts.auth_payload {
            match decode_auth_payload(payload) {
                Ok(tokens) => {
                    tracing::debug!("recovery: social callback with tokens");
                    engine
                        .dispatch(Event::Authenticated {
                            tokens,
                            session_id: Some(sid),
                        })
                        .await;
                }
                Err(detail) => {
                    tracing::warn!(detail, "social callback payload did not decode");
                    engine
                        .dispatch(Event::FieldError {
                            field: Field::Global,
                            code: ErrorCode::Unknown,
                        })
                        .await;
                }
            }
            return (RecoveryOutcome::SocialCallback, stripped);
        }
        if let Some(code) = artifacts.error {
            tracing::debug!(?code, "recovery: social callback error");
            engine.dispatch(Event::SetSignInSession(sid)).await;
            match code {
                ErrorCode::MissingFields => {
                    tracing::debug!(fields = ?artifacts.fields, "profile fields missing");
                    engine.dispatch(Event::SetStep(Step::MissingFields)).await;
                }
                ErrorCode::ConnectBrand => {
                    engine.dispatch(Event::SetStep(Step::ConnectBrand)).await;
                }
                code if code.is_session_fatal() => {
                    engine.dispatch(Event::SessionFatal { code }).await;
                }
                code => {
                    engine
                        .dispatch(Event::FieldError {
                            field: Field::Global,
                            code,
                        })
                        .await;
                }
            }
            return (RecoveryOutcome::SocialCallback, stripped);
        }

        // Branch 2: bare sid, a magic-link landing. Persist the id, then
        // let the cookie-based probe hydrate tokens. Terminal.
        tracing::debug!("recovery: magic-link landing");
        engine.dispatch(Event::SetSignInSession(sid.clone())).await;
        match engine.service().signed_in().await {
            Ok(tokens) => {
                engine
                    .dispatch(Event::Authenticated {
                        tokens,
                        session_id: Some(sid),
                    })
                    .await;
            }
            Err(err) => {
                engine.fold_error(err, Field::Global).await;
            }
        }
        return (RecoveryOutcome::MagicLink, stripped);
    }

    // Reset-password link: validate the token and park at the branch.
    if let Some(token) = artifacts.reset_password_token {
        tracing::debug!("recovery: reset-password link");
        engine.accept_reset_password_token(&token).await;
        return (RecoveryOutcome::ResetPassword, stripped);
    }

    // Branch 3: a cached access token that is still fresh reconstructs
    // an authenticated snapshot with no I/O.
    if let Some(access) = store.get(Slot::AccessToken) {
        if let Ok(decoded) = claims::decode(&access) {
            if decoded.is_fresh(claims::now_secs(), engine.token_manager().buffer_secs()) {
                let session_id = store.get(Slot::SessionId).or(decoded.sid);
                let refresh_token = store.get(Slot::RefreshToken);
                tracing::debug!("recovery: cached access token still fresh");
                engine
                    .dispatch(Event::Authenticated {
                        tokens: TokenPair {
                            access_token: access,
                            refresh_token,
                        },
                        session_id,
                    })
                    .await;
                return (RecoveryOutcome::CachedToken, stripped);
            }
        }
    }

    // Branch 4: one refresh attempt. On failure the manager has already
    // cleared the credentials and we fall through.
    if store.get(Slot::RefreshToken).is_some() {
        if let Some(tokens) = engine.token_manager().refresh().await {
            let session_id = store.get(Slot::SessionId);
            tracing::debug!("recovery: hydrated through refresh");
            engine
                .dispatch(Event::Authenticated { tokens, session_id })
                .await;
            return (RecoveryOutcome::Refreshed, stripped);
        }
    }

    let snapshot = store.durable_snapshot();

    // Branch 5: resume a persisted recoverable step mid-flow.
    if let (Some(step), Some(session_id)) = (snapshot.recoverable_step, snapshot.session_id.clone())
    {
        if step.is_recoverable() {
            tracing::debug!(step = step.as_str(), "recovery: resuming recoverable step");
            engine
                .dispatch(Event::HydrateContext {
                    email: snapshot.email.clone(),
                    login_options: snapshot.login_options.clone(),
                })
                .await;
            engine.dispatch(Event::ResumeStep { step, session_id }).await;
            return (RecoveryOutcome::ResumedStep, stripped);
        }
    }

    // Branch 6: cold start with whatever non-sensitive context survived.
    engine
        .dispatch(Event::HydrateContext {
            email: snapshot.email,
            login_options: snapshot.login_options,
        })
        .await;
    (RecoveryOutcome::ColdStart, stripped)
}

//! Token lifecycle: expiry checks and the deduplicated refresh.
//!
//! At most one refresh network call is ever in flight per manager,
//! regardless of how many concurrent callers discover an expired token in
//! the same tick. The in-flight operation itself is cached (not a boolean
//! flag): late callers attach to the shared future and observe the same
//! outcome. The slot is cleared inside the shared future body, so
//! settlement always clears it, success or failure.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use latchkey_types::TokenPair;
use latchkey_types::token::mask_token;

use crate::claims;
use crate::service::AuthService;
use crate::store::{Slot, Store};

type InflightRefresh = Shared<BoxFuture<'static, Option<TokenPair>>>;

/// Owns the access-token expiry check and the deduplicated refresh.
pub struct TokenManager<S: ?Sized> {
    service: Arc<S>,
    store: Arc<Store>,
    buffer_secs: u64,
    inflight: Arc<Mutex<Option<InflightRefresh>>>,
}

impl<S: AuthService + 'static> TokenManager<S> {
    pub fn new(service: Arc<S>, store: Arc<Store>, buffer_secs: u64) -> Self {
        Self {
            service,
            store,
            buffer_secs,
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn buffer_secs(&self) -> u64 {
        self.buffer_secs
    }

    /// Returns an access token that is still fresh for at least the
    /// configured buffer, refreshing at most once if needed. `None` means
    /// the session cannot be refreshed; all persisted token state has
    /// been cleared and the caller owns the transition back to an
    /// unauthenticated step.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        if let Some(access) = self.store.get(Slot::AccessToken) {
            if let Ok(decoded) = claims::decode(&access) {
                if decoded.is_fresh(claims::now_secs(), self.buffer_secs) {
                    return Some(access);
                }
            }
        }
        self.refresh().await.map(|tokens| tokens.access_token)
    }

    /// Runs (or attaches to) the deduplicated refresh.
    pub async fn refresh(&self) -> Option<TokenPair> {
        let shared = {
            let mut slot = self.inflight.lock().await;
            if let Some(existing) = slot.as_ref() {
                existing.clone()
            } else {
                let service = Arc::clone(&self.service);
                let store = Arc::clone(&self.store);
                let inflight = Arc::clone(&self.inflight);
                let fut: InflightRefresh = async move {
                    let outcome = refresh_once(service.as_ref(), &store).await;
                    // Clear before resolving so the next call after
                    // settlement starts fresh.
                    inflight.lock().await.take();
                    outcome
                }
                .boxed()
                .shared();
                *slot = Some(fut.clone());
                fut
            }
        };
        shared.await
    }
}

/// One refresh attempt against the remote service. Failure clears all
/// persisted token/session-id state; there is no retry.
async fn refresh_once<S: AuthService + ?Sized>(service: &S, store: &Store) -> Option<TokenPair> {
    let Some(refresh_token) = store.get(Slot::RefreshToken) else {
        store.clear_auth();
        return None;
    };
    // The session id may only survive inside the expired access token.
    let session_id = store.get(Slot::SessionId).or_else(|| {
        store
            .get(Slot::AccessToken)
            .and_then(|access| claims::decode(&access).ok())
            .and_then(|decoded| decoded.sid)
    });
    let Some(session_id) = session_id else {
        tracing::warn!("refresh impossible: no session id in storage or token claims");
        store.clear_auth();
        return None;
    };

    match service.refresh_token(&session_id, &refresh_token).await {
        Ok(tokens) => {
            tracing::debug!(access = %mask_token(&tokens.access_token), "token refreshed");
            store.put_tokens(&session_id, &tokens);
            Some(tokens)
        }
        Err(err) => {
            tracing::warn!(error = %err, "token refresh failed; clearing session credentials");
            store.clear_auth();
            None
        }
    }
}

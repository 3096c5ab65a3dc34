//! Token lifecycle: expiry checks, refresh deduplication, failure
//! semantics.

mod fixtures;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use fixtures::{MockAuthService, expired_token, fresh_token, make_engine_with_store};
use latchkey_core::{MemoryBackend, Slot, Store};
use latchkey_types::{ApiError, ErrorCode, TokenPair};

fn store_with(entries: &[(Slot, &str)]) -> Arc<Store> {
    let store = Arc::new(Store::new(MemoryBackend::new(), "test"));
    for (slot, value) in entries {
        store.set(*slot, Some(value));
    }
    store
}

/// Test: a fresh cached token is returned without any network call, on
/// every consecutive invocation.
#[tokio::test]
async fn test_valid_token_never_hits_network() {
    let service = Arc::new(MockAuthService::new());
    let token = fresh_token(Some("s1"));
    let store = store_with(&[(Slot::AccessToken, token.as_str())]);
    let engine = make_engine_with_store(Arc::clone(&service), store);

    assert_eq!(engine.get_valid_access_token().await, Some(token.clone()));
    assert_eq!(engine.get_valid_access_token().await, Some(token));
    assert_eq!(service.refresh_calls.load(Ordering::SeqCst), 0);
}

/// Test: three concurrent callers over an expired token trigger exactly
/// one refresh call, and all three observe the identical resolved value.
#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let service = Arc::new(MockAuthService::new());
    let new_access = fresh_token(Some("s1"));
    service.script_refresh(Ok(TokenPair::new(
        new_access.clone(),
        Some("refresh-2".to_string()),
    )));
    service.script_refresh_delay(Duration::from_millis(50));

    let store = store_with(&[
        (Slot::AccessToken, expired_token(Some("s1")).as_str()),
        (Slot::RefreshToken, "refresh-1"),
        (Slot::SessionId, "s1"),
    ]);
    let engine = Arc::new(make_engine_with_store(Arc::clone(&service), store));

    let (a, b, c) = tokio::join!(
        engine.get_valid_access_token(),
        engine.get_valid_access_token(),
        engine.get_valid_access_token(),
    );
    assert_eq!(a, Some(new_access.clone()));
    assert_eq!(b, Some(new_access.clone()));
    assert_eq!(c, Some(new_access));
    assert_eq!(service.refresh_calls.load(Ordering::SeqCst), 1);
}

/// Test: after a refresh settles, the next call starts fresh instead of
/// attaching to a stale in-flight entry.
#[tokio::test]
async fn test_inflight_slot_cleared_after_settlement() {
    let service = Arc::new(MockAuthService::new());
    // First refresh fails, second would succeed; both must reach the wire.
    service.script_refresh(Err(ApiError::platform(ErrorCode::SignInNotFound)));

    let store = store_with(&[
        (Slot::AccessToken, expired_token(Some("s1")).as_str()),
        (Slot::RefreshToken, "refresh-1"),
        (Slot::SessionId, "s1"),
    ]);
    let engine = make_engine_with_store(Arc::clone(&service), Arc::clone(&store));

    assert_eq!(engine.get_valid_access_token().await, None);
    assert_eq!(service.refresh_calls.load(Ordering::SeqCst), 1);

    // The failure cleared the credentials; restock and go again.
    store.set(Slot::RefreshToken, Some("refresh-1"));
    store.set(Slot::SessionId, Some("s1"));
    let new_access = fresh_token(Some("s1"));
    service.script_refresh(Ok(TokenPair::new(new_access.clone(), None)));

    assert_eq!(engine.get_valid_access_token().await, Some(new_access));
    assert_eq!(service.refresh_calls.load(Ordering::SeqCst), 2);
}

/// Test: refresh failure clears every persisted credential and reports
/// null; it does not retry.
#[tokio::test]
async fn test_refresh_failure_clears_state() {
    let service = Arc::new(MockAuthService::new());
    service.script_refresh(Err(ApiError::platform(ErrorCode::SignInExpired)));

    let store = store_with(&[
        (Slot::AccessToken, expired_token(Some("s1")).as_str()),
        (Slot::RefreshToken, "refresh-1"),
        (Slot::SessionId, "s1"),
    ]);
    let engine = make_engine_with_store(Arc::clone(&service), Arc::clone(&store));

    assert_eq!(engine.get_valid_access_token().await, None);
    assert_eq!(service.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get(Slot::AccessToken), None);
    assert_eq!(store.get(Slot::RefreshToken), None);
    assert_eq!(store.get(Slot::SessionId), None);
}

/// Test: the session id can be recovered from the expired token's own
/// claims when it was never separately persisted.
#[tokio::test]
async fn test_session_id_recovered_from_expired_claims() {
    let service = Arc::new(MockAuthService::new());
    let new_access = fresh_token(Some("s7"));
    service.script_refresh(Ok(TokenPair::new(new_access.clone(), None)));

    let store = store_with(&[
        (Slot::AccessToken, expired_token(Some("s7")).as_str()),
        (Slot::RefreshToken, "refresh-1"),
        // No SessionId slot on purpose.
    ]);
    let engine = make_engine_with_store(Arc::clone(&service), Arc::clone(&store));

    assert_eq!(engine.get_valid_access_token().await, Some(new_access));
    // The recovered id is persisted alongside the new tokens.
    assert_eq!(store.get(Slot::SessionId).as_deref(), Some("s7"));
}

/// Test: with neither refresh token nor session id the session is not
/// refreshable; state is cleared and no call is made.
#[tokio::test]
async fn test_unrefreshable_session_yields_null() {
    let service = Arc::new(MockAuthService::new());
    let store = store_with(&[(Slot::AccessToken, expired_token(None).as_str())]);
    let engine = make_engine_with_store(Arc::clone(&service), Arc::clone(&store));

    assert_eq!(engine.get_valid_access_token().await, None);
    assert_eq!(service.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.get(Slot::AccessToken), None);
}

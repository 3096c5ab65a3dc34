//! Shared fixtures for the engine integration tests: a scripted
//! [`AuthService`] with call counters, and compact-token builders.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;

use std::sync::Arc;

use latchkey_core::{AuthService, EngineConfig, MemoryBackend, SessionEngine, Store};
use latchkey_types::{ApiError, ErrorCode, LoginOptions, MagicCodeAck, SignInOutcome, TokenPair};

/// Installs a test subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine over a fresh in-memory store.
pub fn make_engine(service: Arc<MockAuthService>) -> SessionEngine<MockAuthService> {
    make_engine_with_store(service, Arc::new(Store::new(MemoryBackend::new(), "test")))
}

pub fn make_engine_with_store(
    service: Arc<MockAuthService>,
    store: Arc<Store>,
) -> SessionEngine<MockAuthService> {
    init_tracing();
    SessionEngine::new(service, store, &EngineConfig::default())
}

/// Builds a compact token whose claims segment carries `exp` (and
/// optionally `sid`). The signature segment is junk: the engine never
/// verifies it.
pub fn access_token(exp: u64, sid: Option<&str>) -> String {
    let claims = match sid {
        Some(sid) => format!(r#"{{"exp":{exp},"sid":"{sid}"}}"#),
        None => format!(r#"{{"exp":{exp}}}"#),
    };
    format!("hdr.{}.sig", BASE64_URL_SAFE_NO_PAD.encode(claims.as_bytes()))
}

/// A token that is fresh for another hour.
pub fn fresh_token(sid: Option<&str>) -> String {
    access_token(latchkey_core::claims::now_secs() + 3600, sid)
}

/// A token that expired an hour ago.
pub fn expired_token(sid: Option<&str>) -> String {
    access_token(latchkey_core::claims::now_secs().saturating_sub(3600), sid)
}

/// Base64url JSON payload in the shape of a social callback.
pub fn auth_payload(access: &str, refresh: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(
        format!(r#"{{"access_token":"{access}","refresh_token":"{refresh}"}}"#).as_bytes(),
    )
}

fn unscripted<T>() -> Result<T, ApiError> {
    Err(ApiError::Connectivity("unscripted mock call".to_string()))
}

/// Scripted service: each operation returns a preset (cloned) result and
/// counts its calls. The refresh result can be delayed to hold several
/// callers in the same in-flight window.
pub struct MockAuthService {
    pub create_sign_in_result: Mutex<Result<SignInOutcome, ApiError>>,
    pub send_magic_code_result: Mutex<Result<MagicCodeAck, ApiError>>,
    pub password_result: Mutex<Result<TokenPair, ApiError>>,
    pub magic_code_result: Mutex<Result<TokenPair, ApiError>>,
    pub refresh_result: Mutex<Result<TokenPair, ApiError>>,
    pub signed_in_result: Mutex<Result<TokenPair, ApiError>>,
    pub sign_out_result: Mutex<Result<(), ApiError>>,
    pub reset_email_result: Mutex<Result<(), ApiError>>,
    pub validate_reset_result: Mutex<Result<(), ApiError>>,
    pub reset_password_result: Mutex<Result<(), ApiError>>,

    pub refresh_delay: Mutex<Duration>,

    pub create_sign_in_calls: AtomicUsize,
    pub send_magic_code_calls: AtomicUsize,
    pub password_calls: AtomicUsize,
    pub magic_code_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub signed_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl Default for MockAuthService {
    fn default() -> Self {
        Self {
            create_sign_in_result: Mutex::new(unscripted()),
            send_magic_code_result: Mutex::new(unscripted()),
            password_result: Mutex::new(unscripted()),
            magic_code_result: Mutex::new(unscripted()),
            refresh_result: Mutex::new(unscripted()),
            signed_in_result: Mutex::new(unscripted()),
            sign_out_result: Mutex::new(Ok(())),
            reset_email_result: Mutex::new(Ok(())),
            validate_reset_result: Mutex::new(Ok(())),
            reset_password_result: Mutex::new(Ok(())),
            refresh_delay: Mutex::new(Duration::ZERO),
            create_sign_in_calls: AtomicUsize::new(0),
            send_magic_code_calls: AtomicUsize::new(0),
            password_calls: AtomicUsize::new(0),
            magic_code_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            signed_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }
}

impl MockAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_create_sign_in(&self, result: Result<SignInOutcome, ApiError>) {
        *self.create_sign_in_result.lock().unwrap() = result;
    }

    pub fn script_send_magic_code(&self, result: Result<MagicCodeAck, ApiError>) {
        *self.send_magic_code_result.lock().unwrap() = result;
    }

    pub fn script_password(&self, result: Result<TokenPair, ApiError>) {
        *self.password_result.lock().unwrap() = result;
    }

    pub fn script_magic_code(&self, result: Result<TokenPair, ApiError>) {
        *self.magic_code_result.lock().unwrap() = result;
    }

    pub fn script_refresh(&self, result: Result<TokenPair, ApiError>) {
        *self.refresh_result.lock().unwrap() = result;
    }

    pub fn script_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn script_signed_in(&self, result: Result<TokenPair, ApiError>) {
        *self.signed_in_result.lock().unwrap() = result;
    }
}

/// Session-created outcome with password + magic link enabled.
pub fn session_created(session_id: &str) -> SignInOutcome {
    SignInOutcome::SessionCreated {
        session_id: session_id.to_string(),
        login_options: LoginOptions {
            password: true,
            magic_link: true,
            ..LoginOptions::default()
        },
    }
}

pub fn platform_error(code: ErrorCode) -> ApiError {
    ApiError::platform(code)
}

#[async_trait]
impl AuthService for MockAuthService {
    async fn create_sign_in(
        &self,
        _email: &str,
        _password: Option<&str>,
        _send_magic_code: bool,
    ) -> Result<SignInOutcome, ApiError> {
        self.create_sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.create_sign_in_result.lock().unwrap().clone()
    }

    async fn send_magic_code(&self, _session_id: &str) -> Result<MagicCodeAck, ApiError> {
        self.send_magic_code_calls.fetch_add(1, Ordering::SeqCst);
        self.send_magic_code_result.lock().unwrap().clone()
    }

    async fn authenticate_with_password(
        &self,
        _session_id: &str,
        _password: &str,
    ) -> Result<TokenPair, ApiError> {
        self.password_calls.fetch_add(1, Ordering::SeqCst);
        self.password_result.lock().unwrap().clone()
    }

    async fn authenticate_with_magic_code(
        &self,
        _session_id: &str,
        _code: &str,
    ) -> Result<TokenPair, ApiError> {
        self.magic_code_calls.fetch_add(1, Ordering::SeqCst);
        self.magic_code_result.lock().unwrap().clone()
    }

    async fn refresh_token(
        &self,
        _session_id: &str,
        _refresh_token: &str,
    ) -> Result<TokenPair, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        self.refresh_result.lock().unwrap().clone()
    }

    async fn sign_out(&self, _session_id: &str) -> Result<(), ApiError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.sign_out_result.lock().unwrap().clone()
    }

    async fn send_reset_password_email(&self, _email: &str) -> Result<(), ApiError> {
        self.reset_email_result.lock().unwrap().clone()
    }

    async fn validate_reset_password_token(&self, _token: &str) -> Result<(), ApiError> {
        self.validate_reset_result.lock().unwrap().clone()
    }

    async fn reset_password(
        &self,
        _session_id: &str,
        _token: &str,
        _new_password: &str,
    ) -> Result<(), ApiError> {
        self.reset_password_result.lock().unwrap().clone()
    }

    async fn signed_in(&self) -> Result<TokenPair, ApiError> {
        self.signed_in_calls.fetch_add(1, Ordering::SeqCst);
        self.signed_in_result.lock().unwrap().clone()
    }
}

//! Reqwest reference implementation of the platform auth contract.
//!
//! Maps every [`AuthService`] operation onto one JSON endpoint. Non-2xx
//! responses carry an `{ "error": <code> }` body that decodes into
//! [`ApiError::Platform`]; transport failures become
//! [`ApiError::Connectivity`]. The client keeps a cookie store because
//! the signed-in probe is cookie-based.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use latchkey_core::AuthService;
use latchkey_types::{
    ApiError, ErrorCode, LoginOptions, MagicCodeAck, SignInOutcome, TokenPair, mask_token,
};

const SIGN_IN_PATH: &str = "/auth/sign-in";
const SESSION_PATH: &str = "/auth/session";
const RESET_EMAIL_PATH: &str = "/auth/reset-password/email";
const RESET_VALIDATE_PATH: &str = "/auth/reset-password/validate";

/// Client configuration. Serde-derived so hosts can embed it in their own
/// config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Platform base URL, e.g. `https://api.example.com`.
    pub base_url: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

/// HTTP client for the platform auth endpoints.
pub struct PlatformClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl PlatformClient {
    pub fn new(config: ClientConfig) -> Self {
        let http = match reqwest::Client::builder().cookie_store(true).build() {
            Ok(http) => http,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "cookie-backed client build failed; the signed-in probe will not carry cookies"
                );
                reqwest::Client::new()
            }
        };
        Self { config, http }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn session_endpoint(&self, session_id: &str, suffix: &str) -> String {
        self.endpoint(&format!("{SIGN_IN_PATH}/{session_id}{suffix}"))
    }
}

// ---- wire shapes ---------------------------------------------------------

#[derive(Serialize)]
struct CreateSignInBody<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    send_magic_code: bool,
}

/// `create_sign_in` is overloaded on the server; the response shape tells
/// the outcome apart. Field sets are disjoint, so untagged decode is
/// unambiguous.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignInResponse {
    SessionCreated {
        sign_in_session_id: String,
        login_options: LoginOptions,
    },
    MagicCodeSent {
        sign_in_session_id: String,
        resend_after_seconds: u64,
    },
    Authenticated {
        access_token: String,
        refresh_token: Option<String>,
    },
}

impl From<SignInResponse> for SignInOutcome {
    fn from(response: SignInResponse) -> Self {
        match response {
            SignInResponse::SessionCreated {
                sign_in_session_id,
                login_options,
            } => SignInOutcome::SessionCreated {
                session_id: sign_in_session_id,
                login_options,
            },
            SignInResponse::MagicCodeSent {
                sign_in_session_id,
                resend_after_seconds,
            } => SignInOutcome::MagicCodeSent {
                session_id: sign_in_session_id,
                ack: MagicCodeAck {
                    resend_after_seconds,
                },
            },
            SignInResponse::Authenticated {
                access_token,
                refresh_token,
            } => SignInOutcome::Authenticated {
                tokens: TokenPair {
                    access_token,
                    refresh_token,
                },
            },
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorCode,
    resend_after_seconds: Option<u64>,
}

// ---- response handling ---------------------------------------------------

fn connectivity(err: &reqwest::Error) -> ApiError {
    ApiError::Connectivity(err.to_string())
}

/// Folds a response into a typed body: 2xx decodes as `T`, anything else
/// decodes as the platform error shape.
async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|err| connectivity(&err))?;
    if status.is_success() {
        return serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()));
    }
    Err(decode_error(status, &bytes))
}

/// Like [`decode`] but for endpoints whose success body is empty.
async fn decode_unit(response: reqwest::Response) -> Result<(), ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let bytes = response.bytes().await.map_err(|err| connectivity(&err))?;
    Err(decode_error(status, &bytes))
}

fn decode_error(status: reqwest::StatusCode, bytes: &[u8]) -> ApiError {
    match serde_json::from_slice::<ErrorBody>(bytes) {
        Ok(body) => ApiError::Platform {
            code: body.error,
            resend_after_seconds: body.resend_after_seconds,
        },
        Err(err) => {
            tracing::warn!(%status, error = %err, "undecodable error body");
            ApiError::Decode(format!("status {status}: {err}"))
        }
    }
}

#[async_trait]
impl AuthService for PlatformClient {
    async fn create_sign_in(
        &self,
        email: &str,
        password: Option<&str>,
        send_magic_code: bool,
    ) -> Result<SignInOutcome, ApiError> {
        tracing::debug!(send_magic_code, "create sign-in");
        let response = self
            .http
            .post(self.endpoint(SIGN_IN_PATH))
            .json(&CreateSignInBody {
                email,
                password,
                send_magic_code,
            })
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        decode::<SignInResponse>(response).await.map(Into::into)
    }

    async fn send_magic_code(&self, session_id: &str) -> Result<MagicCodeAck, ApiError> {
        let response = self
            .http
            .post(self.session_endpoint(session_id, "/magic-code"))
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        decode(response).await
    }

    async fn authenticate_with_password(
        &self,
        session_id: &str,
        password: &str,
    ) -> Result<TokenPair, ApiError> {
        let response = self
            .http
            .post(self.session_endpoint(session_id, "/password"))
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        decode(response).await
    }

    async fn authenticate_with_magic_code(
        &self,
        session_id: &str,
        code: &str,
    ) -> Result<TokenPair, ApiError> {
        let response = self
            .http
            .post(self.session_endpoint(session_id, "/magic-code/verify"))
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        decode(response).await
    }

    async fn refresh_token(
        &self,
        session_id: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, ApiError> {
        tracing::debug!(refresh_token = %mask_token(refresh_token), "refreshing access token");
        let response = self
            .http
            .post(self.session_endpoint(session_id, "/refresh"))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        decode(response).await
    }

    async fn sign_out(&self, session_id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.session_endpoint(session_id, ""))
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        // Deleting an already-gone session is still a completed sign-out.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        decode_unit(response).await
    }

    async fn send_reset_password_email(&self, email: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.endpoint(RESET_EMAIL_PATH))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        decode_unit(response).await
    }

    async fn validate_reset_password_token(&self, token: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.endpoint(RESET_VALIDATE_PATH))
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        decode_unit(response).await
    }

    async fn reset_password(
        &self,
        session_id: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.session_endpoint(session_id, "/reset-password"))
            .json(&serde_json::json!({ "token": token, "new_password": new_password }))
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        decode_unit(response).await
    }

    async fn signed_in(&self) -> Result<TokenPair, ApiError> {
        let response = self
            .http
            .get(self.endpoint(SESSION_PATH))
            .send()
            .await
            .map_err(|err| connectivity(&err))?;
        decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: the untagged response shapes stay disjoint.
    #[test]
    fn test_sign_in_response_shapes() {
        let created: SignInResponse = serde_json::from_str(
            r#"{"sign_in_session_id":"s1","login_options":{"password":true}}"#,
        )
        .unwrap();
        assert!(matches!(
            SignInOutcome::from(created),
            SignInOutcome::SessionCreated { session_id, .. } if session_id == "s1"
        ));

        let sent: SignInResponse =
            serde_json::from_str(r#"{"sign_in_session_id":"s1","resend_after_seconds":60}"#)
                .unwrap();
        assert!(matches!(
            SignInOutcome::from(sent),
            SignInOutcome::MagicCodeSent { ack, .. } if ack.resend_after_seconds == 60
        ));

        let authed: SignInResponse =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r"}"#).unwrap();
        assert!(matches!(
            SignInOutcome::from(authed),
            SignInOutcome::Authenticated { tokens } if tokens.refresh_token.as_deref() == Some("r")
        ));
    }

    /// Test: error bodies map to the platform variant, garbage to decode.
    #[test]
    fn test_error_body_mapping() {
        let err = decode_error(
            reqwest::StatusCode::CONFLICT,
            br#"{"error":"magic_code_recently_created","resend_after_seconds":30}"#,
        );
        assert_eq!(
            err,
            ApiError::Platform {
                code: ErrorCode::MagicCodeRecentlyCreated,
                resend_after_seconds: Some(30),
            }
        );

        let err = decode_error(reqwest::StatusCode::BAD_GATEWAY, b"<html>");
        assert!(matches!(err, ApiError::Decode(_)));
    }

    /// Test: endpoint building tolerates a trailing slash on the base.
    #[test]
    fn test_endpoint_join() {
        let client = PlatformClient::new(ClientConfig::new("https://api.example.com/"));
        assert_eq!(
            client.endpoint(SIGN_IN_PATH),
            "https://api.example.com/auth/sign-in"
        );
        assert_eq!(
            client.session_endpoint("s1", "/refresh"),
            "https://api.example.com/auth/sign-in/s1/refresh"
        );
    }
}

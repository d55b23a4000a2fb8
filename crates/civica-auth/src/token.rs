//! Auth endpoint calls
//!
//! Thin `reqwest` calls against the backend's `/auth` and `/user` surface.
//! These run without stored credentials: they either establish the token
//! pair (login, refresh, code exchange) or manage the account around it
//! (signup, verification, password reset). Authenticated traffic goes
//! through `civica-api` instead.
//!
//! Every endpoint answers with the `{ message, data }` envelope; 401/403
//! maps to `Error::InvalidCredentials`, other non-success statuses to
//! `Error::Api`.

use common::Envelope;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::routes;

/// Authenticated user row cached locally after login/refresh/exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Result of a successful login, refresh, or code exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtData {
    pub access_token: String,
    pub refresh_token: String,
    pub user_info: UserInfo,
}

/// Server-issued authorization data for one sign-in attempt.
///
/// `code_verifier` is not part of the server response; the orchestrator
/// reattaches the locally held verifier so the whole attempt travels as one
/// value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthAuthorizationData {
    pub authorization_url: String,
    pub state: String,
    pub code_challenge: String,
    #[serde(default)]
    pub code_verifier: String,
}

/// Password login.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    password: &str,
) -> Result<JwtData> {
    let response = client
        .post(format!("{base_url}{}", routes::AUTH_LOGIN))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    require_data(read_envelope(response, "login").await?, "login")
}

/// Password signup. Returns the server message (the account typically needs
/// email verification before login succeeds).
pub async fn signup(
    client: &reqwest::Client,
    base_url: &str,
    username: &str,
    email: &str,
    password: &str,
) -> Result<String> {
    let response = client
        .post(format!("{base_url}{}", routes::AUTH_SIGNUP))
        .json(&serde_json::json!({
            "username": username,
            "email": email,
            "password": password,
        }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("signup request failed: {e}")))?;

    let envelope: Envelope<serde_json::Value> = read_envelope(response, "signup").await?;
    Ok(envelope.message)
}

/// Obtain a fresh token pair from a refresh token.
///
/// Called by the background refresh job and by manual "refresh now".
pub async fn refresh(
    client: &reqwest::Client,
    base_url: &str,
    refresh_token: &str,
) -> Result<JwtData> {
    let response = client
        .post(format!("{base_url}{}", routes::AUTH_REFRESH))
        .json(&serde_json::json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    require_data(read_envelope(response, "token refresh").await?, "token refresh")
}

/// Confirm an email address with a one-time code.
pub async fn verify_email(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    otp: &str,
) -> Result<String> {
    let response = client
        .post(format!("{base_url}{}", routes::AUTH_VERIFY_EMAIL))
        .json(&serde_json::json!({ "email": email, "otp": otp }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("verify-email request failed: {e}")))?;

    let envelope: Envelope<serde_json::Value> = read_envelope(response, "verify-email").await?;
    Ok(envelope.message)
}

/// Re-send the verification email.
pub async fn resend_verification(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
) -> Result<String> {
    let response = client
        .post(format!("{base_url}{}", routes::AUTH_RESEND_VERIFICATION))
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("resend-verification request failed: {e}")))?;

    let envelope: Envelope<serde_json::Value> =
        read_envelope(response, "resend-verification").await?;
    Ok(envelope.message)
}

/// Ask the backend for an authorization URL for the given provider.
///
/// The backend derives the S256 challenge from `code_verifier` server-side
/// and binds it, together with `state`, into the returned URL.
pub async fn fetch_authorize_url(
    client: &reqwest::Client,
    base_url: &str,
    provider: &str,
    code_verifier: &str,
    state: &str,
) -> Result<OAuthAuthorizationData> {
    let response = client
        .get(format!("{base_url}{}", routes::OAUTH_AUTHORIZE_URL))
        .query(&[
            ("provider", provider),
            ("codeVerifier", code_verifier),
            ("state", state),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("authorize-url request failed: {e}")))?;

    require_data(read_envelope(response, "authorize-url").await?, "authorize-url")
}

/// Exchange an authorization code for a token pair.
///
/// The second half of the PKCE flow: the raw verifier goes to the backend
/// here, and only here, over the confidential channel.
pub async fn exchange_code(
    client: &reqwest::Client,
    base_url: &str,
    provider: &str,
    code: &str,
    state: &str,
    code_verifier: &str,
    client_kind: &str,
) -> Result<JwtData> {
    let response = client
        .post(format!("{base_url}{}", routes::oauth_callback(provider)))
        .query(&[("code", code), ("state", state), ("client", client_kind)])
        .json(&serde_json::json!({ "codeVerifier": code_verifier }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("code exchange request failed: {e}")))?;

    require_data(read_envelope(response, "code exchange").await?, "code exchange")
}

/// Password reset, step 1: send the reset OTP.
pub async fn initiate_password_reset(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
) -> Result<String> {
    let response = client
        .post(format!("{base_url}{}", routes::PASSWORD_RESET_INITIATE))
        .query(&[("email", email)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("password-reset request failed: {e}")))?;

    let envelope: Envelope<serde_json::Value> = read_envelope(response, "password reset").await?;
    Ok(envelope.message)
}

/// Password reset, step 2: confirm with the OTP and set the new password.
pub async fn confirm_password_reset(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    otp: &str,
    new_password: &str,
) -> Result<String> {
    let response = client
        .post(format!("{base_url}{}", routes::PASSWORD_RESET_CONFIRM))
        .query(&[("email", email), ("otp", otp), ("newPassword", new_password)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("password-reset confirm request failed: {e}")))?;

    let envelope: Envelope<serde_json::Value> =
        read_envelope(response, "password reset confirm").await?;
    Ok(envelope.message)
}

/// Decode a backend response into the envelope, mapping non-success statuses
/// into the auth error taxonomy. 401/403 means the credentials (or the code)
/// were rejected outright.
async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<Envelope<T>> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            .map(|e| e.message)
            .unwrap_or(body);

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "{what} rejected ({status}): {message}"
            )));
        }
        return Err(Error::Api {
            status: status.as_u16(),
            message: format!("{what}: {message}"),
        });
    }

    response
        .json::<Envelope<T>>()
        .await
        .map_err(|e| Error::UnexpectedResponse(format!("invalid {what} response: {e}")))
}

fn require_data<T>(envelope: Envelope<T>, what: &str) -> Result<T> {
    envelope
        .data
        .ok_or_else(|| Error::UnexpectedResponse(format!("{what} response carried no payload")))
}

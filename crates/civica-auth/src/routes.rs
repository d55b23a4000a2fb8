//! Backend route constants
//!
//! Paths are relative to the configured API base URL. These are not secrets;
//! they mirror the server's published REST surface. The tokens themselves are
//! managed by the token store.

/// Password signup
pub const AUTH_SIGNUP: &str = "/auth/signup";

/// Password login
pub const AUTH_LOGIN: &str = "/auth/login";

/// Access-token refresh using the stored refresh token
pub const AUTH_REFRESH: &str = "/auth/refresh";

/// Email verification with a one-time code
pub const AUTH_VERIFY_EMAIL: &str = "/auth/verify-email";

/// Re-send the verification email
pub const AUTH_RESEND_VERIFICATION: &str = "/auth/resend-verification";

/// Authorization-URL request for the OAuth flow
/// (`?provider=&codeVerifier=&state=`)
pub const OAUTH_AUTHORIZE_URL: &str = "/auth/oauth2/authorize-url";

/// Password reset, step 1 (`?email=`)
pub const PASSWORD_RESET_INITIATE: &str = "/user/password/reset/initiate";

/// Password reset, step 2 (`?email=&otp=&newPassword=`)
pub const PASSWORD_RESET_CONFIRM: &str = "/user/password/reset/confirm";

/// Client kind reported in the `client` query parameter of the OAuth
/// callback exchange. The backend uses it to select redirect handling.
pub const DEFAULT_CLIENT_KIND: &str = "desktop";

/// Authorization-code exchange path for a given identity provider.
pub fn oauth_callback(provider: &str) -> String {
    format!("/auth/oauth2/callback/{provider}")
}

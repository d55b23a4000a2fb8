//! Token header names
//!
//! Request side: the access token rides in the standard `Authorization`
//! bearer header and the refresh token in `x-refresh`, which lets the backend
//! rotate proactively. Response side: the backend hands back rotated tokens
//! in plain `access_token`/`refresh_token` headers; when it needs the client
//! to switch access tokens mid-session it sets `x-access-token`, which wins
//! over the plain header.

/// Request header carrying the refresh token.
pub const X_REFRESH: &str = "x-refresh";

/// Response header carrying the (possibly unchanged) access token.
pub const ACCESS_TOKEN: &str = "access_token";

/// Response header carrying the refresh token.
pub const REFRESH_TOKEN: &str = "refresh_token";

/// Response header signaling a freshly rotated access token. Overrides
/// `access_token` when both are present.
pub const X_ACCESS_TOKEN: &str = "x-access-token";

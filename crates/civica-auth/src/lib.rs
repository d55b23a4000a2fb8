//! Civica authentication library
//!
//! Provides PKCE generation, the persisted PKCE and token stores, the auth
//! endpoint calls, and the OAuth sign-in orchestrator. This crate is a
//! standalone library with no dependency on the agent binary — it can be
//! tested and used independently.
//!
//! Sign-in flow:
//! 1. `OAuthFlow::begin()` generates PKCE data via `pkce::generate()` and
//!    persists it in the `PkceStore`
//! 2. The backend returns an authorization URL; the user authorizes in an
//!    external browser
//! 3. The redirect lands back in the app and `OAuthFlow::complete()` checks
//!    the anti-CSRF state, then calls `token::exchange_code()`
//! 4. Tokens land in the `TokenStore`, the user row in the `ProfileCache`
//! 5. `civica-sync` refreshes the pair in the background via
//!    `token::refresh()`

pub mod error;
pub mod oauth;
pub mod pkce;
pub mod profile;
pub mod routes;
pub mod token;
pub mod token_store;

mod storage;

pub use error::{Error, Result};
pub use oauth::{FlowState, OAuthFlow, RedirectCallback};
pub use pkce::{PkceData, PkceStore, compute_challenge, generate};
pub use profile::ProfileCache;
pub use token::{JwtData, OAuthAuthorizationData, UserInfo};
pub use token_store::TokenStore;

//! Backend response envelope
//!
//! Every Civica backend endpoint wraps its payload as
//! `{ "message": string, "data": T? }`. `data` is absent on pure-status
//! responses (e.g. resend-verification) and on errors.

use serde::{Deserialize, Serialize};

/// The `{ message, data }` wrapper returned by every backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, or surface the server message when `data` is absent.
    pub fn into_data(self) -> Result<T, String> {
        self.data.ok_or(self.message)
    }
}

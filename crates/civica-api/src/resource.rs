//! Three-state wrapper for UI-facing calls
//!
//! Screens observe a `Resource` stream instead of a bare future: first
//! `Loading`, then exactly one terminal `Success` or `Error`. Cancellation is
//! dropping the stream; it is never converted into an error item.

use std::future::Future;

use common::Envelope;
use futures_util::Stream;
use futures_util::stream::{self, StreamExt};

use crate::error::ApiError;

/// One observation of an in-flight API call.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource<T> {
    Loading,
    Success { data: Option<T>, message: String },
    Error(ApiError),
}

impl<T> Resource<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Resource::Loading)
    }
}

/// Wrap an API call into a `Loading` → terminal stream.
pub fn resource_stream<T, F>(call: F) -> impl Stream<Item = Resource<T>>
where
    F: Future<Output = Result<Envelope<T>, ApiError>>,
{
    stream::once(async { Resource::Loading }).chain(stream::once(async move {
        match call.await {
            Ok(envelope) => Resource::Success {
                data: envelope.data,
                message: envelope.message,
            },
            Err(e) => Resource::Error(e),
        }
    }))
}

//! Dial/invoke primitives the RPC fabric requires from its transport
//! (spec.md §6). The wire format itself is opaque; these traits exist so
//! `fabric_balancer` and `fabric_rpc` can be written against a capability
//! rather than a concrete client library.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Status classification surfaced by [`Invoker::invoke`], coarse enough for
/// the breaker's acceptable-error classifier (spec.md §4.3) without
/// depending on any particular RPC framework's status type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    DeadlineExceeded,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Other,
}

impl StatusCode {
    /// The breaker's classifier: these codes count as failures even when
    /// the call otherwise "succeeded" at the transport level; everything
    /// else counts as success, matching the original's `acceptable(err)`.
    pub fn counts_as_failure(self) -> bool {
        matches!(
            self,
            StatusCode::DeadlineExceeded
                | StatusCode::Unimplemented
                | StatusCode::Internal
                | StatusCode::Unavailable
                | StatusCode::DataLoss
        )
    }
}

/// An error surfaced by [`Invoker::invoke`], carrying enough status
/// information for breaker classification plus an opaque cause.
#[derive(Debug)]
pub struct InvokeError {
    pub status: StatusCode,
    pub source: anyhow::Error,
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc invoke failed ({:?}): {}", self.status, self.source)
    }
}

impl std::error::Error for InvokeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.source()
    }
}

impl InvokeError {
    pub fn new(status: StatusCode, source: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            source: source.into(),
        }
    }
}

/// Opens a transport connection to `addr`. Implementations decide what
/// "ready" means for their connection type (e.g. an observable connectivity
/// state); the balancer only needs the connection value itself.
#[async_trait]
pub trait Dialer<C>: Send + Sync {
    async fn dial(&self, addr: &str) -> anyhow::Result<C>;

    /// Closes a previously dialed connection. Default no-op lets
    /// connection types whose `Drop` already closes skip an override.
    async fn close(&self, _conn: &C) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Invokes `method` against an already-dialed connection.
#[async_trait]
pub trait Invoker<C>: Send + Sync {
    async fn invoke(&self, conn: &C, method: &str, req: Bytes) -> Result<Bytes, InvokeError>;
}

//! Breaker error types. Hand-implemented rather than derived: `thiserror`
//! doesn't cleanly express a transparent variant over a bare generic
//! parameter, and `fabric_core::InvokeError` already sets the precedent
//! for writing these by hand at this crate's seams.

use std::fmt;

/// Why a request was rejected before it ever ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Open,
    TooManyRequests,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Open => write!(f, "circuit breaker is open"),
            Rejection::TooManyRequests => write!(f, "too many requests on half-open state"),
        }
    }
}

impl std::error::Error for Rejection {}

/// Either the breaker refused to admit the call ([`Rejection`]) or it
/// admitted the call and the guarded function itself failed (`Inner`).
#[derive(Debug)]
pub enum BreakerError<E> {
    Rejected(Rejection),
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Rejected(r) => write!(f, "{r}"),
            BreakerError::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for BreakerError<E> {}

impl<E> From<Rejection> for BreakerError<E> {
    fn from(rejection: Rejection) -> Self {
        BreakerError::Rejected(rejection)
    }
}

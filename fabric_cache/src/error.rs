//! Cache error types. [`TakeError`] is hand-implemented rather than
//! `thiserror`-derived for the same reason as `fabric_breaker::BreakerError`:
//! a transparent variant over a bare generic parameter doesn't derive
//! cleanly.

use std::fmt;

use thiserror::Error;

/// A failure talking to the cache store itself (distinct from "not found",
/// which is a normal outcome, not a transport failure).
#[derive(Debug, Error)]
#[error("cache store error: {0}")]
pub struct CacheError(#[from] pub anyhow::Error);

/// A failure from the DB session a [`crate::db::Db`] wraps — query,
/// exec, or transaction failure alike.
#[derive(Debug, Error)]
#[error("db error: {0}")]
pub struct DbError(#[from] pub anyhow::Error);

impl Clone for DbError {
    fn clone(&self) -> Self {
        DbError(anyhow::anyhow!(self.0.to_string()))
    }
}

/// Outcome of [`crate::Cache::take`].
#[derive(Debug)]
pub enum TakeError<E> {
    /// Neither the cache nor the loader has the value.
    NotFound,
    /// The cache store itself failed (connection, encoding, etc).
    Cache(CacheError),
    /// The loader (e.g. a database query) failed.
    Db(E),
}

impl<E: fmt::Display> fmt::Display for TakeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeError::NotFound => write!(f, "not found"),
            TakeError::Cache(err) => write!(f, "{err}"),
            TakeError::Db(err) => write!(f, "{err}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for TakeError<E> {}

impl<E> Clone for TakeError<E>
where
    E: Clone,
{
    fn clone(&self) -> Self {
        match self {
            TakeError::NotFound => TakeError::NotFound,
            TakeError::Cache(CacheError(err)) => {
                TakeError::Cache(CacheError(anyhow::anyhow!(err.to_string())))
            }
            TakeError::Db(err) => TakeError::Db(err.clone()),
        }
    }
}

//! Shared concurrency primitives used across the fabric: a signal-based
//! condition variable, a timed borrow limit built on it, and a
//! reference-counted single-cleanup resource wrapper.

pub mod cond;
pub mod resource;
pub mod timeout_limit;

pub use cond::Cond;
pub use resource::{Resource, ResourceError};
pub use timeout_limit::{TimeoutError, TimeoutLimit};

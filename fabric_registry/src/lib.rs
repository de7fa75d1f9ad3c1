//! Lease-backed registry publishing and prefix subscription on top of
//! `fabric_core::KvStore`.

pub mod container;
pub mod publisher;
pub mod subscriber;

#[cfg(test)]
mod test_support;

pub use container::{Container, Listener};
pub use publisher::{Publisher, PublisherError};
pub use subscriber::Subscriber;

//! Shared types, traits and error kinds for the microservice fabric.
//!
//! This crate has no behavior of its own — it is the seam the other
//! `fabric_*` crates and their external collaborators (KV driver, RPC
//! transport) meet at, mirroring the role `s5_core` plays for the S5
//! workspace this one is patterned after.

pub mod error;
pub mod key;
pub mod kv;
pub mod transport;

pub use error::{ConfigError, KvHostsConfig};
pub use key::{DELIMITER, extract_id, extract_key, make_key};
pub use kv::{KeepAliveStream, KvEntry, KvStore, LeaseId, WatchEvent, WatchStream};
pub use transport::{Dialer, InvokeError, Invoker, StatusCode};

/// Default registry lease TTL (spec.md §6).
pub const LEASE_TTL: std::time::Duration = std::time::Duration::from_secs(10);
/// Default lease renewal cadence, ≈ TTL/2.5 (spec.md §4.1).
pub const RENEW_INTERVAL: std::time::Duration = std::time::Duration::from_secs(4);
/// Default registry dial timeout (spec.md §6).
pub const DIAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
/// Default registry request timeout (spec.md §6).
pub const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);
/// Default RPC deadline when the caller supplies none (spec.md §5).
pub const DEFAULT_RPC_DEADLINE: std::time::Duration = std::time::Duration::from_secs(2);

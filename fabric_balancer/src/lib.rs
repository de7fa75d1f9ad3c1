//! Round-robin and consistent-hash load balancing over connections fed
//! by a live registry watch.

pub mod base;
pub mod consistent_hash;
pub mod ring;
pub mod round_robin;

pub use consistent_hash::{ConsistentHashBalancer, Keyer, id_keyer, value_keyer};
pub use ring::ConsistentHash;
pub use round_robin::RoundRobinBalancer;

//! Client/server glue on top of [`fabric_balancer`], [`fabric_breaker`] and
//! [`fabric_registry`], mirroring `original_source/lib/rpcx`.

pub mod client;
pub mod config;
pub mod server;

pub use client::{ClientError, RpcClient};
pub use config::{ClientConfig, ServerConfig};
pub use server::{RpcServer, handle_unary};

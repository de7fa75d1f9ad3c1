//! Server hosting glue, translated from
//! `original_source/lib/rpcx/{rpcserver,rpcpubserver,serverinterceptors}.go`.
//! The concrete transport (listener, wire framing) is an external
//! collaborator; this crate owns the registry keep-alive lifecycle and
//! the deadline/panic-recovery wrapper every handler call goes through.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use fabric_core::{InvokeError, KvStore, StatusCode};
use fabric_registry::Publisher;
use futures::FutureExt as _;

use crate::config::ServerConfig;

const SLOW_CALL_THRESHOLD: Duration = Duration::from_millis(500);

/// Wraps a single unary handler invocation with the original's
/// `UnaryStatInterceptor` (panic recovery, duration logging) and
/// `UnaryTimeoutInterceptor` (per-call deadline) behavior, collapsed into
/// one call since there's no separate interceptor chain to register onto.
pub async fn handle_unary<F, Fut>(
    method: &str,
    timeout: Duration,
    handler: F,
) -> Result<Bytes, InvokeError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Bytes, InvokeError>>,
{
    let start = Instant::now();

    let outcome = tokio::time::timeout(timeout, AssertUnwindSafe(handler()).catch_unwind()).await;

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            tracing::error!(method, ?panic, "rpc handler panicked");
            Err(InvokeError::new(
                StatusCode::Internal,
                anyhow::anyhow!("panic in handler for {method}"),
            ))
        }
        Err(_) => Err(InvokeError::new(
            StatusCode::DeadlineExceeded,
            anyhow::anyhow!("handler for {method} exceeded {:?} deadline", timeout),
        )),
    };

    let elapsed = start.elapsed();
    match &result {
        Ok(_) if elapsed > SLOW_CALL_THRESHOLD => {
            tracing::warn!(method, ?elapsed, "slow rpc handler");
        }
        Ok(_) => tracing::debug!(method, ?elapsed, "rpc handler ok"),
        Err(err) => tracing::info!(method, ?elapsed, error = %err, "rpc handler failed"),
    }

    result
}

/// Hosts a server on `config.listen_on`, optionally keeping a registry
/// publication alive for as long as the server runs — the `rpcpubserver.go`
/// `keepAliveServer` wrapper, generalized over any [`KvStore`].
pub struct RpcServer<K> {
    config: ServerConfig,
    publisher: Option<Arc<Publisher<K>>>,
}

impl<K: KvStore + 'static> RpcServer<K> {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            publisher: None,
        }
    }

    /// Publishes `config.listen_on` under `config.registry_key` and keeps
    /// the lease alive for the server's lifetime. Must be called before
    /// [`RpcServer::run`] for a server that should be discoverable.
    pub fn with_registry(mut self, kv: Arc<K>) -> anyhow::Result<Self> {
        let key = self
            .config
            .registry_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ServerConfig::registry_key is required to publish"))?;
        self.publisher = Some(Arc::new(Publisher::new(kv, key, self.config.listen_on.clone())));
        Ok(self)
    }

    pub fn listen_on(&self) -> &str {
        &self.config.listen_on
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Starts the registry keep-alive loop (if configured) and runs
    /// `serve` until it returns, the analogue of `keepAliveServer::Start`
    /// registering with etcd before `Server.Start(fn)`.
    pub async fn run<F, Fut>(&self, serve: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let keep_alive = self.publisher.clone().map(|publisher| {
            tokio::spawn(async move {
                if let Err(err) = publisher.run().await {
                    tracing::error!(error = %err, "registry keep-alive loop exited with error");
                }
            })
        });

        let result = serve().await;

        if let Some(publisher) = &self.publisher {
            publisher.revoke_now().await;
        }
        if let Some(handle) = keep_alive {
            handle.abort();
        }

        result
    }
}

//! Client dial/invoke glue, translated from
//! `original_source/lib/rpcx/{client,clientinterceptors,rrclient}.go`.
//! The original's interceptor chain (breaker ⊃ duration-log ⊃ deadline)
//! is collapsed into one [`RpcClient::invoke`] since Rust has no
//! ambient interceptor-registration mechanism to hang them on separately.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use fabric_balancer::RoundRobinBalancer;
use fabric_breaker::BreakerError;
use fabric_core::{Dialer, Invoker, InvokeError, KvStore, StatusCode};

use crate::config::ClientConfig;

const SLOW_CALL_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum ClientError {
    NoServerAvailable,
    Invoke(InvokeError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NoServerAvailable => write!(f, "no server available"),
            ClientError::Invoke(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ClientError {}

enum Dispatch<D, C> {
    Direct(C),
    Balanced(Arc<RoundRobinBalancer<D, C>>),
}

impl<D, C> Dispatch<D, C>
where
    D: Dialer<C> + 'static,
    C: Clone + Send + Sync + 'static,
{
    async fn next(&self) -> Option<C> {
        match self {
            Dispatch::Direct(conn) => Some(conn.clone()),
            Dispatch::Balanced(balancer) => balancer.next(),
        }
    }
}

/// An RPC client over either a single fixed address or a live registry
/// watch balanced round-robin, wrapping every call in a named breaker and
/// a per-call deadline.
pub struct RpcClient<D, C, I> {
    dispatch: Dispatch<D, C>,
    invoker: Arc<I>,
    timeout: Duration,
    target: String,
}

impl<D, C, I> RpcClient<D, C, I>
where
    D: Dialer<C> + 'static,
    C: Clone + Send + Sync + 'static,
    I: Invoker<C>,
{
    /// Builds a client that always dials the single fixed address in
    /// `config.server`, analogous to the original's `DirectClient`.
    pub async fn direct(config: ClientConfig, dialer: &D, invoker: Arc<I>) -> anyhow::Result<Self> {
        let server = config
            .server
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ClientConfig::server is required for a direct client"))?;
        let conn = dialer.dial(&server).await?;
        Ok(Self {
            dispatch: Dispatch::Direct(conn),
            invoker,
            timeout: config.timeout(),
            target: server,
        })
    }

    /// Builds a client balanced round-robin over servers published under
    /// `config.registry_prefix`, analogous to `NewRoundRobinRpcClient`.
    pub async fn balanced<K: KvStore + 'static>(
        config: ClientConfig,
        kv: Arc<K>,
        dialer: Arc<D>,
        invoker: Arc<I>,
    ) -> anyhow::Result<Self> {
        let prefix = config
            .registry_prefix
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ClientConfig::registry_prefix is required for a balanced client"))?;
        let balancer = RoundRobinBalancer::subscribe(kv, prefix.clone(), dialer, false).await?;
        Ok(Self {
            dispatch: Dispatch::Balanced(balancer),
            invoker,
            timeout: config.timeout(),
            target: prefix,
        })
    }

    pub async fn next(&self) -> Option<C> {
        self.dispatch.next().await
    }

    /// Runs `method` against a live connection, under a breaker named
    /// `"{target}/{method}"` and a per-call deadline.
    pub async fn invoke(&self, method: &str, req: Bytes) -> Result<Bytes, BreakerError<ClientError>> {
        let conn = self
            .next()
            .await
            .ok_or(BreakerError::Inner(ClientError::NoServerAvailable))?;

        let breaker_name = format!("{}/{}", self.target, method);
        let invoker = self.invoker.clone();
        let timeout = self.timeout;
        let method = method.to_string();
        let target = self.target.clone();

        fabric_breaker::do_async_with_acceptable(
            &breaker_name,
            move || async move {
                let start = Instant::now();
                let outcome = tokio::time::timeout(timeout, invoker.invoke(&conn, &method, req)).await;
                let elapsed = start.elapsed();

                match outcome {
                    Ok(Ok(bytes)) => {
                        if elapsed > SLOW_CALL_THRESHOLD {
                            tracing::warn!(target = %target, method, ?elapsed, "slow rpc call");
                        } else {
                            tracing::debug!(target = %target, method, ?elapsed, "rpc call ok");
                        }
                        Ok(bytes)
                    }
                    Ok(Err(invoke_err)) => {
                        tracing::info!(target = %target, method, ?elapsed, error = %invoke_err, "rpc call failed");
                        Err(ClientError::Invoke(invoke_err))
                    }
                    Err(_) => {
                        let timeout_err = InvokeError::new(
                            StatusCode::DeadlineExceeded,
                            anyhow::anyhow!("rpc call exceeded {:?} deadline", timeout),
                        );
                        tracing::info!(target = %target, method, ?elapsed, "rpc call timed out");
                        Err(ClientError::Invoke(timeout_err))
                    }
                }
            },
            |result| acceptable_client(result),
        )
        .await
    }
}

/// The original's `acceptable(err)`: these status codes count as breaker
/// failures even though the call "completed" at the transport level.
fn acceptable_client(result: &Result<Bytes, ClientError>) -> bool {
    match result {
        Ok(_) => true,
        Err(ClientError::NoServerAvailable) => false,
        Err(ClientError::Invoke(err)) => !err.status.counts_as_failure(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoDialer;

    #[async_trait]
    impl Dialer<String> for EchoDialer {
        async fn dial(&self, addr: &str) -> anyhow::Result<String> {
            Ok(addr.to_string())
        }
    }

    struct CountingInvoker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Invoker<String> for CountingInvoker {
        async fn invoke(&self, conn: &String, _method: &str, req: Bytes) -> Result<Bytes, InvokeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(conn, "127.0.0.1:9000");
            Ok(req)
        }
    }

    #[tokio::test]
    async fn direct_client_invokes_against_the_fixed_address() {
        let dialer = EchoDialer;
        let invoker = Arc::new(CountingInvoker {
            calls: AtomicUsize::new(0),
        });
        let config = ClientConfig {
            server: Some("127.0.0.1:9000".into()),
            ..ClientConfig::default()
        };
        let client = RpcClient::direct(config, &dialer, invoker.clone()).await.unwrap();

        let reply = client
            .invoke("svc.Echo/Call", Bytes::from_static(b"ping"))
            .await
            .unwrap();
        assert_eq!(reply, Bytes::from_static(b"ping"));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invoke_without_any_server_is_rejected_before_dialing() {
        struct NeverDialer;
        #[async_trait]
        impl Dialer<String> for NeverDialer {
            async fn dial(&self, _addr: &str) -> anyhow::Result<String> {
                anyhow::bail!("unreachable in this test")
            }
        }

        let invoker = Arc::new(CountingInvoker {
            calls: AtomicUsize::new(0),
        });
        let balancer = RoundRobinBalancer::new(Arc::new(NeverDialer), false);
        let client = RpcClient::<NeverDialer, String, CountingInvoker> {
            dispatch: Dispatch::Balanced(balancer),
            invoker,
            timeout: Duration::from_millis(50),
            target: "svc.user".into(),
        };

        let result = client.invoke("svc.Echo/Call", Bytes::new()).await;
        assert!(matches!(result, Err(BreakerError::Inner(ClientError::NoServerAvailable))));
    }
}

//! Lease-backed self-registration, translated from
//! `original_source/lib/etcd/publisher.go`.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use fabric_core::{KvStore, LeaseId, make_key};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("registry operation failed: {0}")]
    Kv(#[from] anyhow::Error),
}

enum SessionEnd {
    ChannelClosed,
    Paused(oneshot::Sender<()>),
    Stopped,
}

/// Keeps `(prefix/leaseId -> listenOn)` alive in the registry for as
/// long as the publisher runs, renewing the lease until [`Publisher::stop`]
/// or the OS asks the process to shut down via [`Publisher::revoke_now`].
pub struct Publisher<K> {
    kv: Arc<K>,
    key: String,
    listen_on: String,
    id: Option<i64>,
    full_key: StdMutex<Option<String>>,
    lease: StdMutex<Option<LeaseId>>,
    pause_tx: mpsc::Sender<oneshot::Sender<()>>,
    pause_rx: AsyncMutex<mpsc::Receiver<oneshot::Sender<()>>>,
    resume_tx: mpsc::Sender<oneshot::Sender<()>>,
    resume_rx: AsyncMutex<mpsc::Receiver<oneshot::Sender<()>>>,
    quit: Notify,
    stopped: AtomicBool,
}

impl<K: KvStore + 'static> Publisher<K> {
    pub fn new(kv: Arc<K>, key: impl Into<String>, listen_on: impl Into<String>) -> Self {
        let (pause_tx, pause_rx) = mpsc::channel(1);
        let (resume_tx, resume_rx) = mpsc::channel(1);
        Self {
            kv,
            key: key.into(),
            listen_on: listen_on.into(),
            id: None,
            full_key: StdMutex::new(None),
            lease: StdMutex::new(None),
            pause_tx,
            pause_rx: AsyncMutex::new(pause_rx),
            resume_tx,
            resume_rx: AsyncMutex::new(resume_rx),
            quit: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Pins the published key's trailing id rather than deriving it from
    /// the granted lease, matching the original's `WithId` option.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn full_key(&self) -> Option<String> {
        self.full_key.lock().unwrap().clone()
    }

    /// Revokes the current lease and blocks renewal until [`Publisher::resume`]
    /// is called. Rendezvous with the run loop via a oneshot ack, mirroring
    /// the original's blocking unbuffered `pauseChan <- placeholder` send:
    /// this only returns once the run loop has actually paused.
    pub async fn pause(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.pause_tx.send(ack_tx).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    /// Resumes renewal after [`Publisher::pause`], with the same
    /// send-then-await-ack rendezvous as `pause`.
    pub async fn resume(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.resume_tx.send(ack_tx).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    /// Signals the run loop to revoke and return.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.quit.notify_one();
    }

    /// Spawns a task that revokes the lease as soon as `token` is
    /// cancelled, the analogue of the original's `DeadNotify` signal
    /// handler — signal delivery itself stays an external collaborator,
    /// this only owns the revoke it triggers.
    pub fn revoke_on_shutdown(self: &Arc<Self>, token: CancellationToken) {
        let publisher = self.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            publisher.revoke_now().await;
        });
    }

    /// Runs the keep-alive loop until stopped. On a lost keep-alive
    /// channel this re-registers from scratch rather than returning, so
    /// callers should spawn this once and let it run for the process
    /// lifetime.
    pub async fn run(&self) -> Result<(), PublisherError> {
        let mut pause_rx = self.pause_rx.lock().await;
        let mut resume_rx = self.resume_rx.lock().await;

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }

            let lease = self.register().await?;
            *self.lease.lock().unwrap() = Some(lease);
            let mut stream = self.kv.keep_alive(lease).await?;

            match self.run_session(&mut stream, &mut pause_rx).await {
                SessionEnd::Stopped => {
                    self.revoke(lease).await;
                    return Ok(());
                }
                SessionEnd::ChannelClosed => {
                    self.revoke(lease).await;
                    tracing::warn!(key = %self.key, "keep-alive channel closed, re-registering");
                }
                SessionEnd::Paused(ack) => {
                    self.revoke(lease).await;
                    let _ = ack.send(());
                    tracing::info!(key = %self.key, listen_on = %self.listen_on, "paused registry renewal");
                    tokio::select! {
                        Some(resume_ack) = resume_rx.recv() => {
                            let _ = resume_ack.send(());
                        }
                        _ = self.quit.notified() => return Ok(()),
                    }
                }
            }
        }
    }

    async fn run_session(
        &self,
        stream: &mut fabric_core::KeepAliveStream,
        pause_rx: &mut mpsc::Receiver<oneshot::Sender<()>>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                item = stream.next() => {
                    if item.is_none() {
                        return SessionEnd::ChannelClosed;
                    }
                }
                Some(ack) = pause_rx.recv() => return SessionEnd::Paused(ack),
                _ = self.quit.notified() => return SessionEnd::Stopped,
            }
        }
    }

    async fn register(&self) -> Result<LeaseId, PublisherError> {
        let lease = self.kv.grant_lease(fabric_core::LEASE_TTL).await?;
        let full_key = match self.id {
            Some(id) => make_key(&self.key, id),
            None => make_key(&self.key, lease.0),
        };
        self.kv
            .put_with_lease(&full_key, &self.listen_on, lease)
            .await?;
        *self.full_key.lock().unwrap() = Some(full_key);
        Ok(lease)
    }

    /// Revokes `lease` if it is still the publisher's active lease,
    /// clearing it afterward so a concurrent call (e.g. from
    /// [`Publisher::revoke_now`] racing the run loop's own shutdown path)
    /// sees it already gone and skips a second revoke.
    async fn revoke(&self, lease: LeaseId) {
        let should_revoke = {
            let mut current = self.lease.lock().unwrap();
            if *current == Some(lease) {
                *current = None;
                true
            } else {
                false
            }
        };
        if !should_revoke {
            return;
        }
        if let Err(err) = self.kv.revoke(lease).await {
            tracing::error!(error = %err, "failed to revoke lease");
        }
    }

    /// Revokes the active lease immediately, bypassing the run loop —
    /// the direct analogue of the original's signal-triggered `UnReg`.
    pub async fn revoke_now(&self) {
        self.stop();
        let lease = *self.lease.lock().unwrap();
        if let Some(lease) = lease {
            if let Some(full_key) = self.full_key() {
                tracing::info!(key = %full_key, "revoking on shutdown");
            }
            self.revoke(lease).await;
        }
    }
}

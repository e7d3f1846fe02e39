//! Reconciliation layer - best-effort mirroring of sessions to a remote store
//!
//! Local writes are the source of truth. Remote writes are queued to a
//! single worker task and run in submission order; their failures are
//! logged and never reach the caller.

mod http;

pub use http::HttpRemote;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{SessionId, WorkoutSession};

/// How long a resync waits for the remote before keeping local history
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opaque identity of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Remote did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Sync worker is not running")]
    WorkerGone,
}

/// Remote mirror of the session collection, partitioned by user
pub trait RemoteStore: Send + Sync + 'static {
    /// Create the session remotely, returning the remote id
    fn create_session(
        &self,
        user: &UserId,
        session: &WorkoutSession,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    /// Upsert the session under its local id
    fn update_session(
        &self,
        user: &UserId,
        id: SessionId,
        session: &WorkoutSession,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn list_sessions(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<WorkoutSession>, RemoteError>> + Send;
}

enum Job {
    Create {
        user: UserId,
        session: WorkoutSession,
    },
    Update {
        user: UserId,
        id: SessionId,
        session: WorkoutSession,
    },
    Resync {
        user: UserId,
        reply: oneshot::Sender<Result<Vec<WorkoutSession>, RemoteError>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the background mirror worker
pub struct Reconciler {
    jobs: UnboundedSender<Job>,
    worker: JoinHandle<()>,
    timeout: Duration,
}

impl Reconciler {
    /// Spawn the worker for `remote`. Must be called inside a tokio runtime.
    pub fn spawn<R: RemoteStore>(remote: R, timeout: Duration) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(remote, rx));
        Self { jobs, worker, timeout }
    }

    pub fn mirror_create(&self, user: &UserId, session: &WorkoutSession) {
        self.enqueue(Job::Create {
            user: user.clone(),
            session: session.clone(),
        });
    }

    pub fn mirror_update(&self, user: &UserId, id: SessionId, session: &WorkoutSession) {
        self.enqueue(Job::Update {
            user: user.clone(),
            id,
            session: session.clone(),
        });
    }

    /// Fetch the user's full remote history once every queued write has run
    pub async fn resync(&self, user: &UserId) -> Result<Vec<WorkoutSession>, RemoteError> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job::Resync { user: user.clone(), reply })
            .map_err(|_| RemoteError::WorkerGone)?;
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RemoteError::WorkerGone),
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }

    /// Wait until every job queued so far has been attempted
    pub async fn flush(&self) -> Result<(), RemoteError> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job::Flush { reply })
            .map_err(|_| RemoteError::WorkerGone)?;
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RemoteError::WorkerGone),
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }

    fn enqueue(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            warn!("Sync worker stopped, remote write dropped");
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker<R: RemoteStore>(remote: R, mut jobs: UnboundedReceiver<Job>) {
    info!("Sync worker started");
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Create { user, session } => match remote.create_session(&user, &session).await {
                Ok(remote_id) => debug!(%user, session_id = ?session.id, remote_id = %remote_id, "Session created remotely"),
                Err(e) => warn!(%user, session_id = ?session.id, error = %e, "Remote session create failed"),
            },
            Job::Update { user, id, session } => {
                if let Err(e) = remote.update_session(&user, id, &session).await {
                    warn!(%user, session_id = id, error = %e, "Remote session update failed");
                } else {
                    debug!(%user, session_id = id, "Session updated remotely");
                }
            }
            Job::Resync { user, reply } => {
                let result = remote.list_sessions(&user).await;
                let _ = reply.send(result);
            }
            Job::Flush { reply } => {
                let _ = reply.send(());
            }
        }
    }
    debug!("Sync worker finished");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// In-memory remote that records calls and can be told to fail or hang
    #[derive(Clone, Default)]
    pub struct MemoryRemote {
        pub calls: Arc<Mutex<Vec<String>>>,
        pub sessions: Arc<Mutex<BTreeMap<SessionId, WorkoutSession>>>,
        pub fail: Arc<Mutex<bool>>,
        pub hang: Arc<Mutex<bool>>,
    }

    impl MemoryRemote {
        pub fn failing() -> Self {
            let remote = Self::default();
            *remote.fail.lock().unwrap() = true;
            remote
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn gate(&self, call: String) -> Result<(), RemoteError> {
            self.calls.lock().unwrap().push(call);
            let hang = *self.hang.lock().unwrap();
            if hang {
                std::future::pending::<()>().await;
            }
            let fail = *self.fail.lock().unwrap();
            if fail {
                return Err(RemoteError::Api {
                    status: 503,
                    message: "offline".to_string(),
                });
            }
            Ok(())
        }
    }

    impl RemoteStore for MemoryRemote {
        async fn create_session(&self, user: &UserId, session: &WorkoutSession) -> Result<String, RemoteError> {
            self.gate(format!("create:{}:{:?}", user, session.id)).await?;
            let id = session.id.unwrap_or_default();
            self.sessions.lock().unwrap().insert(id, session.clone());
            Ok(format!("remote-{}", id))
        }

        async fn update_session(&self, user: &UserId, id: SessionId, session: &WorkoutSession) -> Result<(), RemoteError> {
            self.gate(format!("update:{}:{}", user, id)).await?;
            self.sessions.lock().unwrap().insert(id, session.clone());
            Ok(())
        }

        async fn list_sessions(&self, user: &UserId) -> Result<Vec<WorkoutSession>, RemoteError> {
            self.gate(format!("list:{}", user)).await?;
            Ok(self.sessions.lock().unwrap().values().cloned().collect())
        }
    }
}

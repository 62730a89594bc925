use std::sync::Arc;

use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, timeout},
};
use tracing::{debug, warn};

use crate::{
    assets::ObjectStore,
    node::ClassroomTree,
    persist::{ContentStore, StoreError},
    reconcile::{ReconcileError, Reconciler, SyncReport},
    record::StoredClassroom,
    types::RowId,
};

use super::events::SyncEvent;

/// Failure seen by a [`SyncHandle`] caller.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The synchronization itself failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    /// A read outside a synchronization failed.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// The writer task has stopped.
    #[error("runtime channel closed")]
    ChannelClosed,
    /// No answer within the configured number of milliseconds.
    #[error("synchronization exceeded {0} ms")]
    TimedOut(u64),
    /// The blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(String),
}

impl RuntimeError {
    /// Stable machine-readable name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reconcile(err) => err.kind(),
            Self::Store(_) => "StoreReadFailed",
            Self::ChannelClosed => "Unavailable",
            Self::TimedOut(_) => "TimedOut",
            Self::Join(_) => "Internal",
        }
    }

    /// HTTP status reported to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Reconcile(err) => err.status_code(),
            Self::ChannelClosed => 503,
            Self::TimedOut(_) => 504,
            Self::Store(_) | Self::Join(_) => 500,
        }
    }
}

/// Writer task tuning.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Commands buffered before senders wait.
    pub command_queue_bound: usize,
    /// Events kept for slow subscribers.
    pub event_capacity: usize,
    /// Upper bound on one synchronization. The blocking pass keeps running
    /// after a timeout; later commands queue behind it.
    pub sync_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 64,
            event_capacity: 256,
            sync_timeout_ms: 30_000,
        }
    }
}

/// Cloneable client of the writer task.
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<SyncEvent>,
}

enum Command {
    Sync {
        tree: Box<ClassroomTree>,
        resp: oneshot::Sender<Result<SyncReport, RuntimeError>>,
    },
    Load {
        classroom_id: RowId,
        resp: oneshot::Sender<Result<Option<StoredClassroom>, RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

struct Engine {
    store: Box<dyn ContentStore>,
    objects: Box<dyn ObjectStore>,
}

impl Engine {
    fn sync(&mut self, tree: &ClassroomTree) -> Result<SyncReport, ReconcileError> {
        Reconciler::new(self.store.as_mut(), self.objects.as_mut()).sync(tree)
    }
}

/// Starts the writer task. Synchronizations run one at a time, in the
/// order their commands arrive.
pub fn spawn_syncer(
    store: Box<dyn ContentStore>,
    objects: Box<dyn ObjectStore>,
    config: RuntimeConfig,
) -> SyncHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<SyncEvent>(config.event_capacity.max(1));

    let engine = Arc::new(Mutex::new(Engine { store, objects }));
    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            let done = handle_command(cmd, &engine, &events_tx_loop, &config).await;
            if done {
                break;
            }
        }
        debug!("sync runtime stopped");
    });

    SyncHandle { cmd_tx, events_tx }
}

impl SyncHandle {
    /// Receives every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events_tx.subscribe()
    }

    /// Queues one synchronization and waits for its report.
    pub async fn sync(&self, tree: ClassroomTree) -> Result<SyncReport, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Sync {
                tree: Box::new(tree),
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Reads the stored tree, ordered by position.
    pub async fn load(&self, classroom_id: RowId) -> Result<Option<StoredClassroom>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Load {
                classroom_id,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Stops accepting commands once queued ones have run.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn handle_command(
    cmd: Command,
    engine: &Arc<Mutex<Engine>>,
    events_tx: &broadcast::Sender<SyncEvent>,
    config: &RuntimeConfig,
) -> bool {
    match cmd {
        Command::Sync { tree, resp } => {
            let classroom_id = tree.id;
            let engine_ref = Arc::clone(engine);
            let task = tokio::task::spawn_blocking(move || {
                let mut engine = engine_ref.blocking_lock();
                engine.sync(&tree)
            });

            let res = match timeout(Duration::from_millis(config.sync_timeout_ms), task).await {
                Ok(Ok(inner)) => inner.map_err(RuntimeError::from),
                Ok(Err(e)) => Err(RuntimeError::Join(e.to_string())),
                Err(_) => Err(RuntimeError::TimedOut(config.sync_timeout_ms)),
            };

            match &res {
                Ok(report) => {
                    for failure in &report.delete_failures {
                        let _ = events_tx.send(SyncEvent::DeleteFailed {
                            classroom_id,
                            failure: failure.clone(),
                        });
                    }
                    let _ = events_tx.send(SyncEvent::Synced {
                        classroom_id,
                        report: report.clone(),
                    });
                }
                Err(err) => {
                    warn!(classroom_id, kind = err.kind(), %err, "sync command failed");
                    let _ = events_tx.send(SyncEvent::SyncFailed {
                        classroom_id,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
            let _ = resp.send(res);
        }
        Command::Load { classroom_id, resp } => {
            let engine_ref = Arc::clone(engine);
            let res = match tokio::task::spawn_blocking(move || {
                let engine = engine_ref.blocking_lock();
                engine.store.load_classroom(classroom_id)
            })
            .await
            {
                Ok(inner) => inner.map_err(RuntimeError::from),
                Err(e) => Err(RuntimeError::Join(e.to_string())),
            };
            let _ = resp.send(res);
        }
        Command::Shutdown { resp } => {
            // Waits for a timed-out pass that is still holding the engine.
            let _guard = engine.lock().await;
            let _ = resp.send(());
            return true;
        }
    }

    false
}

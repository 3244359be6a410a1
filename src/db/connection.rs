use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Run(DbTask),
    Shutdown,
}

/// Handle to the sleep database. A single worker thread owns the SQLite
/// connection; callers submit closures over a channel and await the reply,
/// so every statement runs off the caller's task.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
    path: Arc<PathBuf>,
}

struct Shared {
    commands: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(handle) = handle {
            if self.commands.send(DbCommand::Shutdown).is_err() {
                debug!("DB worker already gone at shutdown");
            }
            if let Err(err) = handle.join() {
                error!("Failed to join DB worker thread: {err:?}");
            }
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL mode")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    conn.pragma_update(None, "busy_timeout", 5_000)
        .context("failed to set busy timeout")?;

    Ok(conn)
}

fn worker_loop(mut conn: Connection, commands: &mpsc::Receiver<DbCommand>) {
    while let Ok(command) = commands.recv() {
        match command {
            DbCommand::Run(task) => task(&mut conn),
            DbCommand::Shutdown => break,
        }
    }
    info!("Database worker shutting down");
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let worker_path = db_path.clone();

        let worker = thread::Builder::new()
            .name("nightlog-db".into())
            .spawn(move || {
                let init = open_connection(&worker_path).and_then(|mut conn| {
                    run_migrations(&mut conn)
                        .context("failed to run database migrations")
                        .map(|()| conn)
                });

                match init {
                    Ok(conn) => {
                        if ready_tx.send(Ok(())).is_err() {
                            error!("DB handle dropped before worker became ready");
                            return;
                        }
                        worker_loop(conn, &command_rx);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database ready at {}", db_path.display());

        Ok(Self {
            shared: Arc::new(Shared {
                commands: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Runs `task` on the worker thread and suspends the caller until the
    /// result comes back.
    pub(crate) async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Run(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                debug!("DB caller dropped before receiving result");
            }
        }));

        self.shared
            .commands
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB worker: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker terminated unexpectedly"))?
    }
}

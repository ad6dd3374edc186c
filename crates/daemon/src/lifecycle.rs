// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, recovery, serving, shutdown.

use crate::broker::Broker;
use crate::config::{Config, ConfigFileError};
use crate::paths::CovenPaths;
use crate::recovery::recover_orphans;
use crate::server::{router, AppState};
use coven_agent::{GitWorktreeAdapter, LocalAgentAdapter};
use coven_core::{Event, SystemClock};
use coven_engine::{Engine, EngineConfig, Scheduler, SchedulerConfig};
use coven_grimoire::Matcher;
use coven_store::{Store, StoreError};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Engine with the daemon's concrete adapters.
pub type DaemonEngine = Engine<LocalAgentAdapter<SystemClock>, GitWorktreeAdapter, SystemClock>;
/// Scheduler with the daemon's concrete adapters.
pub type DaemonScheduler =
    Scheduler<LocalAgentAdapter<SystemClock>, GitWorktreeAdapter, SystemClock>;

/// Startup failures, mapped to process exit codes in `main`.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Exit code 2
    #[error("another daemon holds the lock for this workspace")]
    Locked,

    /// Exit code 3
    #[error("store schema is incompatible: {0}")]
    Schema(StoreError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Config(#[from] ConfigFileError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Locked => LifecycleError::Locked,
            StoreError::SchemaVersion { .. } => LifecycleError::Schema(e),
            other => LifecycleError::Store(other),
        }
    }
}

impl LifecycleError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::Locked => 2,
            LifecycleError::Schema(_) => 3,
            _ => 1,
        }
    }
}

/// A fully wired daemon, ready to serve.
pub struct Daemon {
    pub state: Arc<AppState>,
    pub listener: UnixListener,
    pub shutdown: CancellationToken,
    // Held for the daemon's lifetime to keep the exclusive lock.
    #[allow(dead_code)]
    lock_file: File,
}

/// Bring the daemon up: lock, store, config, artifacts, recovery,
/// background tasks, socket.
pub async fn startup(paths: CovenPaths) -> Result<Daemon, LifecycleError> {
    paths.create_dirs()?;

    // Acquire the lock before anything else; a second daemon must not
    // get far enough to touch shared state. Avoid truncating before the
    // lock is held, or we would wipe the running daemon's PID.
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&paths.lock)?;
    lock_file.try_lock_exclusive().map_err(|_| LifecycleError::Locked)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let store = Arc::new(Store::open(&paths.db)?);
    let config = Config::load(&paths.config)?;
    info!(workspace = %paths.workspace.display(), "starting covend");

    let grimoires = coven_grimoire::load_dir(&paths.grimoires_dir).unwrap_or_else(|e| {
        warn!(error = %e, "grimoire directory unreadable; continuing with none");
        HashMap::new()
    });
    let matcher = Matcher::load(&paths.matchers).unwrap_or_else(|e| {
        warn!(error = %e, "matcher pipeline invalid; continuing without rules");
        Matcher::empty()
    });
    info!(grimoires = grimoires.len(), matcher_rules = matcher.len(), "artifacts loaded");

    let clock = SystemClock;
    let agents = Arc::new(LocalAgentAdapter::new(clock.clone()));
    let worktrees = Arc::new(GitWorktreeAdapter::new(
        &paths.workspace,
        &paths.worktrees_dir,
        &config.target_branch,
    ));

    let (event_tx, event_rx) = mpsc::channel::<Event>(1024);
    let engine = Engine::new(
        Arc::clone(&store),
        Arc::clone(&agents),
        Arc::clone(&worktrees),
        grimoires,
        event_tx,
        clock.clone(),
        EngineConfig {
            agent_command: config.agent_command.clone(),
            allowed_tools: config.allowed_tools.clone(),
            timeouts: config.step_timeouts(),
            workflow_logs_dir: paths.workflow_logs_dir.clone(),
            spells_dir: paths.spells_dir.clone(),
            max_payload_bytes: coven_core::DEFAULT_MAX_PAYLOAD_BYTES,
        },
    );

    let broker = Arc::new(Broker::new(Arc::clone(&store), clock.clone()));
    let shutdown = CancellationToken::new();

    // Pump engine events into the broker (persist + fan out).
    spawn_event_pump(Arc::clone(&broker), event_rx);
    {
        let broker = Arc::clone(&broker);
        let cancel = shutdown.clone();
        tokio::spawn(async move { broker.heartbeat_loop(cancel).await });
    }

    // Reconcile agents that were alive when the last daemon died, then
    // resume workflows the store says were running.
    let recovered = recover_orphans(&engine, &worktrees, &config.agent_command, &clock).await;
    if !recovered.is_empty() {
        info!(count = recovered.len(), "orphaned agents reconciled");
    }
    // Tasks with a live reattached agent keep their workflow parked
    // until the watcher reconciles the exit.
    let reattached: Vec<_> = recovered
        .iter()
        .filter(|(_, d)| *d == crate::recovery::OrphanDisposition::Reattached)
        .map(|(task_id, _)| task_id.clone())
        .collect();
    match engine.resume_all(&reattached) {
        Ok(resumed) if resumed > 0 => info!(resumed, "workflows resumed"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "workflow resumption failed"),
    }

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&engine),
        Arc::clone(&worktrees),
        matcher,
        paths.output_dir.clone(),
        clock,
        SchedulerConfig {
            poll_interval: config.poll_interval,
            max_concurrent_agents: config.max_concurrent_agents,
            claim_timeout: config.claim_timeout,
            retention: config.retention(),
            ..Default::default()
        },
    ));
    {
        let scheduler = Arc::clone(&scheduler);
        let cancel = shutdown.clone();
        tokio::spawn(async move { scheduler.run(cancel).await });
    }

    // A dead daemon leaves a stale socket file behind; the lock proves
    // nobody is serving it.
    if paths.socket.exists() {
        std::fs::remove_file(&paths.socket)?;
    }
    let listener = UnixListener::bind(&paths.socket)?;
    info!(socket = %paths.socket.display(), "listening");

    let state = Arc::new(AppState {
        store,
        broker,
        engine,
        scheduler,
        paths,
        readers: Mutex::new(HashMap::new()),
    });

    Ok(Daemon { state, listener, shutdown, lock_file })
}

impl Daemon {
    /// Serve the API until shutdown is requested.
    pub async fn serve(self) -> std::io::Result<()> {
        let app = router(Arc::clone(&self.state));
        let shutdown = self.shutdown.clone();
        let socket = self.state.paths.socket.clone();

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        // Leave no stale socket behind on clean shutdown.
        let _ = std::fs::remove_file(socket);
        Ok(())
    }
}

fn spawn_event_pump(broker: Arc<Broker<SystemClock>>, mut rx: mpsc::Receiver<Event>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            broker.publish(event);
        }
    });
}

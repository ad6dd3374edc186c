// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! covend: the coven workflow daemon.
//!
//! Exit codes: 0 clean shutdown, 1 fatal error, 2 lock held by another
//! daemon, 3 incompatible store schema.

use coven_daemon::{startup, CovenPaths};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() {
    let workspace = std::env::args()
        .nth(1)
        .map(std::path::PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let paths = CovenPaths::new(workspace);

    let code = run(paths);
    std::process::exit(code);
}

fn run(paths: CovenPaths) -> i32 {
    // Log to the daemon log file and, for operators running it in the
    // foreground, to stderr.
    if let Some(parent) = paths.daemon_log.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let appender = tracing_appender::rolling::never(
        paths.daemon_log.parent().unwrap_or(std::path::Path::new(".")),
        paths
            .daemon_log
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "covend.log".to_string()),
    );
    let (file_writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("covend: failed to start runtime: {e}");
            return 1;
        }
    };

    runtime.block_on(async {
        let daemon = match startup(paths).await {
            Ok(daemon) => daemon,
            Err(e) => {
                tracing::error!(error = %e, "startup failed");
                eprintln!("covend: {e}");
                return e.exit_code();
            }
        };

        let shutdown = daemon.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                shutdown.cancel();
            }
        });

        match daemon.serve().await {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!(error = %e, "server failed");
                1
            }
        }
    })
}

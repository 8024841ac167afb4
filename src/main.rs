// Cerberus Console - terminal client for the Cerberus scan server
//
// Architecture:
// - Dashboard (lib): operation controller, session coordinator, toasts and
//   derived views wired around one Backend and one broadcast event bus
// - Backend: reqwest client for the scan server, or the in-process axum demo
//   server in demo mode
// - Front ends: interactive shell (default) or a one-shot `scan` command
// - Journal: optional JSONL copy of every event for later analysis

use anyhow::{Context, Result};
use cerberus_console::cli::{self, Cli, Commands};
use cerberus_console::config::Config;
use cerberus_console::demo::{DemoOptions, DemoServer};
use cerberus_console::events::DashboardEvent;
use cerberus_console::logging::{self, LogBuffer, LogSink};
use cerberus_console::model::{OperationState, ProjectId, ScanOptions, ScopeKey};
use cerberus_console::operation::OperationError;
use cerberus_console::storage::{new_session_id, EventJournal};
use cerberus_console::{shell, startup, Dashboard};
use clap::Parser;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// How long shutdown waits for the journal to write what is queued
const JOURNAL_FLUSH_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Broken config is fatal; missing config means defaults
    let mut config = Config::load_or_exit();
    if cli.demo {
        config.demo_mode = true;
    }

    // Config commands exit before anything else starts
    if let Some(Commands::Config { show, reset, path }) = &cli.command {
        std::process::exit(cli::handle_config(&config, *show, *reset, *path));
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    // Interactive mode captures logs in memory so they don't garble the
    // prompt; one-shot scans keep stdout for console lines and log to stderr
    let log_buffer = LogBuffer::new();
    let sink = match cli.command {
        None => LogSink::Buffer(log_buffer.clone()),
        Some(_) => LogSink::Stderr,
    };
    let _log_guard = logging::init(&config.logging, sink);

    let session_id = new_session_id();
    tracing::debug!("Session ID: {}", session_id);

    // Demo mode: serve the scan-server API in-process and point at it
    let demo = if config.demo_mode {
        tracing::info!("Running in DEMO MODE - using the in-process backend");
        Some(
            DemoServer::spawn(DemoOptions::interactive())
                .await
                .context("Failed to start demo backend")?,
        )
    } else {
        None
    };

    let api_url = match (&demo, &cli.api_url) {
        (Some(server), _) => server.url(),
        (None, Some(url)) => url.clone(),
        (None, None) => config.api_url.clone(),
    };
    let dashboard = Dashboard::connect(&api_url, &config)?;

    // Spawn the journal (if enabled); it writes until the bus closes
    let journal_handle = if config.features.journal {
        match EventJournal::new(&config.log_dir, &session_id, dashboard.bus().subscribe()) {
            Ok(journal) => Some(tokio::spawn(journal.run())),
            Err(e) => {
                tracing::warn!("Event journal disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let exit_code = match cli.command {
        None => {
            startup::print_startup(&config, &api_url);
            startup::log_startup(&config, &api_url);
            shell::run(dashboard.clone(), log_buffer).await?;
            0
        }
        Some(Commands::Scan {
            target,
            comprehensive,
            project,
        }) => run_scan(&dashboard, &target, comprehensive, project).await?,
        Some(Commands::Config { .. }) => 0,
    };

    tracing::info!("Shutting down...");
    drop(dashboard);

    if let Some(handle) = journal_handle {
        match tokio::time::timeout(JOURNAL_FLUSH_GRACE, handle).await {
            Ok(Ok(Err(e))) => tracing::error!("Journal error: {:#}", e),
            Ok(_) => {}
            Err(_) => tracing::debug!("Journal still running at shutdown"),
        }
    }
    if let Some(server) = demo {
        server.shutdown().await;
    }

    tracing::info!("Shutdown complete");
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// One-shot scan: stream the console to stdout, toasts to stderr
///
/// Ctrl+C requests a stop but keeps draining until the backend closes the
/// stream. Returns the process exit code.
async fn run_scan(
    dashboard: &Dashboard,
    target: &str,
    comprehensive: bool,
    project: Option<String>,
) -> Result<i32> {
    let scope = match project {
        Some(id) => {
            dashboard
                .session()
                .list()
                .await
                .context("Failed to load projects")?;
            dashboard
                .session()
                .select(Some(ProjectId::new(id)))
                .context("Cannot scan for that project")?
        }
        None => ScopeKey::Global,
    };

    let printer = tokio::spawn(print_scope(dashboard.bus().subscribe(), scope.clone()));

    let options = ScanOptions::default().comprehensive(comprehensive);
    let handle = match dashboard.operations().start(scope.clone(), target, options) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            printer.abort();
            return Ok(2);
        }
    };

    let wait = handle.wait();
    tokio::pin!(wait);
    let result = loop {
        tokio::select! {
            result = &mut wait => break result,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                eprintln!("Stop requested; waiting for the server to finish...");
                let _ = dashboard.operations().stop(&scope).await;
            }
        }
    };

    // The printer ends on the terminal transition; give it a moment
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    Ok(match result {
        Ok(OperationState::Completed) => 0,
        Ok(state) => {
            tracing::debug!("Scan ended in state {}", state);
            1
        }
        Err(OperationError::AlreadyRunning(scope)) => {
            eprintln!("A scan is already running for {}", scope);
            2
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    })
}

/// Print console lines for `scope` and every toast until the scope's
/// operation reaches a terminal state
async fn print_scope(
    mut events: tokio::sync::broadcast::Receiver<DashboardEvent>,
    scope: ScopeKey,
) {
    loop {
        match events.recv().await {
            Ok(DashboardEvent::ConsoleLine {
                scope: line_scope,
                line,
                ..
            }) if line_scope == scope => println!("{}", line),
            Ok(DashboardEvent::ToastShown { toast }) => {
                eprintln!("[{}] {}: {}", toast.kind.as_str(), toast.title, toast.message)
            }
            Ok(DashboardEvent::OperationChanged {
                scope: changed, to, ..
            }) if changed == scope && to.is_terminal() => break,
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => eprintln!("(skipped {} events)", n),
            Err(RecvError::Closed) => break,
        }
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use buckaroo_mcp::cli::{Cli, Command};
use buckaroo_mcp::config::Config;
use buckaroo_mcp::mcp::{McpServer, ToolContext};
use buckaroo_mcp::service::ServiceClient;
use buckaroo_mcp::supervisor::process::{self, Signal};
use buckaroo_mcp::supervisor::{
    CommandLauncher, OrphanDetector, Supervisor, SupervisorConfig, signals, watchdog,
};
use buckaroo_mcp::telemetry::logging::{self, LogConfig};

enum Exit {
    InputClosed,
    Signal(Signal),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    cli.apply(&mut config);

    logging::init(&LogConfig {
        level: cli.log_level,
        file: Some(config.supervisor_log()),
    })?;

    match cli.mode() {
        Command::Serve => serve(config),
        Command::Watchdog(args) => {
            let result = watchdog::run(args.pid);
            logging::flush();
            result.context("watchdog failed")
        }
    }
}

fn serve(config: Config) -> Result<()> {
    info!(
        pid = std::process::id(),
        ppid = process::parent_pid(),
        port = config.port,
        python = %config.python,
        "buckaroo-mcp starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let supervisor_config = SupervisorConfig::from_config(&config);
    let orphan_poll = supervisor_config.timings.orphan_poll;
    let supervisor = Arc::new(Supervisor::new(
        supervisor_config,
        ServiceClient::new(config.service_url()),
        Box::new(CommandLauncher::new(
            config.python.clone(),
            config.service_args(),
        )),
    ));

    let orphaned = Arc::clone(&supervisor);
    OrphanDetector::new(orphan_poll)
        .spawn(move |_, _| {
            orphaned.shutdown();
            logging::flush();
            std::process::exit(0);
        })
        .context("failed to start parent watcher")?;

    let server = McpServer::new(Arc::new(ToolContext::new(Arc::clone(&supervisor), config)));

    let exit = runtime.block_on(async {
        tokio::select! {
            _ = server.run_stdio() => Exit::InputClosed,
            signal = termination() => Exit::Signal(signal),
        }
    });

    supervisor.shutdown();
    // The stdin reader sits on a blocking thread that never returns by itself.
    runtime.shutdown_background();

    match exit {
        Exit::InputClosed => {
            info!("client disconnected, exiting");
            logging::flush();
            Ok(())
        }
        Exit::Signal(signal) => {
            info!(signal = signal.name(), "exiting on signal");
            logging::flush();
            // Only returns if the re-raise failed.
            let _ = process::reraise(signal);
            std::process::exit(128 + signal.as_raw());
        }
    }
}

async fn termination() -> Signal {
    match signals::wait_for_termination().await {
        Ok(signal) => signal,
        Err(err) => {
            warn!(error = %err, "signal handlers unavailable; relying on stdin close");
            std::future::pending().await
        }
    }
}

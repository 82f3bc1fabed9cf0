use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::telemetry::logging::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "buckaroo-mcp",
    about = "MCP server that opens data files in the Buckaroo table viewer",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PORT",
        help = "Port of the backing data server (overrides BUCKAROO_PORT)"
    )]
    pub port: Option<u16>,

    #[arg(
        long = "log-level",
        global = true,
        value_enum,
        env = "BUCKAROO_LOG_LEVEL",
        default_value_t = LogLevel::Info,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve MCP over stdin/stdout (default when no subcommand given)
    Serve,
    /// Internal: terminate a service once the supervisor's pipe closes
    #[command(hide = true)]
    Watchdog(WatchdogArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WatchdogArgs {
    #[arg(long, value_name = "PID", help = "Process to terminate")]
    pub pid: u32,
}

impl Cli {
    pub fn mode(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Apply flag overrides on top of the environment.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

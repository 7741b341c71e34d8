use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Clone, Debug, PartialEq)]
#[command(version = env!("CARGO_PKG_VERSION"), about = "Offline cache manager: precache, prune, serve network-first", long_about = None)]
pub struct Cli {
    /// TOML configuration file layered under PRECACHE_* environment variables.
    #[arg(
        short,
        long = "config",
        visible_alias = "config-file",
        value_name = "FILE",
        env = "PRECACHE_CONFIG_FILE",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    /// Log output format. Logs always go to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Json, env = "PRECACHE_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Command {
    /// Precache the asset manifest into the current generation.
    Install,

    /// Delete every generation except the current one.
    Activate,

    /// Install, then activate.
    Start,

    /// Serve one request through the interceptor.
    Fetch {
        /// Path on the configured origin, or an absolute URL.
        target: String,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Extra request header, `Name: value`. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,

        /// Write the response body to stdout.
        #[arg(long)]
        body: bool,
    },

    /// List cache generations.
    Caches {
        #[arg(long)]
        json: bool,
    },

    /// List the requests stored in a generation.
    Entries {
        /// Generation name (default: the configured one).
        name: Option<String>,
    },
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the pipecache binary.
#[derive(Debug, Parser)]
#[command(name = "pipecache", version, about = "Caching pipeline server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PIPECACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve content through the caching pipeline.
    Serve(Box<ServeArgs>),
    /// Remove every entry from the configured cache backend.
    Purge(PurgeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Toggle response caching.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub enabled: Option<bool>,

    /// Cache backend (memory|disk).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Maximum number of entries held by the memory backend.
    #[arg(long = "cache-max-entries", value_name = "COUNT")]
    pub max_entries: Option<u64>,

    /// Directory used by the disk backend.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub directory: Option<PathBuf>,

    /// Default expiry in seconds (0 never caches, negative caches indefinitely).
    #[arg(
        long = "cache-default-expires-seconds",
        value_name = "SECONDS",
        allow_hyphen_values = true
    )]
    pub default_expires_seconds: Option<i64>,

    /// Cache key template; `{path}` and `{query}` are substituted.
    #[arg(long = "cache-key-template", value_name = "TEMPLATE")]
    pub key_template: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the directory content is served from.
    #[arg(long = "content-root", value_name = "PATH")]
    pub content_root: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub cache: CacheOverrides,
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use crate::domain::entities::EntityRef;

/// Command-line arguments for the tripwire binary.
#[derive(Debug, Parser)]
#[command(
    name = "tripwire",
    version,
    about = "Change-dependency tracking and cache invalidation"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TRIPWIRE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the invalidation service and its admin listener.
    Serve(Box<ServeArgs>),
    /// Print the dependency closure of one or more changed entities.
    Chain(ChainArgs),
    /// Print the curated relation table and its exclusions.
    Relations,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

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

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the origin base URL entity-cache misses are fetched from.
    #[arg(long = "origin-base-url", value_name = "URL")]
    pub origin_base_url: Option<String>,

    /// Override the interval of the background invalidation consumer.
    #[arg(long = "invalidation-auto-consume-interval-ms", value_name = "MILLIS")]
    pub auto_consume_interval_ms: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct ChainArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Changed entity as `Type:id`; repeat for a batch.
    #[arg(long = "trigger", value_name = "TYPE:ID", required = true)]
    pub triggers: Vec<EntityRef>,

    /// Keep soft-deleted entities in the printed closure.
    #[arg(long = "include-deleted", action = clap::ArgAction::SetTrue)]
    pub include_deleted: bool,
}

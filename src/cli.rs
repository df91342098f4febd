use std::time::Duration;

use crate::{
    client::{ClientOptions, RespClient},
    config::ProcgraphConfig,
    local_logger::{PROCGRAPH_U8_COLOR_CODE, init_local_logger},
    prelude::*,
    process,
    snapshot::{DEFAULT_BATCH_SIZE, LoadOptions, Snapshot, load_snapshot},
};
use clap::{
    Parser,
    builder::{Styles, styling},
};

pub const DEFAULT_GRAPH: &str = "process_graph";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_USER: &str = "default";

fn create_styles() -> Styles {
    styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(
            styling::Ansi256Color(PROCGRAPH_U8_COLOR_CODE).on_default() | styling::Effects::BOLD,
        )
        .placeholder(styling::AnsiColor::Cyan.on_default())
}

fn parse_batch_size(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(size) => Ok(size),
        Err(err) => Err(err.to_string()),
    }
}

/// Load a snapshot of the local process table into a graph database
#[derive(Parser, Debug)]
#[command(version, about, styles = create_styles())]
pub struct Cli {
    /// Name of the graph to write to [default: process_graph]
    #[arg(long, env = "PROCGRAPH_GRAPH")]
    pub graph: Option<String>,

    /// Graph database host [default: 127.0.0.1]
    #[arg(long, env = "PROCGRAPH_HOST")]
    pub host: Option<String>,

    /// Graph database port [default: 3000]
    #[arg(long, env = "PROCGRAPH_PORT")]
    pub port: Option<u16>,

    /// User to authenticate as. When empty, only the password is sent [default: default]
    #[arg(long, env = "PROCGRAPH_USER")]
    pub user: Option<String>,

    /// Password to authenticate with. Authentication is skipped when empty
    #[arg(long, env = "PROCGRAPH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Delete the graph before loading the snapshot
    #[arg(long)]
    pub clear: bool,

    /// Number of processes or edges sent per query [default: 200]
    #[arg(long, value_parser = parse_batch_size)]
    pub batch_size: Option<usize>,

    /// Maximum time to wait for each reply, e.g. `30s`. Waits forever when unset
    #[arg(long, env = "PROCGRAPH_TIMEOUT", value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// The configuration name to use
    /// If provided, the configuration will be loaded from ~/.config/procgraph/{config-name}.yaml
    /// Otherwise, loads from ~/.config/procgraph/config.yaml
    #[arg(long, env = "PROCGRAPH_CONFIG_NAME")]
    pub config_name: Option<String>,
}

/// Settings of one run, after merging the command line with the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub host: String,
    pub port: u16,
    pub timeout: Option<Duration>,
    pub load: LoadOptions,
}

impl Cli {
    /// Command line and environment values win over the configuration file, which wins over
    /// the built-in defaults.
    pub fn resolve(self, config: ProcgraphConfig) -> Result<RunSettings> {
        let connection = config.connection;

        let timeout = match (self.timeout, connection.timeout) {
            (Some(timeout), _) => Some(timeout),
            (None, Some(timeout)) => Some(
                humantime::parse_duration(&timeout)
                    .with_context(|| format!("Invalid connection timeout in config: {timeout}"))?,
            ),
            (None, None) => None,
        };

        let batch_size = self
            .batch_size
            .or(config.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        ensure!(batch_size > 0, "Batch size must be at least 1");

        Ok(RunSettings {
            host: self
                .host
                .or(connection.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.or(connection.port).unwrap_or(DEFAULT_PORT),
            timeout,
            load: LoadOptions {
                graph: self
                    .graph
                    .or(config.graph)
                    .unwrap_or_else(|| DEFAULT_GRAPH.to_string()),
                user: self
                    .user
                    .or(connection.user)
                    .unwrap_or_else(|| DEFAULT_USER.to_string()),
                password: self.password.or(connection.password).unwrap_or_default(),
                clear: self.clear,
                batch_size,
            },
        })
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_local_logger()?;

    let config = ProcgraphConfig::load(cli.config_name.as_deref())?;
    let settings = cli.resolve(config)?;
    debug!("Settings: {settings:?}", settings = RedactedSettings(&settings));

    start_group!("Collecting processes");
    let processes = process::list_processes()?;
    let snapshot = Snapshot::capture();
    end_group!();
    debug!("Snapshot {snapshot:?}");

    start_group!(format!(
        "Loading snapshot into graph '{}' on {}:{}",
        settings.load.graph, settings.host, settings.port
    ));
    let mut client = RespClient::connect(
        &settings.host,
        settings.port,
        ClientOptions {
            request_timeout: settings.timeout,
        },
    )
    .await?;

    let result = load_snapshot(&mut client, &processes, &snapshot, &settings.load).await;
    if let Err(err) = client.close().await {
        debug!("Failed to close the connection: {err}");
    }
    end_group!();
    let summary = result?;

    // Printed regardless of PROCGRAPH_LOG
    println!("{summary}");
    Ok(())
}

/// Debug view of [`RunSettings`] that does not leak the password into logs.
struct RedactedSettings<'a>(&'a RunSettings);

impl std::fmt::Debug for RedactedSettings<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settings = self.0;
        f.debug_struct("RunSettings")
            .field("host", &settings.host)
            .field("port", &settings.port)
            .field("timeout", &settings.timeout)
            .field("graph", &settings.load.graph)
            .field("user", &settings.load.user)
            .field(
                "password",
                &if settings.load.password.is_empty() { "" } else { "***" },
            )
            .field("clear", &settings.load.clear)
            .field("batch_size", &settings.load.batch_size)
            .finish()
    }
}

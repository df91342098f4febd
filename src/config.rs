use std::{env, fs, path::PathBuf};

use crate::prelude::*;
use nestify::nest;
use serde::{Deserialize, Serialize};

nest! {
    #[derive(Debug, Default, PartialEq, Deserialize, Serialize)]*
    #[serde(rename_all = "kebab-case", default)]*
    /// Persistent defaults for procgraph runs.
    ///
    /// Stored at `~/.config/procgraph/config.yaml` (following XDG). Every value can be
    /// overridden from the command line or the environment.
    ///
    /// ```yaml
    /// graph: process_graph
    /// connection:
    ///   host: 127.0.0.1
    ///   port: 3000
    ///   user: default
    ///   password: s3cr3t
    ///   timeout: 30s
    /// ```
    pub struct ProcgraphConfig {
        pub graph: Option<String>,
        pub batch_size: Option<usize>,
        pub connection: pub struct ConnectionConfig {
            pub host: Option<String>,
            pub port: Option<u16>,
            pub user: Option<String>,
            pub password: Option<String>,
            /// Per-request timeout, in humantime syntax (`30s`, `2m`)
            pub timeout: Option<String>,
        }
    }
}

/// Get the path to the configuration file, following the XDG Base Directory Specification
/// at https://specifications.freedesktop.org/basedir-spec/basedir-spec-latest.html
///
/// If config_name is None, returns ~/.config/procgraph/config.yaml (default)
/// If config_name is Some, returns ~/.config/procgraph/{config_name}.yaml
fn get_configuration_file_path(config_name: Option<&str>) -> Result<PathBuf> {
    let config_dir = match env::var("XDG_CONFIG_HOME") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let home = env::var("HOME").context("Neither XDG_CONFIG_HOME nor HOME is set")?;
            PathBuf::from(home).join(".config")
        }
    };
    let config_dir = config_dir.join("procgraph");

    Ok(match config_name {
        Some(name) => config_dir.join(format!("{name}.yaml")),
        None => config_dir.join("config.yaml"),
    })
}

impl ProcgraphConfig {
    /// Load the configuration. If it does not exist, return a default configuration.
    pub fn load(config_name: Option<&str>) -> Result<Self> {
        let config_path = get_configuration_file_path(config_name)?;

        match fs::read(&config_path) {
            Ok(config_str) => {
                let config: ProcgraphConfig =
                    serde_yaml::from_slice(&config_str).context(format!(
                        "Failed to parse procgraph config at {}",
                        config_path.display()
                    ))?;
                debug!("Config loaded from {}", config_path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file not found at {}", config_path.display());
                Ok(ProcgraphConfig::default())
            }
            Err(e) => bail!("Failed to load config at {}: {e}", config_path.display()),
        }
    }
}

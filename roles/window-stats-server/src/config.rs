use serde::Deserialize;
use std::{env, fs};

/// Where bucket aggregates are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Sqlite { db_path: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tcp_address: String,
    pub http_address: String,
    pub storage: StorageBackend,
}

#[derive(Debug, Deserialize, Default)]
struct WindowStatsConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    tcp_listen_address: Option<String>,
    http_listen_address: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_listen_address: Some("127.0.0.1:9093".to_string()),
            http_listen_address: Some("127.0.0.1:9094".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    backend: Option<String>,
    db_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Some("memory".to_string()),
            db_path: None,
        }
    }
}

const DEFAULT_DB_PATH: &str = ".devenv/state/window-stats/stats.db";

fn flag_value(args: &[String], names: &[&str]) -> Option<String> {
    args.iter()
        .position(|arg| names.contains(&arg.as_str()))
        .and_then(|i| args.get(i + 1))
        .cloned()
}

impl Config {
    pub fn from_args() -> Result<Self, Box<dyn std::error::Error>> {
        let args: Vec<String> = env::args().collect();
        Self::from_arg_list(&args)
    }

    pub fn from_arg_list(args: &[String]) -> Result<Self, Box<dyn std::error::Error>> {
        // A missing or empty config file falls back to defaults
        let file_config: WindowStatsConfig = match flag_value(args, &["--config", "-c"]) {
            Some(path) => {
                let contents = fs::read_to_string(&path).unwrap_or_default();
                if contents.trim().is_empty() {
                    WindowStatsConfig::default()
                } else {
                    toml::from_str(&contents)?
                }
            }
            None => WindowStatsConfig::default(),
        };

        let tcp_address = flag_value(args, &["--tcp-address", "-t"])
            .or(file_config.server.tcp_listen_address)
            .ok_or("Missing required config: server.tcp_listen_address")?;

        let http_address = flag_value(args, &["--http-address", "-h"])
            .or(file_config.server.http_listen_address)
            .ok_or("Missing required config: server.http_listen_address")?;

        let db_path_override = flag_value(args, &["--db-path"]);

        // Passing a database path on the command line implies SQLite
        let backend = if db_path_override.is_some() {
            "sqlite".to_string()
        } else {
            file_config
                .storage
                .backend
                .unwrap_or_else(|| "memory".to_string())
        };

        let storage = match backend.as_str() {
            "memory" => StorageBackend::Memory,
            "sqlite" => StorageBackend::Sqlite {
                db_path: db_path_override
                    .or(file_config.storage.db_path)
                    .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            },
            other => return Err(format!("Unknown storage backend: {other}").into()),
        };

        Ok(Config {
            tcp_address,
            http_address,
            storage,
        })
    }
}

use anyhow::{anyhow, Result};
use config::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Connection settings for the shared database.
///
/// All fields are carried as strings so the same shape works for drivers
/// with and without network endpoints. The SQLite executor interprets
/// `host` as the directory holding database files and `name` as the
/// database name; `user` and `password` are accepted for driver parity
/// and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSettings {
    /// Database name (or `:memory:` for an in-memory database).
    pub name: String,

    /// Database user.
    pub user: String,

    /// Database password.
    pub password: String,

    /// Default host. Per-shard catalog records may override this.
    pub host: String,

    /// Port, kept as a string. Only used when it parses as an integer.
    pub port: String,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            name: "shardstore".to_string(),
            user: String::new(),
            password: String::new(),
            host: ".".to_string(),
            port: String::new(),
        }
    }
}

impl DbSettings {
    /// The configured port, when it parses as an integer.
    pub fn port_number(&self) -> Option<u16> {
        self.port.parse().ok()
    }
}

/// Configuration for the shardstore library.
pub struct ShardConfig {
    /// Path to the directory holding shardstore's data
    pub data_dir: String,

    /// Connection settings for the shared database
    pub db: DbSettings,
}

const EMPTY_CONFIG: &str = r#"### shardstore configuration file

### directory for database files managed by shardstore
# data_dir = "~/.shardstore"

### shared database connection settings
# db_name = "shardstore"
# db_user = ""
# db_password = ""
# db_host = "~/.shardstore"
# db_port = ""
"#;

impl Default for ShardConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());
        let data_dir = format!("{}/.shardstore", home_dir);

        Self {
            db: DbSettings {
                host: data_dir.clone(),
                ..DbSettings::default()
            },
            data_dir,
        }
    }
}

impl ShardConfig {
    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<ShardConfig> {
        let mut builder = Config::builder();

        // By default use $HOME/.shardstore/shardstore.toml as the configuration file path
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();

        // Config dir
        let shardstore_dir = format!("{}/.shardstore", home_dir.as_str());

        // Add in toml configuration file
        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(shardstore_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create shardstore directory: {}", e))?;
                let p = format!("{}/shardstore.toml", shardstore_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // Add in settings from the environment (with a prefix of SHARDSTORE)
        // E.g., `SHARDSTORE_DB_HOST=/var/lib/shards` would set the default host
        builder = builder.add_source(config::Environment::with_prefix("SHARDSTORE"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        // Parse data directory
        let data_dir = match config.get("data_dir") {
            Some(p) => {
                let path = Path::new(p);
                path.to_str()
                    .ok_or_else(|| anyhow!("Could not convert data_dir path to string"))?
                    .to_string()
            }
            None => {
                let dir = format!("{}/.shardstore", home_dir.as_str());
                std::fs::create_dir_all(dir.as_str())
                    .map_err(|e| anyhow!("Unable to create data directory: {}", e))?;
                dir
            }
        };

        let defaults = DbSettings::default();
        let db = DbSettings {
            name: config.get("db_name").cloned().unwrap_or(defaults.name),
            user: config.get("db_user").cloned().unwrap_or(defaults.user),
            password: config
                .get("db_password")
                .cloned()
                .unwrap_or(defaults.password),
            // Database files live under the data directory unless told otherwise
            host: config
                .get("db_host")
                .cloned()
                .unwrap_or_else(|| data_dir.clone()),
            port: config.get("db_port").cloned().unwrap_or(defaults.port),
        };

        Ok(ShardConfig { data_dir, db })
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.shardstore/shardstore.toml", home_dir)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let lines = vec![
            format!("Data Directory:     {}", self.data_dir),
            format!("Database Name:      {}", self.db.name),
            format!("Database Host:      {}", self.db.host),
            format!(
                "Database Port:      {}",
                self.db
                    .port_number()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "(default)".to_string())
            ),
        ];

        lines.join("\n")
    }
}

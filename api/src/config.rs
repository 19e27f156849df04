use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATABASE_PATH: &str = "data/db.json";

/// Server settings read from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// `PORT`
    pub port: u16,
    /// `DATABASE_PATH`: location of the store document.
    pub database_path: PathBuf,
    /// `DATABASE_INIT`: create an empty store document when none exists.
    pub initialize_database: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = match lookup("PORT") {
            Some(port_str) => match port_str.trim().parse::<u16>() {
                Ok(port_num) => {
                    info!("Using port {} from environment variable PORT.", port_num);
                    port_num
                }
                Err(_) => {
                    warn!(
                        "Invalid PORT value '{}' in environment variable. Using default port {}.",
                        port_str, DEFAULT_PORT
                    );
                    DEFAULT_PORT
                }
            },
            None => {
                info!(
                    "PORT environment variable not set. Using default port {}.",
                    DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        };

        let database_path = lookup("DATABASE_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let initialize_database = match lookup("DATABASE_INIT") {
            Some(flag) => match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "" | "0" | "false" | "no" => false,
                other => {
                    warn!("Invalid DATABASE_INIT value '{}'. Treating as false.", other);
                    false
                }
            },
            None => false,
        };

        Self {
            port,
            database_path,
            initialize_database,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(
            config_from(&[]),
            ServerConfig {
                port: DEFAULT_PORT,
                database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
                initialize_database: false,
            }
        );
    }

    #[test]
    fn reads_all_variables() {
        let config = config_from(&[
            ("PORT", "8000"),
            ("DATABASE_PATH", "/var/lib/board/db.json"),
            ("DATABASE_INIT", "TRUE"),
        ]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.database_path, PathBuf::from("/var/lib/board/db.json"));
        assert!(config.initialize_database);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("DATABASE_INIT", "maybe")]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.initialize_database);
    }
}

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub network: NetworkConfig,
    pub database: DatabaseConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub name: String,
    /// Shared secret peer servers present with CONNECT.
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Loads and parses the TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.bind_address, self.network.port)
    }

    pub fn ai_addr(&self) -> String {
        format!("{}:{}", self.ai.host, self.ai.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let toml = r#"
            [server]
            name = "chat-1"
            secret = "hunter2"

            [network]
            bind_address = "127.0.0.1"
            port = 6667

            [database]
            path = "chat.db"

            [ai]
            host = "localhost"
            port = 10001
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.name, "chat-1");
        assert_eq!(config.bind_addr(), "127.0.0.1:6667");
        assert_eq!(config.ai_addr(), "localhost:10001");
        assert_eq!(config.database.path, "chat.db");
    }
}

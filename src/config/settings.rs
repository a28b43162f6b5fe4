//! Process settings from the environment.

use crate::error::ConfigError;

pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 1000;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    /// JSON file with the resource declarations.
    pub resources_path: String,
    pub bind_addr: String,
    pub max_connections: u32,
    /// Page size for index requests without `?limit=`.
    pub page_limit: u64,
}

impl Settings {
    /// `DATABASE_URL`, `RESOURCES_PATH`, `BIND_ADDR`, `MAX_CONNECTIONS`, `PAGE_LIMIT`; each has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_connections = parse_var("MAX_CONNECTIONS", 5)?;
        let page_limit = parse_var("PAGE_LIMIT", DEFAULT_PAGE_LIMIT)?.clamp(1, MAX_PAGE_LIMIT);
        Ok(Settings {
            database_url: var_or("DATABASE_URL", "postgres://localhost/restmap"),
            resources_path: var_or("RESOURCES_PATH", "resources.json"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3000"),
            max_connections,
            page_limit,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/restmap".into(),
            resources_path: "resources.json".into(),
            bind_addr: "0.0.0.0:3000".into(),
            max_connections: 5,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("{} must be a number, got '{}'", name, v))),
        Err(_) => Ok(default),
    }
}

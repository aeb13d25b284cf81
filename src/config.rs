use std::net::SocketAddr;

use crate::AppResult;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub metered_domain: Option<String>,
    pub metered_secret_key: Option<String>,
}

impl Config {
    /// Reads the process environment, falling back to a `.env` file.
    pub fn from_env() -> AppResult<Config> {
        Config::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Config> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse()?;
        let non_empty = |key: &str| lookup(key).filter(|value: &String| !value.is_empty());

        Ok(Config {
            bind_addr,
            metered_domain: non_empty("METERED_DOMAIN"),
            metered_secret_key: non_empty("METERED_SECRET_KEY"),
        })
    }
}

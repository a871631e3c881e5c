use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub public_url: String,
    pub initial_page: u32,
    pub page_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let number = |key: &str, default: &str| -> Result<u32> {
            let raw = var(key).unwrap_or_else(|| default.into());
            raw.parse().with_context(|| format!("{} must be a number, got '{}'", key, raw))
        };

        let port = var("ARCHIVE_PORT").unwrap_or_else(|| "3000".into());
        Ok(Self {
            db_path: var("ARCHIVE_DB_PATH").unwrap_or_else(|| "archive.db".into()).into(),
            host: var("ARCHIVE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: port
                .parse()
                .with_context(|| format!("ARCHIVE_PORT must be a port number, got '{}'", port))?,
            public_url: var("ARCHIVE_PUBLIC_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            initial_page: number("ARCHIVE_INITIAL_PAGE", "250")?,
            page_size: number("ARCHIVE_PAGE_SIZE", "100")?,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().with_context(|| format!("Invalid listen address '{}'", addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("archive.db"));
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
        assert_eq!(config.public_url, "http://localhost:3000");
        assert_eq!(config.initial_page, 250);
        assert_eq!(config.page_size, 100);
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let config = load(&[("ARCHIVE_PORT", "8080"), ("ARCHIVE_PAGE_SIZE", "50")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.page_size, 50);

        assert!(load(&[("ARCHIVE_PAGE_SIZE", "lots")]).is_err());
        assert!(load(&[("ARCHIVE_PORT", "99999")]).is_err());
    }
}

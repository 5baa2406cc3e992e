use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;

/// Placeholder secret used when none is configured. Fine for local runs only.
pub const PLACEHOLDER_SECRET: &str = "dev-secret-change-me";

/// Longest token lifetime accepted from configuration: one year.
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: TimeDelta,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("MURMUR_PORT")
            .unwrap_or_else(|| "5173".into())
            .parse()
            .context("MURMUR_PORT must be a port number")?;
        let db_path = lookup("MURMUR_DB_PATH").unwrap_or_else(|| "murmur.db".into()).into();
        let jwt_secret = lookup("MURMUR_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_SECRET.into());
        let token_ttl_hours: i64 = lookup("MURMUR_TOKEN_TTL_HOURS")
            .unwrap_or_else(|| "1".into())
            .parse()
            .context("MURMUR_TOKEN_TTL_HOURS must be a whole number of hours")?;
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            bail!(
                "MURMUR_TOKEN_TTL_HOURS must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_HOURS,
                token_ttl_hours
            );
        }
        let token_ttl = TimeDelta::try_hours(token_ttl_hours)
            .context("MURMUR_TOKEN_TTL_HOURS is out of range")?;

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            token_ttl,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        self.jwt_secret == PLACEHOLDER_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 5173);
        assert_eq!(cfg.db_path, PathBuf::from("murmur.db"));
        assert_eq!(cfg.token_ttl, TimeDelta::hours(1));
        assert!(cfg.uses_placeholder_secret());
        assert_eq!(cfg.addr().unwrap().port(), 5173);
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("MURMUR_HOST", "127.0.0.1"),
            ("MURMUR_PORT", "9000"),
            ("MURMUR_JWT_SECRET", "s3cret"),
            ("MURMUR_TOKEN_TTL_HOURS", "24"),
        ])
        .unwrap();
        assert_eq!(cfg.addr().unwrap(), "127.0.0.1:9000".parse().unwrap());
        assert!(!cfg.uses_placeholder_secret());
        assert_eq!(cfg.token_ttl, TimeDelta::hours(24));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(config(&[("MURMUR_PORT", "http")]).is_err());
        assert!(config(&[("MURMUR_PORT", "70000")]).is_err());
        assert!(config(&[("MURMUR_TOKEN_TTL_HOURS", "soon")]).is_err());
    }

    #[test]
    fn rejects_token_lifetimes_that_expire_or_overflow() {
        for ttl in ["0", "-3", "9223372036854775807", "10000000000", "8761"] {
            assert!(
                config(&[("MURMUR_TOKEN_TTL_HOURS", ttl)]).is_err(),
                "accepted MURMUR_TOKEN_TTL_HOURS={}",
                ttl
            );
        }
        let cfg = config(&[("MURMUR_TOKEN_TTL_HOURS", "8760")]).unwrap();
        assert_eq!(cfg.token_ttl, TimeDelta::hours(24 * 365));
    }

    #[test]
    fn empty_secret_falls_back_to_placeholder() {
        let cfg = config(&[("MURMUR_JWT_SECRET", "")]).unwrap();
        assert!(cfg.uses_placeholder_secret());
    }
}

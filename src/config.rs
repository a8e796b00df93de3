use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::{info, warn};
use rand::Rng;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid {key} value: {info}")]
    Invalid { key: &'static str, info: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub secret_key: Vec<u8>,
    pub token_lifetime_hours: i64,
    pub media_root: PathBuf,
    pub media_url: String,
    pub page_size: i64,
}

impl Config {
    /// Reads the process environment; a `.env` file is honoured when present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = match lookup("FOODGRAM_SECRET_KEY") {
            Some(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                warn!("FOODGRAM_SECRET_KEY not set, tokens will not survive a restart");
                rand::thread_rng().gen::<[u8; 32]>().to_vec()
            }
        };

        let mut media_url: String = try_load(&lookup, "FOODGRAM_MEDIA_URL", "/media/")?;
        if !media_url.ends_with('/') {
            media_url.push('/');
        }

        let page_size: i64 = try_load(
            &lookup,
            "FOODGRAM_PAGE_SIZE",
            &DEFAULT_PAGE_SIZE.to_string(),
        )?;
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ConfigError::Invalid {
                key: "FOODGRAM_PAGE_SIZE",
                info: format!("expected 1..={MAX_PAGE_SIZE}, got {page_size}"),
            });
        }

        Ok(Self {
            port: try_load(&lookup, "FOODGRAM_PORT", "8000")?,
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: try_load(
                &lookup,
                "FOODGRAM_DATABASE_MAX_CONNECTIONS",
                "10",
            )?,
            redis_url: lookup("FOODGRAM_REDIS_URL").filter(|url| !url.is_empty()),
            secret_key,
            token_lifetime_hours: try_load(&lookup, "FOODGRAM_TOKEN_LIFETIME_HOURS", "24")?,
            media_root: try_load(&lookup, "FOODGRAM_MEDIA_ROOT", "media")?,
            media_url,
            page_size,
        })
    }

    pub fn media_link(&self, path: &str) -> Option<String> {
        if path.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.media_url, path))
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            info: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/db")]))
            .unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.media_url, "/media/");
        assert_eq!(config.token_lifetime_hours, 24);
        assert!(config.redis_url.is_none());
        assert_eq!(config.secret_key.len(), 32);
    }

    #[test]
    fn database_url_is_required() {
        let result = Config::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("FOODGRAM_PORT", "eighty"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                key: "FOODGRAM_PORT",
                ..
            })
        ));

        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("FOODGRAM_PAGE_SIZE", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn media_links() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("FOODGRAM_MEDIA_URL", "https://cdn.example.com/media"),
            ("FOODGRAM_SECRET_KEY", "abc"),
        ]))
        .unwrap();

        assert_eq!(config.secret_key, b"abc".to_vec());
        assert_eq!(
            config.media_link("recipes/images/a.png").as_deref(),
            Some("https://cdn.example.com/media/recipes/images/a.png")
        );
        assert_eq!(config.media_link(""), None);
    }
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

const PLACEHOLDER_SECRETS: &[&str] =
    &["", "changeme", "change-me", "secret", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub media_root: PathBuf,
    pub public_url: String,
    pub ffmpeg_path: PathBuf,
    pub thumbnail_timeout: Duration,
    pub feed_page_size: u32,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("REEL_JWT_SECRET").context("REEL_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("REEL_JWT_SECRET is empty or a placeholder value");
        }

        let max_upload_mb: usize = parse(&lookup, "REEL_MAX_UPLOAD_MB", "200")?;
        let feed_page_size: u32 = parse(&lookup, "REEL_FEED_PAGE_SIZE", "30")?;
        if feed_page_size == 0 {
            bail!("REEL_FEED_PAGE_SIZE must be positive");
        }

        Ok(Config {
            host: var("REEL_HOST", "0.0.0.0"),
            port: parse(&lookup, "REEL_PORT", "8080")?,
            db_path: PathBuf::from(var("REEL_DB_PATH", "reel.db")),
            jwt_secret,
            media_root: PathBuf::from(var("REEL_MEDIA_ROOT", "./file")),
            public_url: var("REEL_PUBLIC_URL", "http://localhost:8080"),
            ffmpeg_path: PathBuf::from(var("REEL_FFMPEG_PATH", "ffmpeg")),
            thumbnail_timeout: Duration::from_secs(parse(
                &lookup,
                "REEL_THUMBNAIL_TIMEOUT_SECS",
                "15",
            )?),
            feed_page_size,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.parse().with_context(|| format!("Invalid {}: {:?}", key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = config(&[("REEL_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:8080");
        assert_eq!(config.media_root, PathBuf::from("./file"));
        assert_eq!(config.thumbnail_timeout, Duration::from_secs(15));
        assert_eq!(config.feed_page_size, 30);
        assert_eq!(config.max_upload_bytes, 200 * 1024 * 1024);
    }

    #[test]
    fn missing_or_placeholder_secret_is_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("REEL_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let vars = [("REEL_JWT_SECRET", "s3cr3t-value"), ("REEL_PORT", "eighty")];
        let err = config(&vars).unwrap_err();
        assert!(err.to_string().contains("REEL_PORT"));
    }
}

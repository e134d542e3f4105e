// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::keywords::RefreshPolicy;
use crate::pipeline::PipelineOptions;

const ENV_PATH: &str = "AUTO_EVENTS_CONFIG_PATH";

/// Runtime settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub post_source_base_url: String,
    pub http_timeout_secs: u64,
    /// IANA zone name the post source writes timestamps in.
    pub source_timezone: String,
    pub workers: usize,
    pub posts_per_account: usize,
    pub keyword_refresh_secs: u64,
    pub keyword_retry_attempts: u32,
    pub keyword_retry_delay_secs: u64,
    pub trigger_deadline_secs: u64,
    pub scheduled_deadline_secs: u64,
    pub scheduler_interval_secs: u64,
    /// JSON seed for the in-memory store.
    pub seed_data_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            post_source_base_url: "http://127.0.0.1:8000".to_string(),
            http_timeout_secs: 30,
            source_timezone: "Asia/Tokyo".to_string(),
            workers: 10,
            posts_per_account: 5,
            keyword_refresh_secs: 24 * 3600,
            keyword_retry_attempts: 3,
            keyword_retry_delay_secs: 5,
            trigger_deadline_secs: 5 * 60,
            scheduled_deadline_secs: 10 * 60,
            scheduler_interval_secs: 24 * 3600,
            seed_data_path: None,
        }
    }
}

impl Settings {
    /// Load settings using env var + fallbacks, then apply env overrides:
    /// 1) $AUTO_EVENTS_CONFIG_PATH
    /// 2) config/auto_events.toml
    /// 3) config/auto_events.json
    /// 4) defaults
    pub fn load() -> Result<Self> {
        let mut settings = match std::env::var(ENV_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_PATH} points to non-existent path"));
                }
                Self::load_from(&pb)?
            }
            Err(_) => {
                let toml_p = PathBuf::from("config/auto_events.toml");
                let json_p = PathBuf::from("config/auto_events.json");
                if toml_p.exists() {
                    Self::load_from(&toml_p)?
                } else if json_p.exists() {
                    Self::load_from(&json_p)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env();
        settings.sanitize();
        Ok(settings)
    }

    /// Load from an explicit path. TOML or JSON by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut settings: Settings = match ext.as_str() {
            "json" => serde_json::from_str(&content).context("parsing settings json")?,
            _ => toml::from_str(&content).context("parsing settings toml")?,
        };
        settings.sanitize();
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("POST_SOURCE_BASE_URL") {
            if !v.trim().is_empty() {
                self.post_source_base_url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("SOURCE_TIMEZONE") {
            if !v.trim().is_empty() {
                self.source_timezone = v.trim().to_string();
            }
        }
        if let Some(n) = env_number("PIPELINE_WORKERS") {
            self.workers = n;
        }
        if let Some(n) = env_number("POSTS_PER_ACCOUNT") {
            self.posts_per_account = n;
        }
        if let Ok(v) = std::env::var("SEED_DATA_PATH") {
            if !v.trim().is_empty() {
                self.seed_data_path = Some(PathBuf::from(v.trim()));
            }
        }
    }

    /// Zero values fall back to defaults.
    fn sanitize(&mut self) {
        let d = Settings::default();
        if self.post_source_base_url.trim().is_empty() {
            self.post_source_base_url = d.post_source_base_url;
        }
        let fix = |v: &mut u64, default: u64| {
            if *v == 0 {
                *v = default;
            }
        };
        fix(&mut self.http_timeout_secs, d.http_timeout_secs);
        fix(&mut self.keyword_refresh_secs, d.keyword_refresh_secs);
        fix(&mut self.keyword_retry_delay_secs, d.keyword_retry_delay_secs);
        fix(&mut self.trigger_deadline_secs, d.trigger_deadline_secs);
        fix(&mut self.scheduled_deadline_secs, d.scheduled_deadline_secs);
        fix(&mut self.scheduler_interval_secs, d.scheduler_interval_secs);
        if self.workers == 0 {
            self.workers = d.workers;
        }
        if self.posts_per_account == 0 {
            self.posts_per_account = d.posts_per_account;
        }
        if self.keyword_retry_attempts == 0 {
            self.keyword_retry_attempts = d.keyword_retry_attempts;
        }
    }

    /// Configured zone, or UTC when the name is unknown.
    pub fn timezone(&self) -> chrono_tz::Tz {
        match self.source_timezone.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(zone = %self.source_timezone, "unknown timezone; using UTC");
                chrono_tz::UTC
            }
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            interval: Duration::from_secs(self.keyword_refresh_secs),
            retry_attempts: self.keyword_retry_attempts,
            retry_delay: Duration::from_secs(self.keyword_retry_delay_secs),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            workers: self.workers,
            posts_per_account: self.posts_per_account,
            timezone: self.timezone(),
        }
    }

    pub fn trigger_deadline(&self) -> Duration {
        Duration::from_secs(self.trigger_deadline_secs)
    }

    pub fn scheduled_deadline(&self) -> Duration {
        Duration::from_secs(self.scheduled_deadline_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(key, value = %raw, "ignoring non-numeric env override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const OVERRIDES: [&str; 5] = [
        "POST_SOURCE_BASE_URL",
        "SOURCE_TIMEZONE",
        "PIPELINE_WORKERS",
        "POSTS_PER_ACCOUNT",
        "SEED_DATA_PATH",
    ];

    fn clear_env() {
        env::remove_var(ENV_PATH);
        for k in OVERRIDES {
            env::remove_var(k);
        }
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let s: Settings = toml::from_str("workers = 4\nsource_timezone = \"UTC\"").unwrap();
        assert_eq!(s.workers, 4);
        assert_eq!(s.posts_per_account, 5);
        assert_eq!(s.timezone(), chrono_tz::UTC);
    }

    #[test]
    fn zeros_fall_back_to_defaults() {
        let mut s = Settings {
            workers: 0,
            http_timeout_secs: 0,
            scheduler_interval_secs: 0,
            ..Settings::default()
        };
        s.sanitize();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn unknown_zone_is_utc() {
        let s = Settings {
            source_timezone: "Mars/Olympus".into(),
            ..Settings::default()
        };
        assert_eq!(s.timezone(), chrono_tz::UTC);
        assert_eq!(Settings::default().timezone(), chrono_tz::Asia::Tokyo);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        clear_env();

        // No files → defaults
        assert_eq!(Settings::load().unwrap(), Settings::default());

        fs::create_dir_all("config").unwrap();
        fs::write("config/auto_events.json", r#"{"workers": 3}"#).unwrap();
        assert_eq!(Settings::load().unwrap().workers, 3);

        // TOML wins over JSON
        fs::write("config/auto_events.toml", "workers = 7").unwrap();
        assert_eq!(Settings::load().unwrap().workers, 7);

        // Explicit path wins over both
        let explicit = tmp.path().join("custom.toml");
        fs::write(&explicit, "posts_per_account = 2").unwrap();
        env::set_var(ENV_PATH, &explicit);
        let s = Settings::load().unwrap();
        assert_eq!(s.posts_per_account, 2);
        assert_eq!(s.workers, 10);

        env::set_var(ENV_PATH, tmp.path().join("missing.toml"));
        assert!(Settings::load().is_err());

        clear_env();
        env::set_current_dir(old).unwrap();
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_apply_after_file() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        clear_env();

        env::set_var("POST_SOURCE_BASE_URL", "http://posts.internal:9000");
        env::set_var("PIPELINE_WORKERS", "4");
        env::set_var("POSTS_PER_ACCOUNT", "lots");
        env::set_var("SEED_DATA_PATH", "seed.json");
        let s = Settings::load().unwrap();
        assert_eq!(s.post_source_base_url, "http://posts.internal:9000");
        assert_eq!(s.workers, 4);
        assert_eq!(s.posts_per_account, 5);
        assert_eq!(s.seed_data_path, Some(PathBuf::from("seed.json")));

        clear_env();
        env::set_current_dir(old).unwrap();
    }
}

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::core::history::DEFAULT_HISTORY_LIMIT;

pub const DEFAULT_CONFIG_FILE: &str = "etl-monitor.toml";
const CONFIG_PATH_ENV: &str = "ETL_MONITOR_CONFIG";
const ENV_PREFIX: &str = "ETL_MONITOR_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base of the ETL REST API; status lives at `{base}/status/{jobId}`.
    pub api_base_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Entries kept in the persisted history list.
    pub history_limit: usize,
    pub database_path: PathBuf,
    /// Keep history in memory only.
    pub ephemeral: bool,
    /// Replace the HTTP backend with a simulated job.
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api/etl".to_string(),
            poll_interval_ms: 2_000,
            request_timeout_ms: 10_000,
            history_limit: DEFAULT_HISTORY_LIMIT,
            database_path: PathBuf::from("etl_monitor.db"),
            ephemeral: false,
            simulation: false,
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Layered configuration: defaults, then the TOML file, then
    /// `ETL_MONITOR_*` environment variables, then `overrides` (CLI flags).
    pub fn new<T: Serialize>(overrides: Option<&T>) -> Result<Self, figment::Error> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        figment.extract()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[derive(Serialize)]
    struct Flags {
        #[serde(skip_serializing_if = "Option::is_none")]
        poll_interval_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        api_base_url: Option<String>,
    }

    #[test]
    fn defaults_without_sources() {
        Jail::expect_with(|_jail| {
            let config = AppConfig::new(None::<&Flags>)?;
            assert_eq!(config, AppConfig::default());
            assert_eq!(config.poll_interval(), Duration::from_secs(2));
            assert_eq!(config.history_limit, 50);
            Ok(())
        });
    }

    #[test]
    fn file_then_env_then_flags() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                api_base_url = "http://etl.internal/api/etl"
                poll_interval_ms = 5000
                history_limit = 20
                "#,
            )?;
            jail.set_env("ETL_MONITOR_POLL_INTERVAL_MS", "750");

            let config = AppConfig::new(None::<&Flags>)?;
            assert_eq!(config.api_base_url, "http://etl.internal/api/etl");
            assert_eq!(config.poll_interval_ms, 750);
            assert_eq!(config.history_limit, 20);

            let flags = Flags {
                poll_interval_ms: Some(100),
                api_base_url: None,
            };
            let config = AppConfig::new(Some(&flags))?;
            assert_eq!(config.poll_interval_ms, 100);
            assert_eq!(config.api_base_url, "http://etl.internal/api/etl");
            Ok(())
        });
    }

    #[test]
    fn config_path_from_env() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "ephemeral = true")?;
            jail.set_env("ETL_MONITOR_CONFIG", "custom.toml");

            let config = AppConfig::new(None::<&Flags>)?;
            assert!(config.ephemeral);
            Ok(())
        });
    }
}

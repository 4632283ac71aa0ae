use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "/config/pgwidget.yaml";

pub const CONFIG_ENV: &str = "PGWIDGET_CONFIG";
pub const TOKEN_ENV: &str = "PGWIDGET_ZABBIX_TOKEN";
pub const URL_ENV: &str = "PGWIDGET_ZABBIX_URL";

/// Top-level configuration for the widget backend.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub zabbix: ZabbixConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Widget fields applied underneath every request's own fields.
    #[serde(default)]
    pub widget: Map<String, Value>,
    /// API token; only ever read from the environment.
    #[serde(skip)]
    pub token: String,
}

/// Monitoring frontend connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ZabbixConfig {
    #[serde(default = "ZabbixConfig::default_url")]
    pub url: String,
    #[serde(default = "ZabbixConfig::default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// History requests in flight per render.
    #[serde(default = "ZabbixConfig::default_history_concurrency")]
    pub history_concurrency: usize,
    #[serde(default)]
    pub token: String,
}

impl ZabbixConfig {
    fn default_url() -> String {
        "http://localhost/zabbix".to_string()
    }

    const fn default_timeout() -> Duration {
        Duration::from_secs(10)
    }

    const fn default_history_concurrency() -> usize {
        8
    }
}

impl Default for ZabbixConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            timeout: Self::default_timeout(),
            history_concurrency: Self::default_history_concurrency(),
            token: String::new(),
        }
    }
}

/// HTTP listener configuration (bind address).
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_bind")]
    pub bind: String,
}

impl HttpConfig {
    fn default_bind() -> String {
        "0.0.0.0:8282".to_string()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
        }
    }
}

/// Load configuration from YAML disk file, falling back to defaults + env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let target_path = if let Some(path) = path {
        path.to_path_buf()
    } else if let Ok(env_path) = env::var(CONFIG_ENV) {
        PathBuf::from(env_path)
    } else {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    };

    let mut config = match try_parse_file(&target_path)? {
        Some(cfg) => {
            info!(path = %target_path.display(), "loaded configuration");
            cfg
        }
        None => {
            warn!(path = %target_path.display(), "config file not found; using built-in defaults");
            AppConfig::default()
        }
    };

    enforce_yaml_policy(&config)?;
    apply_overrides(&mut config, |name| env::var(name).ok())?;
    ensure_required_secrets(&config)?;
    Ok(config)
}

fn try_parse_file(path: &Path) -> Result<Option<AppConfig>> {
    match fs::read_to_string(path) {
        Ok(raw) => parse_yaml(&raw)
            .with_context(|| format!("failed to parse YAML config at {}", path.display()))
            .map(Some),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read config file at {}", path.display()))
        }
    }
}

pub fn parse_yaml(raw: &str) -> Result<AppConfig> {
    let config: AppConfig = serde_yaml::from_str(raw)?;
    if config.zabbix.history_concurrency == 0 {
        bail!("zabbix.history_concurrency must be at least 1");
    }
    Ok(config)
}

fn enforce_yaml_policy(config: &AppConfig) -> Result<()> {
    if !config.zabbix.token.trim().is_empty() {
        bail!(
            "Remove `zabbix.token` from the YAML config; set the API token via the {TOKEN_ENV} environment variable (see .env.sample)."
        );
    }
    Ok(())
}

/// Apply environment overrides, read through `lookup` so tests need not touch
/// the process environment.
pub fn apply_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(url) = lookup(URL_ENV) {
        if !url.trim().is_empty() {
            config.zabbix.url = url.trim().to_string();
        }
    }

    if let Some(token) = lookup(TOKEN_ENV) {
        if token.trim().is_empty() {
            bail!("Environment variable {TOKEN_ENV} is set but empty; populate it in your .env file.");
        }
        config.token = token.trim().to_string();
    }

    Ok(())
}

fn ensure_required_secrets(config: &AppConfig) -> Result<()> {
    if config.token.trim().is_empty() {
        bail!(
            "Missing Zabbix API token. Set the {TOKEN_ENV} environment variable (see .env.sample). Secrets must not be stored in YAML."
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_sections_with_defaults() {
        let config = parse_yaml(
            r#"
zabbix:
  url: https://zabbix.example.com
  timeout: 3s
http:
  bind: 127.0.0.1:9000
widget:
  zabbix_base_url: https://zabbix.example.com
  weight_bloat: 0
"#,
        )
        .expect("config");

        assert_eq!(config.zabbix.url, "https://zabbix.example.com");
        assert_eq!(config.zabbix.timeout, Duration::from_secs(3));
        assert_eq!(config.zabbix.history_concurrency, 8);
        assert_eq!(config.http.bind, "127.0.0.1:9000");
        assert_eq!(config.widget["weight_bloat"], 0);
        assert!(config.token.is_empty());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_yaml("{}").expect("config");
        assert_eq!(config.zabbix.timeout, Duration::from_secs(10));
        assert_eq!(config.http.bind, "0.0.0.0:8282");
        assert!(config.widget.is_empty());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(parse_yaml("zabbix:\n  history_concurrency: 0\n").is_err());
    }

    #[test]
    fn token_in_yaml_is_refused() {
        let config = parse_yaml("zabbix:\n  token: abc\n").expect("parses");
        assert!(enforce_yaml_policy(&config).is_err());
    }

    #[test]
    fn env_overrides_token_and_url() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, |name| match name {
            TOKEN_ENV => Some(" secret ".into()),
            URL_ENV => Some("https://other".into()),
            _ => None,
        })
        .expect("overrides");
        assert_eq!(config.token, "secret");
        assert_eq!(config.zabbix.url, "https://other");
        assert!(ensure_required_secrets(&config).is_ok());
    }

    #[test]
    fn missing_or_blank_token_fails() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, |_| None).expect("no overrides");
        assert!(ensure_required_secrets(&config).is_err());

        let blank = apply_overrides(&mut config, |name| {
            (name == TOKEN_ENV).then(|| "  ".to_string())
        });
        assert!(blank.is_err());
    }
}

//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The operator token is loaded from the ADMIN_TOKEN env var or token_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub sweeper: SweeperSettings,
    #[serde(default)]
    pub admin: AdminSettings,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Credential store location
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub credentials_path: PathBuf,
}

/// Fallback orchestration settings
#[derive(Debug, Deserialize)]
pub struct PoolSettings {
    /// Upper bound on one provider call; a hung call is cut off and
    /// classified as a server fault.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// How many distinct keys one logical operation may burn through.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Reactivation sweeper settings
#[derive(Debug, Deserialize)]
pub struct SweeperSettings {
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_cooldown_days")]
    pub cooldown_days: u64,
}

/// Operator authentication for the admin surface
#[derive(Debug, Default, Deserialize)]
pub struct AdminSettings {
    #[serde(skip)]
    pub token: Option<Secret<String>>,
    /// Path to a file containing the operator token (alternative to the
    /// ADMIN_TOKEN env var)
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

/// One scraping provider the gateway can probe.
///
/// The probe URL is only used by the admin test endpoints; production
/// callers supply their own unit of work and wire protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub test_url: String,
    /// Header the provider expects the key in.
    #[serde(default = "default_secret_header")]
    pub secret_header: String,
}

fn default_max_connections() -> usize {
    1000
}

fn default_call_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_cooldown_days() -> u64 {
    30
}

fn default_secret_header() -> String {
    "x-api-key".to_string()
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            cooldown_days: default_cooldown_days(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Operator token resolution order:
    /// 1. ADMIN_TOKEN env var
    /// 2. token_file path from config
    ///
    /// A missing token is a hard error: every mutating admin endpoint is
    /// gated on it, and starting without one would leave them wide open.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.pool.call_timeout_secs == 0 {
            return Err(common::Error::Config(
                "call_timeout_secs must be greater than 0".into(),
            ));
        }
        if config.pool.max_attempts == 0 {
            return Err(common::Error::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if config.sweeper.interval_secs == 0 {
            return Err(common::Error::Config(
                "sweeper interval_secs must be greater than 0".into(),
            ));
        }
        for provider in &config.providers {
            if provider.name.is_empty() {
                return Err(common::Error::Config("provider name must not be empty".into()));
            }
            if !provider.test_url.starts_with("http://")
                && !provider.test_url.starts_with("https://")
            {
                return Err(common::Error::Config(format!(
                    "provider '{}' test_url must start with http:// or https://, got: {}",
                    provider.name, provider.test_url
                )));
            }
        }

        // Resolve operator token: env var takes precedence over file
        if let Ok(token) = std::env::var("ADMIN_TOKEN") {
            config.admin.token = Some(Secret::new(token));
        } else if let Some(ref token_file) = config.admin.token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.admin.token = Some(Secret::new(token));
            }
        }

        if config.admin.token.is_none() {
            return Err(common::Error::Config(
                "no operator token configured — set ADMIN_TOKEN or admin.token_file".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("scrape-gateway.toml")
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.call_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper.interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.sweeper.cooldown_days * 24 * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:8080"

[store]
credentials_path = "/var/lib/scrape-gateway/credentials.json"

[[providers]]
name = "talentscan"
test_url = "https://api.talentscan.example/v1/ping"
secret_header = "x-talentscan-key"
"#
    }

    fn write_config(dir_name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_config_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let path = write_config("scrape-gateway-test-valid", valid_toml());

        unsafe { set_env("ADMIN_TOKEN", "op-token-123") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("ADMIN_TOKEN") };

        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.pool.call_timeout_secs, 30);
        assert_eq!(config.pool.max_attempts, 3);
        assert_eq!(config.sweeper.interval_secs, 3600);
        assert_eq!(config.sweeper.cooldown_days, 30);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "talentscan");
        assert_eq!(config.providers[0].secret_header, "x-talentscan-key");
        assert_eq!(config.admin.token.as_ref().unwrap().expose(), "op-token-123");
        assert_eq!(config.cooldown(), Duration::from_secs(30 * 24 * 3600));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let path = write_config("scrape-gateway-test-invalid", "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_missing_token_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let path = write_config("scrape-gateway-test-no-token", valid_toml());

        unsafe { remove_env("ADMIN_TOKEN") };
        let result = Config::load(&path);
        assert!(result.is_err(), "config without an operator token must fail");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("operator token"), "got: {err}");
    }

    #[test]
    fn test_token_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = std::env::temp_dir().join("scrape-gateway-test-tokenfile");
        std::fs::create_dir_all(&dir).unwrap();
        let token_path = dir.join("admin_token");
        std::fs::write(&token_path, "op-file-456\n").unwrap();

        let toml_content = format!(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[store]
credentials_path = "/tmp/credentials.json"

[admin]
token_file = "{}"
"#,
            token_path.display()
        );
        let config_path = dir.join("config.toml");
        std::fs::write(&config_path, &toml_content).unwrap();

        unsafe { remove_env("ADMIN_TOKEN") };
        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.admin.token.as_ref().unwrap().expose(), "op-file-456");
    }

    #[test]
    fn test_token_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = std::env::temp_dir().join("scrape-gateway-test-token-override");
        std::fs::create_dir_all(&dir).unwrap();
        let token_path = dir.join("admin_token");
        std::fs::write(&token_path, "op-file-value").unwrap();

        let toml_content = format!(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[store]
credentials_path = "/tmp/credentials.json"

[admin]
token_file = "{}"
"#,
            token_path.display()
        );
        let config_path = dir.join("config.toml");
        std::fs::write(&config_path, &toml_content).unwrap();

        unsafe { set_env("ADMIN_TOKEN", "op-env-value") };
        let config = Config::load(&config_path).unwrap();
        unsafe { remove_env("ADMIN_TOKEN") };
        assert_eq!(config.admin.token.as_ref().unwrap().expose(), "op-env-value");
    }

    #[test]
    fn test_zero_call_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[server]
listen_addr = "127.0.0.1:8080"

[store]
credentials_path = "/tmp/credentials.json"

[pool]
call_timeout_secs = 0
"#;
        let path = write_config("scrape-gateway-test-zero-timeout", toml_content);
        unsafe { set_env("ADMIN_TOKEN", "t") };
        let result = Config::load(&path);
        unsafe { remove_env("ADMIN_TOKEN") };
        assert!(result.is_err(), "call_timeout_secs = 0 must be rejected");
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[server]
listen_addr = "127.0.0.1:8080"

[store]
credentials_path = "/tmp/credentials.json"

[pool]
max_attempts = 0
"#;
        let path = write_config("scrape-gateway-test-zero-attempts", toml_content);
        unsafe { set_env("ADMIN_TOKEN", "t") };
        let result = Config::load(&path);
        unsafe { remove_env("ADMIN_TOKEN") };
        assert!(result.is_err(), "max_attempts = 0 must be rejected");
    }

    #[test]
    fn test_provider_url_without_scheme_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[server]
listen_addr = "127.0.0.1:8080"

[store]
credentials_path = "/tmp/credentials.json"

[[providers]]
name = "talentscan"
test_url = "api.talentscan.example/ping"
"#;
        let path = write_config("scrape-gateway-test-bad-url", toml_content);
        unsafe { set_env("ADMIN_TOKEN", "t") };
        let result = Config::load(&path);
        unsafe { remove_env("ADMIN_TOKEN") };
        assert!(result.is_err());
        let err = format!("{}", result.unwrap_err());
        assert!(err.contains("test_url must start with http"), "got: {err}");
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(path, PathBuf::from("/env/path.toml"));
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("scrape-gateway.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
    }

    #[test]
    fn test_custom_pool_and_sweeper_settings() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[server]
listen_addr = "127.0.0.1:8080"
max_connections = 200

[store]
credentials_path = "/tmp/credentials.json"

[pool]
call_timeout_secs = 10
max_attempts = 5

[sweeper]
interval_secs = 600
cooldown_days = 7
"#;
        let path = write_config("scrape-gateway-test-custom", toml_content);
        unsafe { set_env("ADMIN_TOKEN", "t") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("ADMIN_TOKEN") };

        assert_eq!(config.server.max_connections, 200);
        assert_eq!(config.call_timeout(), Duration::from_secs(10));
        assert_eq!(config.pool.max_attempts, 5);
        assert_eq!(config.sweep_interval(), Duration::from_secs(600));
        assert_eq!(config.cooldown(), Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn test_whitespace_only_token_file_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = std::env::temp_dir().join("scrape-gateway-test-empty-token");
        std::fs::create_dir_all(&dir).unwrap();
        let token_path = dir.join("admin_token");
        std::fs::write(&token_path, "  \n  ").unwrap();

        let toml_content = format!(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[store]
credentials_path = "/tmp/credentials.json"

[admin]
token_file = "{}"
"#,
            token_path.display()
        );
        let config_path = dir.join("config.toml");
        std::fs::write(&config_path, &toml_content).unwrap();

        unsafe { remove_env("ADMIN_TOKEN") };
        assert!(
            Config::load(&config_path).is_err(),
            "whitespace-only token file must leave the gateway without a token, which is rejected"
        );
    }
}

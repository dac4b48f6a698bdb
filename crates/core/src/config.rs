use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telephony: TelephonyConfig,
    pub kb: KbConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelephonyConfig {
    /// Vendor REST credential. Absent means the adapter runs as a no-op stub.
    pub api_key: Option<SecretString>,
    /// Shared secret expected in the `x-vapi-secret` webhook header. Absent
    /// disables the check entirely; set it in any non-development
    /// environment.
    pub webhook_secret: Option<SecretString>,
    /// Vendor REST base URL. Absent means call-control requests are skipped.
    pub base_url: Option<String>,
    pub hotline_number: String,
}

#[derive(Clone, Debug)]
pub struct KbConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Desired passage count per lookup, capped at 4 by the KB contract.
    pub max_passages: u8,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub telephony_api_key: Option<String>,
    pub telephony_webhook_secret: Option<String>,
    pub telephony_base_url: Option<String>,
    pub hotline_number: Option<String>,
    pub kb_url: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://saathi.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            telephony: TelephonyConfig {
                api_key: None,
                webhook_secret: None,
                base_url: None,
                hotline_number: String::new(),
            },
            kb: KbConfig {
                url: "http://localhost:8081/kb/search".to_string(),
                timeout_secs: 10,
                max_passages: 4,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("saathi.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(telephony) = patch.telephony {
            if let Some(api_key) = telephony.api_key {
                self.telephony.api_key = Some(secret_value(api_key));
            }
            if let Some(webhook_secret) = telephony.webhook_secret {
                self.telephony.webhook_secret = Some(secret_value(webhook_secret));
            }
            if let Some(base_url) = telephony.base_url {
                self.telephony.base_url = Some(base_url);
            }
            if let Some(hotline_number) = telephony.hotline_number {
                self.telephony.hotline_number = hotline_number;
            }
        }

        if let Some(kb) = patch.kb {
            if let Some(url) = kb.url {
                self.kb.url = url;
            }
            if let Some(timeout_secs) = kb.timeout_secs {
                self.kb.timeout_secs = timeout_secs;
            }
            if let Some(max_passages) = kb.max_passages {
                self.kb.max_passages = max_passages;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SAATHI_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SAATHI_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SAATHI_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SAATHI_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SAATHI_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SAATHI_TELEPHONY_API_KEY") {
            self.telephony.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SAATHI_TELEPHONY_WEBHOOK_SECRET") {
            self.telephony.webhook_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("SAATHI_TELEPHONY_BASE_URL") {
            self.telephony.base_url = Some(value);
        }
        if let Some(value) = read_env("SAATHI_HOTLINE_NUMBER") {
            self.telephony.hotline_number = value;
        }

        if let Some(value) = read_env("SAATHI_KB_URL") {
            self.kb.url = value;
        }
        if let Some(value) = read_env("SAATHI_KB_TIMEOUT_SECS") {
            self.kb.timeout_secs = parse_u64("SAATHI_KB_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SAATHI_KB_MAX_PASSAGES") {
            self.kb.max_passages = parse_u8("SAATHI_KB_MAX_PASSAGES", &value)?;
        }

        if let Some(value) = read_env("SAATHI_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SAATHI_SERVER_PORT") {
            self.server.port = parse_u16("SAATHI_SERVER_PORT", &value)?;
        }

        let log_level = read_env("SAATHI_LOGGING_LEVEL").or_else(|| read_env("SAATHI_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SAATHI_LOGGING_FORMAT").or_else(|| read_env("SAATHI_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(api_key) = overrides.telephony_api_key {
            self.telephony.api_key = Some(secret_value(api_key));
        }
        if let Some(webhook_secret) = overrides.telephony_webhook_secret {
            self.telephony.webhook_secret = Some(secret_value(webhook_secret));
        }
        if let Some(base_url) = overrides.telephony_base_url {
            self.telephony.base_url = Some(base_url);
        }
        if let Some(hotline_number) = overrides.hotline_number {
            self.telephony.hotline_number = hotline_number;
        }
        if let Some(kb_url) = overrides.kb_url {
            self.kb.url = kb_url;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_telephony(&self.telephony)?;
        validate_kb(&self.kb)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("saathi.toml"), PathBuf::from("config/saathi.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_telephony(telephony: &TelephonyConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &telephony.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "telephony.base_url must start with http:// or https://".to_string(),
            ));
        }

        let key_missing = telephony
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if key_missing {
            return Err(ConfigError::Validation(
                "telephony.api_key is required when telephony.base_url is configured".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_kb(kb: &KbConfig) -> Result<(), ConfigError> {
    if !kb.url.starts_with("http://") && !kb.url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "kb.url must start with http:// or https://".to_string(),
        ));
    }

    if kb.timeout_secs == 0 || kb.timeout_secs > 60 {
        return Err(ConfigError::Validation("kb.timeout_secs must be in range 1..=60".to_string()));
    }

    if kb.max_passages == 0 || kb.max_passages > 4 {
        return Err(ConfigError::Validation("kb.max_passages must be in range 1..=4".to_string()));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    telephony: Option<TelephonyPatch>,
    kb: Option<KbPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelephonyPatch {
    api_key: Option<String>,
    webhook_secret: Option<String>,
    base_url: Option<String>,
    hotline_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KbPatch {
    url: Option<String>,
    timeout_secs: Option<u64>,
    max_passages: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_input() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.server.port == 8080, "default port should be 8080")?;
        ensure(config.kb.max_passages == 4, "default passage cap should be 4")?;
        ensure(
            config.telephony.webhook_secret.is_none(),
            "webhook secret should default to disabled",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_VAPI_SECRET", "whsec-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("saathi.toml");
            fs::write(
                &path,
                r#"
[telephony]
webhook_secret = "${TEST_VAPI_SECRET}"
hotline_number = "+911234567890"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let secret = config
                .telephony
                .webhook_secret
                .as_ref()
                .map(|value| value.expose_secret().to_owned())
                .unwrap_or_default();
            ensure(secret == "whsec-from-env", "webhook secret should interpolate from env")?;
            ensure(
                config.telephony.hotline_number == "+911234567890",
                "hotline number should load from file",
            )
        })();

        clear_vars(&["TEST_VAPI_SECRET"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SAATHI_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SAATHI_KB_URL", "http://kb-from-env:8081/kb/search");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("saathi.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[kb]
url = "http://kb-from-file:8081/kb/search"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.kb.url == "http://kb-from-env:8081/kb/search",
                "env kb url should win over file and defaults",
            )
        })();

        clear_vars(&["SAATHI_DATABASE_URL", "SAATHI_KB_URL"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SAATHI_LOG_LEVEL", "warn");
        env::set_var("SAATHI_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["SAATHI_LOG_LEVEL", "SAATHI_LOG_FORMAT"]);
        result
    }

    #[test]
    fn base_url_without_api_key_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SAATHI_TELEPHONY_BASE_URL", "https://api.vendor.example");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("telephony.api_key")
            );
            ensure(has_message, "validation failure should mention telephony.api_key")
        })();

        clear_vars(&["SAATHI_TELEPHONY_BASE_URL"]);
        result
    }

    #[test]
    fn out_of_range_passage_cap_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SAATHI_KB_MAX_PASSAGES", "9");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("kb.max_passages")
            );
            ensure(has_message, "validation failure should mention kb.max_passages")
        })();

        clear_vars(&["SAATHI_KB_MAX_PASSAGES"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SAATHI_TELEPHONY_WEBHOOK_SECRET", "whsec-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("whsec-secret-value"),
                "debug output should not contain the webhook secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["SAATHI_TELEPHONY_WEBHOOK_SECRET"]);
        result
    }
}

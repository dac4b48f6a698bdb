use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use saathi_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "SAATHI_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "SAATHI_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "SAATHI_DATABASE_TIMEOUT_SECS"),
    ));

    let api_key = if config.telephony.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "telephony.api_key",
        api_key,
        source("telephony.api_key", "SAATHI_TELEPHONY_API_KEY"),
    ));
    let webhook_secret =
        if config.telephony.webhook_secret.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "telephony.webhook_secret",
        webhook_secret,
        source("telephony.webhook_secret", "SAATHI_TELEPHONY_WEBHOOK_SECRET"),
    ));
    lines.push(render_line(
        "telephony.base_url",
        config.telephony.base_url.as_deref().unwrap_or("<unset>"),
        source("telephony.base_url", "SAATHI_TELEPHONY_BASE_URL"),
    ));
    lines.push(render_line(
        "telephony.hotline_number",
        &config.telephony.hotline_number,
        source("telephony.hotline_number", "SAATHI_HOTLINE_NUMBER"),
    ));

    lines.push(render_line("kb.url", &config.kb.url, source("kb.url", "SAATHI_KB_URL")));
    lines.push(render_line(
        "kb.timeout_secs",
        &config.kb.timeout_secs.to_string(),
        source("kb.timeout_secs", "SAATHI_KB_TIMEOUT_SECS"),
    ));
    lines.push(render_line(
        "kb.max_passages",
        &config.kb.max_passages.to_string(),
        source("kb.max_passages", "SAATHI_KB_MAX_PASSAGES"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "SAATHI_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "SAATHI_SERVER_PORT"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "SAATHI_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "SAATHI_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("saathi.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/saathi.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

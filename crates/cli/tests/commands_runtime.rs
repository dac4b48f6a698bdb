use std::env;
use std::sync::{Mutex, OnceLock};

use saathi_cli::commands::{migrate, start};
use serde_json::Value;

#[test]
fn start_returns_success_with_valid_env() {
    with_env(&[("SAATHI_DATABASE_URL", "sqlite::memory:")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 0, "expected successful start preflight");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn start_returns_config_failure_with_bad_database_url() {
    with_env(&[("SAATHI_DATABASE_URL", "postgres://localhost/saathi")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("SAATHI_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_config_failure_before_touching_the_database() {
    with_env(&[("SAATHI_KB_MAX_PASSAGES", "9")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SAATHI_DATABASE_URL",
        "SAATHI_DATABASE_MAX_CONNECTIONS",
        "SAATHI_DATABASE_TIMEOUT_SECS",
        "SAATHI_TELEPHONY_API_KEY",
        "SAATHI_TELEPHONY_WEBHOOK_SECRET",
        "SAATHI_TELEPHONY_BASE_URL",
        "SAATHI_HOTLINE_NUMBER",
        "SAATHI_KB_URL",
        "SAATHI_KB_TIMEOUT_SECS",
        "SAATHI_KB_MAX_PASSAGES",
        "SAATHI_SERVER_BIND_ADDRESS",
        "SAATHI_SERVER_PORT",
        "SAATHI_LOGGING_LEVEL",
        "SAATHI_LOGGING_FORMAT",
        "SAATHI_LOG_LEVEL",
        "SAATHI_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

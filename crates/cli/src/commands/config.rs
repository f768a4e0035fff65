use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use sge_core::config::{AppConfig, BackendKind, ConfigOverrides, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

struct Field<'a> {
    key: &'static str,
    env: &'static [&'static str],
    value: &'a str,
}

pub fn run(options: LoadOptions) -> CommandResult {
    let explicit_path = options.config_path.clone();
    let overrides = options.overrides.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    CommandResult { exit_code: 0, output: render(&config, &overrides, explicit_path.as_deref()) }
}

fn render(config: &AppConfig, overrides: &ConfigOverrides, explicit_path: Option<&Path>) -> String {
    let config_file_path = detect_config_path(explicit_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let kind = match config.backend.kind {
        BackendKind::Memory => "memory",
        BackendKind::Http => "http",
    };
    let api_token = match &config.backend.api_token {
        Some(token) => redact_token(token.expose_secret()),
        None => "<unset>".to_string(),
    };
    let timeout = config.backend.timeout_secs.to_string();
    let max_bytes = config.upload.max_bytes.to_string();
    let gate = config.workflow.enforce_approval_gate.to_string();
    let format = format!("{:?}", config.logging.format).to_lowercase();

    let fields = [
        Field { key: "backend.kind", env: &["SGE_BACKEND_KIND"], value: kind },
        Field {
            key: "backend.base_url",
            env: &["SGE_BACKEND_BASE_URL"],
            value: &config.backend.base_url,
        },
        Field { key: "backend.api_token", env: &["SGE_BACKEND_API_TOKEN"], value: &api_token },
        Field { key: "backend.timeout_secs", env: &["SGE_BACKEND_TIMEOUT_SECS"], value: &timeout },
        Field {
            key: "session.user_id",
            env: &["SGE_SESSION_USER_ID"],
            value: &config.session.user_id,
        },
        Field {
            key: "session.role",
            env: &["SGE_SESSION_ROLE"],
            value: config.session.role.as_str(),
        },
        Field { key: "upload.max_bytes", env: &["SGE_UPLOAD_MAX_BYTES"], value: &max_bytes },
        Field {
            key: "workflow.enforce_approval_gate",
            env: &["SGE_WORKFLOW_ENFORCE_APPROVAL_GATE"],
            value: &gate,
        },
        Field {
            key: "logging.level",
            env: &["SGE_LOGGING_LEVEL", "SGE_LOG_LEVEL"],
            value: &config.logging.level,
        },
        Field {
            key: "logging.format",
            env: &["SGE_LOGGING_FORMAT", "SGE_LOG_FORMAT"],
            value: &format,
        },
    ];

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in &fields {
        let source = match override_flag(field.key, overrides) {
            Some(flag) => format!("flag ({flag})"),
            None => field_source(
                field.key,
                field.env,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        };
        lines.push(render_line(field.key, field.value, source));
    }

    lines.join("\n")
}

fn override_flag(key: &str, overrides: &ConfigOverrides) -> Option<&'static str> {
    let (flag, set) = match key {
        "backend.kind" => ("--backend", overrides.backend_kind.is_some()),
        "backend.base_url" => ("--base-url", overrides.base_url.is_some()),
        "backend.api_token" => ("--api-token", overrides.api_token.is_some()),
        "session.user_id" => ("--user", overrides.session_user_id.is_some()),
        "session.role" => ("--role", overrides.session_role.is_some()),
        "workflow.enforce_approval_gate" => {
            ("--no-approval-gate", overrides.enforce_approval_gate.is_some())
        }
        "logging.level" => ("--log-level", overrides.log_level.is_some()),
        _ => return None,
    };
    set.then_some(flag)
}

fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("sge.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/sge.toml");
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
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('_') {
        return format!("{prefix}_***");
    }

    "<redacted>".to_string()
}

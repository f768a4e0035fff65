use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::user::{Role, Session};
use crate::validation::MAX_UPLOAD_BYTES;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub upload: UploadConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: String,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub user_id: String,
    pub role: Role,
}

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_bytes: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Refuse staff approval of presence requests until every teacher approved.
    pub enforce_approval_gate: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Http,
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
    pub backend_kind: Option<BackendKind>,
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub session_user_id: Option<String>,
    pub session_role: Option<Role>,
    pub enforce_approval_gate: Option<bool>,
    pub log_level: Option<String>,
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
            backend: BackendConfig {
                kind: BackendKind::Memory,
                base_url: "http://localhost:8080/api".to_string(),
                api_token: None,
                timeout_secs: 30,
            },
            session: SessionConfig { user_id: "stu-001".to_string(), role: Role::Student },
            upload: UploadConfig { max_bytes: MAX_UPLOAD_BYTES },
            workflow: WorkflowConfig { enforce_approval_gate: true },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::Validation(format!(
                "unsupported backend kind `{other}` (expected memory|http)"
            ))),
        }
    }
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
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("sge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn session(&self) -> Session {
        Session::new(self.session.user_id.trim(), self.session.role)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(backend) = patch.backend {
            if let Some(kind) = backend.kind {
                self.backend.kind = kind;
            }
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(api_token_value) = backend.api_token {
                self.backend.api_token = Some(secret_value(api_token_value));
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(session) = patch.session {
            if let Some(user_id) = session.user_id {
                self.session.user_id = user_id;
            }
            if let Some(role) = session.role {
                self.session.role = parse_role("session.role", &role)?;
            }
        }

        if let Some(upload) = patch.upload {
            if let Some(max_bytes) = upload.max_bytes {
                self.upload.max_bytes = max_bytes;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(enforce_approval_gate) = workflow.enforce_approval_gate {
                self.workflow.enforce_approval_gate = enforce_approval_gate;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SGE_BACKEND_KIND") {
            self.backend.kind = value.parse()?;
        }
        if let Some(value) = read_env("SGE_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("SGE_BACKEND_API_TOKEN") {
            self.backend.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("SGE_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("SGE_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SGE_SESSION_USER_ID") {
            self.session.user_id = value;
        }
        if let Some(value) = read_env("SGE_SESSION_ROLE") {
            self.session.role = parse_role("SGE_SESSION_ROLE", &value)?;
        }

        if let Some(value) = read_env("SGE_UPLOAD_MAX_BYTES") {
            self.upload.max_bytes = parse_u64("SGE_UPLOAD_MAX_BYTES", &value)?;
        }

        if let Some(value) = read_env("SGE_WORKFLOW_ENFORCE_APPROVAL_GATE") {
            self.workflow.enforce_approval_gate =
                parse_bool("SGE_WORKFLOW_ENFORCE_APPROVAL_GATE", &value)?;
        }

        let log_level = read_env("SGE_LOGGING_LEVEL").or_else(|| read_env("SGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("SGE_LOGGING_FORMAT").or_else(|| read_env("SGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(kind) = overrides.backend_kind {
            self.backend.kind = kind;
        }
        if let Some(base_url) = overrides.base_url {
            self.backend.base_url = base_url;
        }
        if let Some(api_token) = overrides.api_token {
            self.backend.api_token = Some(secret_value(api_token));
        }
        if let Some(user_id) = overrides.session_user_id {
            self.session.user_id = user_id;
        }
        if let Some(role) = overrides.session_role {
            self.session.role = role;
        }
        if let Some(enforce_approval_gate) = overrides.enforce_approval_gate {
            self.workflow.enforce_approval_gate = enforce_approval_gate;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend(&self.backend)?;
        validate_session(&self.session)?;
        validate_upload(&self.upload)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("sge.toml"), PathBuf::from("config/sge.toml")]
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

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    if backend.timeout_secs == 0 || backend.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if backend.kind == BackendKind::Memory {
        return Ok(());
    }

    let base_url = backend.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https:// for the http backend"
                .to_string(),
        ));
    }

    let missing_token = backend
        .api_token
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_token {
        return Err(ConfigError::Validation(
            "backend.api_token is required for the http backend (set SGE_BACKEND_API_TOKEN)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.user_id.trim().is_empty() {
        return Err(ConfigError::Validation("session.user_id must not be empty".to_string()));
    }
    Ok(())
}

fn validate_upload(upload: &UploadConfig) -> Result<(), ConfigError> {
    if upload.max_bytes == 0 || upload.max_bytes > MAX_UPLOAD_BYTES {
        return Err(ConfigError::Validation(format!(
            "upload.max_bytes must be in range 1..={MAX_UPLOAD_BYTES}"
        )));
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

fn parse_role(key: &str, value: &str) -> Result<Role, ConfigError> {
    value.parse::<Role>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    session: Option<SessionPatch>,
    upload: Option<UploadPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    kind: Option<BackendKind>,
    base_url: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    user_id: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UploadPatch {
    max_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    enforce_approval_gate: Option<bool>,
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

    use crate::domain::user::Role;

    use super::{AppConfig, BackendKind, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const SGE_VARS: &[&str] = &[
        "SGE_BACKEND_KIND",
        "SGE_BACKEND_BASE_URL",
        "SGE_BACKEND_API_TOKEN",
        "SGE_BACKEND_TIMEOUT_SECS",
        "SGE_SESSION_USER_ID",
        "SGE_SESSION_ROLE",
        "SGE_UPLOAD_MAX_BYTES",
        "SGE_WORKFLOW_ENFORCE_APPROVAL_GATE",
        "SGE_LOG_LEVEL",
        "SGE_LOG_FORMAT",
        "SGE_LOGGING_LEVEL",
        "SGE_LOGGING_FORMAT",
    ];

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
    fn defaults_select_the_in_memory_backend() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(SGE_VARS);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.backend.kind == BackendKind::Memory, "memory backend is the default")?;
        ensure(config.upload.max_bytes == 10 * 1024 * 1024, "upload limit defaults to 10 MiB")?;
        ensure(config.workflow.enforce_approval_gate, "approval gate is enforced by default")?;
        ensure(config.session().role == Role::Student, "default session is a student")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(SGE_VARS);

        env::set_var("TEST_SGE_API_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("sge.toml");
            fs::write(
                &path,
                r#"
[backend]
kind = "http"
base_url = "https://sge.example.edu/api"
api_token = "${TEST_SGE_API_TOKEN}"

[session]
user_id = "adm-001"
role = "administrator"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.backend.kind == BackendKind::Http, "backend kind should come from file")?;
            ensure(
                config.backend.api_token.as_ref().map(|token| token.expose_secret())
                    == Some("token-from-env"),
                "api token should be interpolated from environment",
            )?;
            ensure(config.session.role == Role::Administrator, "role should be parsed")?;
            Ok(())
        })();

        clear_vars(&["TEST_SGE_API_TOKEN"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(SGE_VARS);

        env::set_var("SGE_SESSION_USER_ID", "tch-from-env");
        env::set_var("SGE_SESSION_ROLE", "teacher");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("sge.toml");
            fs::write(
                &path,
                r#"
[session]
user_id = "stu-from-file"
role = "student"

[workflow]
enforce_approval_gate = true

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    enforce_approval_gate: Some(false),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.session.user_id == "tch-from-env", "env user id should win over file")?;
            ensure(config.session.role == Role::Teacher, "env role should win over file")?;
            ensure(!config.workflow.enforce_approval_gate, "override should win over file")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(SGE_VARS);
        result
    }

    #[test]
    fn http_backend_requires_a_token() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(SGE_VARS);

        env::set_var("SGE_BACKEND_KIND", "http");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("backend.api_token")
            );
            ensure(has_message, "validation failure should mention backend.api_token")
        })();

        clear_vars(SGE_VARS);
        result
    }

    #[test]
    fn upload_limit_cannot_be_raised_above_ten_megabytes() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(SGE_VARS);

        env::set_var("SGE_UPLOAD_MAX_BYTES", "20971520");
        let result = (|| -> Result<(), String> {
            let failed = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message)) if message.contains("upload.max_bytes")
            );
            ensure(failed, "a 20 MiB limit must be refused")
        })();

        clear_vars(SGE_VARS);
        result
    }

    #[test]
    fn api_token_is_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(SGE_VARS);

        env::set_var("SGE_BACKEND_KIND", "http");
        env::set_var("SGE_BACKEND_API_TOKEN", "secret-token-value");
        env::set_var("SGE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("secret-token-value"), "debug output should not contain token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "log format alias should be honoured",
            )?;
            Ok(())
        })();

        clear_vars(SGE_VARS);
        result
    }
}

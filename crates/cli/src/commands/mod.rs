pub mod approvals;
pub mod config;
pub mod doctor;
pub mod fulfill;
pub mod requests;
pub mod submit;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use sge_client::DocumentGateway;
use sge_core::config::{AppConfig, LoadOptions};
use sge_core::errors::{ApplicationError, InterfaceError};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_VALIDATION: u8 = 3;
pub const EXIT_COLLABORATOR: u8 = 4;
pub const EXIT_INTERNAL: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: impl Serialize,
    ) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), EXIT_INTERNAL)
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Renders a workflow failure. Local refusals keep their precise message;
    /// collaborator and network failures share one generic message.
    pub fn from_application_error(command: &str, error: ApplicationError) -> Self {
        let correlation_id = format!("cli-{command}");
        let interface = error.into_interface(correlation_id.as_str());
        let (message, exit_code) = match &interface {
            InterfaceError::BadRequest { message, .. } => (message.clone(), EXIT_VALIDATION),
            InterfaceError::ServiceUnavailable { .. } => {
                (interface.user_message().to_string(), EXIT_COLLABORATOR)
            }
            InterfaceError::Internal { .. } => {
                (interface.user_message().to_string(), EXIT_INTERNAL)
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(interface.error_class().to_string()),
            message,
            correlation_id: Some(correlation_id),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Everything a workflow command needs: the loaded config and its gateway.
pub struct Workspace {
    pub config: AppConfig,
    pub gateway: Arc<dyn DocumentGateway>,
}

/// Loads config, starts logging, and connects the configured gateway.
pub fn load_workspace(command: &str, options: LoadOptions) -> Result<Workspace, CommandResult> {
    let config = AppConfig::load(options).map_err(|error| {
        CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
    })?;
    crate::init_logging(&config);
    let gateway = sge_client::connect(&config)
        .map_err(|error| CommandResult::from_application_error(command, error))?;
    Ok(Workspace { config, gateway })
}

/// Runs one async workflow on a throwaway current-thread runtime.
pub fn block_on<F: Future>(command: &str, future: F) -> Result<F::Output, CommandResult> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_INTERNAL,
            )
        },
    )?;
    Ok(runtime.block_on(future))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

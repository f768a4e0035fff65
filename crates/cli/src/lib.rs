pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use sge_core::config::{AppConfig, BackendKind, ConfigOverrides, LoadOptions};
use sge_core::domain::approval::ApprovalDecision;
use sge_core::domain::request::{
    DocumentType, Language, ReceptionType, RequestFilter, RequestStatus,
};
use sge_core::domain::user::{Role, UserId};
use sge_core::submission::RequestDraft;

use commands::fulfill::{Decision, FulfillArgs};
use commands::{CommandResult, Workspace, EXIT_INTERNAL};

#[derive(Debug, Parser)]
#[command(
    name = "sge",
    about = "SGE document request CLI",
    long_about = "Submit document requests, decide teacher approvals, and run the staff fulfillment pipeline.",
    after_help = "Examples:\n  sge requests list --status new\n  sge --role teacher --user tch-001 approvals list\n  sge --role administrator fulfill REQ-0003 --out-dir out --upload scan.pdf --decision approve"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to an sge.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Backend to talk to (memory|http)")]
    backend: Option<BackendKind>,
    #[arg(long = "user", global = true, help = "Act as this user id")]
    user_id: Option<String>,
    #[arg(long, global = true, help = "Act with this role")]
    role: Option<Role>,
    #[arg(long, global = true, help = "Base URL of the SGE REST backend")]
    base_url: Option<String>,
    #[arg(long, global = true, help = "Bearer token for the SGE REST backend")]
    api_token: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Approve presence certificates without waiting for teacher approvals"
    )]
    no_approval_gate: bool,
    #[arg(long, global = true, help = "Log level (error|warn|info|debug|trace)")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, backend readiness, and gateway connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(subcommand, about = "List, inspect, and deliver document requests")]
    Requests(RequestsCommand),
    #[command(about = "Submit a new document request")]
    Submit {
        #[arg(long = "type", help = "Document type, e.g. transcript or certificate_presence")]
        document_type: DocumentType,
        #[arg(long, default_value = "fr")]
        language: Language,
        #[arg(long, default_value = "online")]
        reception: ReceptionType,
        #[arg(long = "year", help = "Academic year, e.g. 2025-2026")]
        academic_year: String,
        #[arg(long = "info")]
        additional_info: Option<String>,
        #[arg(long = "teacher", help = "Teacher id; repeat 2 to 5 times for presence certificates")]
        teachers: Vec<String>,
    },
    #[command(subcommand, about = "Teacher approval tasks for presence certificates")]
    Approvals(ApprovalsCommand),
    #[command(about = "Run the staff fulfillment pipeline over one request")]
    Fulfill {
        request_id: String,
        #[arg(long, default_value = ".", help = "Directory for downloaded PDFs")]
        out_dir: PathBuf,
        #[arg(long, help = "Official PDF to upload at step 3")]
        upload: Option<PathBuf>,
        #[arg(long, value_enum, help = "Final decision at step 4")]
        decision: Option<Decision>,
    },
}

#[derive(Debug, Subcommand)]
enum RequestsCommand {
    #[command(about = "List visible requests with status badges")]
    List {
        #[arg(long = "type")]
        document_type: Option<DocumentType>,
        #[arg(long)]
        status: Option<RequestStatus>,
    },
    #[command(about = "Show one request with its history and approvals")]
    Show { request_id: String },
    #[command(about = "Mark a READY request as delivered")]
    Deliver { request_id: String },
}

#[derive(Debug, Subcommand)]
enum ApprovalsCommand {
    #[command(about = "List approval tasks assigned to the current teacher")]
    List,
    #[command(about = "Approve a pending task")]
    Approve { approval_id: String },
    #[command(about = "Reject a pending task")]
    Reject { approval_id: String },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                backend_kind: self.backend,
                base_url: self.base_url.clone(),
                api_token: self.api_token.clone(),
                session_user_id: self.user_id.clone(),
                session_role: self.role,
                enforce_approval_gate: self.no_approval_gate.then_some(false),
                log_level: self.log_level.clone(),
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = execute(cli);

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

pub fn execute(cli: Cli) -> CommandResult {
    let options = cli.load_options();

    match cli.command {
        Command::Doctor { json } => {
            let (output, passed) = commands::doctor::run(options, json);
            CommandResult { exit_code: if passed { 0 } else { 1 }, output }
        }
        Command::Config => commands::config::run(options),
        command => {
            let workspace = match commands::load_workspace(command_name(&command), options) {
                Ok(workspace) => workspace,
                Err(failure) => return failure,
            };
            dispatch(&workspace, command)
        }
    }
}

fn dispatch(workspace: &Workspace, command: Command) -> CommandResult {
    match command {
        Command::Requests(RequestsCommand::List { document_type, status }) => {
            commands::requests::list(workspace, RequestFilter { document_type, status })
        }
        Command::Requests(RequestsCommand::Show { request_id }) => {
            commands::requests::show(workspace, request_id)
        }
        Command::Requests(RequestsCommand::Deliver { request_id }) => {
            commands::requests::deliver(workspace, request_id)
        }
        Command::Submit {
            document_type,
            language,
            reception,
            academic_year,
            additional_info,
            teachers,
        } => {
            let draft = RequestDraft {
                document_type,
                language,
                reception_type: reception,
                academic_year,
                additional_info,
                teachers: teachers.into_iter().map(UserId).collect(),
            };
            commands::submit::run(workspace, draft)
        }
        Command::Approvals(ApprovalsCommand::List) => commands::approvals::list(workspace),
        Command::Approvals(ApprovalsCommand::Approve { approval_id }) => {
            commands::approvals::decide(workspace, approval_id, ApprovalDecision::Approved)
        }
        Command::Approvals(ApprovalsCommand::Reject { approval_id }) => {
            commands::approvals::decide(workspace, approval_id, ApprovalDecision::Rejected)
        }
        Command::Fulfill { request_id, out_dir, upload, decision } => commands::fulfill::run(
            workspace,
            FulfillArgs { request_id, out_dir, upload, decision },
        ),
        Command::Doctor { .. } | Command::Config => CommandResult::failure(
            "sge",
            "internal",
            "doctor and config do not open a workspace",
            EXIT_INTERNAL,
        ),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Doctor { .. } => "doctor",
        Command::Config => "config",
        Command::Requests(_) => "requests",
        Command::Submit { .. } => "submit",
        Command::Approvals(_) => "approvals",
        Command::Fulfill { .. } => "fulfill",
    }
}

/// Logs go to stderr; stdout carries only the command payload.
pub(crate) fn init_logging(config: &AppConfig) {
    use sge_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}

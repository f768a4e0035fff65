use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Serialize;

use sge_client::{FulfillmentOptions, FulfillmentSession};
use sge_core::documents::PdfDocument;
use sge_core::domain::request::{DocumentRequest, DocumentRequestId};
use sge_core::errors::ApplicationError;
use sge_core::flows::{PipelineAction, PipelineState};

use crate::commands::{block_on, CommandResult, Workspace, EXIT_INTERNAL};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Clone, Debug)]
pub struct FulfillArgs {
    pub request_id: String,
    pub out_dir: PathBuf,
    pub upload: Option<PathBuf>,
    pub decision: Option<Decision>,
}

#[derive(Debug, Serialize)]
struct FulfillReport {
    request: DocumentRequest,
    state: PipelineState,
    step: Option<u8>,
    available_actions: Vec<PipelineAction>,
    approve_enabled: bool,
    files: Vec<PathBuf>,
}

enum StepFailure {
    Workflow(ApplicationError),
    Io(String),
}

impl From<ApplicationError> for StepFailure {
    fn from(error: ApplicationError) -> Self {
        Self::Workflow(error)
    }
}

/// Walks one request through the pipeline as far as the arguments allow:
/// download, certificate or skip, then upload and decision when given.
pub fn run(workspace: &Workspace, args: FulfillArgs) -> CommandResult {
    let options = FulfillmentOptions::from_config(&workspace.config);
    let session = workspace.config.session();
    let request_id = DocumentRequestId(args.request_id.clone());

    let outcome = block_on("fulfill", async {
        let mut pipeline =
            FulfillmentSession::open(workspace.gateway.clone(), &session, &request_id, options)
                .await?;
        let mut files = Vec::new();

        let request_pdf = pipeline.download_request_pdf().await?;
        files.push(write_pdf(&args.out_dir, &request_pdf)?);

        if let Some(certificate) = pipeline.prepare_certificate().await? {
            files.push(write_pdf(&args.out_dir, &certificate)?);
        }

        if let Some(path) = &args.upload {
            let bytes = fs::read(path).map_err(|error| {
                StepFailure::Io(format!("failed to read `{}`: {error}", path.display()))
            })?;
            let content_type = mime_guess::from_path(path).first_or_octet_stream();
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document.pdf".to_string());
            let document = pipeline.prepare_upload(file_name, content_type.essence_str(), bytes)?;
            pipeline.upload_official_document(&document).await?;
        }

        match args.decision {
            Some(Decision::Approve) => {
                pipeline.approve().await?;
            }
            Some(Decision::Reject) => {
                pipeline.reject().await?;
            }
            None => {}
        }

        Ok::<_, StepFailure>(FulfillReport {
            request: pipeline.request().clone(),
            state: pipeline.state(),
            step: pipeline.state().step(),
            available_actions: pipeline.available_actions(),
            approve_enabled: pipeline.approve_enabled(),
            files,
        })
    });

    match outcome {
        Ok(Ok(report)) => {
            let message = match report.step {
                Some(step) => format!("request {} waiting on step {step}", report.request.id),
                None => format!("request {} is now {}", report.request.id, report.request.status),
            };
            CommandResult::success_with_data("fulfill", message, report)
        }
        Ok(Err(StepFailure::Workflow(error))) => {
            CommandResult::from_application_error("fulfill", error)
        }
        Ok(Err(StepFailure::Io(message))) => {
            CommandResult::failure("fulfill", "io", message, EXIT_INTERNAL)
        }
        Err(failure) => failure,
    }
}

fn write_pdf(out_dir: &Path, document: &PdfDocument) -> Result<PathBuf, StepFailure> {
    fs::create_dir_all(out_dir).map_err(|error| {
        StepFailure::Io(format!("failed to create `{}`: {error}", out_dir.display()))
    })?;
    let path = out_dir.join(&document.file_name);
    fs::write(&path, &document.bytes).map_err(|error| {
        StepFailure::Io(format!("failed to write `{}`: {error}", path.display()))
    })?;
    Ok(path)
}

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{DiagnosticSink, FormElements, SelectedFile, SubmitError, SubmitHandler};
use serde_json::Value;
use shared::domain::SubmissionId;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Submits a file and a subject name to a `/process` endpoint, the way the
/// upload page does.
#[derive(Parser, Debug)]
struct Args {
    /// Server origin.
    #[arg(long, env = "UPLOADER_SERVER_URL")]
    server_url: String,
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long, default_value = "")]
    subject_name: String,
    /// Number of back-to-back submit events to fire.
    #[arg(long, default_value_t = 1)]
    submits: u16,
}

/// Prints responses to stdout and failures to stderr.
struct ConsoleSink;

impl DiagnosticSink for ConsoleSink {
    fn log(&self, submission_id: SubmissionId, value: &Value) {
        let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        println!("[{submission_id}] {rendered}");
    }

    fn error(&self, submission_id: SubmissionId, error: &SubmitError) {
        eprintln!("[{submission_id}] {error}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();

    let form = FormElements::new();
    if let Some(path) = &args.file {
        form.file_input.select(SelectedFile::from_path(path));
    }
    form.subject_name.set_value(args.subject_name);

    let handler = SubmitHandler::new(&args.server_url, form)?.with_sink(Arc::new(ConsoleSink));
    info!(endpoint = %handler.endpoint(), submits = args.submits, "uploader: submitting");

    let mut tasks = Vec::new();
    for _ in 0..args.submits {
        let mut event = handler.form().submit_event();
        tasks.extend(handler.on_submit(&mut event));
    }

    for result in futures::future::join_all(tasks).await {
        result.context("submit task panicked")?;
    }

    Ok(())
}

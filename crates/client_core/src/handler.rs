use std::sync::Arc;

use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde_json::Value;
use shared::{
    domain::SubmissionId,
    protocol::{FILE_FIELD, PROCESS_ROUTE, SUBJECT_NAME_FIELD},
};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::{
    diagnostics::{DiagnosticSink, TracingSink},
    error::SubmitError,
    form::{FormElements, Submission, SubmitEvent},
};

/// Posts the bound form to `/process` on every submit event.
pub struct SubmitHandler {
    http: Client,
    endpoint: Url,
    form: FormElements,
    sink: Arc<dyn DiagnosticSink>,
}

impl SubmitHandler {
    pub fn new(server_url: &str, form: FormElements) -> Result<Self, SubmitError> {
        Ok(Self {
            http: Client::new(),
            endpoint: process_endpoint(server_url)?,
            form,
            sink: Arc::new(TracingSink),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn form(&self) -> &FormElements {
        &self.form
    }

    /// Handles one submit event. Events aimed at another form are left
    /// untouched and `None` is returned. Otherwise the default action is
    /// prevented, the form is read, and the request runs on a spawned task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_submit(&self, event: &mut SubmitEvent) -> Option<JoinHandle<()>> {
        if event.target_id() != self.form.form_id {
            return None;
        }
        event.prevent_default();

        let submission = Submission::capture(&self.form);
        let submission_id = SubmissionId::new();
        debug!(
            %submission_id,
            has_file = submission.file.is_some(),
            subject_name = %submission.subject_name,
            "submit: intercepted"
        );

        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let sink = Arc::clone(&self.sink);
        Some(tokio::spawn(async move {
            run(&http, &endpoint, sink.as_ref(), submission_id, submission).await;
        }))
    }

    /// Sends one submission and returns the parsed JSON reply.
    pub async fn dispatch(&self, submission: Submission) -> Result<Value, SubmitError> {
        post_submission(&self.http, &self.endpoint, submission).await
    }
}

fn process_endpoint(server_url: &str) -> Result<Url, SubmitError> {
    Url::parse(server_url)
        .and_then(|base| base.join(PROCESS_ROUTE))
        .map_err(|source| SubmitError::InvalidEndpoint {
            base: server_url.to_string(),
            source,
        })
}

async fn run(
    http: &Client,
    endpoint: &Url,
    sink: &dyn DiagnosticSink,
    submission_id: SubmissionId,
    submission: Submission,
) {
    info!(%submission_id, %endpoint, "submit: dispatching");
    match post_submission(http, endpoint, submission).await {
        Ok(value) => sink.log(submission_id, &value),
        Err(error) => sink.error(submission_id, &error),
    }
}

async fn build_form(submission: Submission) -> Result<Form, SubmitError> {
    let mut form = Form::new();
    if let Some(file) = submission.file {
        let bytes = file.read().await?;
        let mut part = Part::bytes(bytes).file_name(file.name);
        if let Some(mime_type) = file.mime_type {
            part = part
                .mime_str(&mime_type)
                .map_err(|source| SubmitError::InvalidMimeType { mime_type, source })?;
        }
        form = form.part(FILE_FIELD, part);
    }
    Ok(form.text(SUBJECT_NAME_FIELD, submission.subject_name))
}

async fn post_submission(
    http: &Client,
    endpoint: &Url,
    submission: Submission,
) -> Result<Value, SubmitError> {
    let form = build_form(submission).await?;
    let transport = |source: reqwest::Error| SubmitError::Transport {
        url: endpoint.to_string(),
        source,
    };

    let response = http
        .post(endpoint.clone())
        .multipart(form)
        .send()
        .await
        .map_err(transport)?;
    let status = response.status();
    let body = response.bytes().await.map_err(transport)?;
    debug!(%endpoint, %status, body_len = body.len(), "submit: response body read");

    serde_json::from_slice(&body).map_err(|source| SubmitError::Decode {
        url: endpoint.to_string(),
        status: status.as_u16(),
        source,
    })
}

#[cfg(test)]
#[path = "tests/handler_tests.rs"]
mod tests;

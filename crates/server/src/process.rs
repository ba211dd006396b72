use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use shared::{
    domain::has_allowed_extension,
    error::{ApiError, ApiException, ErrorCode},
    protocol::{ProcessResponse, FILE_FIELD, SUBJECT_NAME_FIELD},
};
use tracing::{error, info};

use crate::{
    app_state::AppState,
    attendance::{process_workbook, AttendanceError, AttendanceReport, OUTPUT_FILE},
};

const MISSING_FIELDS: &str = "File or subject name missing";
const INVALID_FILE_TYPE: &str = "Invalid file type";
const MAX_FILENAME_BYTES: usize = 255;
const SPREADSHEET_EXTENSION: &str = "xlsx";

type Rejection = (StatusCode, Json<ApiError>);

#[derive(Debug, Default)]
struct ProcessForm {
    file: Option<UploadedFile>,
    subject_name: Option<String>,
}

#[derive(Debug)]
struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
}

fn reject(status: StatusCode, exception: ApiException) -> Rejection {
    (status, Json(exception.into()))
}

fn multipart_rejection(error: MultipartError) -> Rejection {
    let status = error.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorCode::PayloadTooLarge
    } else {
        ErrorCode::Validation
    };
    (
        status,
        Json(ApiError::new(
            code,
            format!("failed to read multipart body: {}", error.body_text()),
        )),
    )
}

async fn read_process_form(mut multipart: Multipart) -> Result<ProcessForm, Rejection> {
    let mut form = ProcessForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_rejection)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FILE_FIELD => {
                // A part without a filename is a plain text field, not an upload.
                let Some(filename) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let bytes = field.bytes().await.map_err(multipart_rejection)?;
                form.file = Some(UploadedFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            SUBJECT_NAME_FIELD => {
                form.subject_name = Some(field.text().await.map_err(multipart_rejection)?);
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Reduces a client supplied name to a bare file name with an accepted
/// extension.
pub(crate) fn validate_filename(raw: &str) -> Result<String, ApiException> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty()
        || name.contains("..")
        || name.len() > MAX_FILENAME_BYTES
        || !has_allowed_extension(name)
    {
        return Err(ApiException::validation(INVALID_FILE_TYPE));
    }

    Ok(name.to_string())
}

fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn attendance_rejection(error: AttendanceError) -> Rejection {
    match error {
        AttendanceError::Read(e) => {
            info!(error = %e, "process: workbook could not be parsed");
            reject(
                StatusCode::BAD_REQUEST,
                ApiException::validation(AttendanceError::NoData.to_string()),
            )
        }
        AttendanceError::NoData | AttendanceError::SubjectNotFound(_) => reject(
            StatusCode::BAD_REQUEST,
            ApiException::validation(error.to_string()),
        ),
        AttendanceError::Write(e) => {
            error!(error = %e, "process: failed to render report workbook");
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiException::internal("failed to create report workbook"),
            )
        }
    }
}

async fn highlight_attendance(
    bytes: Vec<u8>,
    subject_name: String,
) -> Result<AttendanceReport, Rejection> {
    tokio::task::spawn_blocking(move || process_workbook(&bytes, &subject_name))
        .await
        .map_err(|e| {
            error!(error = %e, "process: attendance task failed");
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiException::internal("attendance processing failed"),
            )
        })?
        .map_err(attendance_rejection)
}

pub(crate) async fn process_upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, Rejection> {
    let form = read_process_form(multipart).await?;
    let (Some(file), Some(subject_name)) = (form.file, form.subject_name) else {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            ApiException::validation(MISSING_FIELDS),
        ));
    };

    let filename = validate_filename(&file.filename)
        .map_err(|exception| reject(StatusCode::BAD_REQUEST, exception))?;
    let subject_name = subject_name.to_lowercase();

    let path = state.upload_dir.join(&filename);
    tokio::fs::write(&path, &file.bytes).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "process: failed to store upload");
        reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiException::internal(format!("failed to store {filename}")),
        )
    })?;
    info!(
        %filename,
        %subject_name,
        size_bytes = file.bytes.len(),
        "process: upload stored"
    );

    let extension = extension_of(&filename);
    if extension != SPREADSHEET_EXTENSION {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            ApiException::validation(format!(
                "Table extraction from .{extension} uploads is not supported"
            )),
        ));
    }

    let report = highlight_attendance(file.bytes, subject_name.clone()).await?;

    let output_path = state.output_dir.join(OUTPUT_FILE);
    tokio::fs::write(&output_path, &report.workbook)
        .await
        .map_err(|e| {
            error!(path = %output_path.display(), error = %e, "process: failed to write report");
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiException::internal(format!("failed to write {OUTPUT_FILE}")),
            )
        })?;

    info!(
        %subject_name,
        subject_column = report.subject_column,
        highlighted = report.highlighted_rows.len(),
        "process: attendance report written"
    );
    Ok(Json(ProcessResponse::completed(OUTPUT_FILE)))
}

#[cfg(test)]
#[path = "tests/process_tests.rs"]
mod tests;

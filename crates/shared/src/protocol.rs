use serde::{Deserialize, Serialize};

/// Path the submit handler posts to, relative to the server origin.
pub const PROCESS_ROUTE: &str = "/process";

/// Multipart part carrying the selected file.
pub const FILE_FIELD: &str = "file";

/// Multipart part carrying the subject text.
pub const SUBJECT_NAME_FIELD: &str = "subjectName";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub message: String,
}

impl ProcessResponse {
    /// Reply once the highlighted workbook has been written.
    pub fn completed(output_file: &str) -> Self {
        Self {
            message: format!("Highlighting and chart creation completed. Check {output_file}"),
        }
    }
}

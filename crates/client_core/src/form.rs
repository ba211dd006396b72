use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::error::SubmitError;

pub const FILE_FORM_ID: &str = "file-form";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Memory(Vec<u8>),
    /// Read when the submission is dispatched, not when it is selected.
    Path(PathBuf),
}

/// One entry of a file picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub source: FileSource,
}

impl SelectedFile {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        Self {
            mime_type: guess_mime_type(&name),
            name,
            source: FileSource::Memory(bytes.into()),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            mime_type: guess_mime_type(&name),
            name,
            source: FileSource::Path(path.to_path_buf()),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub(crate) async fn read(&self) -> Result<Vec<u8>, SubmitError> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.clone()),
            FileSource::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| SubmitError::ReadFile {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

fn guess_mime_type(name: &str) -> Option<String> {
    mime_guess::from_path(name)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

/// Handle to a text input. Clones observe the same value.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    value: Arc<Mutex<String>>,
}

impl TextInput {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Arc::new(Mutex::new(value.into())),
        }
    }

    pub fn value(&self) -> String {
        lock(&self.value).clone()
    }

    pub fn set_value(&self, value: impl Into<String>) {
        *lock(&self.value) = value.into();
    }
}

/// Handle to a file picker. Clones observe the same selection.
#[derive(Debug, Clone, Default)]
pub struct FileInput {
    files: Arc<Mutex<Vec<SelectedFile>>>,
}

impl FileInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, file: SelectedFile) {
        self.set_files(vec![file]);
    }

    pub fn set_files(&self, files: Vec<SelectedFile>) {
        *lock(&self.files) = files;
    }

    pub fn clear(&self) {
        lock(&self.files).clear();
    }

    pub fn files(&self) -> Vec<SelectedFile> {
        lock(&self.files).clone()
    }

    pub fn first(&self) -> Option<SelectedFile> {
        lock(&self.files).first().cloned()
    }
}

/// The form and the two inputs a submit handler reads from.
#[derive(Debug, Clone)]
pub struct FormElements {
    pub form_id: String,
    pub file_input: FileInput,
    pub subject_name: TextInput,
}

impl FormElements {
    pub fn new() -> Self {
        Self::with_form_id(FILE_FORM_ID)
    }

    pub fn with_form_id(form_id: impl Into<String>) -> Self {
        Self {
            form_id: form_id.into(),
            file_input: FileInput::new(),
            subject_name: TextInput::default(),
        }
    }

    /// A submit event aimed at this form.
    pub fn submit_event(&self) -> SubmitEvent {
        SubmitEvent::new(self.form_id.clone())
    }
}

impl Default for FormElements {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitEvent {
    target_id: String,
    default_prevented: bool,
}

impl SubmitEvent {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            default_prevented: false,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Cancels the native navigation that would follow the submit.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Form state captured at submit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub file: Option<SelectedFile>,
    pub subject_name: String,
}

impl Submission {
    pub fn new(file: Option<SelectedFile>, subject_name: impl Into<String>) -> Self {
        Self {
            file,
            subject_name: subject_name.into(),
        }
    }

    /// Reads the first selected file and the current subject text.
    pub fn capture(form: &FormElements) -> Self {
        Self {
            file: form.file_input.first(),
            subject_name: form.subject_name.value(),
        }
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;

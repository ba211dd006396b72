//! Client side of the subject upload flow.
//!
//! A [`SubmitHandler`] is bound to explicit [`FormElements`]. Each
//! [`SubmitEvent`] aimed at that form is intercepted, the current file and
//! subject name are packed into a multipart body and posted to `/process`,
//! and the JSON reply (or the failure) is handed to a [`DiagnosticSink`].

pub mod diagnostics;
pub mod error;
pub mod form;
mod handler;

pub use diagnostics::{DiagnosticSink, TracingSink};
pub use error::SubmitError;
pub use form::{
    FileInput, FileSource, FormElements, SelectedFile, Submission, SubmitEvent, TextInput,
    FILE_FORM_ID,
};
pub use handler::SubmitHandler;

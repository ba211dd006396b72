use std::path::PathBuf;

#[derive(Debug, Clone)]
pub(crate) struct AppState {
    pub(crate) upload_dir: PathBuf,
    pub(crate) output_dir: PathBuf,
}

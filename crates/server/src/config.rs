use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub upload_dir: PathBuf,
    /// Where the highlighted attendance workbook is written.
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5000".into(),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("."),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Keys accepted in `server.toml`.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind_addr: Option<String>,
    upload_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    max_upload_bytes: Option<usize>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file_config(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<FileConfig>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(error) => {
            warn!(%error, "ignoring unreadable server.toml");
            return;
        }
    };

    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.upload_dir {
        settings.upload_dir = v;
    }
    if let Some(v) = file_cfg.output_dir {
        settings.output_dir = v;
    }
    if let Some(v) = file_cfg.max_upload_bytes {
        settings.max_upload_bytes = v;
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = lookup("UPLOAD_DIR") {
        settings.upload_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("APP__UPLOAD_DIR") {
        settings.upload_dir = PathBuf::from(v);
    }

    if let Some(v) = lookup("OUTPUT_DIR") {
        settings.output_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("APP__OUTPUT_DIR") {
        settings.output_dir = PathBuf::from(v);
    }

    if let Some(v) = lookup("APP__MAX_UPLOAD_BYTES") {
        match v.parse::<usize>() {
            Ok(parsed) => settings.max_upload_bytes = parsed,
            Err(error) => warn!(value = %v, %error, "ignoring invalid APP__MAX_UPLOAD_BYTES"),
        }
    }
}

pub fn prepare_upload_dir(upload_dir: &Path) -> anyhow::Result<PathBuf> {
    prepare_dir(upload_dir, &Settings::default().upload_dir, "upload")
}

pub fn prepare_output_dir(output_dir: &Path) -> anyhow::Result<PathBuf> {
    prepare_dir(output_dir, &Settings::default().output_dir, "output")
}

fn prepare_dir(dir: &Path, fallback: &Path, kind: &str) -> anyhow::Result<PathBuf> {
    let dir = if dir.as_os_str().is_empty() {
        fallback.to_path_buf()
    } else {
        dir.to_path_buf()
    };

    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {kind} directory '{}'", dir.display()))?;

    Ok(dir)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

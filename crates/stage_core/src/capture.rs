//! Still capture through an external camera command.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local};

use crate::config::CaptureConfig;
use crate::error::CaptureError;

/// Produces one image file per call.
pub trait Camera {
    fn capture(&self) -> Result<PathBuf, CaptureError>;
}

/// Runs `libcamera-jpeg` (or a compatible tool) once per capture.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    config: CaptureConfig,
}

impl CommandCamera {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    fn args(&self, output: &Path) -> Vec<String> {
        let cfg = &self.config;
        let mut args = Vec::with_capacity(9);
        if cfg.no_preview {
            args.push("-n".to_string());
        }
        args.push("-o".to_string());
        args.push(output.to_string_lossy().into_owned());
        args.push("-t".to_string());
        args.push(cfg.delay_ms.to_string());
        args.push("--width".to_string());
        args.push(cfg.width.to_string());
        args.push("--height".to_string());
        args.push(cfg.height.to_string());
        args
    }
}

impl Camera for CommandCamera {
    fn capture(&self) -> Result<PathBuf, CaptureError> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir).map_err(|source| CaptureError::Io {
            path: dir.clone(),
            source,
        })?;
        let output = next_capture_path(dir, &self.config.file_prefix, Local::now());

        tracing::info!("capturando {} con {}", output.display(), self.config.tool);
        let result = Command::new(&self.config.tool)
            .args(self.args(&output))
            .output();
        let out = match result {
            Ok(out) => out,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CaptureError::ToolMissing {
                    tool: self.config.tool.clone(),
                });
            }
            Err(source) => {
                return Err(CaptureError::Io {
                    path: PathBuf::from(&self.config.tool),
                    source,
                });
            }
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(CaptureError::ProcessFailed {
                tool: self.config.tool.clone(),
                status: out.status.to_string(),
                stderr,
            });
        }
        Ok(output)
    }
}

/// `<dir>/<prefix>_YYYYmmdd_HHMMSS.jpg`, with a numeric suffix when a file
/// from the same second already exists.
pub fn next_capture_path(dir: &Path, prefix: &str, now: DateTime<Local>) -> PathBuf {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let first = dir.join(format!("{prefix}_{stamp}.jpg"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| dir.join(format!("{prefix}_{stamp}_{n}.jpg")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

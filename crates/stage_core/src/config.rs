use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration, usually read from `etapas.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub classifier: ClassifierConfig,
    pub display: DisplayConfig,
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Parse a TOML file. Unset keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`AppConfig::from_file`], but a missing file means defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("{} no existe; usando configuración por defecto", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }
}

/// Arguments for the external still-capture command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub tool: String,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub width: u32,
    pub height: u32,
    pub delay_ms: u64,
    pub no_preview: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tool: "libcamera-jpeg".to_string(),
            output_dir: PathBuf::from("fotos_campo"),
            file_prefix: "captura".to_string(),
            width: 1280,
            height: 960,
            delay_ms: 200,
            no_preview: true,
        }
    }
}

/// Model location and input transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    /// Shorter side after the first resize.
    pub resize: u32,
    /// Side of the square center crop fed to the network.
    pub crop: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    /// Labels in model output order.
    pub labels: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/G19.onnx"),
            resize: 256,
            crop: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            // ImageFolder ordering used at training time.
            labels: ["R5", "R6", "R7", "R8", "R9", "V1", "V2", "V3", "V4"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub debounce_ms: u64,
    /// Bounds smaller than this on either side are not rendered into.
    pub min_side: u32,
    /// Subtracted from the display area width and height before fitting.
    pub padding: u32,
    /// The field camera is mounted sideways.
    pub rotate_clockwise: bool,
    /// Box used for the first display when the area is not laid out yet.
    pub fallback: [u32; 2],
}

impl DisplayConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            min_side: 10,
            padding: 10,
            rotate_clockwise: true,
            fallback: [160, 240],
        }
    }
}

/// What happens to the captured file when the operator clears the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    #[default]
    Keep,
    Delete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub on_clear: RetentionPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_other_defaults() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("etapas.toml");
        fs::write(
            &path,
            r#"
[capture]
output_dir = "/tmp/fotos"
width = 640
height = 480

[retention]
on_clear = "delete"
"#,
        )?;

        let cfg = AppConfig::from_file(&path)?;
        assert_eq!(cfg.capture.output_dir, PathBuf::from("/tmp/fotos"));
        assert_eq!(cfg.capture.width, 640);
        assert_eq!(cfg.capture.tool, "libcamera-jpeg");
        assert_eq!(cfg.retention.on_clear, RetentionPolicy::Delete);
        assert_eq!(cfg.display, DisplayConfig::default());
        assert_eq!(cfg.classifier.labels.len(), 9);
        Ok(())
    }

    #[test]
    fn missing_file_means_defaults() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let cfg = AppConfig::load_or_default(dir.path().join("nope.toml"))?;
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.display.debounce(), Duration::from_millis(250));
        Ok(())
    }

    #[test]
    fn malformed_file_is_a_parse_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("etapas.toml");
        fs::write(&path, "[display\ndebounce_ms = ")?;
        let err = AppConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        Ok(())
    }
}

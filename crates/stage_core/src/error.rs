use std::path::PathBuf;

use thiserror::Error;

/// Failure of the external camera capture command.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture tool is not installed or not on `PATH`.
    #[error("{tool} no encontrado")]
    ToolMissing { tool: String },
    /// The capture tool ran but exited unsuccessfully.
    #[error("{tool} terminó con {status}: {stderr}")]
    ProcessFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    /// The capture tool could not be started for another reason, or the
    /// output directory could not be prepared.
    #[error("no se pudo preparar {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to turn the captured file into a displayable image.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("no se pudo decodificar {}: {source}", .path.display())]
    DecodeFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Anything that goes wrong inside the classifier boundary.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("inferencia fallida: {0}")]
    InferenceFailed(String),
    #[error("el modelo devolvió el índice {index} pero sólo hay {labels} etiquetas")]
    UnknownIndex { index: usize, labels: usize },
}

impl From<anyhow::Error> for ClassificationError {
    fn from(err: anyhow::Error) -> Self {
        ClassificationError::InferenceFailed(format!("{err:#}"))
    }
}

/// Errors raised while reading the TOML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no se pudo leer {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuración inválida en {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Fatal startup error: the application cannot run without its model.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("modelo no encontrado: {}", .0.display())]
    Missing(PathBuf),
    #[error("la lista de etiquetas está vacía")]
    NoLabels,
    #[error("este binario se compiló sin soporte de ONNX Runtime (feature `ort`)")]
    BackendUnavailable,
    #[error("no se pudo cargar el modelo: {0}")]
    Backend(String),
}

/// A label outside the fixed growth-stage set. Never fatal: callers fall
/// back to [`crate::StageInfo::not_found`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("etapa desconocida: {0}")]
pub struct LookupMiss(pub String);

//! Core of the bean growth-stage field classifier: camera capture, model
//! seam, stage descriptions, resize-aware display and the workflow that
//! ties them together. The GUI crate only drives these types.

pub mod capture;
pub mod classifier;
pub mod config;
pub mod display;
pub mod error;
#[cfg(feature = "ort")]
pub mod onnx;
pub mod stages;
pub mod workflow;

pub use capture::{Camera, CommandCamera};
pub use classifier::{Prediction, StageClassifier, load_classifier};
pub use config::{AppConfig, RetentionPolicy};
pub use display::{Bounds, Debouncer, ResponsiveDisplay, fit_within};
pub use error::{
    CaptureError, ClassificationError, ConfigError, DisplayError, LookupMiss, ModelLoadError,
};
pub use stages::{GrowthStage, StageInfo, describe};
pub use workflow::{CapturedImage, FailedStage, StageOutcome, Workflow, WorkflowState};

//! Capture → display → classify state machine driven by one UI thread.
//!
//! The front end calls [`Workflow::trigger`] on the capture button and then
//! [`Workflow::step`] once per frame while [`Workflow::is_busy`] holds, so
//! the status of each stage is painted before that stage blocks.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::capture::Camera;
use crate::classifier::{Prediction, StageClassifier};
use crate::config::{AppConfig, RetentionPolicy};
use crate::display::ResponsiveDisplay;
use crate::error::{CaptureError, ClassificationError, DisplayError};
use crate::stages::{StageInfo, describe};

pub const STATUS_IDLE: &str = "Esperando acción...";
pub const STATUS_CAPTURING: &str = "Capturando imagen...";
pub const STATUS_CLASSIFYING: &str = "Clasificando...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Capturing,
    Displaying,
    Classifying,
    Result,
    Error,
}

/// Which boundary failed, so the operator knows what to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Capture,
    Display,
    Classification,
}

/// The photo produced by the current action.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub path: PathBuf,
    pub image: DynamicImage,
}

/// Classification shown to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub prediction: Prediction,
    pub info: StageInfo,
}

impl StageOutcome {
    pub fn heading(&self) -> String {
        format!("Etapa: {}", self.prediction.label)
    }
}

pub struct Workflow {
    camera: Box<dyn Camera>,
    classifier: Box<dyn StageClassifier>,
    retention: RetentionPolicy,
    display: ResponsiveDisplay,
    state: WorkflowState,
    captured: Option<CapturedImage>,
    /// File written by a capture that could not be decoded.
    pending_path: Option<PathBuf>,
    failed: Option<FailedStage>,
    outcome: Option<StageOutcome>,
    status: String,
}

impl Workflow {
    pub fn new(
        camera: Box<dyn Camera>,
        classifier: Box<dyn StageClassifier>,
        config: &AppConfig,
    ) -> Self {
        Self {
            camera,
            classifier,
            retention: config.retention.on_clear,
            display: ResponsiveDisplay::new(config.display.clone()),
            state: WorkflowState::Idle,
            captured: None,
            pending_path: None,
            failed: None,
            outcome: None,
            status: STATUS_IDLE.to_string(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn outcome(&self) -> Option<&StageOutcome> {
        self.outcome.as_ref()
    }

    pub fn captured(&self) -> Option<&CapturedImage> {
        self.captured.as_ref()
    }

    pub fn failed_stage(&self) -> Option<FailedStage> {
        self.failed
    }

    pub fn display(&self) -> &ResponsiveDisplay {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut ResponsiveDisplay {
        &mut self.display
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            WorkflowState::Capturing | WorkflowState::Displaying | WorkflowState::Classifying
        )
    }

    /// The capture button. Disabled while busy and after a result, until
    /// the result is cleared.
    pub fn can_trigger(&self) -> bool {
        matches!(self.state, WorkflowState::Idle | WorkflowState::Error)
    }

    pub fn can_clear(&self) -> bool {
        match self.state {
            WorkflowState::Result => true,
            WorkflowState::Error => self.captured.is_some(),
            _ => false,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.state == WorkflowState::Error
            && self.failed == Some(FailedStage::Classification)
            && self.captured.is_some()
    }

    /// Start a capture. Ignored unless [`Self::can_trigger`].
    pub fn trigger(&mut self) -> bool {
        if !self.can_trigger() {
            tracing::debug!("captura ignorada en estado {:?}", self.state);
            return false;
        }
        self.discard_capture();
        self.display.clear();
        self.outcome = None;
        self.failed = None;
        self.enter(WorkflowState::Capturing, STATUS_CAPTURING);
        true
    }

    /// Classify the retained photo again after a classification failure.
    pub fn retry_classification(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.failed = None;
        self.enter(WorkflowState::Classifying, STATUS_CLASSIFYING);
        true
    }

    /// Perform the blocking work of the current state and move on.
    pub fn step(&mut self) {
        match self.state {
            WorkflowState::Capturing => match self.camera.capture() {
                Ok(path) => match decode(&path) {
                    Ok(image) => {
                        self.captured = Some(CapturedImage { path, image });
                        self.state = WorkflowState::Displaying;
                        tracing::info!("estado: {:?}", self.state);
                    }
                    Err(err) => {
                        self.pending_path = Some(path);
                        self.fail(FailedStage::Display, format!("Error mostrar imagen: {err}"));
                    }
                },
                Err(err) => self.fail_capture(err),
            },
            WorkflowState::Displaying => {
                let Some(captured) = &self.captured else {
                    self.fail(FailedStage::Display, "Error mostrar imagen: sin imagen".into());
                    return;
                };
                self.display.show(captured.image.clone());
                self.enter(WorkflowState::Classifying, STATUS_CLASSIFYING);
            }
            WorkflowState::Classifying => {
                let Some(captured) = &self.captured else {
                    self.fail(FailedStage::Classification, "Error clasificar: sin imagen".into());
                    return;
                };
                // A panicking backend must not take the UI thread down with it.
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.classifier.classify(&captured.image)
                }))
                .unwrap_or_else(|payload| {
                    Err(ClassificationError::InferenceFailed(panic_message(payload.as_ref())))
                });
                match result {
                    Ok(prediction) => self.finish(prediction),
                    Err(err) => self.fail_classification(err),
                }
            }
            WorkflowState::Idle | WorkflowState::Result | WorkflowState::Error => {}
        }
    }

    /// Step until the action settles in Idle, Result or Error.
    pub fn run_to_completion(&mut self) -> WorkflowState {
        while self.is_busy() {
            self.step();
        }
        self.state
    }

    /// Discard the photo and result and show the placeholder again.
    /// Returns false if there was nothing to reset.
    pub fn clear(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        let had_something = self.state != WorkflowState::Idle
            || self.captured.is_some()
            || !self.display.is_placeholder();
        if !had_something {
            return false;
        }
        self.discard_capture();
        self.display.clear();
        self.outcome = None;
        self.failed = None;
        self.enter(WorkflowState::Idle, STATUS_IDLE);
        true
    }

    fn finish(&mut self, prediction: Prediction) {
        tracing::info!(
            "predicción {} ({:.1}%)",
            prediction.label,
            prediction.confidence * 100.0
        );
        let info = describe(&prediction.label);
        self.status = info.description.clone();
        self.outcome = Some(StageOutcome { prediction, info });
        self.state = WorkflowState::Result;
    }

    fn fail_capture(&mut self, err: CaptureError) {
        let msg = match &err {
            CaptureError::ToolMissing { tool } => format!("Error: {tool} no encontrado."),
            other => format!("Error captura: {other}"),
        };
        self.fail(FailedStage::Capture, msg);
    }

    fn fail_classification(&mut self, err: ClassificationError) {
        self.fail(FailedStage::Classification, format!("Error clasificar: {err}"));
    }

    fn fail(&mut self, stage: FailedStage, message: String) {
        tracing::warn!("{message}");
        self.failed = Some(stage);
        self.status = message;
        self.state = WorkflowState::Error;
    }

    fn enter(&mut self, state: WorkflowState, status: &str) {
        tracing::info!("estado: {state:?}");
        self.state = state;
        self.status = status.to_string();
    }

    fn discard_capture(&mut self) {
        let path = self
            .captured
            .take()
            .map(|c| c.path)
            .or_else(|| self.pending_path.take());
        self.pending_path = None;
        if self.retention == RetentionPolicy::Delete
            && let Some(path) = path
        {
            remove_capture(&path);
        }
    }
}

fn decode(path: &Path) -> Result<DynamicImage, DisplayError> {
    image::open(path).map_err(|source| DisplayError::DecodeFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("pánico en el clasificador: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("pánico en el clasificador: {msg}")
    } else {
        "pánico en el clasificador".to_string()
    }
}

fn remove_capture(path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => tracing::info!("captura eliminada: {}", path.display()),
        Err(e) => tracing::warn!("no se pudo eliminar {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CommandCamera;
    use crate::config::{CaptureConfig, DisplayConfig, RetentionConfig};
    use image::{Rgb, RgbImage};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use tempfile::{TempDir, tempdir};

    /// Writes a real PNG, or fails with the queued error.
    struct FakeCamera {
        dir: PathBuf,
        failures: RefCell<VecDeque<CaptureError>>,
        shots: Cell<u32>,
        garbage: bool,
    }

    impl FakeCamera {
        fn new(dir: &Path) -> Self {
            Self {
                dir: dir.to_path_buf(),
                failures: RefCell::new(VecDeque::new()),
                shots: Cell::new(0),
                garbage: false,
            }
        }
    }

    impl Camera for FakeCamera {
        fn capture(&self) -> Result<PathBuf, CaptureError> {
            if let Some(err) = self.failures.borrow_mut().pop_front() {
                return Err(err);
            }
            let n = self.shots.get() + 1;
            self.shots.set(n);
            let path = self.dir.join(format!("captura_{n}.png"));
            if self.garbage {
                fs::write(&path, b"not an image").map_err(|source| CaptureError::Io {
                    path: path.clone(),
                    source,
                })?;
            } else {
                RgbImage::from_pixel(64, 48, Rgb([30, 160, 30]))
                    .save(&path)
                    .map_err(|e| CaptureError::Io {
                        path: path.clone(),
                        source: std::io::Error::other(e),
                    })?;
            }
            Ok(path)
        }
    }

    /// Returns queued answers; records how often it was asked.
    struct FakeClassifier {
        answers: RefCell<VecDeque<Result<&'static str, &'static str>>>,
        calls: Rc<Cell<u32>>,
    }

    impl FakeClassifier {
        fn new(answers: Vec<Result<&'static str, &'static str>>) -> Self {
            Self {
                answers: RefCell::new(answers.into()),
                calls: Rc::new(Cell::new(0)),
            }
        }
    }

    impl StageClassifier for FakeClassifier {
        fn classify(&self, _image: &DynamicImage) -> Result<Prediction, ClassificationError> {
            self.calls.set(self.calls.get() + 1);
            match self.answers.borrow_mut().pop_front() {
                Some(Ok(label)) => Ok(Prediction {
                    label: label.to_string(),
                    confidence: 0.9,
                }),
                Some(Err(msg)) => Err(ClassificationError::InferenceFailed(msg.to_string())),
                None => Err(ClassificationError::InferenceFailed("sin respuesta".into())),
            }
        }
    }

    struct PanickingClassifier;

    impl StageClassifier for PanickingClassifier {
        fn classify(&self, _image: &DynamicImage) -> Result<Prediction, ClassificationError> {
            panic!("índice fuera de rango")
        }
    }

    fn config(retention: RetentionPolicy) -> AppConfig {
        AppConfig {
            display: DisplayConfig {
                rotate_clockwise: false,
                ..DisplayConfig::default()
            },
            retention: RetentionConfig {
                on_clear: retention,
            },
            ..AppConfig::default()
        }
    }

    fn workflow_with(
        camera: FakeCamera,
        answers: Vec<Result<&'static str, &'static str>>,
    ) -> Workflow {
        Workflow::new(
            Box::new(camera),
            Box::new(FakeClassifier::new(answers)),
            &config(RetentionPolicy::Keep),
        )
    }

    fn assert_image_invariant(wf: &Workflow) {
        let holds_image = matches!(
            wf.state(),
            WorkflowState::Displaying | WorkflowState::Classifying | WorkflowState::Result
        ) || wf.failed_stage() == Some(FailedStage::Classification);
        assert_eq!(wf.captured().is_some(), holds_image, "state {:?}", wf.state());
    }

    fn setup() -> (TempDir, FakeCamera) {
        let dir = tempdir().unwrap();
        let cam = FakeCamera::new(dir.path());
        (dir, cam)
    }

    #[test]
    fn successful_run_ends_in_result_with_r5_text() {
        let (_dir, cam) = setup();
        let mut wf = workflow_with(cam, vec![Ok("R5")]);
        assert!(wf.can_trigger());
        assert!(!wf.can_clear());

        assert!(wf.trigger());
        let mut seen = vec![wf.state()];
        while wf.is_busy() {
            assert!(!wf.can_trigger());
            assert!(!wf.can_clear());
            assert_image_invariant(&wf);
            wf.step();
            seen.push(wf.state());
        }

        assert_eq!(
            seen,
            vec![
                WorkflowState::Capturing,
                WorkflowState::Displaying,
                WorkflowState::Classifying,
                WorkflowState::Result
            ]
        );
        assert_eq!(
            wf.status(),
            "Inicio de la floración; se observan las primeras flores abiertas."
        );
        let outcome = wf.outcome().unwrap();
        assert_eq!(outcome.heading(), "Etapa: R5");
        assert!(outcome.info.recommendations.is_some());
        assert!(!wf.can_trigger());
        assert!(wf.can_clear());
        assert!(!wf.display().is_placeholder());
        assert_image_invariant(&wf);
    }

    #[test]
    fn trigger_is_ignored_while_busy() {
        let (_dir, cam) = setup();
        let mut wf = workflow_with(cam, vec![Ok("V2")]);
        assert!(wf.trigger());
        assert!(!wf.trigger());
        wf.step();
        assert!(!wf.trigger());
        assert_eq!(wf.run_to_completion(), WorkflowState::Result);
        assert!(!wf.trigger());
    }

    #[test]
    fn missing_tool_surfaces_capture_message() {
        let (_dir, cam) = setup();
        cam.failures.borrow_mut().push_back(CaptureError::ToolMissing {
            tool: "libcamera-jpeg".into(),
        });
        let mut wf = workflow_with(cam, vec![]);
        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Error);
        assert_eq!(wf.status(), "Error: libcamera-jpeg no encontrado.");
        assert_eq!(wf.failed_stage(), Some(FailedStage::Capture));
        assert!(wf.captured().is_none());
        assert!(wf.can_trigger());
        assert!(!wf.can_clear());
        assert!(wf.display().is_placeholder());
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_one_from_capture_tool_ends_in_error() {
        let dir = tempdir().unwrap();
        let camera = CommandCamera::new(CaptureConfig {
            tool: "false".into(),
            output_dir: dir.path().to_path_buf(),
            ..CaptureConfig::default()
        });
        let classifier = FakeClassifier::new(vec![Ok("R5")]);
        let calls = classifier.calls.clone();
        let mut wf = Workflow::new(
            Box::new(camera),
            Box::new(classifier),
            &config(RetentionPolicy::Keep),
        );

        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Error);
        assert!(wf.status().starts_with("Error captura:"));
        assert!(wf.captured().is_none());
        assert!(wf.can_trigger());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn capture_error_does_not_poison_next_run() {
        let (_dir, cam) = setup();
        cam.failures.borrow_mut().push_back(CaptureError::ProcessFailed {
            tool: "libcamera-jpeg".into(),
            status: "exit status: 1".into(),
            stderr: "no cameras available".into(),
        });
        let mut wf = workflow_with(cam, vec![Ok("V3")]);
        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Error);
        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Result);
        assert_eq!(wf.outcome().unwrap().prediction.label, "V3");
        assert_eq!(wf.failed_stage(), None);
    }

    #[test]
    fn undecodable_file_is_a_display_error() {
        let (_dir, mut cam) = setup();
        cam.garbage = true;
        let mut wf = workflow_with(cam, vec![Ok("R5")]);
        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Error);
        assert_eq!(wf.failed_stage(), Some(FailedStage::Display));
        assert!(wf.status().starts_with("Error mostrar imagen:"));
        assert!(wf.captured().is_none());
        assert!(wf.can_trigger());
    }

    #[test]
    fn classification_error_keeps_image_for_retry() {
        let (_dir, cam) = setup();
        let mut wf = workflow_with(cam, vec![Err("tensor inválido"), Ok("R8")]);
        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Error);
        assert_eq!(wf.status(), "Error clasificar: inferencia fallida: tensor inválido");
        assert!(wf.captured().is_some());
        assert!(wf.can_trigger());
        assert!(wf.can_clear());
        assert!(wf.can_retry());

        let path = wf.captured().unwrap().path.clone();
        assert!(wf.retry_classification());
        assert_eq!(wf.run_to_completion(), WorkflowState::Result);
        assert_eq!(wf.captured().unwrap().path, path);
        assert_eq!(wf.outcome().unwrap().heading(), "Etapa: R8");
    }

    #[test]
    fn unknown_label_shows_sentinel_description() {
        let (_dir, cam) = setup();
        let mut wf = workflow_with(cam, vec![Ok("clase4")]);
        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Result);
        assert_eq!(wf.status(), "Descripción no encontrada para: clase4");
    }

    #[test]
    fn clear_from_result_resets_once() {
        let (_dir, cam) = setup();
        let mut wf = workflow_with(cam, vec![Ok("R5")]);
        wf.trigger();
        wf.run_to_completion();

        assert!(wf.clear());
        assert_eq!(wf.state(), WorkflowState::Idle);
        assert_eq!(wf.status(), STATUS_IDLE);
        assert!(wf.captured().is_none());
        assert!(wf.outcome().is_none());
        assert!(wf.display().is_placeholder());
        assert!(wf.can_trigger());
        assert!(!wf.can_clear());
        let generation = wf.display().generation();

        assert!(!wf.clear());
        assert_eq!(wf.state(), WorkflowState::Idle);
        assert_eq!(wf.display().generation(), generation);
    }

    #[test]
    fn clear_keeps_or_deletes_file_per_policy() {
        for (policy, should_exist) in [(RetentionPolicy::Keep, true), (RetentionPolicy::Delete, false)]
        {
            let dir = tempdir().unwrap();
            let mut wf = Workflow::new(
                Box::new(FakeCamera::new(dir.path())),
                Box::new(FakeClassifier::new(vec![Ok("V1")])),
                &config(policy),
            );
            wf.trigger();
            wf.run_to_completion();
            let path = wf.captured().unwrap().path.clone();
            assert!(path.exists());

            wf.clear();
            assert_eq!(path.exists(), should_exist, "{policy:?}");
        }
    }

    #[test]
    fn clear_from_classification_error_returns_to_idle() {
        let dir = tempdir().unwrap();
        let mut wf = Workflow::new(
            Box::new(FakeCamera::new(dir.path())),
            Box::new(FakeClassifier::new(vec![Err("sesión cerrada")])),
            &config(RetentionPolicy::Delete),
        );
        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Error);
        let path = wf.captured().unwrap().path.clone();
        assert!(path.exists());
        assert!(!wf.display().is_placeholder());
        assert!(wf.can_clear());

        assert!(wf.clear());
        assert_eq!(wf.state(), WorkflowState::Idle);
        assert_eq!(wf.status(), STATUS_IDLE);
        assert_eq!(wf.failed_stage(), None);
        assert!(wf.captured().is_none());
        assert!(wf.display().is_placeholder());
        assert!(!wf.can_retry());
        assert!(!wf.can_clear());
        assert!(wf.can_trigger());
        assert!(!path.exists());
    }

    #[test]
    fn undecodable_capture_is_deleted_by_next_trigger() {
        let dir = tempdir().unwrap();
        let mut cam = FakeCamera::new(dir.path());
        cam.garbage = true;
        let mut wf = Workflow::new(
            Box::new(cam),
            Box::new(FakeClassifier::new(vec![])),
            &config(RetentionPolicy::Delete),
        );
        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Error);
        let garbage = dir.path().join("captura_1.png");
        assert!(garbage.exists());
        assert!(!wf.can_clear());

        assert!(wf.trigger());
        assert!(!garbage.exists());
        assert_eq!(wf.run_to_completion(), WorkflowState::Error);
        assert!(dir.path().join("captura_2.png").exists());
    }

    #[test]
    fn panicking_classifier_becomes_classification_error() {
        let (_dir, cam) = setup();
        let mut wf = Workflow::new(
            Box::new(cam),
            Box::new(PanickingClassifier),
            &config(RetentionPolicy::Keep),
        );
        wf.trigger();
        assert_eq!(wf.run_to_completion(), WorkflowState::Error);
        assert_eq!(wf.failed_stage(), Some(FailedStage::Classification));
        assert_eq!(
            wf.status(),
            "Error clasificar: inferencia fallida: pánico en el clasificador: índice fuera de rango"
        );
        assert!(wf.can_retry());
        assert!(wf.can_clear());
        assert_image_invariant(&wf);
    }
}

use anyhow::Result;
use directories_next::ProjectDirs;
use eframe::{NativeOptions, egui};
use stage_core::{AppConfig, CommandCamera, ModelLoadError, Workflow, load_classifier};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod app;

use app::UiApp;

const CONFIG_FILE: &str = "etapas.toml";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let explicit = config_arg(std::env::args().skip(1));
    let config = match pick_config(explicit.as_deref(), &config_candidates(explicit.as_deref())) {
        Some(path) => {
            tracing::info!("configuración: {}", path.display());
            AppConfig::from_file(&path)?
        }
        None => AppConfig::default(),
    };

    // Without the model there is nothing useful to show; refuse to start.
    let classifier = match load_classifier(&config.classifier) {
        Ok(classifier) => classifier,
        Err(err) => {
            let context = startup_context(&config.classifier.model_path, &err);
            return Err(anyhow::Error::new(err).context(context));
        }
    };
    let camera = CommandCamera::new(config.capture.clone());
    let workflow = Workflow::new(Box::new(camera), classifier, &config);

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([480.0, 320.0])
            .with_min_inner_size([320.0, 240.0])
            .with_title("Clasificador de Etapas de Frijol"),
        ..Default::default()
    };
    eframe::run_native(
        "Clasificador de Etapas de Frijol",
        options,
        Box::new(|_cc| Ok(Box::new(UiApp::new(workflow)))),
    )
    .map_err(|e| anyhow::anyhow!("la aplicación se detuvo con error: {e}"))
}

/// What the operator sees when the model cannot be loaded, with the fix for
/// the two setup mistakes that are not a broken model file.
fn startup_context(model_path: &Path, err: &ModelLoadError) -> String {
    let base = format!("no se pudo iniciar el clasificador ({})", model_path.display());
    match err {
        ModelLoadError::BackendUnavailable => format!(
            "{base}; compile con soporte ONNX: `cargo run -p stage_gui --features onnx`"
        ),
        ModelLoadError::Missing(_) => format!(
            "{base}; exporte el modelo a ONNX en esa ruta o ajuste `classifier.model_path` en {CONFIG_FILE}"
        ),
        ModelLoadError::NoLabels | ModelLoadError::Backend(_) => base,
    }
}

/// Value of `--config <path>` or `--config=<path>`.
fn config_arg(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(value) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(value));
        }
    }
    None
}

/// Working directory first, then the per-user config directory.
fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if explicit.is_some() {
        return Vec::new();
    }
    let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dirs) = ProjectDirs::from("mx", "campo", "EtapasFrijol") {
        candidates.push(dirs.config_dir().join(CONFIG_FILE));
    }
    candidates
}

/// An explicit path is always used (and must exist); otherwise the first
/// existing candidate, or none for built-in defaults.
fn pick_config(explicit: Option<&Path>, candidates: &[PathBuf]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    candidates.iter().find(|p| p.is_file()).cloned()
}

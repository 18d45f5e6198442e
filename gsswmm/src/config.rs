use std::path::{Path, PathBuf};

/// Default name of the model file.
pub const MODEL_FILE: &str = "model.inp";
/// Default name of the engine report file.
pub const REPORT_FILE: &str = "model.rpt";
/// Default name of the engine binary results file.
pub const OUTPUT_FILE: &str = "model.out";
/// Default name of the interface mapping file.
pub const MAPPING_FILE: &str = "SwmmGoldSimBridge.json";
/// Default name of the bridge log.
pub const LOG_FILE: &str = "bridge_debug.log";

/// File locations and engine options of a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub model_path: PathBuf,
    pub report_path: PathBuf,
    pub output_path: PathBuf,
    pub mapping_path: PathBuf,
    pub log_path: PathBuf,
    /// Shared library loaded by [`crate::engine::Swmm5`].
    pub engine_library: PathBuf,
    /// Whether the engine saves results to `output_path`.
    pub save_results: bool,
}

impl Default for BridgeConfig {
    /// Default file names, relative to the working directory.
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(MODEL_FILE),
            report_path: PathBuf::from(REPORT_FILE),
            output_path: PathBuf::from(OUTPUT_FILE),
            mapping_path: PathBuf::from(MAPPING_FILE),
            log_path: PathBuf::from(LOG_FILE),
            engine_library: PathBuf::from(libloading::library_filename("swmm5")),
            save_results: true,
        }
    }
}

impl BridgeConfig {
    /// Default file names inside `dir`. The engine library is still looked up by name.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        let default = Self::default();
        Self {
            model_path: dir.join(default.model_path),
            report_path: dir.join(default.report_path),
            output_path: dir.join(default.output_path),
            mapping_path: dir.join(default.mapping_path),
            log_path: dir.join(default.log_path),
            ..default
        }
    }
}

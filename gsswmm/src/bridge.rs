//! Simulation lifecycle.
//!
//! A [`Bridge`] owns an engine and drives it through `initialize`, any number of `calculate`
//! calls and `cleanup`. The mapping file is loaded once and cached until the session is closed.
//! Initialization is all or nothing: if any step fails, whatever was acquired is released
//! before the error is returned.

use crate::adapter::{read_value, resolve, write_value, Binding, Direction, ResolveError};
use crate::config::BridgeConfig;
use crate::engine::{Engine, Operation, StepOutcome};
use crate::error::{Error, Result};
use crate::mapping::MappingFile;
use crate::{fingerprint, logging};
use std::io::BufRead;
use std::path::Path;

/// Number of report lines logged when the engine cannot open a model.
const REPORT_PREVIEW_LINES: usize = 50;

/// States of the bridge lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    Initializing,
    Ready,
    Calculating,
    CleaningUp,
}

/// Descriptors of a mapping resolved against the open model, in interface index order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInterface {
    inputs: Vec<Binding>,
    outputs: Vec<Binding>,
}

impl ResolvedInterface {
    /// Resolves every descriptor of `mapping`. Fails on the first descriptor that does not resolve.
    pub fn resolve<E: Engine + ?Sized>(
        engine: &E,
        mapping: &MappingFile,
    ) -> std::result::Result<Self, ResolveError> {
        let inputs = mapping
            .inputs()
            .iter()
            .map(|d| resolve(engine, d, Direction::Input))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let outputs = mapping
            .outputs()
            .iter()
            .map(|d| resolve(engine, d, Direction::Output))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { inputs, outputs })
    }

    #[inline]
    pub fn inputs(&self) -> &[Binding] {
        &self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> &[Binding] {
        &self.outputs
    }
}

/// Resources acquired by the current session.
#[derive(Debug, Default)]
struct Session {
    opened: bool,
    started: bool,
    interface: Option<ResolvedInterface>,
    steps: usize,
}

/// Lifecycle controller connecting the host to an engine.
#[derive(Debug)]
pub struct Bridge<E: Engine> {
    config: BridgeConfig,
    engine: E,
    mapping: Option<MappingFile>,
    state: LifecycleState,
    session: Session,
}

impl<E: Engine> Bridge<E> {
    /// Creates an idle bridge. Nothing is read until the first call that needs it.
    pub fn new(config: BridgeConfig, engine: E) -> Self {
        Self {
            config,
            engine,
            mapping: None,
            state: LifecycleState::Idle,
            session: Session::default(),
        }
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[inline]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[inline]
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Returns the cached mapping, if one is loaded.
    #[inline]
    pub fn mapping(&self) -> Option<&MappingFile> {
        self.mapping.as_ref()
    }

    /// Returns the resolved interface of the current session.
    #[inline]
    pub fn interface(&self) -> Option<&ResolvedInterface> {
        self.session.interface.as_ref()
    }

    /// Returns the number of steps taken in the current session.
    #[inline]
    pub fn steps(&self) -> usize {
        self.session.steps
    }

    /// Returns the version reported to the host.
    pub fn report_version(&self) -> f64 {
        crate::VERSION
    }

    /// Returns the number of inputs and outputs of the interface, loading the mapping if needed.
    pub fn report_arguments(&mut self) -> Result<(usize, usize)> {
        let mapping = ensure_mapping(&mut self.mapping, &self.config.mapping_path)?;
        let arguments = (mapping.inputs().len(), mapping.outputs().len());
        tracing::debug!(
            "reporting {} inputs and {} outputs",
            arguments.0,
            arguments.1
        );
        Ok(arguments)
    }

    /// Opens the model, resolves the interface and starts the simulation.
    ///
    /// An open session is closed first. On failure, the bridge is left idle.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != LifecycleState::Idle || self.session.opened {
            tracing::warn!("initialize called on an open session; cleaning up first");
            if let Err(e) = self.cleanup() {
                tracing::warn!("cleanup before initialize failed: {e}");
            }
        }
        tracing::info!("initializing bridge version {}", crate::VERSION);
        self.state = LifecycleState::Initializing;
        match self.open_session() {
            Ok(()) => {
                self.state = LifecycleState::Ready;
                if let Some(interface) = &self.session.interface {
                    tracing::info!(
                        "initialization successful: {} inputs, {} outputs",
                        interface.inputs().len(),
                        interface.outputs().len()
                    );
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!("initialization failed: {e}");
                if let Err(release) = self.release() {
                    tracing::warn!("releasing engine after failed initialization: {release}");
                }
                self.mapping = None;
                self.state = LifecycleState::Idle;
                Err(e)
            }
        }
    }

    fn open_session(&mut self) -> Result<()> {
        validate_model_path(&self.config.model_path)?;
        let mapping = ensure_mapping(&mut self.mapping, &self.config.mapping_path)?;
        check_fingerprint(mapping, &self.config.model_path);

        tracing::debug!(
            "opening model {} (report {}, output {})",
            self.config.model_path.display(),
            self.config.report_path.display(),
            self.config.output_path.display()
        );
        self.engine
            .open(
                &self.config.model_path,
                &self.config.report_path,
                &self.config.output_path,
            )
            .map_err(|e| {
                log_report(&self.config.report_path);
                Error::engine(Operation::Open, e)
            })?;
        self.session.opened = true;

        let interface = ResolvedInterface::resolve(&self.engine, mapping)?;

        self.engine
            .start(self.config.save_results)
            .map_err(|e| Error::engine(Operation::Start, e))?;
        self.session.started = true;
        self.session.interface = Some(interface);
        Ok(())
    }

    /// Writes `inputs` to the engine, advances one step and reads the engine into `outputs`.
    ///
    /// When the engine reports the end of the simulation, every output is set to zero, the
    /// session is closed and `Ok(StepOutcome::Finished)` is returned. Later calls fail with
    /// [`Error::NotInitialized`].
    pub fn calculate(&mut self, inputs: &[f64], outputs: &mut [f64]) -> Result<StepOutcome> {
        if self.state != LifecycleState::Ready {
            return Err(Error::NotInitialized);
        }
        let Some(interface) = &self.session.interface else {
            return Err(Error::NotInitialized);
        };
        if inputs.len() < interface.inputs.len() {
            return Err(Error::InputArrayTooShort {
                array: "input",
                expected: interface.inputs.len(),
                found: inputs.len(),
            });
        }
        if outputs.len() < interface.outputs.len() {
            return Err(Error::InputArrayTooShort {
                array: "output",
                expected: interface.outputs.len(),
                found: outputs.len(),
            });
        }

        self.state = LifecycleState::Calculating;
        let first = self.session.steps == 0;
        for binding in &interface.inputs {
            let value = inputs[binding.interface_index];
            if first {
                tracing::debug!("input [{}] = {value}", binding.interface_index);
            }
            write_value(&mut self.engine, binding, value);
        }
        let outcome = self.engine.step();
        self.state = LifecycleState::Ready;

        match outcome {
            Err(e) => {
                tracing::error!("step {} failed: {e}", self.session.steps + 1);
                Err(Error::engine(Operation::Step, e))
            }
            Ok(StepOutcome::Finished) => {
                for binding in &interface.outputs {
                    outputs[binding.interface_index] = 0.0;
                }
                tracing::info!("simulation ended after {} steps", self.session.steps);
                if let Err(e) = self.cleanup() {
                    tracing::warn!("closing finished simulation: {e}");
                }
                Ok(StepOutcome::Finished)
            }
            Ok(StepOutcome::Advanced { elapsed_days }) => {
                for binding in &interface.outputs {
                    let value = read_value(&self.engine, binding);
                    if first {
                        tracing::debug!("output [{}] = {value}", binding.interface_index);
                    }
                    outputs[binding.interface_index] = value;
                }
                self.session.steps += 1;
                Ok(StepOutcome::Advanced { elapsed_days })
            }
        }
    }

    /// Ends and closes whatever the session acquired and drops the cached mapping.
    ///
    /// Always leaves the bridge idle. Errors of the engine are reported after the
    /// remaining resources have been released.
    pub fn cleanup(&mut self) -> Result<()> {
        self.mapping = None;
        if !self.session.opened {
            self.state = LifecycleState::Idle;
            tracing::debug!("cleanup: no open session");
            return Ok(());
        }
        self.state = LifecycleState::CleaningUp;
        tracing::info!("cleanup after {} steps", self.session.steps);
        let result = self.release();
        self.state = LifecycleState::Idle;
        result
    }

    fn release(&mut self) -> Result<()> {
        let session = std::mem::take(&mut self.session);
        let mut result = Ok(());
        if session.started {
            if let Err(e) = self.engine.end() {
                result = Err(Error::engine(Operation::End, e));
            }
        }
        if session.opened {
            if let Err(e) = self.engine.close() {
                if result.is_ok() {
                    result = Err(Error::engine(Operation::Close, e));
                }
            }
        }
        result
    }
}

impl<E: Engine> Drop for Bridge<E> {
    fn drop(&mut self) {
        if self.session.opened {
            let _ = self.release();
        }
    }
}

/// Returns the cached mapping, loading it from `path` first if the cache is empty.
fn ensure_mapping<'a>(slot: &'a mut Option<MappingFile>, path: &Path) -> Result<&'a MappingFile> {
    let mapping = match slot.take() {
        Some(mapping) => mapping,
        None => {
            tracing::debug!("loading mapping file {}", path.display());
            let mapping = MappingFile::load(path)?;
            logging::apply(mapping.logging_level());
            tracing::debug!(
                "mapping loaded: {} inputs, {} outputs",
                mapping.inputs().len(),
                mapping.outputs().len()
            );
            mapping
        }
    };
    Ok(slot.insert(mapping))
}

fn validate_model_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::ModelPathEmpty);
    }
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Err(Error::ModelPathIsDirectory {
            path: path.to_path_buf(),
        }),
        Ok(_) => Ok(()),
        Err(_) => Err(Error::ModelFileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Warns if the model changed since the mapping was generated. Never fails.
fn check_fingerprint(mapping: &MappingFile, model: &Path) {
    let Some(expected) = mapping.fingerprint() else {
        return;
    };
    if !fingerprint::is_comparable(expected) {
        tracing::debug!("mapping fingerprint '{expected}' is not comparable; check skipped");
        return;
    }
    let text = match std::fs::read_to_string(model) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("cannot fingerprint model {}: {e}", model.display());
            return;
        }
    };
    match fingerprint::compare(expected, &text) {
        Some((actual, true)) => tracing::debug!("model fingerprint {actual} matches"),
        Some((actual, false)) => tracing::warn!(
            "model {} changed since the mapping was generated (mapping {expected}, model {actual}); regenerate the mapping file",
            model.display()
        ),
        None => {}
    }
}

/// Logs the beginning of the engine report, where the engine explains input errors.
fn log_report(path: &Path) {
    match std::fs::File::open(path) {
        Ok(file) => {
            tracing::debug!("report file {}:", path.display());
            for line in std::io::BufReader::new(file)
                .lines()
                .map_while(std::result::Result::ok)
                .take(REPORT_PREVIEW_LINES)
            {
                tracing::debug!("  {line}");
            }
        }
        Err(e) => tracing::debug!("cannot read report file {}: {e}", path.display()),
    }
}

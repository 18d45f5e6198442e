use std::path::Path;
use thiserror::Error;

pub mod memory;
pub mod swmm5;

pub use memory::MemoryEngine;
pub use swmm5::Swmm5;

/// Object categories addressable by name in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineObject {
    Gage = 0,
    Subcatch = 1,
    Node = 2,
    Link = 3,
}

impl EngineObject {
    /// Returns the object type code expected by the SWMM toolkit.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Engine properties reachable through `getValue`/`setValue`.
/// Discriminants follow the SWMM 5.2 toolkit numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineProperty {
    GageRainfall = 100,
    SubcatchRainfall = 202,
    SubcatchInfil = 204,
    SubcatchRunoff = 205,
    NodeDepth = 303,
    NodeHead = 304,
    NodeVolume = 305,
    NodeLatFlow = 306,
    NodeInflow = 307,
    NodeOverflow = 308,
    LinkSetting = 407,
    LinkFlow = 410,
    LinkDepth = 411,
}

impl EngineProperty {
    /// Returns the property code expected by the SWMM toolkit.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Returns the object category the property belongs to.
    pub fn object(self) -> EngineObject {
        match self {
            Self::GageRainfall => EngineObject::Gage,
            Self::SubcatchRainfall | Self::SubcatchInfil | Self::SubcatchRunoff => {
                EngineObject::Subcatch
            }
            Self::NodeDepth
            | Self::NodeHead
            | Self::NodeVolume
            | Self::NodeLatFlow
            | Self::NodeInflow
            | Self::NodeOverflow => EngineObject::Node,
            Self::LinkSetting | Self::LinkFlow | Self::LinkDepth => EngineObject::Link,
        }
    }
}

/// Quantities of a nested device (LID unit) inside a subcatchment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NestedProperty {
    StorageVolume,
    SurfaceInflow,
    SurfaceOutflow,
    DrainFlow,
}

/// Engine operations that may fail with an engine error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Start,
    Step,
    End,
    Close,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            Self::Open => "open the model",
            Self::Start => "start the simulation",
            Self::Step => "advance the simulation",
            Self::End => "end the simulation",
            Self::Close => "close the model",
        };
        f.write_str(verb)
    }
}

/// Result of advancing the engine by one routing step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// The engine advanced; `elapsed_days` is the new simulation time.
    Advanced { elapsed_days: f64 },
    /// The simulation reached its end date.
    Finished,
}

/// Failure reported by the engine, with the engine's own error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (engine code {code})")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new<S: Into<String>>(code: i32, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Interface of the hydraulic engine driven by the bridge.
///
/// Name lookups (`index_of`, `nested_count`, `nested_name`) are only used while resolving
/// the interface mapping. Per-step exchange goes through `value`, `set_value` and `nested_value`
/// with the integer handles obtained at resolution time.
pub trait Engine {
    /// Opens a model, naming the report and binary output files the engine writes.
    fn open(&mut self, model: &Path, report: &Path, output: &Path) -> Result<(), EngineError>;

    /// Starts the computation session of an open model.
    fn start(&mut self, save_results: bool) -> Result<(), EngineError>;

    /// Advances the simulation by one routing step.
    fn step(&mut self) -> Result<StepOutcome, EngineError>;

    /// Ends the computation session.
    fn end(&mut self) -> Result<(), EngineError>;

    /// Closes the model.
    fn close(&mut self) -> Result<(), EngineError>;

    /// Returns the index of the named object, or [`None`] if the model has no such object.
    fn index_of(&self, object: EngineObject, name: &str) -> Option<usize>;

    /// Returns the number of objects of a category in the open model.
    fn count(&self, object: EngineObject) -> usize;

    /// Reads the current value of a property.
    fn value(&self, property: EngineProperty, index: usize) -> f64;

    /// Overrides the value of a property for the next step.
    fn set_value(&mut self, property: EngineProperty, index: usize, value: f64);

    /// Returns the number of nested devices of a subcatchment.
    /// It returns [`None`] if the engine does not expose nested devices at all.
    fn nested_count(&self, container: usize) -> Option<usize>;

    /// Returns the name of the nested device at position `device` of a subcatchment.
    fn nested_name(&self, container: usize, device: usize) -> Option<String>;

    /// Returns `true` if the engine can read `property` of nested devices.
    fn nested_supports(&self, property: NestedProperty) -> bool;

    /// Reads the current value of a nested-device property.
    fn nested_value(&self, property: NestedProperty, container: usize, device: usize) -> f64;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn open(&mut self, model: &Path, report: &Path, output: &Path) -> Result<(), EngineError> {
        (**self).open(model, report, output)
    }

    fn start(&mut self, save_results: bool) -> Result<(), EngineError> {
        (**self).start(save_results)
    }

    fn step(&mut self) -> Result<StepOutcome, EngineError> {
        (**self).step()
    }

    fn end(&mut self) -> Result<(), EngineError> {
        (**self).end()
    }

    fn close(&mut self) -> Result<(), EngineError> {
        (**self).close()
    }

    fn index_of(&self, object: EngineObject, name: &str) -> Option<usize> {
        (**self).index_of(object, name)
    }

    fn count(&self, object: EngineObject) -> usize {
        (**self).count(object)
    }

    fn value(&self, property: EngineProperty, index: usize) -> f64 {
        (**self).value(property, index)
    }

    fn set_value(&mut self, property: EngineProperty, index: usize, value: f64) {
        (**self).set_value(property, index, value)
    }

    fn nested_count(&self, container: usize) -> Option<usize> {
        (**self).nested_count(container)
    }

    fn nested_name(&self, container: usize, device: usize) -> Option<String> {
        (**self).nested_name(container, device)
    }

    fn nested_supports(&self, property: NestedProperty) -> bool {
        (**self).nested_supports(property)
    }

    fn nested_value(&self, property: NestedProperty, container: usize, device: usize) -> f64 {
        (**self).nested_value(property, container, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_codes() {
        assert_eq!(100, EngineProperty::GageRainfall.code());
        assert_eq!(306, EngineProperty::NodeLatFlow.code());
        assert_eq!(407, EngineProperty::LinkSetting.code());
        assert_eq!(3, EngineObject::Link.code());
    }

    #[test]
    fn test_property_object() {
        assert_eq!(EngineObject::Gage, EngineProperty::GageRainfall.object());
        assert_eq!(EngineObject::Subcatch, EngineProperty::SubcatchRunoff.object());
        assert_eq!(EngineObject::Node, EngineProperty::NodeInflow.object());
        assert_eq!(EngineObject::Link, EngineProperty::LinkDepth.object());
    }

    #[test]
    fn test_engine_error_display() {
        let e = EngineError::new(303, "ERROR 303: cannot open input file.");
        assert_eq!(
            "ERROR 303: cannot open input file. (engine code 303)",
            e.to_string()
        );
    }
}

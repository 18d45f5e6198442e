use super::{Engine, EngineError, EngineObject, EngineProperty, NestedProperty, Operation, StepOutcome};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default routing step of the in-memory engine, in days (30 seconds).
const DEFAULT_STEP_DAYS: f64 = 30.0 / 86_400.0;

/// Default number of calls kept in the journal.
pub const DEFAULT_JOURNAL_LIMIT: usize = 4096;

/// Calls observed by a [`MemoryEngine`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(PathBuf),
    Start(bool),
    Step,
    End,
    Close,
    SetValue(EngineProperty, usize, f64),
}

#[derive(Debug, Clone)]
struct NestedUnit {
    container: usize,
    name: String,
    values: HashMap<NestedProperty, f64>,
}

/// In-process engine with a fixed set of named objects.
///
/// Values are kept in a table keyed by property and index. Every step routes the lateral
/// inflow of each node into its total inflow, so an inflow written by the host shows up on
/// the node outputs after the next step. The simulation finishes after a configurable number
/// of steps, and any [`Operation`] can be scripted to fail.
///
/// The engine keeps a journal of the most recent calls it received, up to a limit, so long
/// dry runs do not grow it without bound.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    names: HashMap<EngineObject, Vec<String>>,
    values: HashMap<(EngineProperty, usize), f64>,
    nested: Vec<NestedUnit>,
    nested_api: bool,
    unsupported: Vec<NestedProperty>,
    step_days: f64,
    finish_after: Option<usize>,
    failures: HashMap<Operation, EngineError>,
    opened: bool,
    started: bool,
    steps: usize,
    calls: Vec<Call>,
    journal_limit: usize,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an empty engine with the nested-device extension available.
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
            values: HashMap::new(),
            nested: Vec::new(),
            nested_api: true,
            unsupported: Vec::new(),
            step_days: DEFAULT_STEP_DAYS,
            finish_after: None,
            failures: HashMap::new(),
            opened: false,
            started: false,
            steps: 0,
            calls: Vec::new(),
            journal_limit: DEFAULT_JOURNAL_LIMIT,
        }
    }

    fn with_object<S: Into<String>>(mut self, object: EngineObject, name: S) -> Self {
        self.names.entry(object).or_default().push(name.into());
        self
    }

    /// Adds a rain gage.
    pub fn with_gage<S: Into<String>>(self, name: S) -> Self {
        self.with_object(EngineObject::Gage, name)
    }

    /// Adds a subcatchment.
    pub fn with_subcatch<S: Into<String>>(self, name: S) -> Self {
        self.with_object(EngineObject::Subcatch, name)
    }

    /// Adds a node (junction, storage unit or outfall).
    pub fn with_node<S: Into<String>>(self, name: S) -> Self {
        self.with_object(EngineObject::Node, name)
    }

    /// Adds a link (conduit, pump, orifice or weir).
    pub fn with_link<S: Into<String>>(self, name: S) -> Self {
        self.with_object(EngineObject::Link, name)
    }

    /// Adds a nested device to an existing subcatchment.
    /// Unknown subcatchments are ignored.
    pub fn with_nested<S: Into<String>>(mut self, subcatch: &str, name: S) -> Self {
        if let Some(container) = self.index_of(EngineObject::Subcatch, subcatch) {
            self.nested.push(NestedUnit {
                container,
                name: name.into(),
                values: HashMap::new(),
            });
        }
        self
    }

    /// Sets the initial value of a property of a named object.
    pub fn with_value(mut self, property: EngineProperty, name: &str, value: f64) -> Self {
        if let Some(index) = self.index_of(property.object(), name) {
            self.values.insert((property, index), value);
        }
        self
    }

    /// Sets the value of a property of a nested device, addressed as `subcatch/device`.
    pub fn with_nested_value(
        mut self,
        property: NestedProperty,
        subcatch: &str,
        device: &str,
        value: f64,
    ) -> Self {
        if let Some(container) = self.index_of(EngineObject::Subcatch, subcatch) {
            if let Some(unit) = self
                .nested
                .iter_mut()
                .find(|u| u.container == container && u.name == device)
            {
                unit.values.insert(property, value);
            }
        }
        self
    }

    /// Removes the nested-device extension, as in engine builds without LID accessors.
    pub fn without_nested_api(mut self) -> Self {
        self.nested_api = false;
        self
    }

    /// Removes one nested-device accessor, as in engine builds with a partial LID extension.
    pub fn without_nested_property(mut self, property: NestedProperty) -> Self {
        self.unsupported.push(property);
        self
    }

    /// Keeps at most `limit` calls in the journal.
    pub fn with_journal_limit(mut self, limit: usize) -> Self {
        self.journal_limit = limit;
        self.trim_journal();
        self
    }

    /// Finishes the simulation on the step following the `steps`-th successful one.
    pub fn finish_after(mut self, steps: usize) -> Self {
        self.finish_after = Some(steps);
        self
    }

    /// Makes every subsequent call to `operation` fail with the given engine error.
    pub fn fail_on(mut self, operation: Operation, error: EngineError) -> Self {
        self.failures.insert(operation, error);
        self
    }

    /// Returns `true` if a model is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Returns `true` if a simulation is started.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Returns the number of successful steps since the last start.
    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Returns the most recent calls received by the engine, oldest first.
    #[inline]
    pub fn calls(&self) -> &[Call] {
        &self.calls[self.calls.len().saturating_sub(self.journal_limit)..]
    }

    fn record(&mut self, call: Call) {
        self.calls.push(call);
        // amortized: drop the stale head once it is as long as the kept tail
        if self.calls.len() >= 2 * self.journal_limit.max(1) {
            self.trim_journal();
        }
    }

    fn trim_journal(&mut self) {
        let stale = self.calls.len().saturating_sub(self.journal_limit);
        self.calls.drain(..stale);
    }

    fn check(&self, operation: Operation) -> Result<(), EngineError> {
        match self.failures.get(&operation) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn nested_unit(&self, container: usize, device: usize) -> Option<&NestedUnit> {
        self.nested
            .iter()
            .filter(|u| u.container == container)
            .nth(device)
    }

    fn route(&mut self) {
        let lateral: Vec<(usize, f64)> = self
            .values
            .iter()
            .filter(|((p, _), _)| *p == EngineProperty::NodeLatFlow)
            .map(|((_, i), v)| (*i, *v))
            .collect();
        for (index, flow) in lateral {
            self.values.insert((EngineProperty::NodeInflow, index), flow);
        }
    }
}

impl Engine for MemoryEngine {
    fn open(&mut self, model: &Path, _report: &Path, _output: &Path) -> Result<(), EngineError> {
        self.record(Call::Open(model.to_path_buf()));
        self.check(Operation::Open)?;
        if self.opened {
            return Err(EngineError::new(
                -1,
                "ERROR: a model is already open in this engine.",
            ));
        }
        self.opened = true;
        Ok(())
    }

    fn start(&mut self, save_results: bool) -> Result<(), EngineError> {
        self.record(Call::Start(save_results));
        self.check(Operation::Start)?;
        if !self.opened {
            return Err(EngineError::new(-1, "ERROR: no model is open."));
        }
        self.started = true;
        self.steps = 0;
        Ok(())
    }

    fn step(&mut self) -> Result<StepOutcome, EngineError> {
        self.record(Call::Step);
        self.check(Operation::Step)?;
        if !self.started {
            return Err(EngineError::new(-1, "ERROR: the simulation is not started."));
        }
        if self.finish_after.is_some_and(|n| self.steps >= n) {
            return Ok(StepOutcome::Finished);
        }
        self.route();
        self.steps += 1;
        Ok(StepOutcome::Advanced {
            elapsed_days: self.steps as f64 * self.step_days,
        })
    }

    fn end(&mut self) -> Result<(), EngineError> {
        self.record(Call::End);
        self.check(Operation::End)?;
        self.started = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.record(Call::Close);
        self.check(Operation::Close)?;
        self.opened = false;
        Ok(())
    }

    fn index_of(&self, object: EngineObject, name: &str) -> Option<usize> {
        self.names.get(&object)?.iter().position(|n| n == name)
    }

    fn count(&self, object: EngineObject) -> usize {
        self.names.get(&object).map_or(0, Vec::len)
    }

    fn value(&self, property: EngineProperty, index: usize) -> f64 {
        self.values.get(&(property, index)).copied().unwrap_or(0.0)
    }

    fn set_value(&mut self, property: EngineProperty, index: usize, value: f64) {
        self.record(Call::SetValue(property, index, value));
        self.values.insert((property, index), value);
    }

    fn nested_count(&self, container: usize) -> Option<usize> {
        if !self.nested_api {
            return None;
        }
        Some(self.nested.iter().filter(|u| u.container == container).count())
    }

    fn nested_name(&self, container: usize, device: usize) -> Option<String> {
        if !self.nested_api {
            return None;
        }
        self.nested_unit(container, device).map(|u| u.name.clone())
    }

    fn nested_supports(&self, property: NestedProperty) -> bool {
        self.nested_api && !self.unsupported.contains(&property)
    }

    fn nested_value(&self, property: NestedProperty, container: usize, device: usize) -> f64 {
        self.nested_unit(container, device)
            .and_then(|u| u.values.get(&property).copied())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> (PathBuf, PathBuf, PathBuf) {
        (
            PathBuf::from("model.inp"),
            PathBuf::from("model.rpt"),
            PathBuf::from("model.out"),
        )
    }

    #[test]
    fn test_names() {
        let engine = MemoryEngine::new()
            .with_node("J1")
            .with_node("OUT1")
            .with_link("P1")
            .with_subcatch("S1")
            .with_nested("S1", "InfilTrench")
            .with_nested("S1", "RainBarrel")
            .with_nested("S9", "Ignored");

        assert_eq!(Some(1), engine.index_of(EngineObject::Node, "OUT1"));
        assert_eq!(None, engine.index_of(EngineObject::Node, "P1"));
        assert_eq!(Some(0), engine.index_of(EngineObject::Link, "P1"));
        assert_eq!(2, engine.count(EngineObject::Node));
        assert_eq!(0, engine.count(EngineObject::Gage));
        assert_eq!(Some(2), engine.nested_count(0));
        assert_eq!(Some("RainBarrel".to_string()), engine.nested_name(0, 1));
        assert_eq!(None, engine.nested_name(0, 2));
    }

    #[test]
    fn test_lifecycle() {
        let (inp, rpt, out) = paths();
        let mut engine = MemoryEngine::new().with_node("J1").finish_after(2);

        assert!(engine.start(true).is_err());
        engine.open(&inp, &rpt, &out).unwrap();
        assert!(engine.open(&inp, &rpt, &out).is_err());
        engine.start(false).unwrap();

        let j1 = engine.index_of(EngineObject::Node, "J1").unwrap();
        engine.set_value(EngineProperty::NodeLatFlow, j1, 2.5);
        assert_eq!(0.0, engine.value(EngineProperty::NodeInflow, j1));

        match engine.step().unwrap() {
            StepOutcome::Advanced { elapsed_days } => assert!(elapsed_days > 0.0),
            StepOutcome::Finished => panic!("simulation should not be finished"),
        }
        assert_eq!(2.5, engine.value(EngineProperty::NodeInflow, j1));
        assert!(matches!(engine.step().unwrap(), StepOutcome::Advanced { .. }));
        assert_eq!(StepOutcome::Finished, engine.step().unwrap());
        assert_eq!(2, engine.steps());

        engine.end().unwrap();
        engine.close().unwrap();
        assert!(!engine.is_started());
        assert!(!engine.is_open());
        assert_eq!(Call::Start(true), engine.calls()[0]);
        assert_eq!(Call::Open(inp), engine.calls()[1]);
        assert_eq!(Some(&Call::Close), engine.calls().last());
    }

    #[test]
    fn test_failures() {
        let (inp, rpt, out) = paths();
        let mut engine =
            MemoryEngine::new().fail_on(Operation::Open, EngineError::new(303, "cannot open"));
        let err = engine.open(&inp, &rpt, &out).unwrap_err();
        assert_eq!(303, err.code);
        assert!(!engine.is_open());
    }

    #[test]
    fn test_nested_values() {
        let engine = MemoryEngine::new()
            .with_subcatch("S1")
            .with_nested("S1", "InfilTrench")
            .with_nested_value(NestedProperty::StorageVolume, "S1", "InfilTrench", 12.0);
        assert_eq!(12.0, engine.nested_value(NestedProperty::StorageVolume, 0, 0));
        assert_eq!(0.0, engine.nested_value(NestedProperty::DrainFlow, 0, 0));

        assert!(engine.nested_supports(NestedProperty::DrainFlow));

        let partial = engine.clone().without_nested_property(NestedProperty::DrainFlow);
        assert!(!partial.nested_supports(NestedProperty::DrainFlow));
        assert!(partial.nested_supports(NestedProperty::StorageVolume));

        let engine = engine.without_nested_api();
        assert_eq!(None, engine.nested_count(0));
        assert_eq!(None, engine.nested_name(0, 0));
        assert!(!engine.nested_supports(NestedProperty::StorageVolume));
    }

    #[test]
    fn test_journal_limit() {
        let (inp, rpt, out) = paths();
        let mut engine = MemoryEngine::new().with_node("J1").with_journal_limit(3);
        engine.open(&inp, &rpt, &out).unwrap();
        engine.start(true).unwrap();
        for step in 0..100 {
            engine.set_value(EngineProperty::NodeLatFlow, 0, step as f64);
            engine.step().unwrap();
        }
        assert_eq!(100, engine.steps());
        assert_eq!(
            [
                Call::Step,
                Call::SetValue(EngineProperty::NodeLatFlow, 0, 99.0),
                Call::Step
            ],
            engine.calls()
        );
        assert!(engine.calls.len() < 6);
    }
}

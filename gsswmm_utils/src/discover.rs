//! Discovery of the values a model exchanges with GoldSim.
//!
//! Inputs are the model objects driven by a placeholder named `DUMMY`: rain gages reading a
//! `DUMMY` time series, pumps with a `DUMMY` curve, orifices and weirs set by a `DUMMY` control
//! rule, and nodes with a `DUMMY` dry-weather flow pattern. Outputs are every storage unit,
//! outfall, orifice, weir, subcatchment and LID unit of the model.
//!
//! Models are validated before discovery; a model with errors produces no mapping.

use crate::inp::{InpError, InpSections};
use crate::validate::{self, Issue, Severity};
use gsswmm::adapter::{ObjectType, Property};
use gsswmm::mapping::{Descriptor, MappingError, MappingFile};
use gsswmm::fingerprint;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder name marking an object as driven by GoldSim.
pub const PLACEHOLDER: &str = "DUMMY";

/// A model value exchanged with GoldSim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub object_type: ObjectType,
    pub property: Property,
}

impl Element {
    fn new<S: Into<String>>(name: S, object_type: ObjectType, property: Property) -> Self {
        Self {
            name: name.into(),
            object_type,
            property,
        }
    }

    fn descriptor(&self, index: usize) -> Descriptor {
        Descriptor::new(
            index,
            self.name.clone(),
            self.object_type.name(),
            self.property.name(),
        )
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("cannot read model {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Inp(#[from] InpError),
    #[error("model {} will not run in SWMM: {}", .path.display(), list(.errors))]
    InvalidModel { path: PathBuf, errors: Vec<Issue> },
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("cannot serialize mapping: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn list(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Returns the names of `section` that a `DUMMY` control rule refers to with `keyword`.
///
/// A rule line such as `THEN ORIFICE OR1 SETTING = CURVE DUMMY` refers to `OR1`. Names missing
/// from `section` are skipped with a warning.
fn controlled(sections: &InpSections, keyword: &str, section: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for rule in sections.section("CONTROLS") {
        if !rule.iter().any(|f| f == PLACEHOLDER) {
            continue;
        }
        let Some(position) = rule.iter().position(|f| f == keyword) else {
            continue;
        };
        let Some(name) = rule.get(position + 1) else {
            continue;
        };
        if !sections.names(section).any(|n| n == name) {
            tracing::warn!("skipping DUMMY reference to {keyword} '{name}': not found in [{section}]");
        } else if !found.contains(name) {
            found.push(name.clone());
        }
    }
    // file order of the section, not of the rules
    sections
        .names(section)
        .filter(|n| found.iter().any(|f| f == n))
        .map(String::from)
        .collect()
}

/// Discovers the inputs of a model. The host clock is always the first one.
pub fn inputs(sections: &InpSections) -> Vec<Element> {
    let mut inputs = vec![Element::new(
        "ElapsedTime",
        ObjectType::System,
        Property::ElapsedTime,
    )];

    // Name Format Interval SCF Source_Type Source_Name
    for gage in sections.section("RAINGAGES") {
        if gage.len() >= 6 && gage[4] == "TIMESERIES" && gage[5] == PLACEHOLDER {
            inputs.push(Element::new(&gage[0], ObjectType::Gage, Property::Rainfall));
        }
    }

    // Name From To Pcurve ...
    for pump in sections.section("PUMPS") {
        if pump.len() >= 4 && pump[3] == PLACEHOLDER {
            inputs.push(Element::new(&pump[0], ObjectType::Pump, Property::Setting));
        }
    }

    for name in controlled(sections, "ORIFICE", "ORIFICES") {
        inputs.push(Element::new(name, ObjectType::Orifice, Property::Setting));
    }
    for name in controlled(sections, "WEIR", "WEIRS") {
        inputs.push(Element::new(name, ObjectType::Weir, Property::Setting));
    }

    // Node Constituent Baseline Pat1 Pat2 Pat3 Pat4
    let mut nodes: Vec<&str> = Vec::new();
    for dwf in sections.section("DWF") {
        if dwf.len() < 4 {
            continue;
        }
        let node = dwf[0].as_str();
        if !dwf[3..dwf.len().min(7)].iter().any(|p| p == PLACEHOLDER) {
            continue;
        }
        let exists = ["JUNCTIONS", "STORAGE", "OUTFALLS"]
            .iter()
            .any(|s| sections.names(s).any(|n| n == node));
        if !exists {
            tracing::warn!("skipping DUMMY reference to node '{node}': not found in [JUNCTIONS], [STORAGE] or [OUTFALLS]");
        } else if !nodes.contains(&node) {
            nodes.push(node);
            inputs.push(Element::new(node, ObjectType::Node, Property::LatFlow));
        }
    }

    inputs
}

/// Discovers the outputs of a model.
pub fn outputs(sections: &InpSections) -> Vec<Element> {
    let table = [
        ("STORAGE", ObjectType::Storage, Property::Volume),
        ("OUTFALLS", ObjectType::Outfall, Property::Flow),
        ("ORIFICES", ObjectType::Orifice, Property::Flow),
        ("WEIRS", ObjectType::Weir, Property::Flow),
        ("SUBCATCHMENTS", ObjectType::Subcatch, Property::Runoff),
    ];
    let mut outputs: Vec<Element> = table
        .iter()
        .flat_map(|&(section, object_type, property)| {
            sections
                .names(section)
                .map(move |name| Element::new(name, object_type, property))
        })
        .collect();

    // Subcatchment LID_Process Number Area ...
    for usage in sections.section("LID_USAGE") {
        if usage.len() < 2 {
            continue;
        }
        let element = Element::new(
            format!("{}/{}", usage[0], usage[1]),
            ObjectType::Lid,
            Property::StorageVolume,
        );
        if !outputs.contains(&element) {
            outputs.push(element);
        }
    }

    outputs
}

/// Builds the mapping of a parsed model.
pub fn mapping(sections: &InpSections, fingerprint: &str) -> Result<MappingFile, MappingError> {
    let inputs = inputs(sections)
        .iter()
        .enumerate()
        .map(|(i, e)| e.descriptor(i))
        .collect();
    let outputs = outputs(sections)
        .iter()
        .enumerate()
        .map(|(i, e)| e.descriptor(i))
        .collect();
    Ok(MappingFile::new(inputs, outputs)?.with_fingerprint(fingerprint))
}

/// Reads a model file, validates it and builds its mapping.
///
/// Validation warnings are logged. Validation errors fail with [`GenerateError::InvalidModel`].
pub fn generate<P: AsRef<Path>>(model: P) -> Result<MappingFile, GenerateError> {
    let model = model.as_ref();
    let text = std::fs::read_to_string(model).map_err(|source| GenerateError::Io {
        path: model.to_path_buf(),
        source,
    })?;
    let sections = InpSections::parse(&text)?;

    let issues = validate::validate(&sections);
    for issue in &issues {
        match issue.severity {
            Severity::Warning => tracing::warn!("{}", issue.message),
            Severity::Error => tracing::error!("{}", issue.message),
        }
    }
    if validate::has_errors(&issues) {
        return Err(GenerateError::InvalidModel {
            path: model.to_path_buf(),
            errors: issues.into_iter().filter(Issue::is_error).collect(),
        });
    }

    Ok(mapping(&sections, &fingerprint::of_str(&text))?)
}

/// Writes a mapping file, replacing any previous one.
pub fn write<P: AsRef<Path>>(mapping: &MappingFile, path: P) -> Result<(), GenerateError> {
    let path = path.as_ref();
    let json = mapping.to_json()?;
    std::fs::write(path, json + "\n").map_err(|source| GenerateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const MODEL: &str = "\
[RAINGAGES]
RG1  INTENSITY 0:15 1.0 TIMESERIES DUMMY
RG2  INTENSITY 0:15 1.0 TIMESERIES TS1

[SUBCATCHMENTS]
S1   RG1  J1  5  50  500  0.5  0
S2   RG2  J1  5  50  500  0.5  0

[JUNCTIONS]
J1   10  2  0  0  0
J2   9   2  0  0  0

[OUTFALLS]
OUT1 8   FREE  NO

[STORAGE]
SU1  5  4  0  FUNCTIONAL 1000 0 0

[PUMPS]
P1   SU1  J2  DUMMY  ON  0  0
P2   SU1  J2  CURVE1 ON  0  0

[ORIFICES]
OR1  SU1  J2  SIDE  0  0.6
OR2  SU1  J2  SIDE  0  0.6

[WEIRS]
W1   J2  OUT1  TRANSVERSE  0  3.3

[CONTROLS]
RULE R1
IF SIMULATION TIME > 0
THEN ORIFICE OR2 SETTING = CURVE DUMMY
RULE R2
IF SIMULATION TIME > 0
THEN ORIFICE OR9 SETTING = CURVE DUMMY
RULE R3
IF SIMULATION TIME > 0
THEN WEIR W1 SETTING = CURVE DUMMY

[DWF]
J2   FLOW  1.0  DUMMY
J2   TSS   1.0  \"\"  DUMMY
XX   FLOW  1.0  DUMMY

[LID_USAGE]
S1   InfilTrench  1  100  10  0  0  0
S1   RainBarrel   2  10   0   0  0  0
";

    fn names(elements: &[Element]) -> Vec<&str> {
        elements.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_inputs() {
        let sections = InpSections::parse(MODEL).unwrap();
        let inputs = inputs(&sections);
        assert_eq!(
            vec!["ElapsedTime", "RG1", "P1", "OR2", "W1", "J2"],
            names(&inputs)
        );
        assert_eq!(ObjectType::System, inputs[0].object_type);
        assert_eq!(Property::Setting, inputs[3].property);
        assert_eq!(ObjectType::Node, inputs[5].object_type);
        assert_eq!(Property::LatFlow, inputs[5].property);
    }

    #[test]
    fn test_outputs() {
        let sections = InpSections::parse(MODEL).unwrap();
        let outputs = outputs(&sections);
        assert_eq!(
            vec![
                "SU1",
                "OUT1",
                "OR1",
                "OR2",
                "W1",
                "S1",
                "S2",
                "S1/InfilTrench",
                "S1/RainBarrel"
            ],
            names(&outputs)
        );
        assert_eq!(Property::Volume, outputs[0].property);
        assert_eq!(ObjectType::Lid, outputs[7].object_type);
        assert_eq!(Property::StorageVolume, outputs[8].property);
    }

    #[test]
    fn test_empty_model() {
        let sections = InpSections::parse("[TITLE]\nempty\n").unwrap();
        assert_eq!(vec!["ElapsedTime"], names(&inputs(&sections)));
        assert!(outputs(&sections).is_empty());
    }

    #[test]
    fn test_mapping() {
        let sections = InpSections::parse(MODEL).unwrap();
        let mapping = mapping(&sections, "xxh3:0123456789abcdef").unwrap();
        assert_eq!(6, mapping.inputs().len());
        assert_eq!(9, mapping.outputs().len());
        assert_eq!(Some("xxh3:0123456789abcdef"), mapping.fingerprint());

        let lid = &mapping.outputs()[7];
        assert_eq!(7, lid.interface_index);
        assert_eq!("S1/InfilTrench", lid.element_name);
        assert_eq!("LID", lid.object_type_name);
        assert_eq!("STORAGE_VOLUME", lid.property_name);

        let parsed = MappingFile::from_json(&mapping.to_json().unwrap()).unwrap();
        assert_eq!(mapping, parsed);
    }

    #[test]
    fn test_generate_and_write() {
        let dir = std::env::temp_dir().join(format!("gsswmm_utils_generate_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let model = dir.join("model.inp");
        std::fs::write(&model, MODEL).unwrap();

        let mapping = generate(&model).unwrap();
        assert_eq!(Some(fingerprint::of_str(MODEL).as_str()), mapping.fingerprint());

        let path = dir.join("SwmmGoldSimBridge.json");
        write(&mapping, &path).unwrap();
        assert_eq!(mapping, MappingFile::load(&path).unwrap());

        assert!(matches!(
            generate(dir.join("absent.inp")),
            Err(GenerateError::Io { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_generate_invalid_model() {
        let dir = std::env::temp_dir().join(format!("gsswmm_utils_invalid_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let model = dir.join("model.inp");
        let text = MODEL
            .replace("[OUTFALLS]\nOUT1 8   FREE  NO\n", "")
            .replace("W1   J2  OUT1", "W1   J2  J1");
        std::fs::write(&model, text).unwrap();

        match generate(&model) {
            Err(GenerateError::InvalidModel { errors, .. }) => {
                assert_eq!(1, errors.len());
                assert!(errors[0].message.contains("no outfalls"));
                let message = GenerateError::InvalidModel {
                    path: model.clone(),
                    errors,
                }
                .to_string();
                assert!(message.contains("model.inp"), "{message}");
            }
            other => panic!("unexpected result {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}

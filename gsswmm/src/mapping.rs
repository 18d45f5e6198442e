//! Interface mapping files.
//!
//! A mapping file is a JSON document listing the values exchanged with the host on every step.
//! Each entry ties a position of the host's input or output array to a named element of the
//! hydraulic model and one of its properties. This module only checks the structure of the
//! document; whether names exist in the model is decided when the mapping is resolved.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The only mapping format version understood by this crate.
pub const FORMAT_VERSION: &str = "1.0";

/// Verbosity of the bridge log, as requested by a mapping file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoggingLevel {
    Off,
    Error,
    #[default]
    Info,
    Debug,
}

impl std::str::FromStr for LoggingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OFF" => Ok(Self::Off),
            "ERROR" => Ok(Self::Error),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            _ => Err(format!("unknown logging level '{s}'")),
        }
    }
}

impl std::fmt::Display for LoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Off => "OFF",
            Self::Error => "ERROR",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}

/// One entry of the `inputs` or `outputs` array of a mapping file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Position in the host array, starting at 0.
    pub interface_index: usize,
    /// Engine object name, or `container/device` for nested devices.
    pub element_name: String,
    pub object_type_name: String,
    pub property_name: String,
    /// Informative engine index written by the generator. It is never trusted at runtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_index: Option<i64>,
}

impl Descriptor {
    pub fn new<S: Into<String>, T: Into<String>, U: Into<String>>(
        interface_index: usize,
        element_name: S,
        object_type_name: T,
        property_name: U,
    ) -> Self {
        Self {
            interface_index,
            element_name: element_name.into(),
            object_type_name: object_type_name.into(),
            property_name: property_name.into(),
            engine_index: None,
        }
    }

    /// Sets the informative engine index.
    pub fn with_engine_index(mut self, engine_index: i64) -> Self {
        self.engine_index = Some(engine_index);
        self
    }
}

/// Entry of the `inputs` array.
pub type InputDescriptor = Descriptor;
/// Entry of the `outputs` array.
pub type OutputDescriptor = Descriptor;

/// Which descriptor array of a mapping file an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Array {
    Inputs,
    Outputs,
}

impl Array {
    fn key(self) -> Key {
        match self {
            Self::Inputs => Key::INPUTS,
            Self::Outputs => Key::OUTPUTS,
        }
    }

    fn count_key(self) -> Key {
        match self {
            Self::Inputs => Key::INPUT_COUNT,
            Self::Outputs => Key::OUTPUT_COUNT,
        }
    }
}

impl std::fmt::Display for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key().name)
    }
}

/// A document key with the legacy spelling accepted in its place.
#[derive(Clone, Copy)]
struct Key {
    name: &'static str,
    legacy: &'static str,
}

impl Key {
    const FORMAT_VERSION: Key = Key::new("formatVersion", "version");
    const FINGERPRINT: Key = Key::new("sourceModelFingerprint", "inp_file_hash");
    const LOGGING_LEVEL: Key = Key::new("loggingLevel", "logging_level");
    const INPUT_COUNT: Key = Key::new("inputCount", "input_count");
    const OUTPUT_COUNT: Key = Key::new("outputCount", "output_count");
    const INPUTS: Key = Key::new("inputs", "inputs");
    const OUTPUTS: Key = Key::new("outputs", "outputs");
    const INTERFACE_INDEX: Key = Key::new("interfaceIndex", "index");
    const ELEMENT_NAME: Key = Key::new("elementName", "name");
    const OBJECT_TYPE_NAME: Key = Key::new("objectTypeName", "object_type");
    const PROPERTY_NAME: Key = Key::new("propertyName", "property");
    const ENGINE_INDEX: Key = Key::new("engineIndex", "swmm_index");

    const fn new(name: &'static str, legacy: &'static str) -> Self {
        Self { name, legacy }
    }

    fn get(self, object: &Map<String, Value>) -> Option<&Value> {
        object.get(self.name).or_else(|| object.get(self.legacy))
    }
}

/// Structural problems found while loading a mapping file.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error(
        "Error: Mapping file not found\nContext: File path '{}' ({source})\nSuggestion: Ensure the mapping file exists and is accessible, or generate it from the model with gsswmm_mapgen",
        .path.display()
    )]
    NotFound {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(
        "Error: Mapping file is empty\nContext: File path '{}'\nSuggestion: Ensure the mapping file contains valid JSON content",
        .path.display()
    )]
    Empty { path: PathBuf },
    #[error(
        "Error: Invalid mapping file format\nContext: File '{}': {detail}\nSuggestion: Ensure the file contains a valid JSON object",
        .path.display()
    )]
    MalformedFormat { path: PathBuf, detail: String },
    #[error(
        "Error: Required field missing from mapping file\nContext: Field '{field}' in file '{}'\nSuggestion: Regenerate the mapping file using the current version of the generator",
        .path.display()
    )]
    MissingField { path: PathBuf, field: &'static str },
    #[error(
        "Error: Invalid value in mapping file\nContext: Field '{field}' in file '{}': {problem}\nSuggestion: Regenerate the mapping file using the current version of the generator",
        .path.display()
    )]
    InvalidField {
        path: PathBuf,
        field: &'static str,
        problem: String,
    },
    #[error(
        "Error: Unsupported mapping file version\nContext: Version '{found}' in file '{}' (supported: {supported})\nSuggestion: Regenerate the mapping file using the current version of the generator",
        .path.display(),
        supported = FORMAT_VERSION
    )]
    UnsupportedVersion { path: PathBuf, found: String },
    #[error(
        "Error: Malformed {array} entry\nContext: Entry {position}, field '{field}': {problem}\nSuggestion: Ensure every entry has an integer interfaceIndex and string elementName, objectTypeName and propertyName"
    )]
    MalformedEntry {
        array: Array,
        position: usize,
        field: &'static str,
        problem: &'static str,
    },
    #[error(
        "Error: {array} count mismatch\nContext: Expected {expected} {array}, found {found}\nSuggestion: Regenerate the mapping file to ensure consistency"
    )]
    CountMismatch {
        array: Array,
        expected: usize,
        found: usize,
    },
    #[error(
        "Error: Negative interface index\nContext: Entry {position} of {array} has interfaceIndex {found}\nSuggestion: Number {array} from 0 upwards"
    )]
    NegativeIndex {
        array: Array,
        position: usize,
        found: i64,
    },
    #[error(
        "Error: {array} interface indices are not contiguous\nContext: Expected interfaceIndex {expected}, found {found}\nSuggestion: Number {array} 0, 1, 2, ... without gaps or duplicates"
    )]
    IndexLayout {
        array: Array,
        expected: usize,
        found: usize,
    },
}

/// A parsed and structurally valid interface mapping.
///
/// Descriptor arrays are sorted by interface index, and the indices of each array are exactly
/// `0..len`.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingFile {
    format_version: String,
    fingerprint: Option<String>,
    logging_level: LoggingLevel,
    inputs: Vec<InputDescriptor>,
    outputs: Vec<OutputDescriptor>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document<'a> {
    format_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_model_fingerprint: Option<&'a str>,
    logging_level: LoggingLevel,
    input_count: usize,
    output_count: usize,
    inputs: &'a [InputDescriptor],
    outputs: &'a [OutputDescriptor],
}

impl MappingFile {
    /// Creates a mapping from descriptor lists, validating their index layout.
    pub fn new(
        inputs: Vec<InputDescriptor>,
        outputs: Vec<OutputDescriptor>,
    ) -> Result<Self, MappingError> {
        Ok(Self {
            format_version: FORMAT_VERSION.to_string(),
            fingerprint: None,
            logging_level: LoggingLevel::default(),
            inputs: arrange(Array::Inputs, inputs)?,
            outputs: arrange(Array::Outputs, outputs)?,
        })
    }

    /// Sets the fingerprint of the model the mapping was generated from.
    pub fn with_fingerprint<S: Into<String>>(mut self, fingerprint: S) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Sets the logging level requested by the mapping.
    pub fn with_logging_level(mut self, logging_level: LoggingLevel) -> Self {
        self.logging_level = logging_level;
        self
    }

    /// Reads and validates the mapping file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MappingError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Validates a mapping document held in memory.
    pub fn from_json(text: &str) -> Result<Self, MappingError> {
        Self::parse(text, Path::new("<memory>"))
    }

    /// Serializes the mapping with the current key names.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Document {
            format_version: &self.format_version,
            source_model_fingerprint: self.fingerprint.as_deref(),
            logging_level: self.logging_level,
            input_count: self.inputs.len(),
            output_count: self.outputs.len(),
            inputs: &self.inputs,
            outputs: &self.outputs,
        })
    }

    #[inline]
    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    /// Returns the fingerprint of the model the mapping was generated from, if any.
    #[inline]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    #[inline]
    pub fn logging_level(&self) -> LoggingLevel {
        self.logging_level
    }

    #[inline]
    pub fn inputs(&self) -> &[InputDescriptor] {
        &self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> &[OutputDescriptor] {
        &self.outputs
    }

    fn parse(text: &str, path: &Path) -> Result<Self, MappingError> {
        if text.trim().is_empty() {
            return Err(MappingError::Empty {
                path: path.to_path_buf(),
            });
        }
        let root: Value =
            serde_json::from_str(text).map_err(|e| MappingError::MalformedFormat {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        let Value::Object(root) = root else {
            return Err(MappingError::MalformedFormat {
                path: path.to_path_buf(),
                detail: "top-level value is not an object".to_string(),
            });
        };

        let missing = |key: Key| MappingError::MissingField {
            path: path.to_path_buf(),
            field: key.name,
        };
        let invalid = |key: Key, problem: &str| MappingError::InvalidField {
            path: path.to_path_buf(),
            field: key.name,
            problem: problem.to_string(),
        };

        let version = Key::FORMAT_VERSION
            .get(&root)
            .ok_or_else(|| missing(Key::FORMAT_VERSION))?;
        let version = version
            .as_str()
            .ok_or_else(|| invalid(Key::FORMAT_VERSION, "expected a string"))?;
        if version != FORMAT_VERSION {
            return Err(MappingError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: version.to_string(),
            });
        }

        let fingerprint = match Key::FINGERPRINT.get(&root) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(invalid(Key::FINGERPRINT, "expected a string")),
        };

        let logging_level = match Key::LOGGING_LEVEL.get(&root) {
            None | Some(Value::Null) => LoggingLevel::default(),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|e: String| invalid(Key::LOGGING_LEVEL, &e))?,
            Some(_) => return Err(invalid(Key::LOGGING_LEVEL, "expected a string")),
        };

        let mut arrays = Vec::with_capacity(2);
        for array in [Array::Inputs, Array::Outputs] {
            let entries = array.key().get(&root).ok_or_else(|| missing(array.key()))?;
            let entries = entries
                .as_array()
                .ok_or_else(|| invalid(array.key(), "expected an array"))?;
            let descriptors = entries
                .iter()
                .enumerate()
                .map(|(position, entry)| parse_entry(array, position, entry))
                .collect::<Result<Vec<_>, _>>()?;

            match array.count_key().get(&root) {
                None | Some(Value::Null) => {}
                Some(count) => {
                    let expected = count
                        .as_u64()
                        .ok_or_else(|| invalid(array.count_key(), "expected a non-negative integer"))?
                        as usize;
                    if expected != descriptors.len() {
                        return Err(MappingError::CountMismatch {
                            array,
                            expected,
                            found: descriptors.len(),
                        });
                    }
                }
            }
            arrays.push(arrange(array, descriptors)?);
        }
        let outputs = arrays.pop().unwrap_or_default();
        let inputs = arrays.pop().unwrap_or_default();

        tracing::debug!(
            "parsed mapping {}: {} inputs, {} outputs",
            path.display(),
            inputs.len(),
            outputs.len()
        );
        Ok(Self {
            format_version: version.to_string(),
            fingerprint,
            logging_level,
            inputs,
            outputs,
        })
    }
}

fn parse_entry(array: Array, position: usize, entry: &Value) -> Result<Descriptor, MappingError> {
    let malformed = |key: Key, problem: &'static str| MappingError::MalformedEntry {
        array,
        position,
        field: key.name,
        problem,
    };
    let Value::Object(entry) = entry else {
        return Err(MappingError::MalformedEntry {
            array,
            position,
            field: "entry",
            problem: "expected an object",
        });
    };
    let text = |key: Key| -> Result<String, MappingError> {
        match key.get(entry) {
            None => Err(malformed(key, "missing")),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(malformed(key, "expected a string")),
        }
    };

    let index = match Key::INTERFACE_INDEX.get(entry) {
        None => return Err(malformed(Key::INTERFACE_INDEX, "missing")),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| malformed(Key::INTERFACE_INDEX, "expected an integer"))?,
    };
    let interface_index = usize::try_from(index).map_err(|_| MappingError::NegativeIndex {
        array,
        position,
        found: index,
    })?;
    let engine_index = match Key::ENGINE_INDEX.get(entry) {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| malformed(Key::ENGINE_INDEX, "expected an integer"))?,
        ),
    };

    Ok(Descriptor {
        interface_index,
        element_name: text(Key::ELEMENT_NAME)?,
        object_type_name: text(Key::OBJECT_TYPE_NAME)?,
        property_name: text(Key::PROPERTY_NAME)?,
        engine_index,
    })
}

/// Sorts descriptors by interface index and checks that the indices are exactly `0..len`.
fn arrange(array: Array, mut descriptors: Vec<Descriptor>) -> Result<Vec<Descriptor>, MappingError> {
    descriptors.sort_by_key(|d| d.interface_index);
    for (expected, descriptor) in descriptors.iter().enumerate() {
        if descriptor.interface_index != expected {
            return Err(MappingError::IndexLayout {
                array,
                expected,
                found: descriptor.interface_index,
            });
        }
    }
    Ok(descriptors)
}

#![allow(dead_code)]

use gsswmm::engine::{EngineProperty, MemoryEngine};
use gsswmm::BridgeConfig;
use std::path::{Path, PathBuf};

pub const MODEL: &str = "\
[TITLE]
Bridge test model

[RAINGAGES]
RG1  INTENSITY 0:15 1.0 TIMESERIES DUMMY

[SUBCATCHMENTS]
S1   RG1  J1  5  50  500  0.5  0

[JUNCTIONS]
J1   10  2  0  0  0

[OUTFALLS]
OUT1 8   FREE  NO

[CONDUITS]
C1   J1  OUT1  400  0.01  0  0  0  0
";

/// Temporary directory holding a model and a mapping file.
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("gsswmm_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let workspace = Self { dir };
        workspace.write("model.inp", MODEL);
        workspace
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> BridgeConfig {
        BridgeConfig::in_dir(&self.dir)
    }

    pub fn write(&self, name: &str, text: &str) {
        std::fs::write(self.dir.join(name), text).unwrap();
    }

    pub fn write_mapping(&self, text: &str) {
        self.write("SwmmGoldSimBridge.json", text);
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.dir.join(name)).unwrap();
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Engine holding the objects of [`MODEL`], plus a LID unit in `S1`.
pub fn engine() -> MemoryEngine {
    MemoryEngine::new()
        .with_gage("RG1")
        .with_subcatch("S1")
        .with_node("J1")
        .with_node("OUT1")
        .with_link("C1")
        .with_nested("S1", "InfilTrench")
        .with_value(EngineProperty::NodeInflow, "OUT1", 0.75)
}

fn entries(list: &[(&str, &str, &str)]) -> String {
    list.iter()
        .enumerate()
        .map(|(i, (element, object_type, property))| {
            format!(
                r#"{{"interfaceIndex": {i}, "elementName": "{element}", "objectTypeName": "{object_type}", "propertyName": "{property}"}}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",\n        ")
}

/// Builds a mapping document from `(element, type, property)` triples.
pub fn mapping(inputs: &[(&str, &str, &str)], outputs: &[(&str, &str, &str)]) -> String {
    format!(
        r#"{{
    "formatVersion": "1.0",
    "loggingLevel": "DEBUG",
    "inputCount": {},
    "outputCount": {},
    "inputs": [
        {}
    ],
    "outputs": [
        {}
    ]
}}"#,
        inputs.len(),
        outputs.len(),
        entries(inputs),
        entries(outputs)
    )
}

/// Elapsed time in, outfall flow of `element` out.
pub fn outfall_mapping(element: &str) -> String {
    mapping(
        &[("ElapsedTime", "SYSTEM", "ELAPSEDTIME")],
        &[(element, "OUTFALL", "FLOW")],
    )
}

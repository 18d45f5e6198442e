//! Reader for SWMM `.inp` model files.
//!
//! Only the section structure is parsed: every data line becomes a list of whitespace-separated
//! fields under the name of its section.

use std::{
    collections::HashMap,
    ops::Deref,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InpError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed section header at line {line}: '{text}' is missing the closing bracket")]
    MalformedHeader { line: usize, text: String },
    #[error("empty section name at line {line}: '{text}'")]
    EmptySectionName { line: usize, text: String },
    #[error("unexpected bracket at line {line}: '{text}'")]
    UnexpectedBracket { line: usize, text: String },
}

/// Data lines of a model file, grouped by upper-case section name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InpSections(HashMap<String, Vec<Vec<String>>>);

impl InpSections {
    /// Parses model text.
    ///
    /// Blank lines, comment lines and inline comments (from `;` to the end of the line) are
    /// ignored, as are data lines before the first section header.
    pub fn parse(text: &str) -> Result<Self, InpError> {
        let mut sections: HashMap<String, Vec<Vec<String>>> = HashMap::new();
        let mut current: Option<String> = None;

        for (number, raw) in text.lines().enumerate() {
            let line_number = number + 1;
            let line = match raw.split_once(';') {
                Some((data, _)) => data.trim(),
                None => raw.trim(),
            };
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                if !line.ends_with(']') {
                    return Err(InpError::MalformedHeader {
                        line: line_number,
                        text: line.to_string(),
                    });
                }
                let name = line[1..line.len() - 1].trim();
                if name.is_empty() {
                    return Err(InpError::EmptySectionName {
                        line: line_number,
                        text: line.to_string(),
                    });
                }
                let name = name.to_ascii_uppercase();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            if line.contains(['[', ']']) {
                return Err(InpError::UnexpectedBracket {
                    line: line_number,
                    text: line.to_string(),
                });
            }
            if let Some(section) = &current {
                let fields = line.split_whitespace().map(String::from).collect();
                sections.entry(section.clone()).or_default().push(fields);
            }
        }
        Ok(Self(sections))
    }

    /// Reads and parses a model file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, InpError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| InpError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Returns the data lines of a section, or nothing if the model lacks it.
    pub fn section(&self, name: &str) -> &[Vec<String>] {
        self.0
            .get(&name.to_ascii_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the object names (first field) of a section, in file order.
    pub fn names<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.section(name)
            .iter()
            .filter_map(|fields| fields.first().map(String::as_str))
    }
}

impl Deref for InpSections {
    type Target = HashMap<String, Vec<Vec<String>>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

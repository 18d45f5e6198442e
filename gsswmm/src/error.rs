use crate::adapter::ResolveError;
use crate::engine::{EngineError, Operation};
use crate::mapping::MappingError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the bridge lifecycle.
///
/// The `Display` text of every variant reads `Error: ...`, `Context: ...`, `Suggestion: ...` on
/// three lines, which is what the host shows to the user.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(
        "Error: SWMM input file path is empty\nContext: File path is empty\nSuggestion: Ensure the input file path is specified in the model configuration"
    )]
    ModelPathEmpty,
    #[error(
        "Error: SWMM input file not found\nContext: File path '{}'\nSuggestion: Verify the file path is correct and the file exists",
        .path.display()
    )]
    ModelFileNotFound { path: PathBuf },
    #[error(
        "Error: SWMM input path is a directory\nContext: Path '{}'\nSuggestion: Provide a file path, not a directory path",
        .path.display()
    )]
    ModelPathIsDirectory { path: PathBuf },
    #[error(
        "Error: SWMM failed to {phase}\nContext: {}\nSuggestion: Check the SWMM report file for details",
        .source.message
    )]
    Engine {
        phase: Operation,
        source: EngineError,
    },
    #[error(
        "Error: Bridge is not initialized\nContext: Calculate called outside of a simulation session\nSuggestion: Initialize the bridge before calculating"
    )]
    NotInitialized,
    #[error(
        "Error: {array} array is too short\nContext: Expected at least {expected} values, received {found}\nSuggestion: Make the external element's {array} count match the mapping file"
    )]
    InputArrayTooShort {
        array: &'static str,
        expected: usize,
        found: usize,
    },
}

impl Error {
    pub(crate) fn engine(phase: Operation, source: EngineError) -> Self {
        Self::Engine { phase, source }
    }

    /// Returns `false` for errors reported to the host as a plain failure, without a message.
    pub fn has_message(&self) -> bool {
        !matches!(self, Self::NotInitialized)
    }
}

/// Result type of bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_part_messages() {
        let errors = [
            Error::ModelPathEmpty,
            Error::ModelFileNotFound {
                path: PathBuf::from("missing.inp"),
            },
            Error::ModelPathIsDirectory {
                path: PathBuf::from("models"),
            },
            Error::engine(Operation::Start, EngineError::new(200, "ERROR 200: input errors")),
            Error::NotInitialized,
            Error::InputArrayTooShort {
                array: "input",
                expected: 3,
                found: 1,
            },
        ];
        for e in errors {
            let message = e.to_string();
            let lines: Vec<_> = message.lines().collect();
            assert_eq!(3, lines.len(), "{message}");
            assert!(lines[0].starts_with("Error: "));
            assert!(lines[1].starts_with("Context: "));
            assert!(lines[2].starts_with("Suggestion: "));
        }
    }

    #[test]
    fn test_engine_error_text() {
        let e = Error::engine(Operation::Open, EngineError::new(303, "ERROR 303: cannot open"));
        let message = e.to_string();
        assert!(message.contains("failed to open the model"));
        assert!(message.contains("ERROR 303: cannot open"));
        assert!(e.has_message());
        assert!(!Error::NotInitialized.has_message());
    }
}

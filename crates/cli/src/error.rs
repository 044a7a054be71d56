//! CLI errors and their exit codes.
//!
//! | code | meaning                                         |
//! |------|-------------------------------------------------|
//! | 0    | success                                         |
//! | 2    | argument parse error (raised by clap)           |
//! | 10   | engine error                                    |
//! | 11   | an input file could not be read                 |
//! | 12   | an input file could not be understood           |
//! | 13   | output could not be serialized                  |

use shaderlab_core::EngineError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(EngineError),

    #[error("{}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("{}: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },

    /// Scene contents that load but cannot be ordered.
    #[error("{0}")]
    Scene(String),

    #[error("cannot serialize output: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    /// Attaches the input file to an error raised while loading it.
    pub fn at(path: &Path, error: EngineError) -> Self {
        let path = path.to_path_buf();
        match error {
            EngineError::Io(message) => CliError::Unreadable { path, message },
            EngineError::InvalidDocument(message) => CliError::Malformed { path, message },
            other => CliError::Engine(other),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(_) => 10,
            CliError::Unreadable { .. } => 11,
            CliError::Malformed { .. } | CliError::Scene(_) => 12,
            CliError::Serialization(_) => 13,
        }
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidDocument(message) => CliError::Scene(message),
            other => CliError::Engine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_failures_name_the_file_and_exit_11() {
        let err = CliError::at(Path::new("a/pack.glsl"), EngineError::Io("not found".into()));
        assert_eq!(err.exit_code(), 11);
        assert_eq!(err.to_string(), "a/pack.glsl: not found");
    }

    #[test]
    fn malformed_documents_exit_12() {
        let err = CliError::at(
            Path::new("scene.json"),
            EngineError::InvalidDocument("line 3: duplicate section".into()),
        );
        assert_eq!(err.exit_code(), 12);
        assert!(err.to_string().starts_with("scene.json: line 3"), "got: {err}");
    }

    #[test]
    fn other_engine_errors_pass_through_with_exit_10() {
        let err = CliError::at(Path::new("x"), EngineError::DuplicateComponent("b".into()));
        assert_eq!(err.exit_code(), 10);
        assert_eq!(err.to_string(), "duplicate component: b");
    }

    #[test]
    fn invalid_scene_entries_exit_12() {
        let err = CliError::from(EngineError::InvalidDocument("not an object".into()));
        assert_eq!(err.exit_code(), 12);
        assert_eq!(CliError::Scene("twice".into()).exit_code(), 12);
    }

    #[test]
    fn serialization_failures_exit_13() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        assert_eq!(CliError::from(json_err).exit_code(), 13);
    }
}

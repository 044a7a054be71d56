//! Error types for the shaderlab core.

use thiserror::Error;

use crate::stage::StageKind;

/// A diagnostic attached to a program or one of its stages.
///
/// These are accumulated, never thrown: a program with diagnostics simply
/// stays unlinked until its source changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShaderError {
    /// A stage failed to compile. `line` is the 1-based source line when the
    /// driver diagnostic carried one.
    #[error("{} shader{}: {message}", stage_title(.stage), line_suffix(.line))]
    Compile {
        stage: StageKind,
        line: Option<u32>,
        message: String,
    },

    /// The program failed to link.
    #[error("program link error: {0}")]
    Link(String),

    /// A stage the program cannot be linked without has no source.
    #[error("a {0} shader is required to create a program")]
    MissingStage(StageKind),

    /// The graphics context (or a capability it must have) is unavailable.
    #[error("graphics context unavailable: {0}")]
    ContextUnavailable(String),
}

fn stage_title(stage: &StageKind) -> &'static str {
    stage.title()
}

fn line_suffix(line: &Option<u32>) -> String {
    match line {
        Some(n) => format!(" (line {n})"),
        None => String::new(),
    }
}

impl ShaderError {
    /// Parses one non-blank line of a driver info log.
    ///
    /// An optional `ERROR:` prefix is dropped. If the remainder has the shape
    /// `<ignored>:<line>:<message>` the line number is kept; otherwise the
    /// whole trimmed text becomes the message.
    pub fn from_log_line(stage: StageKind, raw: &str) -> Self {
        let text = raw.trim();
        let text = match text.get(..6) {
            Some(prefix) if prefix.eq_ignore_ascii_case("ERROR:") => text[6..].trim_start(),
            _ => text,
        };

        let mut parts = text.splitn(3, ':');
        let parsed = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(line), Some(message)) => line
                .trim()
                .parse::<u32>()
                .ok()
                .map(|n| (n, message.trim())),
            _ => None,
        };

        match parsed {
            Some((line, message)) => ShaderError::Compile {
                stage,
                line: Some(line),
                message: message.to_string(),
            },
            None => ShaderError::Compile {
                stage,
                line: None,
                message: text.to_string(),
            },
        }
    }

    /// Splits a whole info log into one diagnostic per non-blank line.
    pub fn from_log(stage: StageKind, log: &str) -> Vec<Self> {
        log.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Self::from_log_line(stage, line))
            .collect()
    }

    /// The stage this diagnostic came from, if it is stage-specific.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            ShaderError::Compile { stage, .. } | ShaderError::MissingStage(stage) => Some(*stage),
            _ => None,
        }
    }

    /// The 1-based source line, if known.
    pub fn line(&self) -> Option<u32> {
        match self {
            ShaderError::Compile { line, .. } => *line,
            _ => None,
        }
    }
}

/// Errors produced by engine operations outside shader diagnostics.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A persisted document or shader pack could not be understood.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A sampler image could not be decoded or uploaded.
    #[error("image error: {0}")]
    Image(String),

    /// No component with this identity is registered.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// A component with this identity is already registered.
    #[error("duplicate component: {0}")]
    DuplicateComponent(String),

    /// A built-in needs a host capability that is not available.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A GPU object could not be created.
    #[error("graphics error: {0}")]
    Graphics(String),

    /// Rendering is disabled because the graphics context is unavailable.
    #[error("graphics context unavailable: {0}")]
    ContextUnavailable(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<image::ImageError> for EngineError {
    fn from(e: image::ImageError) -> Self {
        EngineError::Image(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InvalidDocument(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_line_with_line_number_is_parsed() {
        let err = ShaderError::from_log_line(
            StageKind::Fragment,
            "ERROR: 0:12: 'foo' : undeclared identifier",
        );
        assert_eq!(err.line(), Some(12));
        match err {
            ShaderError::Compile { message, .. } => {
                assert_eq!(message, "'foo' : undeclared identifier")
            }
            other => panic!("expected compile error, got: {other:?}"),
        }
    }

    #[test]
    fn log_line_without_error_prefix_is_parsed() {
        let err = ShaderError::from_log_line(StageKind::Vertex, "0:3: syntax error");
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn log_line_with_unconventional_shape_keeps_no_line() {
        let err = ShaderError::from_log_line(
            StageKind::Vertex,
            "0(7) : error C0000: syntax error, unexpected '}'",
        );
        assert_eq!(err.line(), None, "expected no line, got: {err:?}");
        assert!(err.to_string().contains("0(7)"), "got: {err}");
    }

    #[test]
    fn log_line_with_non_numeric_line_keeps_whole_message() {
        let err = ShaderError::from_log_line(StageKind::Geometry, "WARNING: a: b: c");
        assert_eq!(err.line(), None);
        assert!(err.to_string().contains("WARNING: a: b: c"), "got: {err}");
    }

    #[test]
    fn from_log_skips_blank_lines() {
        let log = "ERROR: 0:1: first\n\n   \nERROR: 0:2: second\n";
        let errors = ShaderError::from_log(StageKind::Fragment, log);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line(), Some(1));
        assert_eq!(errors[1].line(), Some(2));
    }

    #[test]
    fn compile_error_display_includes_stage_and_line() {
        let err = ShaderError::Compile {
            stage: StageKind::Fragment,
            line: Some(4),
            message: "undeclared identifier".into(),
        };
        assert_eq!(err.to_string(), "Fragment shader (line 4): undeclared identifier");
    }

    #[test]
    fn compile_error_display_without_line() {
        let err = ShaderError::Compile {
            stage: StageKind::TessEval,
            line: None,
            message: "oops".into(),
        };
        assert_eq!(err.to_string(), "Tessellation evaluation shader: oops");
    }

    #[test]
    fn missing_stage_names_the_stage() {
        let msg = ShaderError::MissingStage(StageKind::Vertex).to_string();
        assert!(msg.contains("vertex"), "missing stage name in: {msg}");
    }

    #[test]
    fn stage_accessor_is_none_for_link_errors() {
        assert_eq!(ShaderError::Link("x".into()).stage(), None);
        assert_eq!(
            ShaderError::MissingStage(StageKind::Fragment).stage(),
            Some(StageKind::Fragment)
        );
    }

    #[test]
    fn engine_error_messages_include_detail() {
        let cases = [
            EngineError::Io("disk full".into()),
            EngineError::InvalidDocument("bad header".into()),
            EngineError::UnknownComponent("abc".into()),
            EngineError::Unsupported("depth capture".into()),
        ];
        for (err, needle) in cases
            .iter()
            .zip(["disk full", "bad header", "abc", "depth capture"])
        {
            let msg = err.to_string();
            assert!(msg.contains(needle), "expected '{needle}' in: {msg}");
        }
    }

    #[test]
    fn io_error_converts_to_engine_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = EngineError::from(io);
        assert!(matches!(err, EngineError::Io(ref m) if m.contains("no such file")));
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
        assert_send_sync::<ShaderError>();
    }

    #[test]
    fn errors_implement_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<EngineError>();
        assert_std_error::<ShaderError>();
    }
}

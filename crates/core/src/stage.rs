//! A single shader stage: source text, compiled handle and diagnostics.

use std::cell::OnceCell;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ShaderError;
use crate::gl::{GraphicsApi, NO_HANDLE};
use crate::recycle::RecycleBin;
use crate::scan::{self, AttributeDescriptor, Declarations, UniformDescriptor};

/// The five programmable pipeline stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Vertex,
    TessControl,
    TessEval,
    Geometry,
    Fragment,
}

impl StageKind {
    /// All stages in the order declarations are searched.
    pub const ALL: [StageKind; 5] = [
        StageKind::Vertex,
        StageKind::TessControl,
        StageKind::TessEval,
        StageKind::Geometry,
        StageKind::Fragment,
    ];

    /// Capitalized name used at the start of diagnostics.
    pub fn title(&self) -> &'static str {
        match self {
            StageKind::Vertex => "Vertex",
            StageKind::TessControl => "Tessellation control",
            StageKind::TessEval => "Tessellation evaluation",
            StageKind::Geometry => "Geometry",
            StageKind::Fragment => "Fragment",
        }
    }

    /// Position in [`StageKind::ALL`].
    pub fn index(&self) -> usize {
        match self {
            StageKind::Vertex => 0,
            StageKind::TessControl => 1,
            StageKind::TessEval => 2,
            StageKind::Geometry => 3,
            StageKind::Fragment => 4,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Vertex => "vertex",
            StageKind::TessControl => "tessellation control",
            StageKind::TessEval => "tessellation evaluation",
            StageKind::Geometry => "geometry",
            StageKind::Fragment => "fragment",
        };
        f.write_str(name)
    }
}

/// One shader stage of a program.
///
/// The compiled handle is `0` until [`compile`](Self::compile) succeeds on
/// non-empty source. Declared uniforms and attributes are scanned from the
/// source on first request and cached until the source changes.
#[derive(Debug)]
pub struct ShaderStage {
    kind: StageKind,
    source: String,
    handle: u32,
    errors: Vec<ShaderError>,
    declarations: OnceCell<Declarations>,
}

impl ShaderStage {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            source: String::new(),
            handle: NO_HANDLE,
            errors: Vec::new(),
            declarations: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn errors(&self) -> &[ShaderError] {
        &self.errors
    }

    /// Whether the stage has any non-whitespace source.
    pub fn is_empty(&self) -> bool {
        self.source.trim().is_empty()
    }

    /// Replaces the source text. Returns `false` if it was unchanged.
    ///
    /// A change drops the compiled handle (queued into `bin`), the previous
    /// diagnostics and the cached declarations.
    pub fn set_source(&mut self, source: &str, bin: &mut RecycleBin) -> bool {
        if self.source == source {
            return false;
        }
        self.source = source.to_string();
        self.set_handle(NO_HANDLE, bin);
        self.errors.clear();
        self.declarations = OnceCell::new();
        true
    }

    /// Compiles the stage if it is not compiled yet.
    ///
    /// Empty source succeeds without touching the graphics API and leaves
    /// the handle at `0`. On failure every non-blank line of the driver log
    /// becomes one [`ShaderError::Compile`].
    pub fn compile(&mut self, api: &dyn GraphicsApi, bin: &mut RecycleBin) -> bool {
        if self.handle != NO_HANDLE {
            return true;
        }
        self.errors.clear();
        if self.is_empty() {
            return true;
        }

        match api.compile_shader(self.kind, &self.source) {
            Ok(handle) => {
                log::debug!("compiled {} shader as {handle}", self.kind);
                self.set_handle(handle, bin);
                true
            }
            Err(info_log) => {
                self.errors = ShaderError::from_log(self.kind, &info_log);
                if self.errors.is_empty() {
                    self.errors.push(ShaderError::Compile {
                        stage: self.kind,
                        line: None,
                        message: "compilation failed without a diagnostic".to_string(),
                    });
                }
                log::warn!(
                    "{} shader failed to compile with {} diagnostic(s)",
                    self.kind,
                    self.errors.len()
                );
                false
            }
        }
    }

    /// Queues the compiled handle for deletion, keeping the source.
    pub fn release(&mut self, bin: &mut RecycleBin) {
        self.set_handle(NO_HANDLE, bin);
    }

    /// Uniform declarations found in the source.
    pub fn uniforms(&self) -> &[UniformDescriptor] {
        &self.declarations().uniforms
    }

    /// Attribute declarations found in the source.
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.declarations().attributes
    }

    fn declarations(&self) -> &Declarations {
        self.declarations.get_or_init(|| scan::scan(&self.source))
    }

    pub(crate) fn has_cached_declarations(&self) -> bool {
        self.declarations.get().is_some()
    }

    fn set_handle(&mut self, handle: u32, bin: &mut RecycleBin) {
        if self.handle != handle {
            bin.add_shader(self.handle);
            self.handle = handle;
        }
    }
}

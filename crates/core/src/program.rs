//! A linkable program made of up to five stages, plus its draw settings.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::ShaderError;
use crate::gl::{GraphicsApi, NO_HANDLE};
use crate::recycle::RecycleBin;
use crate::scan::{AttributeDescriptor, UniformDescriptor};
use crate::stage::{ShaderStage, StageKind};

/// Primitive assembly mode for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
    LinesAdjacency,
    LineStripAdjacency,
    TrianglesAdjacency,
    TriangleStripAdjacency,
    Patches,
}

impl DrawMode {
    /// Modes a user may pick. Patches needs tessellation stages and is only
    /// reachable through persisted documents.
    pub const SELECTABLE: [DrawMode; 11] = [
        DrawMode::Points,
        DrawMode::Lines,
        DrawMode::LineLoop,
        DrawMode::LineStrip,
        DrawMode::Triangles,
        DrawMode::TriangleStrip,
        DrawMode::TriangleFan,
        DrawMode::LinesAdjacency,
        DrawMode::LineStripAdjacency,
        DrawMode::TrianglesAdjacency,
        DrawMode::TriangleStripAdjacency,
    ];

    /// The OpenGL primitive enum value.
    pub fn gl_enum(&self) -> u32 {
        match self {
            DrawMode::Points => 0x0000,
            DrawMode::Lines => 0x0001,
            DrawMode::LineLoop => 0x0002,
            DrawMode::LineStrip => 0x0003,
            DrawMode::Triangles => 0x0004,
            DrawMode::TriangleStrip => 0x0005,
            DrawMode::TriangleFan => 0x0006,
            DrawMode::LinesAdjacency => 0x000A,
            DrawMode::LineStripAdjacency => 0x000B,
            DrawMode::TrianglesAdjacency => 0x000C,
            DrawMode::TriangleStripAdjacency => 0x000D,
            DrawMode::Patches => 0x000E,
        }
    }

    /// Inverse of [`gl_enum`](Self::gl_enum).
    pub fn from_gl_enum(value: u32) -> Option<Self> {
        Self::SELECTABLE
            .into_iter()
            .chain([DrawMode::Patches])
            .find(|mode| mode.gl_enum() == value)
    }

    /// Parses the persisted snake_case name.
    pub fn from_name(name: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }

    /// Whether mesh topology should be expanded to an edge list.
    pub fn uses_line_indices(&self) -> bool {
        matches!(self, DrawMode::Lines)
    }
}

/// Fixed-function settings applied around a program's draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgramSettings {
    pub draw_mode: DrawMode,
    line_width: f32,
    point_size: f32,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl ProgramSettings {
    pub const DEFAULT_LINE_WIDTH: f32 = 3.0;
    pub const DEFAULT_POINT_SIZE: f32 = 8.0;

    pub fn line_width(&self) -> f32 {
        self.line_width
    }

    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    /// Sets the line width. Non-positive or non-finite widths are rejected.
    pub fn set_line_width(&mut self, width: f32) -> bool {
        let valid = width.is_finite() && width > 0.0;
        if valid {
            self.line_width = width;
        }
        valid
    }

    /// Sets the point size. Non-positive or non-finite sizes are rejected.
    pub fn set_point_size(&mut self, size: f32) -> bool {
        let valid = size.is_finite() && size > 0.0;
        if valid {
            self.point_size = size;
        }
        valid
    }
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            draw_mode: DrawMode::Triangles,
            line_width: Self::DEFAULT_LINE_WIDTH,
            point_size: Self::DEFAULT_POINT_SIZE,
            depth_test: true,
            depth_write: true,
        }
    }
}

/// Five stages, the linked program built from them, and the sticky
/// failure state that keeps a broken program from relinking every frame.
#[derive(Debug)]
pub struct ProgramModel {
    stages: [ShaderStage; 5],
    handle: u32,
    compile_failed: bool,
    errors: Vec<ShaderError>,
    linked_at: Option<Instant>,
    pub settings: ProgramSettings,
}

impl Default for ProgramModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramModel {
    pub fn new() -> Self {
        Self {
            stages: StageKind::ALL.map(ShaderStage::new),
            handle: NO_HANDLE,
            compile_failed: false,
            errors: Vec::new(),
            linked_at: None,
            settings: ProgramSettings::default(),
        }
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn is_linked(&self) -> bool {
        self.handle != NO_HANDLE
    }

    /// Whether the last attempt failed and no source has changed since.
    pub fn compile_failed(&self) -> bool {
        self.compile_failed
    }

    pub fn stage(&self, kind: StageKind) -> &ShaderStage {
        &self.stages[kind.index()]
    }

    pub fn stages(&self) -> impl Iterator<Item = &ShaderStage> {
        self.stages.iter()
    }

    pub fn source(&self, kind: StageKind) -> &str {
        self.stage(kind).source()
    }

    /// Replaces one stage's source. A change unlinks the program and clears
    /// the sticky failure so the next compile retries.
    pub fn set_source(&mut self, kind: StageKind, source: &str, bin: &mut RecycleBin) -> bool {
        let changed = self.stages[kind.index()].set_source(source, bin);
        if changed {
            self.set_handle(NO_HANDLE, bin);
            self.compile_failed = false;
        }
        changed
    }

    /// Whether both required stages have source.
    pub fn is_link_eligible(&self) -> bool {
        !self.stage(StageKind::Vertex).is_empty() && !self.stage(StageKind::Fragment).is_empty()
    }

    /// Program-level diagnostics followed by each stage's, in stage order.
    pub fn all_errors(&self) -> Vec<ShaderError> {
        self.errors
            .iter()
            .chain(self.stages.iter().flat_map(|s| s.errors().iter()))
            .cloned()
            .collect()
    }

    /// Seconds since the last successful link, or `0` when unlinked.
    pub fn seconds_since_link(&self, now: Instant) -> f32 {
        self.linked_at
            .map(|at| now.saturating_duration_since(at).as_secs_f32())
            .unwrap_or(0.0)
    }

    /// Compiles and links the program if needed.
    ///
    /// Returns the cached outcome when already linked or when a previous
    /// attempt failed and nothing changed since. Otherwise flushes `bin`,
    /// compiles every stage, checks the required stages are present and
    /// links everything that compiled to a non-zero handle.
    pub fn compile(&mut self, api: &dyn GraphicsApi, bin: &mut RecycleBin) -> bool {
        if self.handle != NO_HANDLE {
            return true;
        }
        if self.compile_failed {
            return false;
        }

        bin.recycle(api);
        self.errors.clear();

        let mut success = true;
        for stage in self.stages.iter_mut() {
            success &= stage.compile(api, bin);
        }
        for required in [StageKind::Vertex, StageKind::Fragment] {
            if self.stage(required).is_empty() {
                self.errors.push(ShaderError::MissingStage(required));
                success = false;
            }
        }

        if success {
            match self.link(api) {
                Ok(program) => {
                    self.set_handle(program, bin);
                    self.linked_at = Some(Instant::now());
                    log::debug!("linked program {program}");
                }
                Err(err) => {
                    log::warn!("{err}");
                    self.errors.push(err);
                }
            }
        }

        self.compile_failed = self.handle == NO_HANDLE;
        !self.compile_failed
    }

    fn link(&self, api: &dyn GraphicsApi) -> Result<u32, ShaderError> {
        let program = api.create_program().map_err(ShaderError::Link)?;
        for stage in self.stages.iter().filter(|s| s.handle() != NO_HANDLE) {
            api.attach_shader(program, stage.handle());
        }
        if let Err(info_log) = api.link_program(program) {
            // Never bound, so it cannot be in flight.
            api.delete_program(program);
            return Err(ShaderError::Link(info_log.trim().to_string()));
        }
        Ok(program)
    }

    /// The first uniform declaration named `name`, searching stages in
    /// pipeline order.
    pub fn uniform_type(&self, name: &str) -> Option<&UniformDescriptor> {
        self.stages
            .iter()
            .find_map(|s| s.uniforms().iter().find(|u| u.name == name))
    }

    /// The first attribute declaration named `name`, searching stages in
    /// pipeline order.
    pub fn attribute_type(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.stages
            .iter()
            .find_map(|s| s.attributes().iter().find(|a| a.name == name))
    }

    /// Whether any stage declares a uniform named `name`.
    pub fn declares_uniform(&self, name: &str) -> bool {
        self.uniform_type(name).is_some()
    }

    /// Queues the linked program and every compiled stage for deletion.
    pub fn release(&mut self, bin: &mut RecycleBin) {
        self.set_handle(NO_HANDLE, bin);
        for stage in self.stages.iter_mut() {
            stage.release(bin);
        }
        self.compile_failed = false;
    }

    fn set_handle(&mut self, handle: u32, bin: &mut RecycleBin) {
        if self.handle != handle {
            bin.add_program(self.handle);
            self.handle = handle;
        }
    }
}

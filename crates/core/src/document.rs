//! Persisted component state, as JSON.
//!
//! Reading is lenient: each field is extracted on its own and falls back to
//! its default when missing or of the wrong type, so documents written by
//! older or newer versions still load. The `format_version` gates how
//! `draw_mode` is stored: version 0 wrote the raw GL primitive enum, version
//! 1 writes the mode name.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{ComponentId, ShaderComponent, DEFAULT_SORT_ORDER};
use crate::error::EngineError;
use crate::program::{DrawMode, ProgramSettings};
use crate::recycle::RecycleBin;
use crate::stage::StageKind;

pub const CURRENT_FORMAT_VERSION: u64 = 1;

/// Typed, lenient reads from one JSON object.
///
/// Every accessor yields `None` when the field is missing or has the wrong
/// type, including when the value is not an object at all.
#[derive(Clone, Copy)]
struct Fields<'a>(&'a Value);

impl<'a> Fields<'a> {
    fn get(self, name: &str) -> Option<&'a Value> {
        self.0.get(name)
    }

    /// Integers are accepted too.
    fn f32(self, name: &str) -> Option<f32> {
        self.get(name).and_then(Value::as_f64).map(|v| v as f32)
    }

    /// Out-of-range integers are rejected.
    fn i32(self, name: &str) -> Option<i32> {
        self.get(name)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
    }

    fn u64(self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    fn bool(self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    fn text(self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Version 0 stores the raw GL primitive enum, later versions the name.
    fn draw_mode(self, version: u64) -> Option<DrawMode> {
        let stored = self.get("draw_mode")?;
        if version == 0 {
            stored
                .as_u64()
                .and_then(|raw| u32::try_from(raw).ok())
                .and_then(DrawMode::from_gl_enum)
        } else {
            stored.as_str().and_then(DrawMode::from_name)
        }
    }
}

/// The persisted state of one shader component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentDocument {
    pub format_version: u64,
    pub vertex_shader: String,
    pub tess_ctrl_shader: String,
    pub tess_eval_shader: String,
    pub geometry_shader: String,
    pub fragment_shader: String,
    pub draw_mode: DrawMode,
    pub line_width: f32,
    pub point_size: f32,
    pub depth_testing_enabled: bool,
    pub depth_writing_enabled: bool,
    pub preview_sort_order: i32,
}

impl Default for ComponentDocument {
    fn default() -> Self {
        let settings = ProgramSettings::default();
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            vertex_shader: String::new(),
            tess_ctrl_shader: String::new(),
            tess_eval_shader: String::new(),
            geometry_shader: String::new(),
            fragment_shader: String::new(),
            draw_mode: settings.draw_mode,
            line_width: settings.line_width(),
            point_size: settings.point_size(),
            depth_testing_enabled: settings.depth_test,
            depth_writing_enabled: settings.depth_write,
            preview_sort_order: DEFAULT_SORT_ORDER,
        }
    }
}

fn source_key(kind: StageKind) -> &'static str {
    match kind {
        StageKind::Vertex => "vertex_shader",
        StageKind::TessControl => "tess_ctrl_shader",
        StageKind::TessEval => "tess_eval_shader",
        StageKind::Geometry => "geometry_shader",
        StageKind::Fragment => "fragment_shader",
    }
}

impl ComponentDocument {
    /// Reads a document from a JSON object.
    ///
    /// Only a non-object value is an error. The result always carries the
    /// current format version.
    pub fn from_value(value: &Value) -> Result<Self, EngineError> {
        if !value.is_object() {
            return Err(EngineError::InvalidDocument(
                "component document must be a JSON object".to_string(),
            ));
        }
        let fields = Fields(value);
        let defaults = Self::default();
        let version = fields.u64("format_version").unwrap_or(0);
        if version > CURRENT_FORMAT_VERSION {
            log::warn!(
                "document format version {version} is newer than {CURRENT_FORMAT_VERSION}; reading what is understood"
            );
        }

        let mut document = Self {
            format_version: CURRENT_FORMAT_VERSION,
            draw_mode: fields.draw_mode(version).unwrap_or(defaults.draw_mode),
            line_width: fields.f32("line_width").unwrap_or(defaults.line_width),
            point_size: fields.f32("point_size").unwrap_or(defaults.point_size),
            depth_testing_enabled: fields
                .bool("depth_testing_enabled")
                .unwrap_or(defaults.depth_testing_enabled),
            depth_writing_enabled: fields
                .bool("depth_writing_enabled")
                .unwrap_or(defaults.depth_writing_enabled),
            preview_sort_order: fields
                .i32("preview_sort_order")
                .unwrap_or(DEFAULT_SORT_ORDER),
            ..defaults
        };
        for kind in StageKind::ALL {
            let source = fields.text(source_key(kind)).unwrap_or_default();
            *document.source_mut(kind) = source.to_string();
        }
        Ok(document)
    }

    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn source(&self, kind: StageKind) -> &str {
        match kind {
            StageKind::Vertex => &self.vertex_shader,
            StageKind::TessControl => &self.tess_ctrl_shader,
            StageKind::TessEval => &self.tess_eval_shader,
            StageKind::Geometry => &self.geometry_shader,
            StageKind::Fragment => &self.fragment_shader,
        }
    }

    pub fn source_mut(&mut self, kind: StageKind) -> &mut String {
        match kind {
            StageKind::Vertex => &mut self.vertex_shader,
            StageKind::TessControl => &mut self.tess_ctrl_shader,
            StageKind::TessEval => &mut self.tess_eval_shader,
            StageKind::Geometry => &mut self.geometry_shader,
            StageKind::Fragment => &mut self.fragment_shader,
        }
    }

    /// Captures a component's persisted state.
    pub fn from_component(component: &ShaderComponent) -> Self {
        let program = component.program();
        let settings = program.settings;
        let mut document = Self {
            draw_mode: settings.draw_mode,
            line_width: settings.line_width(),
            point_size: settings.point_size(),
            depth_testing_enabled: settings.depth_test,
            depth_writing_enabled: settings.depth_write,
            preview_sort_order: component.sort_order(),
            ..Self::default()
        };
        for kind in StageKind::ALL {
            *document.source_mut(kind) = program.source(kind).to_string();
        }
        document
    }

    /// Applies this state to `component`. Invalid sizes keep the
    /// component's current value.
    pub fn apply(&self, component: &mut ShaderComponent, bin: &mut RecycleBin) {
        for kind in StageKind::ALL {
            component.set_source(kind, self.source(kind), bin);
        }
        let settings = &mut component.program_mut().settings;
        settings.draw_mode = self.draw_mode;
        settings.depth_test = self.depth_testing_enabled;
        settings.depth_write = self.depth_writing_enabled;
        if !settings.set_line_width(self.line_width) {
            log::warn!("ignoring invalid line width {}", self.line_width);
        }
        if !settings.set_point_size(self.point_size) {
            log::warn!("ignoring invalid point size {}", self.point_size);
        }
        component.set_sort_order(self.preview_sort_order);
    }

    /// A new component holding this state.
    pub fn to_component(&self, id: impl Into<ComponentId>) -> ShaderComponent {
        let mut component = ShaderComponent::empty(id);
        let mut scratch = RecycleBin::new();
        self.apply(&mut component, &mut scratch);
        component
    }
}

/// A set of named components and the text inputs of their samplers.
///
/// Used to preview draw order without a graphics context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub components: Vec<SceneComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneComponent {
    pub id: String,
    /// A component document, read leniently.
    #[serde(default)]
    pub document: Value,
    /// Sampler uniform name to image path or `<component>:color|depth`.
    #[serde(default)]
    pub samplers: BTreeMap<String, String>,
}

impl SceneDocument {
    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

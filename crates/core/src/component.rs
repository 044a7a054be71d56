//! A render component: one program, its per-iteration inputs and its draw.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::binder::{AttributeValues, SamplerSource, UniformAttributeBinder, UniformValues};
use crate::builtins::{
    BuiltInRegistry, SetupContext, INITIAL_COLOR_BUFFER, INITIAL_DEPTH_BUFFER,
    PREVIOUS_COLOR_BUFFER,
};
use crate::error::EngineError;
use crate::frame_cache::FrameRequirements;
use crate::gl::{GraphicsApi, RenderState, NO_HANDLE};
use crate::image_cache::ImageCache;
use crate::mesh::Mesh;
use crate::program::{DrawMode, ProgramModel};
use crate::recycle::RecycleBin;
use crate::stage::StageKind;

pub const DEFAULT_SORT_ORDER: i32 = 5;

pub const DEFAULT_VERTEX_SHADER: &str = "#version 330

layout(location = 0) in vec3 _meshVertex;
uniform mat4 _worldToClip;

void main() {
  gl_Position = _worldToClip * vec4(_meshVertex, 1.0);
}
";

pub const DEFAULT_FRAGMENT_SHADER: &str = "#version 330

out vec4 fragment_color;

void main() {
  fragment_color = vec4(1.0, 1.0, 1.0, 1.0);
}
";

/// Case-insensitive component identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ComponentId {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One value supplied by the host for a named shader input.
#[derive(Debug, Clone)]
pub enum InputValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    /// Also used for colors.
    Vec4(Vec4),
    Matrix(Mat4),
    /// Numbers as text, image paths, or `<component>:color|depth` references.
    Text(String),
    Image { key: String, image: Arc<RgbaImage> },
    Mesh(Arc<Mesh>),
}

impl InputValue {
    fn as_f32(&self) -> Option<f32> {
        match self {
            InputValue::Int(i) => Some(*i as f32),
            InputValue::Float(f) => Some(*f),
            InputValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            InputValue::Text(t) => t.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_i32(&self) -> Option<i32> {
        match self {
            InputValue::Int(i) => Some(*i),
            InputValue::Float(f) => Some(*f as i32),
            InputValue::Bool(b) => Some(i32::from(*b)),
            InputValue::Text(t) => {
                let t = t.trim();
                t.parse()
                    .ok()
                    .or_else(|| t.parse::<f32>().ok().map(|f| f as i32))
                    .or_else(|| t.parse::<bool>().ok().map(i32::from))
            }
            _ => None,
        }
    }

    fn as_vec2(&self) -> Option<Vec2> {
        match self {
            InputValue::Vec2(v) => Some(*v),
            InputValue::Vec3(v) => Some(v.truncate()),
            InputValue::Vec4(v) => Some(v.truncate().truncate()),
            other => other.as_f32().map(Vec2::splat),
        }
    }

    fn as_vec3(&self) -> Option<Vec3> {
        match self {
            InputValue::Vec2(v) => Some(v.extend(0.0)),
            InputValue::Vec3(v) => Some(*v),
            InputValue::Vec4(v) => Some(v.truncate()),
            other => other.as_f32().map(Vec3::splat),
        }
    }

    fn as_vec4(&self) -> Option<Vec4> {
        match self {
            InputValue::Vec2(v) => Some(v.extend(0.0).extend(1.0)),
            InputValue::Vec3(v) => Some(v.extend(1.0)),
            InputValue::Vec4(v) => Some(*v),
            other => other.as_f32().map(Vec4::splat),
        }
    }

    fn as_mat4(&self) -> Option<Mat4> {
        match self {
            InputValue::Matrix(m) => Some(*m),
            _ => None,
        }
    }
}

fn coerce<T>(values: &[InputValue], f: impl Fn(&InputValue) -> Option<T>) -> Option<Vec<T>> {
    values.iter().map(f).collect()
}

/// Converts host values to the uniform type declared in GLSL.
fn uniform_values(type_tag: &str, values: &[InputValue]) -> Option<UniformValues> {
    match type_tag {
        "int" | "bool" | "uint" => coerce(values, InputValue::as_i32).map(UniformValues::Int),
        "float" | "double" => coerce(values, InputValue::as_f32).map(UniformValues::Float),
        "vec2" => coerce(values, InputValue::as_vec2).map(UniformValues::Vec2),
        "vec3" => coerce(values, InputValue::as_vec3).map(UniformValues::Vec3),
        "vec4" => coerce(values, InputValue::as_vec4).map(UniformValues::Vec4),
        "mat3" => coerce(values, |v| v.as_mat4().map(Mat3::from_mat4)).map(UniformValues::Mat3),
        "mat4" => coerce(values, InputValue::as_mat4).map(UniformValues::Mat4),
        _ => None,
    }
}

fn attribute_values(type_tag: &str, values: &[InputValue]) -> Option<AttributeValues> {
    match type_tag {
        "int" => coerce(values, InputValue::as_i32).map(AttributeValues::Int),
        "float" => coerce(values, InputValue::as_f32).map(AttributeValues::Float),
        "vec2" => coerce(values, InputValue::as_vec2).map(AttributeValues::Vec2),
        "vec3" => coerce(values, InputValue::as_vec3).map(AttributeValues::Vec3),
        "vec4" => coerce(values, InputValue::as_vec4).map(AttributeValues::Vec4),
        _ => None,
    }
}

/// What one component draw produced.
#[derive(Debug, Default)]
pub struct DrawOutcome {
    /// Whether the program was linked and the draw sequence ran.
    pub drawn: bool,
    /// Vertices or indices submitted across all iterations.
    pub elements: usize,
    /// Built-ins whose setup raised, by registered name.
    pub builtin_errors: Vec<(&'static str, EngineError)>,
}

/// An independently authored render pass.
#[derive(Debug)]
pub struct ShaderComponent {
    id: ComponentId,
    program: ProgramModel,
    sort_order: i32,
    pub hidden: bool,
    iterations: Vec<UniformAttributeBinder>,
    image_cache: ImageCache,
    vertex_array: u32,
    /// Directory relative sampler paths resolve against.
    pub base_dir: Option<PathBuf>,
}

impl ShaderComponent {
    /// A component with the default vertex and fragment sources.
    pub fn new(id: impl Into<ComponentId>) -> Self {
        let mut component = Self::empty(id);
        let mut scratch = RecycleBin::new();
        component
            .program
            .set_source(StageKind::Vertex, DEFAULT_VERTEX_SHADER, &mut scratch);
        component
            .program
            .set_source(StageKind::Fragment, DEFAULT_FRAGMENT_SHADER, &mut scratch);
        component
    }

    /// A component with no shader source at all.
    pub fn empty(id: impl Into<ComponentId>) -> Self {
        Self {
            id: id.into(),
            program: ProgramModel::new(),
            sort_order: DEFAULT_SORT_ORDER,
            hidden: false,
            iterations: Vec::new(),
            image_cache: ImageCache::new(),
            vertex_array: NO_HANDLE,
            base_dir: None,
        }
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn program(&self) -> &ProgramModel {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut ProgramModel {
        &mut self.program
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    pub(crate) fn set_sort_order(&mut self, order: i32) {
        self.sort_order = order;
    }

    pub fn iterations(&self) -> &[UniformAttributeBinder] {
        &self.iterations
    }

    pub fn set_source(&mut self, kind: StageKind, source: &str, bin: &mut RecycleBin) -> bool {
        self.program.set_source(kind, source, bin)
    }

    /// Fills the binder for `iteration` from named host inputs.
    ///
    /// Iteration 0 compiles the program first and clears every binder. Each
    /// name is looked up as a uniform, then as an attribute, and its values
    /// are converted to the declared type. A scalar uniform takes the value
    /// at the iteration index when the list is long enough. Undeclared names
    /// and values that cannot be converted are skipped.
    pub fn populate(
        &mut self,
        iteration: usize,
        inputs: &[(String, Vec<InputValue>)],
        api: &dyn GraphicsApi,
        bin: &mut RecycleBin,
    ) {
        if iteration == 0 {
            self.program.compile(api, bin);
            for binder in &mut self.iterations {
                binder.clear(bin);
            }
            self.iterations.clear();
            self.image_cache.trim(bin);
        }
        while self.iterations.len() <= iteration {
            self.iterations.push(UniformAttributeBinder::new());
        }

        let binder = &mut self.iterations[iteration];
        for (name, values) in inputs {
            if values.is_empty() {
                continue;
            }
            let meshes: Vec<Arc<Mesh>> = values
                .iter()
                .filter_map(|v| match v {
                    InputValue::Mesh(mesh) => Some(mesh.clone()),
                    _ => None,
                })
                .collect();
            if !meshes.is_empty() {
                for mesh in meshes {
                    binder.add_mesh(mesh);
                }
                continue;
            }

            if let Some(uniform) = self.program.uniform_type(name) {
                let picked = if uniform.array_length == 0 && iteration < values.len() {
                    &values[iteration..=iteration]
                } else {
                    &values[..]
                };
                if uniform.type_tag.starts_with("sampler") {
                    add_sampler(binder, name, &picked[0], self.base_dir.as_deref());
                } else {
                    match uniform_values(&uniform.type_tag, picked) {
                        Some(converted) => {
                            binder.add_uniform(name, uniform.array_length, converted)
                        }
                        None => log::warn!(
                            "input '{name}' cannot be converted to {}",
                            uniform.type_tag
                        ),
                    }
                }
            } else if let Some(attribute) = self.program.attribute_type(name) {
                match attribute_values(&attribute.type_tag, values) {
                    Some(converted) => binder.add_attribute(name, attribute.location, converted),
                    None => log::warn!(
                        "input '{name}' cannot be converted to {}",
                        attribute.type_tag
                    ),
                }
            } else {
                log::debug!("input '{name}' is not declared by component {}", self.id);
            }
        }
    }

    /// Components whose output this component samples.
    pub fn dependencies(&self) -> BTreeSet<ComponentId> {
        self.iterations
            .iter()
            .flat_map(|b| b.output_references())
            .map(|key| ComponentId::new(&key.component))
            .collect()
    }

    /// Adds what this component needs captured to `requirements`.
    pub fn frame_requirements(&self, requirements: &mut FrameRequirements) {
        requirements.initial_color |= self.program.declares_uniform(INITIAL_COLOR_BUFFER);
        requirements.initial_depth |= self.program.declares_uniform(INITIAL_DEPTH_BUFFER);
        requirements.previous_color |= self.program.declares_uniform(PREVIOUS_COLOR_BUFFER);
        for binder in &self.iterations {
            requirements
                .outputs
                .extend(binder.output_references().cloned());
        }
    }

    /// Runs the full draw sequence for one frame.
    ///
    /// Nothing is drawn if the program does not link. Render state is
    /// restored to what it was before the call.
    pub fn draw(
        &mut self,
        api: &dyn GraphicsApi,
        registry: &BuiltInRegistry,
        ctx: &mut SetupContext<'_>,
    ) -> DrawOutcome {
        let mut outcome = DrawOutcome::default();
        if !self.program.compile(api, ctx.recycle_bin) {
            return outcome;
        }
        let program = self.program.handle();
        let settings = self.program.settings;

        if self.vertex_array == NO_HANDLE {
            match api.create_vertex_array() {
                Ok(vertex_array) => self.vertex_array = vertex_array,
                Err(e) => {
                    log::warn!("component {}: no vertex array: {e}", self.id);
                    return outcome;
                }
            }
        }
        let saved = api.render_state();

        api.bind_vertex_array(self.vertex_array);
        api.use_program(program);
        api.set_line_width(settings.line_width());
        api.set_point_size(settings.point_size());
        api.set_render_state(&RenderState {
            depth_test: settings.depth_test,
            depth_write: settings.depth_write,
            blend: true,
            program_point_size: settings.draw_mode == DrawMode::Points,
        });

        ctx.time = self.program.seconds_since_link(Instant::now());
        outcome.builtin_errors = registry.setup_all(api, program, ctx);

        for binder in &mut self.iterations {
            binder.setup_uniforms(
                api,
                program,
                ctx.frame_cache,
                &mut self.image_cache,
                ctx.recycle_bin,
            );
            for index in 0..binder.draw_count() {
                outcome.elements +=
                    binder.setup_attributes_and_draw(index, api, program, settings.draw_mode);
            }
        }

        api.use_program(NO_HANDLE);
        api.bind_vertex_array(NO_HANDLE);
        api.set_render_state(&saved);
        outcome.drawn = true;
        outcome
    }

    /// Queues every GPU object this component owns for deletion.
    pub fn release(&mut self, bin: &mut RecycleBin) {
        self.program.release(bin);
        for binder in &mut self.iterations {
            binder.clear(bin);
        }
        self.iterations.clear();
        self.image_cache.clear(bin);
        bin.add_vertex_array(std::mem::replace(&mut self.vertex_array, NO_HANDLE));
    }
}

fn add_sampler(
    binder: &mut UniformAttributeBinder,
    name: &str,
    value: &InputValue,
    base_dir: Option<&std::path::Path>,
) {
    match value {
        InputValue::Text(text) => {
            let text = text.trim();
            if text.starts_with("http://") || text.starts_with("https://") {
                log::warn!("sampler '{name}': remote image '{text}' skipped");
                return;
            }
            binder.add_sampler_text(name, text, base_dir);
        }
        InputValue::Image { key, image } => binder.add_sampler(
            name,
            SamplerSource::Image {
                key: key.clone(),
                image: image.clone(),
            },
        ),
        other => log::warn!("sampler '{name}' needs a path, image or reference, got {other:?}"),
    }
}

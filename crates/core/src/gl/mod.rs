//! The graphics API seam.
//!
//! Everything in the engine talks to the GPU through [`GraphicsApi`]. Object
//! handles are plain `u32` names as the driver hands them out, with `0`
//! reserved for "no object". Uniform and attribute locations are `Option<u32>`
//! where `None` means the linked program does not declare that name.
//!
//! # Module overview
//!
//! - [`glow_backend`] -- `glow`-backed implementation (requires the `render` feature).
//!
//! All matrix uploads go through [`UniformData::Mat3`] / [`UniformData::Mat4`]
//! as row-major flat arrays; backends transpose on upload.

#[cfg(all(feature = "render", not(target_arch = "wasm32")))]
pub mod glow_backend;

#[cfg(test)]
pub(crate) mod fake;

use crate::frame_cache::BufferKind;
use crate::program::DrawMode;
use crate::stage::StageKind;

/// The sentinel value for "no GPU object".
pub const NO_HANDLE: u32 = 0;

/// Where a buffer object is bound when it is created and drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Per-vertex attribute data (`ARRAY_BUFFER`).
    Vertex,
    /// 32-bit unsigned element indices (`ELEMENT_ARRAY_BUFFER`).
    Index,
}

/// A borrowed uniform payload.
///
/// Each variant carries a flat slice holding `count()` consecutive values of
/// the given GLSL type. A scalar upload is simply a slice of one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    Int(&'a [i32]),
    Float(&'a [f32]),
    Vec2(&'a [f32]),
    Vec3(&'a [f32]),
    Vec4(&'a [f32]),
    /// Row-major 3x3 matrices, nine floats each.
    Mat3(&'a [f32]),
    /// Row-major 4x4 matrices, sixteen floats each.
    Mat4(&'a [f32]),
}

impl UniformData<'_> {
    /// Number of scalar components in one element of this type.
    pub fn components(&self) -> usize {
        match self {
            UniformData::Int(_) | UniformData::Float(_) => 1,
            UniformData::Vec2(_) => 2,
            UniformData::Vec3(_) => 3,
            UniformData::Vec4(_) => 4,
            UniformData::Mat3(_) => 9,
            UniformData::Mat4(_) => 16,
        }
    }

    /// Number of complete elements in the payload.
    pub fn count(&self) -> usize {
        let len = match self {
            UniformData::Int(v) => v.len(),
            UniformData::Float(v)
            | UniformData::Vec2(v)
            | UniformData::Vec3(v)
            | UniformData::Vec4(v)
            | UniformData::Mat3(v)
            | UniformData::Mat4(v) => v.len(),
        };
        len / self.components()
    }
}

/// The fixed-function state a component draw touches and must restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: bool,
    pub program_point_size: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            blend: false,
            program_point_size: false,
        }
    }
}

/// The subset of a GL-style graphics API the engine needs.
///
/// Implementations are expected to be thin: no caching, no deferred work.
/// Every call is issued immediately on the thread that owns the context.
/// Deletion methods are only ever called by
/// [`RecycleBin::recycle`](crate::recycle::RecycleBin::recycle) for shader,
/// program, buffer and texture objects.
pub trait GraphicsApi {
    /// Compiles one stage. On failure returns the driver's info log and
    /// leaves no shader object alive.
    fn compile_shader(&self, stage: StageKind, source: &str) -> Result<u32, String>;

    fn create_program(&self) -> Result<u32, String>;

    fn attach_shader(&self, program: u32, shader: u32);

    /// Links `program`. On failure returns the info log (or the pending API
    /// error) and leaves the program object for the caller to delete.
    fn link_program(&self, program: u32) -> Result<(), String>;

    fn use_program(&self, program: u32);

    fn uniform_location(&self, program: u32, name: &str) -> Option<u32>;

    fn attribute_location(&self, program: u32, name: &str) -> Option<u32>;

    fn set_uniform(&self, location: u32, data: UniformData<'_>);

    /// Uploads an RGBA8 image as a mipmapped, repeating 2D texture.
    fn create_texture_rgba8(&self, width: u32, height: u32, pixels: &[u8]) -> Result<u32, String>;

    /// Copies the lower-left `width` x `height` region of the current
    /// framebuffer into a new texture.
    fn capture_framebuffer(&self, kind: BufferKind, width: u32, height: u32)
        -> Result<u32, String>;

    /// Binds `texture` to texture unit `unit` and leaves unit 0 active.
    fn bind_texture(&self, unit: u32, texture: u32);

    fn create_buffer(&self, target: BufferTarget, bytes: &[u8]) -> Result<u32, String>;

    /// Binds a float vertex buffer to `location` and enables the array.
    fn bind_attribute_buffer(&self, location: u32, buffer: u32, components: u32);

    /// Disables the array at `location` and sets its constant value. `value`
    /// holds one to four floats.
    fn set_constant_attribute(&self, location: u32, value: &[f32]);

    fn disable_attribute(&self, location: u32);

    fn draw_arrays(&self, mode: DrawMode, count: usize);

    /// Draws `count` 32-bit indices from `index_buffer`.
    fn draw_elements(&self, mode: DrawMode, index_buffer: u32, count: usize);

    fn create_vertex_array(&self) -> Result<u32, String>;

    fn bind_vertex_array(&self, vertex_array: u32);

    fn delete_vertex_array(&self, vertex_array: u32);

    fn render_state(&self) -> RenderState;

    fn set_render_state(&self, state: &RenderState);

    fn set_line_width(&self, width: f32);

    fn set_point_size(&self, size: f32);

    fn delete_shader(&self, shader: u32);

    fn delete_program(&self, program: u32);

    fn delete_buffer(&self, buffer: u32);

    fn delete_texture(&self, texture: u32);
}

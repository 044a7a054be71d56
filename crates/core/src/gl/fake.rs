//! A recording [`GraphicsApi`] for tests that need no GL context.
//!
//! Handles are allocated from a counter. A shader source containing a line
//! `#error <text>` fails to compile with a conventional `ERROR: 0:<line>: <text>`
//! log. Uniform and attribute names resolve when any shader attached to the
//! program mentions them as a whole identifier.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use super::{BufferTarget, GraphicsApi, RenderState, UniformData};
use crate::frame_cache::BufferKind;
use crate::program::DrawMode;
use crate::stage::StageKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CompileShader(StageKind),
    CreateProgram(u32),
    LinkProgram(u32),
    UseProgram(u32),
    SetUniform { name: String, values: Vec<f32> },
    CreateTexture(u32),
    Capture(BufferKind, u32),
    BindTexture { unit: u32, texture: u32 },
    CreateBuffer(BufferTarget, u32, usize),
    BindAttribute { location: u32, buffer: u32 },
    ConstantAttribute { location: u32, value: Vec<f32> },
    DisableAttribute(u32),
    DrawArrays(DrawMode, usize),
    DrawElements(DrawMode, u32, usize),
    CreateVertexArray(u32),
    BindVertexArray(u32),
    SetRenderState(RenderState),
    LineWidth(f32),
    PointSize(f32),
    DeleteShader(u32),
    DeleteProgram(u32),
    DeleteBuffer(u32),
    DeleteTexture(u32),
    DeleteVertexArray(u32),
}

#[derive(Default)]
pub struct FakeGl {
    next_handle: Cell<u32>,
    pub fail_link: Cell<bool>,
    pub fail_capture: Cell<bool>,
    shader_sources: RefCell<HashMap<u32, String>>,
    attachments: RefCell<HashMap<u32, Vec<u32>>>,
    locations: RefCell<HashMap<String, u32>>,
    state: Cell<Option<RenderState>>,
    calls: RefCell<Vec<Call>>,
}

impl FakeGl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    /// The values of every upload to uniform `name`, oldest first.
    pub fn uniform_uploads(&self, name: &str) -> Vec<Vec<f32>> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::SetUniform { name: n, values } if n == name => Some(values.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_uniform(&self, name: &str) -> Option<Vec<f32>> {
        self.uniform_uploads(name).pop()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn allocate(&self) -> u32 {
        let next = self.next_handle.get() + 1;
        self.next_handle.set(next);
        next
    }

    fn declares(&self, program: u32, name: &str) -> bool {
        let sources = self.shader_sources.borrow();
        self.attachments
            .borrow()
            .get(&program)
            .into_iter()
            .flatten()
            .filter_map(|shader| sources.get(shader))
            .any(|source| mentions_identifier(source, name))
    }

    fn location_for(&self, name: &str) -> u32 {
        let mut locations = self.locations.borrow_mut();
        let next = locations.len() as u32;
        *locations.entry(name.to_string()).or_insert(next)
    }

    fn name_for(&self, location: u32) -> String {
        self.locations
            .borrow()
            .iter()
            .find(|(_, &l)| l == location)
            .map(|(n, _)| n.clone())
            .unwrap_or_default()
    }
}

fn mentions_identifier(source: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    source.match_indices(name).any(|(i, _)| {
        let before = source[..i].chars().next_back();
        let after = source[i + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

impl GraphicsApi for FakeGl {
    fn compile_shader(&self, stage: StageKind, source: &str) -> Result<u32, String> {
        self.record(Call::CompileShader(stage));
        let failure = source
            .lines()
            .enumerate()
            .find_map(|(i, line)| line.strip_prefix("#error").map(|m| (i + 1, m.trim())));
        if let Some((line, message)) = failure {
            return Err(format!("ERROR: 0:{line}: {message}\n"));
        }
        let handle = self.allocate();
        self.shader_sources
            .borrow_mut()
            .insert(handle, source.to_string());
        Ok(handle)
    }

    fn create_program(&self) -> Result<u32, String> {
        let handle = self.allocate();
        self.record(Call::CreateProgram(handle));
        Ok(handle)
    }

    fn attach_shader(&self, program: u32, shader: u32) {
        self.attachments
            .borrow_mut()
            .entry(program)
            .or_default()
            .push(shader);
    }

    fn link_program(&self, program: u32) -> Result<(), String> {
        self.record(Call::LinkProgram(program));
        if self.fail_link.get() {
            Err("link failed: varying mismatch".to_string())
        } else {
            Ok(())
        }
    }

    fn use_program(&self, program: u32) {
        self.record(Call::UseProgram(program));
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<u32> {
        self.declares(program, name).then(|| self.location_for(name))
    }

    fn attribute_location(&self, program: u32, name: &str) -> Option<u32> {
        self.declares(program, name).then(|| self.location_for(name))
    }

    fn set_uniform(&self, location: u32, data: UniformData<'_>) {
        let values = match data {
            UniformData::Int(v) => v.iter().map(|&i| i as f32).collect(),
            UniformData::Float(v)
            | UniformData::Vec2(v)
            | UniformData::Vec3(v)
            | UniformData::Vec4(v)
            | UniformData::Mat3(v)
            | UniformData::Mat4(v) => v.to_vec(),
        };
        let name = self.name_for(location);
        self.record(Call::SetUniform { name, values });
    }

    fn create_texture_rgba8(&self, _width: u32, _height: u32, _pixels: &[u8]) -> Result<u32, String> {
        let handle = self.allocate();
        self.record(Call::CreateTexture(handle));
        Ok(handle)
    }

    fn capture_framebuffer(
        &self,
        kind: BufferKind,
        _width: u32,
        _height: u32,
    ) -> Result<u32, String> {
        if self.fail_capture.get() {
            return Err("framebuffer incomplete".to_string());
        }
        let handle = self.allocate();
        self.record(Call::Capture(kind, handle));
        Ok(handle)
    }

    fn bind_texture(&self, unit: u32, texture: u32) {
        self.record(Call::BindTexture { unit, texture });
    }

    fn create_buffer(&self, target: BufferTarget, bytes: &[u8]) -> Result<u32, String> {
        let handle = self.allocate();
        self.record(Call::CreateBuffer(target, handle, bytes.len()));
        Ok(handle)
    }

    fn bind_attribute_buffer(&self, location: u32, buffer: u32, _components: u32) {
        self.record(Call::BindAttribute { location, buffer });
    }

    fn set_constant_attribute(&self, location: u32, value: &[f32]) {
        self.record(Call::ConstantAttribute {
            location,
            value: value.to_vec(),
        });
    }

    fn disable_attribute(&self, location: u32) {
        self.record(Call::DisableAttribute(location));
    }

    fn draw_arrays(&self, mode: DrawMode, count: usize) {
        self.record(Call::DrawArrays(mode, count));
    }

    fn draw_elements(&self, mode: DrawMode, index_buffer: u32, count: usize) {
        self.record(Call::DrawElements(mode, index_buffer, count));
    }

    fn create_vertex_array(&self) -> Result<u32, String> {
        let handle = self.allocate();
        self.record(Call::CreateVertexArray(handle));
        Ok(handle)
    }

    fn bind_vertex_array(&self, vertex_array: u32) {
        self.record(Call::BindVertexArray(vertex_array));
    }

    fn delete_vertex_array(&self, vertex_array: u32) {
        self.record(Call::DeleteVertexArray(vertex_array));
    }

    fn render_state(&self) -> RenderState {
        self.state.get().unwrap_or_default()
    }

    fn set_render_state(&self, state: &RenderState) {
        self.state.set(Some(*state));
        self.record(Call::SetRenderState(*state));
    }

    fn set_line_width(&self, width: f32) {
        self.record(Call::LineWidth(width));
    }

    fn set_point_size(&self, size: f32) {
        self.record(Call::PointSize(size));
    }

    fn delete_shader(&self, shader: u32) {
        self.record(Call::DeleteShader(shader));
    }

    fn delete_program(&self, program: u32) {
        self.record(Call::DeleteProgram(program));
    }

    fn delete_buffer(&self, buffer: u32) {
        self.record(Call::DeleteBuffer(buffer));
    }

    fn delete_texture(&self, texture: u32) {
        self.record(Call::DeleteTexture(texture));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_match_requires_word_boundaries() {
        assert!(mentions_identifier("uniform float _time;", "_time"));
        assert!(!mentions_identifier("uniform float _timeDelta;", "_time"));
        assert!(!mentions_identifier("uniform vec3 my_time;", "_time"));
    }

    #[test]
    fn error_directive_fails_compile_with_line_number() {
        let gl = FakeGl::new();
        let log = gl
            .compile_shader(StageKind::Fragment, "void main() {}\n#error bad thing")
            .unwrap_err();
        assert_eq!(log.trim(), "ERROR: 0:2: bad thing");
    }
}

//! Per-iteration uniform, sampler and attribute values, and the draw call.
//!
//! A component holds one [`UniformAttributeBinder`] per upstream data
//! iteration. Drawing runs in a fixed order: uniforms, samplers,
//! attributes, the draw itself, then disabling every attribute array the
//! draw enabled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use image::RgbaImage;

use crate::builtins::{
    row_major3, row_major4, FIRST_USER_TEXTURE_UNIT, MESH_NORMAL, MESH_TEXTURE_COORDINATE,
    MESH_VERTEX, MESH_VERTEX_COLOR,
};
use crate::error::EngineError;
use crate::frame_cache::{FrameCache, OutputKey};
use crate::gl::{BufferTarget, GraphicsApi, UniformData, NO_HANDLE};
use crate::image_cache::ImageCache;
use crate::mesh::Mesh;
use crate::program::DrawMode;
use crate::recycle::RecycleBin;

/// Values for one uniform, one entry per array element.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValues {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Vec2(Vec<Vec2>),
    Vec3(Vec<Vec3>),
    Vec4(Vec<Vec4>),
    Mat3(Vec<Mat3>),
    Mat4(Vec<Mat4>),
}

impl UniformValues {
    pub fn len(&self) -> usize {
        match self {
            UniformValues::Int(v) => v.len(),
            UniformValues::Float(v) => v.len(),
            UniformValues::Vec2(v) => v.len(),
            UniformValues::Vec3(v) => v.len(),
            UniformValues::Vec4(v) => v.len(),
            UniformValues::Mat3(v) => v.len(),
            UniformValues::Mat4(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uploads the first `count` elements as one flat array.
    fn upload(&self, api: &dyn GraphicsApi, location: u32, count: usize) {
        match self {
            UniformValues::Int(v) => api.set_uniform(location, UniformData::Int(&v[..count])),
            UniformValues::Float(v) => api.set_uniform(location, UniformData::Float(&v[..count])),
            UniformValues::Vec2(v) => {
                let flat: Vec<f32> = v[..count].iter().flat_map(|e| e.to_array()).collect();
                api.set_uniform(location, UniformData::Vec2(&flat));
            }
            UniformValues::Vec3(v) => {
                let flat: Vec<f32> = v[..count].iter().flat_map(|e| e.to_array()).collect();
                api.set_uniform(location, UniformData::Vec3(&flat));
            }
            UniformValues::Vec4(v) => {
                let flat: Vec<f32> = v[..count].iter().flat_map(|e| e.to_array()).collect();
                api.set_uniform(location, UniformData::Vec4(&flat));
            }
            UniformValues::Mat3(v) => {
                let flat: Vec<f32> = v[..count].iter().flat_map(|m| row_major3(*m)).collect();
                api.set_uniform(location, UniformData::Mat3(&flat));
            }
            UniformValues::Mat4(v) => {
                let flat: Vec<f32> = v[..count].iter().flat_map(|m| row_major4(*m)).collect();
                api.set_uniform(location, UniformData::Mat4(&flat));
            }
        }
    }
}

/// Per-vertex (or constant) attribute values.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValues {
    /// Uploaded as floats.
    Int(Vec<i32>),
    Float(Vec<f32>),
    Vec2(Vec<Vec2>),
    Vec3(Vec<Vec3>),
    Vec4(Vec<Vec4>),
}

impl AttributeValues {
    pub fn len(&self) -> usize {
        match self {
            AttributeValues::Int(v) => v.len(),
            AttributeValues::Float(v) => v.len(),
            AttributeValues::Vec2(v) => v.len(),
            AttributeValues::Vec3(v) => v.len(),
            AttributeValues::Vec4(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn components(&self) -> u32 {
        match self {
            AttributeValues::Int(_) | AttributeValues::Float(_) => 1,
            AttributeValues::Vec2(_) => 2,
            AttributeValues::Vec3(_) => 3,
            AttributeValues::Vec4(_) => 4,
        }
    }

    fn flatten(&self) -> Vec<f32> {
        match self {
            AttributeValues::Int(v) => v.iter().map(|&i| i as f32).collect(),
            AttributeValues::Float(v) => v.clone(),
            AttributeValues::Vec2(v) => v.iter().flat_map(|e| e.to_array()).collect(),
            AttributeValues::Vec3(v) => v.iter().flat_map(|e| e.to_array()).collect(),
            AttributeValues::Vec4(v) => v.iter().flat_map(|e| e.to_array()).collect(),
        }
    }
}

/// Where a sampler's texture comes from.
#[derive(Debug, Clone)]
pub enum SamplerSource {
    /// An image file on disk.
    Path(PathBuf),
    /// An in-memory image, cached under `key`.
    Image { key: String, image: Arc<RgbaImage> },
    /// Another component's captured output this frame.
    Output(OutputKey),
}

impl SamplerSource {
    fn cache_key(&self) -> Option<String> {
        match self {
            SamplerSource::Path(path) => Some(path.to_string_lossy().into_owned()),
            SamplerSource::Image { key, .. } => Some(format!("<image>{key}")),
            SamplerSource::Output(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformBinding {
    pub name: String,
    pub array_length: usize,
    pub values: UniformValues,
}

#[derive(Debug, Clone)]
pub struct SamplerBinding {
    pub name: String,
    pub source: SamplerSource,
    /// Image texture resolved on first use; `Some(NO_HANDLE)` after a
    /// failed load.
    texture: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AttributeBinding {
    pub name: String,
    /// Explicit layout location; resolved through the program when `None`.
    pub location: Option<u32>,
    pub values: AttributeValues,
    buffer: u32,
}

/// GPU buffers derived from one mesh, built on first use.
#[derive(Debug, Clone)]
pub struct MeshBuffers {
    pub mesh: Arc<Mesh>,
    streams: [u32; 4],
    triangles: (u32, usize),
    lines: (u32, usize),
}

impl MeshBuffers {
    fn new(mesh: Arc<Mesh>) -> Self {
        Self {
            mesh,
            streams: [NO_HANDLE; 4],
            triangles: (NO_HANDLE, 0),
            lines: (NO_HANDLE, 0),
        }
    }

    fn handles(&self) -> impl Iterator<Item = u32> + '_ {
        self.streams
            .iter()
            .copied()
            .chain([self.triangles.0, self.lines.0])
    }

    /// `(attribute name, components, flat data)` for each stream whose
    /// length matches the vertex count.
    fn stream(&self, index: usize) -> (&'static str, u32, Option<Vec<f32>>) {
        let mesh = &self.mesh;
        let n = mesh.vertex_count();
        match index {
            0 => (
                MESH_VERTEX,
                3,
                Some(mesh.vertices.iter().flat_map(|v| v.to_array()).collect()),
            ),
            1 => (
                MESH_NORMAL,
                3,
                (mesh.normals.len() == n)
                    .then(|| mesh.normals.iter().flat_map(|v| v.to_array()).collect()),
            ),
            2 => (
                MESH_TEXTURE_COORDINATE,
                2,
                (mesh.texture_coordinates.len() == n).then(|| {
                    mesh.texture_coordinates
                        .iter()
                        .flat_map(|v| v.to_array())
                        .collect()
                }),
            ),
            _ => (
                MESH_VERTEX_COLOR,
                4,
                (mesh.vertex_colors.len() == n).then(|| mesh.normalized_colors()),
            ),
        }
    }

    fn index_buffer(
        &mut self,
        api: &dyn GraphicsApi,
        lines: bool,
    ) -> Result<(u32, usize), EngineError> {
        let slot = if lines { &mut self.lines } else { &mut self.triangles };
        if slot.0 == NO_HANDLE {
            let indices = if lines {
                self.mesh.line_indices()
            } else {
                self.mesh.triangle_indices()
            };
            let handle = api
                .create_buffer(BufferTarget::Index, bytemuck::cast_slice(&indices))
                .map_err(EngineError::Graphics)?;
            *slot = (handle, indices.len());
        }
        Ok(*slot)
    }
}

/// Values for one draw iteration.
#[derive(Debug, Clone, Default)]
pub struct UniformAttributeBinder {
    uniforms: Vec<UniformBinding>,
    samplers: Vec<SamplerBinding>,
    attributes: Vec<AttributeBinding>,
    meshes: Vec<MeshBuffers>,
}

impl UniformAttributeBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_uniform(&mut self, name: &str, array_length: usize, values: UniformValues) {
        self.uniforms.push(UniformBinding {
            name: name.to_string(),
            array_length,
            values,
        });
    }

    pub fn add_sampler(&mut self, name: &str, source: SamplerSource) {
        self.samplers.push(SamplerBinding {
            name: name.to_string(),
            source,
            texture: None,
        });
    }

    /// Adds a sampler from host text: a `<component>:color|depth` reference
    /// or an image path, made absolute against `base_dir` when relative.
    pub fn add_sampler_text(&mut self, name: &str, text: &str, base_dir: Option<&Path>) {
        let source = match text.parse::<OutputKey>() {
            Ok(key) => SamplerSource::Output(key),
            Err(_) => SamplerSource::Path(resolve_path(text, base_dir)),
        };
        self.add_sampler(name, source);
    }

    pub fn add_attribute(&mut self, name: &str, location: Option<u32>, values: AttributeValues) {
        self.attributes.push(AttributeBinding {
            name: name.to_string(),
            location,
            values,
            buffer: NO_HANDLE,
        });
    }

    pub fn add_mesh(&mut self, mesh: Arc<Mesh>) {
        self.meshes.push(MeshBuffers::new(mesh));
    }

    pub fn uniforms(&self) -> &[UniformBinding] {
        &self.uniforms
    }

    pub fn samplers(&self) -> &[SamplerBinding] {
        &self.samplers
    }

    pub fn attributes(&self) -> &[AttributeBinding] {
        &self.attributes
    }

    pub fn meshes(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.iter().map(|m| m.mesh.as_ref())
    }

    /// Other components' outputs this binder samples.
    pub fn output_references(&self) -> impl Iterator<Item = &OutputKey> {
        self.samplers.iter().filter_map(|s| match &s.source {
            SamplerSource::Output(key) => Some(key),
            _ => None,
        })
    }

    /// How many draws this binder issues: one per mesh, at least one.
    pub fn draw_count(&self) -> usize {
        self.meshes.len().max(1)
    }

    /// Uploads uniforms, then binds samplers to consecutive units from
    /// [`FIRST_USER_TEXTURE_UNIT`]. Returns the number of samplers bound.
    ///
    /// Image samplers go through `images` once per binding; later frames
    /// reuse the resolved texture.
    pub fn setup_uniforms(
        &mut self,
        api: &dyn GraphicsApi,
        program: u32,
        frame_cache: &FrameCache,
        images: &mut ImageCache,
        bin: &mut RecycleBin,
    ) -> usize {
        for uniform in &self.uniforms {
            let Some(location) = api.uniform_location(program, &uniform.name) else {
                continue;
            };
            let available = uniform.values.len();
            if uniform.array_length == 0 {
                if available > 0 {
                    uniform.values.upload(api, location, 1);
                }
            } else if available >= uniform.array_length {
                uniform.values.upload(api, location, uniform.array_length);
            } else {
                log::debug!(
                    "uniform '{}' declares {} elements but only {available} were supplied",
                    uniform.name,
                    uniform.array_length
                );
            }
        }

        let mut unit = FIRST_USER_TEXTURE_UNIT;
        for sampler in &mut self.samplers {
            let Some(location) = api.uniform_location(program, &sampler.name) else {
                continue;
            };
            let texture = match &sampler.source {
                SamplerSource::Output(key) => frame_cache.texture(key),
                source => *sampler
                    .texture
                    .get_or_insert_with(|| load_texture(source, api, images, bin)),
            };
            if texture == NO_HANDLE {
                continue;
            }
            api.bind_texture(unit, texture);
            api.set_uniform(location, UniformData::Int(&[unit as i32]));
            unit += 1;
        }
        (unit - FIRST_USER_TEXTURE_UNIT) as usize
    }

    /// Binds attributes for draw `index` and issues it.
    ///
    /// Returns the element or index count drawn, `0` when nothing was drawn.
    /// Every attribute array enabled here is disabled again before
    /// returning.
    pub fn setup_attributes_and_draw(
        &mut self,
        index: usize,
        api: &dyn GraphicsApi,
        program: u32,
        mode: DrawMode,
    ) -> usize {
        let mut enabled = Vec::new();
        let drawn = self.bind_and_draw(index, api, program, mode, &mut enabled);
        for location in enabled {
            api.disable_attribute(location);
        }
        match drawn {
            Ok(count) => count,
            Err(e) => {
                log::warn!("draw skipped: {e}");
                0
            }
        }
    }

    fn bind_and_draw(
        &mut self,
        index: usize,
        api: &dyn GraphicsApi,
        program: u32,
        mode: DrawMode,
        enabled: &mut Vec<u32>,
    ) -> Result<usize, EngineError> {
        let mut element_count: Option<usize> = None;

        if let Some(mesh) = self.meshes.get_mut(index) {
            element_count = Some(mesh.mesh.vertex_count());
            for stream in 0..4 {
                let (name, components, data) = mesh.stream(stream);
                let Some(location) = api.attribute_location(program, name) else {
                    continue;
                };
                match data {
                    Some(data) => {
                        if mesh.streams[stream] == NO_HANDLE {
                            mesh.streams[stream] = api
                                .create_buffer(BufferTarget::Vertex, bytemuck::cast_slice(&data))
                                .map_err(EngineError::Graphics)?;
                        }
                        api.bind_attribute_buffer(location, mesh.streams[stream], components);
                        enabled.push(location);
                    }
                    None => {
                        api.set_constant_attribute(location, &vec![0.0; components as usize]);
                    }
                }
            }
        }

        let mut constant_only = false;
        for attribute in &mut self.attributes {
            let location = match attribute.location {
                Some(location) => location,
                None => match api.attribute_location(program, &attribute.name) {
                    Some(location) => location,
                    None => continue,
                },
            };
            let length = attribute.values.len();
            if length == 0 {
                continue;
            }
            let data = attribute.values.flatten();
            if length == 1 {
                api.set_constant_attribute(location, &data);
                constant_only = element_count.is_none();
                continue;
            }
            if attribute.buffer == NO_HANDLE {
                attribute.buffer = api
                    .create_buffer(BufferTarget::Vertex, bytemuck::cast_slice(&data))
                    .map_err(EngineError::Graphics)?;
            }
            api.bind_attribute_buffer(location, attribute.buffer, attribute.values.components());
            enabled.push(location);
            element_count = Some(element_count.map_or(length, |n| n.min(length)));
        }

        let count = match element_count {
            Some(n) => n,
            None if constant_only => 1,
            None => 0,
        };
        if count == 0 {
            return Ok(0);
        }

        match self.meshes.get_mut(index) {
            Some(mesh) => {
                let (buffer, indices) = mesh.index_buffer(api, mode.uses_line_indices())?;
                if indices == 0 {
                    return Ok(0);
                }
                api.draw_elements(mode, buffer, indices);
                Ok(indices)
            }
            None => {
                api.draw_arrays(mode, count);
                Ok(count)
            }
        }
    }

    /// Drops every value and queues every buffer this binder created.
    ///
    /// Sampler image textures belong to the image cache and stay alive.
    pub fn clear(&mut self, bin: &mut RecycleBin) {
        for attribute in self.attributes.drain(..) {
            bin.add_buffer(attribute.buffer);
        }
        for mesh in self.meshes.drain(..) {
            for handle in mesh.handles() {
                bin.add_buffer(handle);
            }
        }
        self.uniforms.clear();
        self.samplers.clear();
    }
}

fn load_texture(
    source: &SamplerSource,
    api: &dyn GraphicsApi,
    images: &mut ImageCache,
    bin: &mut RecycleBin,
) -> u32 {
    let Some(key) = source.cache_key() else {
        return NO_HANDLE;
    };
    let result = images.get_or_load(&key, api, bin, || match source {
        SamplerSource::Path(path) => load_image(path),
        SamplerSource::Image { image, .. } => Ok(image.as_ref().clone()),
        SamplerSource::Output(_) => Err(EngineError::Image("not an image source".to_string())),
    });
    match result {
        Ok(texture) => texture,
        Err(e) => {
            log::warn!("sampler image '{key}' unavailable: {e}");
            NO_HANDLE
        }
    }
}

fn load_image(path: &Path) -> Result<RgbaImage, EngineError> {
    let text = path.to_string_lossy();
    if text.starts_with("http://") || text.starts_with("https://") {
        return Err(EngineError::Unsupported(format!(
            "remote images are not fetched: {text}"
        )));
    }
    Ok(image::open(path)?.to_rgba8())
}

fn resolve_path(text: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(text);
    let remote = text.starts_with("http://") || text.starts_with("https://");
    match base_dir {
        Some(base) if !remote && path.is_relative() && !path.exists() => base.join(path),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_cache::{BufferKind, FrameRequirements};
    use crate::gl::fake::{Call, FakeGl};
    use crate::mesh::Face;
    use crate::program::ProgramModel;
    use crate::stage::StageKind;

    fn linked(gl: &FakeGl, vertex: &str, fragment: &str) -> u32 {
        let mut bin = RecycleBin::new();
        let mut model = ProgramModel::new();
        model.set_source(StageKind::Vertex, vertex, &mut bin);
        model.set_source(StageKind::Fragment, fragment, &mut bin);
        assert!(model.compile(gl, &mut bin));
        gl.clear_calls();
        model.handle()
    }

    fn square() -> Arc<Mesh> {
        Arc::new(Mesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            normals: vec![Vec3::Z; 4],
            faces: vec![Face::Quad([0, 1, 2, 3])],
            ..Mesh::default()
        })
    }

    #[test]
    fn scalar_uniform_uploads_first_value_only() {
        let gl = FakeGl::new();
        let program = linked(&gl, "void main() {}", "uniform float speed;");
        let mut binder = UniformAttributeBinder::new();
        binder.add_uniform("speed", 0, UniformValues::Float(vec![2.0, 3.0]));
        binder.setup_uniforms(
            &gl,
            program,
            &FrameCache::new(),
            &mut ImageCache::new(),
            &mut RecycleBin::new(),
        );
        assert_eq!(gl.uniform_uploads("speed"), vec![vec![2.0]]);
    }

    #[test]
    fn array_uniform_uploads_declared_count_flattened() {
        let gl = FakeGl::new();
        let program = linked(&gl, "void main() {}", "uniform vec3 points[2];");
        let mut binder = UniformAttributeBinder::new();
        binder.add_uniform(
            "points",
            2,
            UniformValues::Vec3(vec![Vec3::X, Vec3::Y, Vec3::Z]),
        );
        binder.setup_uniforms(
            &gl,
            program,
            &FrameCache::new(),
            &mut ImageCache::new(),
            &mut RecycleBin::new(),
        );
        assert_eq!(
            gl.last_uniform("points"),
            Some(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
        );
    }

    #[test]
    fn short_array_uniform_is_skipped() {
        let gl = FakeGl::new();
        let program = linked(&gl, "void main() {}", "uniform float weights[4];");
        let mut binder = UniformAttributeBinder::new();
        binder.add_uniform("weights", 4, UniformValues::Float(vec![1.0, 2.0]));
        binder.setup_uniforms(
            &gl,
            program,
            &FrameCache::new(),
            &mut ImageCache::new(),
            &mut RecycleBin::new(),
        );
        assert!(gl.uniform_uploads("weights").is_empty());
    }

    #[test]
    fn samplers_bind_to_consecutive_user_units() {
        let gl = FakeGl::new();
        let program = linked(
            &gl,
            "void main() {}",
            "uniform sampler2D a;\nuniform sampler2D b;",
        );
        let image = Arc::new(RgbaImage::new(2, 2));
        let mut binder = UniformAttributeBinder::new();
        binder.add_sampler(
            "a",
            SamplerSource::Image {
                key: "one".into(),
                image: image.clone(),
            },
        );
        binder.add_sampler(
            "b",
            SamplerSource::Image {
                key: "two".into(),
                image,
            },
        );
        let bound = binder.setup_uniforms(
            &gl,
            program,
            &FrameCache::new(),
            &mut ImageCache::new(),
            &mut RecycleBin::new(),
        );
        assert_eq!(bound, 2);
        assert_eq!(gl.last_uniform("a"), Some(vec![FIRST_USER_TEXTURE_UNIT as f32]));
        assert_eq!(
            gl.last_uniform("b"),
            Some(vec![(FIRST_USER_TEXTURE_UNIT + 1) as f32])
        );
    }

    #[test]
    fn unresolved_sampler_is_skipped_without_consuming_a_unit() {
        let gl = FakeGl::new();
        let program = linked(
            &gl,
            "void main() {}",
            "uniform sampler2D missing;\nuniform sampler2D other;",
        );
        let mut frame_cache = FrameCache::new();
        let mut bin = RecycleBin::new();
        let key = OutputKey::new("producer", BufferKind::Color);
        let req = FrameRequirements {
            outputs: [key.clone()].into_iter().collect(),
            ..FrameRequirements::default()
        };
        let mut scope = frame_cache.begin_frame(&gl, &req, 4, 4, &mut bin);
        {
            let (cache, bin) = scope.parts();
            cache.store_outputs(&gl, "producer", bin);
        }

        let mut binder = UniformAttributeBinder::new();
        binder.add_sampler("missing", SamplerSource::Output(OutputKey::new("nobody", BufferKind::Color)));
        binder.add_sampler_text("other", "PRODUCER:color", None);
        let (cache, bin) = scope.parts();
        let bound = binder.setup_uniforms(&gl, program, cache, &mut ImageCache::new(), bin);
        assert_eq!(bound, 1);
        assert_eq!(gl.last_uniform("other"), Some(vec![FIRST_USER_TEXTURE_UNIT as f32]));
        assert!(gl.last_uniform("missing").is_none());
    }

    #[test]
    fn eleven_distinct_images_load_once_and_evict_the_oldest_after_clear() {
        let gl = FakeGl::new();
        let fragment: String = (0..11)
            .map(|i| format!("uniform sampler2D s{i};\n"))
            .collect();
        let program = linked(&gl, "void main() {}", &fragment);
        let mut binder = UniformAttributeBinder::new();
        for i in 0..11 {
            binder.add_sampler(
                &format!("s{i}"),
                SamplerSource::Image {
                    key: format!("img{i}"),
                    image: Arc::new(RgbaImage::new(1, 1)),
                },
            );
        }
        let mut images = ImageCache::new();
        let mut bin = RecycleBin::new();
        for _ in 0..3 {
            let bound = binder.setup_uniforms(&gl, program, &FrameCache::new(), &mut images, &mut bin);
            assert_eq!(bound, 11);
        }

        let created: Vec<u32> = gl
            .calls()
            .iter()
            .filter_map(|c| match c {
                Call::CreateTexture(h) => Some(*h),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), 11, "got: {created:?}");
        assert!(bin.is_empty(), "bound textures stay alive");

        binder.clear(&mut bin);
        assert!(bin.is_empty(), "the image cache owns sampler textures");
        assert_eq!(images.trim(&mut bin), 1);
        assert_eq!(bin.pending(), 1);
        assert!(bin.contains_texture(created[0]));
    }

    #[test]
    fn unreadable_image_leaves_the_sampler_unbound_every_frame() {
        let gl = FakeGl::new();
        let program = linked(&gl, "void main() {}", "uniform sampler2D photo;");
        let mut binder = UniformAttributeBinder::new();
        binder.add_sampler("photo", SamplerSource::Path(PathBuf::from("/nonexistent/photo.png")));
        let mut images = ImageCache::new();
        let mut bin = RecycleBin::new();
        for _ in 0..2 {
            let bound = binder.setup_uniforms(&gl, program, &FrameCache::new(), &mut images, &mut bin);
            assert_eq!(bound, 0);
        }
        assert!(images.is_empty());
        assert_eq!(gl.count(|c| matches!(c, Call::CreateTexture(_))), 0);
    }

    #[test]
    fn free_attributes_draw_minimum_length_and_constants() {
        let gl = FakeGl::new();
        let program = linked(
            &gl,
            "layout(location = 0) in vec3 position;\nattribute float weight;\nattribute vec4 tint;",
            "void main() {}",
        );
        let mut binder = UniformAttributeBinder::new();
        binder.add_attribute("position", Some(0), AttributeValues::Vec3(vec![Vec3::ZERO; 5]));
        binder.add_attribute("weight", None, AttributeValues::Float(vec![1.0, 2.0, 3.0]));
        binder.add_attribute("tint", None, AttributeValues::Vec4(vec![Vec4::ONE]));

        let drawn = binder.setup_attributes_and_draw(0, &gl, program, DrawMode::Points);
        assert_eq!(drawn, 3);
        let calls = gl.calls();
        assert!(calls.contains(&Call::DrawArrays(DrawMode::Points, 3)));
        assert!(calls
            .iter()
            .any(|c| matches!(c, Call::ConstantAttribute { value, .. } if value == &vec![1.0; 4])));
        assert_eq!(gl.count(|c| matches!(c, Call::BindAttribute { .. })), 2);
        assert_eq!(gl.count(|c| matches!(c, Call::DisableAttribute(_))), 2);
    }

    #[test]
    fn attribute_buffers_are_created_once() {
        let gl = FakeGl::new();
        let program = linked(&gl, "attribute float weight;", "void main() {}");
        let mut binder = UniformAttributeBinder::new();
        binder.add_attribute("weight", None, AttributeValues::Float(vec![1.0, 2.0]));
        binder.setup_attributes_and_draw(0, &gl, program, DrawMode::Lines);
        binder.setup_attributes_and_draw(0, &gl, program, DrawMode::Lines);
        assert_eq!(
            gl.count(|c| matches!(c, Call::CreateBuffer(BufferTarget::Vertex, ..))),
            1
        );
    }

    #[test]
    fn mesh_draw_uses_triangle_indices_and_declared_streams() {
        let gl = FakeGl::new();
        let program = linked(
            &gl,
            "layout(location = 0) in vec3 _meshVertex;\nlayout(location = 1) in vec2 _meshTextureCoordinate;",
            "void main() {}",
        );
        let mut binder = UniformAttributeBinder::new();
        binder.add_mesh(square());

        let drawn = binder.setup_attributes_and_draw(0, &gl, program, DrawMode::Triangles);
        assert_eq!(drawn, 6);
        let calls = gl.calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, Call::DrawElements(DrawMode::Triangles, _, 6))));
        // Texture coordinates were not supplied, so that attribute gets a constant.
        assert!(calls
            .iter()
            .any(|c| matches!(c, Call::ConstantAttribute { value, .. } if value.len() == 2)));
        // Normals exist but the program does not declare them.
        assert_eq!(gl.count(|c| matches!(c, Call::CreateBuffer(BufferTarget::Vertex, ..))), 1);
    }

    #[test]
    fn line_mode_expands_faces_to_edges() {
        let gl = FakeGl::new();
        let program = linked(&gl, "layout(location = 0) in vec3 _meshVertex;", "void main() {}");
        let mut binder = UniformAttributeBinder::new();
        binder.add_mesh(square());
        assert_eq!(
            binder.setup_attributes_and_draw(0, &gl, program, DrawMode::Lines),
            8
        );
    }

    #[test]
    fn nothing_to_draw_issues_no_draw_call() {
        let gl = FakeGl::new();
        let program = linked(&gl, "void main() {}", "void main() {}");
        let mut binder = UniformAttributeBinder::new();
        assert_eq!(
            binder.setup_attributes_and_draw(0, &gl, program, DrawMode::Triangles),
            0
        );
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn clear_queues_all_owned_buffers() {
        let gl = FakeGl::new();
        let program = linked(
            &gl,
            "layout(location = 0) in vec3 _meshVertex;\nattribute float w;",
            "void main() {}",
        );
        let mut binder = UniformAttributeBinder::new();
        binder.add_mesh(square());
        binder.add_attribute("w", None, AttributeValues::Float(vec![1.0; 4]));
        binder.setup_attributes_and_draw(0, &gl, program, DrawMode::Triangles);

        let mut bin = RecycleBin::new();
        binder.clear(&mut bin);
        // vertex stream, triangle indices, free attribute
        assert_eq!(bin.pending(), 3);
        assert_eq!(binder.draw_count(), 1);
        assert!(binder.attributes().is_empty());
    }

    #[test]
    fn sampler_text_resolves_references_and_relative_paths() {
        let mut binder = UniformAttributeBinder::new();
        let base = Path::new("/projects/demo");
        binder.add_sampler_text("a", "Producer:depth", Some(base));
        binder.add_sampler_text("b", "textures/wood.png", Some(base));
        binder.add_sampler_text("c", "https://example.com/x.png", Some(base));

        assert!(matches!(
            &binder.samplers()[0].source,
            SamplerSource::Output(k) if k.component == "producer" && k.kind == BufferKind::Depth
        ));
        assert!(matches!(
            &binder.samplers()[1].source,
            SamplerSource::Path(p) if p == Path::new("/projects/demo/textures/wood.png")
        ));
        assert!(matches!(
            &binder.samplers()[2].source,
            SamplerSource::Path(p) if p.to_string_lossy().starts_with("https://")
        ));
        assert_eq!(binder.output_references().count(), 1);
    }

    #[test]
    fn image_file_is_loaded_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();
        let image = load_image(&path).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn remote_images_are_not_fetched() {
        let err = load_image(Path::new("https://example.com/a.png")).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }
}

//! [`GraphicsApi`] over a native `glow::Context`.
//!
//! `GlowApi` checks the context version once at construction. Handles cross
//! the trait boundary as raw GL names and are rewrapped into glow's native
//! handle types on every call.

use std::num::NonZeroU32;

use super::{BufferTarget, GraphicsApi, RenderState, UniformData};
use crate::error::ShaderError;
use crate::frame_cache::BufferKind;
use crate::program::DrawMode;
use crate::stage::StageKind;

/// Wraps a `glow::Context` that supports at least OpenGL 3.3 or OpenGL ES 3.0.
pub struct GlowApi {
    gl: glow::Context,
}

/// Whether a context version can run the engine.
///
/// Desktop contexts need 3.3 for explicit attribute locations; ES contexts
/// need 3.0.
pub fn version_supported(major: u32, minor: u32, embedded: bool) -> bool {
    if embedded {
        major >= 3
    } else {
        (major, minor) >= (3, 3)
    }
}

/// The GL shader type for a stage.
pub fn stage_enum(stage: StageKind) -> u32 {
    match stage {
        StageKind::Vertex => glow::VERTEX_SHADER,
        StageKind::TessControl => glow::TESS_CONTROL_SHADER,
        StageKind::TessEval => glow::TESS_EVALUATION_SHADER,
        StageKind::Geometry => glow::GEOMETRY_SHADER,
        StageKind::Fragment => glow::FRAGMENT_SHADER,
    }
}

fn shader(handle: u32) -> Option<glow::NativeShader> {
    NonZeroU32::new(handle).map(glow::NativeShader)
}

fn program(handle: u32) -> Option<glow::NativeProgram> {
    NonZeroU32::new(handle).map(glow::NativeProgram)
}

fn buffer(handle: u32) -> Option<glow::NativeBuffer> {
    NonZeroU32::new(handle).map(glow::NativeBuffer)
}

fn texture(handle: u32) -> Option<glow::NativeTexture> {
    NonZeroU32::new(handle).map(glow::NativeTexture)
}

fn vertex_array(handle: u32) -> Option<glow::NativeVertexArray> {
    NonZeroU32::new(handle).map(glow::NativeVertexArray)
}

fn count_i32(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

impl GlowApi {
    /// Wraps `gl` after checking its version.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::ContextUnavailable`] if the context reports a
    /// version below the minimum.
    pub fn new(gl: glow::Context) -> Result<Self, ShaderError> {
        use glow::HasContext;

        let version = gl.version();
        if !version_supported(version.major, version.minor, version.is_embedded) {
            return Err(ShaderError::ContextUnavailable(format!(
                "OpenGL{} {}.{} is older than the required {}",
                if version.is_embedded { " ES" } else { "" },
                version.major,
                version.minor,
                if version.is_embedded { "3.0" } else { "3.3" },
            )));
        }
        log::debug!(
            "using OpenGL {}.{} ({})",
            version.major,
            version.minor,
            version.vendor_info
        );
        Ok(Self { gl })
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub fn into_gl(self) -> glow::Context {
        self.gl
    }

    #[allow(unsafe_code)]
    fn new_texture(&self) -> Result<glow::NativeTexture, String> {
        use glow::HasContext;

        // SAFETY: creating and configuring a texture object touches only
        // the new object and the TEXTURE_2D binding, which is reset below.
        unsafe {
            let texture = self.gl.create_texture()?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            for wrap in [glow::TEXTURE_WRAP_S, glow::TEXTURE_WRAP_T] {
                self.gl
                    .tex_parameter_i32(glow::TEXTURE_2D, wrap, glow::REPEAT as i32);
            }
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as i32,
            );
            Ok(texture)
        }
    }
}

impl GraphicsApi for GlowApi {
    #[allow(unsafe_code)]
    fn compile_shader(&self, stage: StageKind, source: &str) -> Result<u32, String> {
        use glow::HasContext;

        // SAFETY: glow wraps raw GL calls as unsafe. The shader object is
        // deleted on the failure path so nothing leaks.
        unsafe {
            let shader = self.gl.create_shader(stage_enum(stage))?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(shader.0.get())
            } else {
                let info_log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                Err(info_log)
            }
        }
    }

    #[allow(unsafe_code)]
    fn create_program(&self) -> Result<u32, String> {
        use glow::HasContext;

        // SAFETY: allocates a new program object.
        unsafe { self.gl.create_program().map(|p| p.0.get()) }
    }

    #[allow(unsafe_code)]
    fn attach_shader(&self, program_handle: u32, shader_handle: u32) {
        use glow::HasContext;

        if let (Some(p), Some(s)) = (program(program_handle), shader(shader_handle)) {
            // SAFETY: both handles came from this context.
            unsafe { self.gl.attach_shader(p, s) };
        }
    }

    #[allow(unsafe_code)]
    fn link_program(&self, program_handle: u32) -> Result<(), String> {
        use glow::HasContext;

        let p = program(program_handle).ok_or_else(|| "no program object".to_string())?;
        // SAFETY: `p` came from this context. A link can succeed while the
        // driver still records an error, so the error flag is checked too.
        unsafe {
            self.gl.link_program(p);
            if !self.gl.get_program_link_status(p) {
                return Err(self.gl.get_program_info_log(p));
            }
            match self.gl.get_error() {
                glow::NO_ERROR => Ok(()),
                code => Err(format!("GL error 0x{code:04X} after link")),
            }
        }
    }

    #[allow(unsafe_code)]
    fn use_program(&self, program_handle: u32) {
        use glow::HasContext;

        // SAFETY: binding `None` unbinds; otherwise the handle came from
        // this context.
        unsafe { self.gl.use_program(program(program_handle)) };
    }

    #[allow(unsafe_code)]
    fn uniform_location(&self, program_handle: u32, name: &str) -> Option<u32> {
        use glow::HasContext;

        let p = program(program_handle)?;
        // SAFETY: read-only query on a program from this context.
        unsafe { self.gl.get_uniform_location(p, name).map(|l| l.0) }
    }

    #[allow(unsafe_code)]
    fn attribute_location(&self, program_handle: u32, name: &str) -> Option<u32> {
        use glow::HasContext;

        let p = program(program_handle)?;
        // SAFETY: read-only query on a program from this context.
        unsafe { self.gl.get_attrib_location(p, name) }
    }

    #[allow(unsafe_code)]
    fn set_uniform(&self, location: u32, data: UniformData<'_>) {
        use glow::HasContext;

        let location = glow::NativeUniformLocation(location);
        let l = Some(&location);
        // SAFETY: uploads to the currently bound program. Matrices arrive
        // row-major and are transposed by GL.
        unsafe {
            match data {
                UniformData::Int(v) => self.gl.uniform_1_i32_slice(l, v),
                UniformData::Float(v) => self.gl.uniform_1_f32_slice(l, v),
                UniformData::Vec2(v) => self.gl.uniform_2_f32_slice(l, v),
                UniformData::Vec3(v) => self.gl.uniform_3_f32_slice(l, v),
                UniformData::Vec4(v) => self.gl.uniform_4_f32_slice(l, v),
                UniformData::Mat3(v) => self.gl.uniform_matrix_3_f32_slice(l, true, v),
                UniformData::Mat4(v) => self.gl.uniform_matrix_4_f32_slice(l, true, v),
            }
        }
    }

    #[allow(unsafe_code)]
    fn create_texture_rgba8(&self, width: u32, height: u32, pixels: &[u8]) -> Result<u32, String> {
        use glow::HasContext;

        check_rgba8_len(width, height, pixels.len())?;
        let texture = self.new_texture()?;
        // SAFETY: `texture` is bound to TEXTURE_2D by new_texture and the
        // pixel slice length was checked above.
        unsafe {
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR_MIPMAP_LINEAR as i32,
            );
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(pixels)),
            );
            self.gl.generate_mipmap(glow::TEXTURE_2D);
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
        Ok(texture.0.get())
    }

    #[allow(unsafe_code)]
    fn capture_framebuffer(&self, kind: BufferKind, width: u32, height: u32) -> Result<u32, String> {
        use glow::HasContext;

        let texture = self.new_texture()?;
        let format = match kind {
            BufferKind::Color => glow::RGBA,
            BufferKind::Depth => glow::DEPTH_COMPONENT,
        };
        // SAFETY: copies from the current read framebuffer into the texture
        // bound by new_texture.
        unsafe {
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR as i32,
            );
            self.gl
                .copy_tex_image_2d(glow::TEXTURE_2D, 0, format, 0, 0, width as i32, height as i32, 0);
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            match self.gl.get_error() {
                glow::NO_ERROR => Ok(texture.0.get()),
                code => {
                    self.gl.delete_texture(texture);
                    Err(format!("GL error 0x{code:04X} copying the {} buffer", kind.suffix()))
                }
            }
        }
    }

    #[allow(unsafe_code)]
    fn bind_texture(&self, unit: u32, texture_handle: u32) {
        use glow::HasContext;

        // SAFETY: selects a texture unit, binds, then restores unit 0.
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, texture(texture_handle));
            self.gl.active_texture(glow::TEXTURE0);
        }
    }

    #[allow(unsafe_code)]
    fn create_buffer(&self, target: BufferTarget, bytes: &[u8]) -> Result<u32, String> {
        use glow::HasContext;

        let target = match target {
            BufferTarget::Vertex => glow::ARRAY_BUFFER,
            BufferTarget::Index => glow::ELEMENT_ARRAY_BUFFER,
        };
        // SAFETY: the new buffer is bound, filled and unbound again.
        // Unbinding ELEMENT_ARRAY_BUFFER is safe because draws rebind it.
        unsafe {
            let buffer = self.gl.create_buffer()?;
            self.gl.bind_buffer(target, Some(buffer));
            self.gl.buffer_data_u8_slice(target, bytes, glow::STATIC_DRAW);
            self.gl.bind_buffer(target, None);
            Ok(buffer.0.get())
        }
    }

    #[allow(unsafe_code)]
    fn bind_attribute_buffer(&self, location: u32, buffer_handle: u32, components: u32) {
        use glow::HasContext;

        // SAFETY: configures one attribute array of the bound vertex array.
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, buffer(buffer_handle));
            self.gl.enable_vertex_attrib_array(location);
            self.gl
                .vertex_attrib_pointer_f32(location, components as i32, glow::FLOAT, false, 0, 0);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    #[allow(unsafe_code)]
    fn set_constant_attribute(&self, location: u32, value: &[f32]) {
        use glow::HasContext;

        // SAFETY: sets generic attribute state for `location`.
        unsafe {
            self.gl.disable_vertex_attrib_array(location);
            match *value {
                [x] => self.gl.vertex_attrib_1_f32(location, x),
                [x, y] => self.gl.vertex_attrib_2_f32(location, x, y),
                [x, y, z] => self.gl.vertex_attrib_3_f32(location, x, y, z),
                [x, y, z, w, ..] => self.gl.vertex_attrib_4_f32(location, x, y, z, w),
                [] => {}
            }
        }
    }

    #[allow(unsafe_code)]
    fn disable_attribute(&self, location: u32) {
        use glow::HasContext;

        // SAFETY: disables one attribute array.
        unsafe { self.gl.disable_vertex_attrib_array(location) };
    }

    #[allow(unsafe_code)]
    fn draw_arrays(&self, mode: DrawMode, count: usize) {
        use glow::HasContext;

        // SAFETY: the caller bound every enabled array with at least
        // `count` elements.
        unsafe { self.gl.draw_arrays(mode.gl_enum(), 0, count_i32(count)) };
    }

    #[allow(unsafe_code)]
    fn draw_elements(&self, mode: DrawMode, index_buffer: u32, count: usize) {
        use glow::HasContext;

        // SAFETY: `index_buffer` holds at least `count` u32 indices, each
        // within the bound vertex arrays.
        unsafe {
            self.gl
                .bind_buffer(glow::ELEMENT_ARRAY_BUFFER, buffer(index_buffer));
            self.gl
                .draw_elements(mode.gl_enum(), count_i32(count), glow::UNSIGNED_INT, 0);
        }
    }

    #[allow(unsafe_code)]
    fn create_vertex_array(&self) -> Result<u32, String> {
        use glow::HasContext;

        // SAFETY: allocates a new vertex array object.
        unsafe { self.gl.create_vertex_array().map(|v| v.0.get()) }
    }

    #[allow(unsafe_code)]
    fn bind_vertex_array(&self, handle: u32) {
        use glow::HasContext;

        // SAFETY: binding `None` unbinds.
        unsafe { self.gl.bind_vertex_array(vertex_array(handle)) };
    }

    #[allow(unsafe_code)]
    fn delete_vertex_array(&self, handle: u32) {
        use glow::HasContext;

        if let Some(v) = vertex_array(handle) {
            // SAFETY: the caller unbound the vertex array first.
            unsafe { self.gl.delete_vertex_array(v) };
        }
    }

    #[allow(unsafe_code)]
    fn render_state(&self) -> RenderState {
        use glow::HasContext;

        // SAFETY: read-only state queries.
        unsafe {
            RenderState {
                depth_test: self.gl.is_enabled(glow::DEPTH_TEST),
                depth_write: self.gl.get_parameter_i32(glow::DEPTH_WRITEMASK) != 0,
                blend: self.gl.is_enabled(glow::BLEND),
                program_point_size: self.gl.is_enabled(glow::PROGRAM_POINT_SIZE),
            }
        }
    }

    #[allow(unsafe_code)]
    fn set_render_state(&self, state: &RenderState) {
        use glow::HasContext;

        let toggle = |cap: u32, on: bool| {
            // SAFETY: enabling or disabling a fixed-function capability.
            unsafe {
                if on {
                    self.gl.enable(cap);
                } else {
                    self.gl.disable(cap);
                }
            }
        };
        toggle(glow::DEPTH_TEST, state.depth_test);
        toggle(glow::BLEND, state.blend);
        toggle(glow::PROGRAM_POINT_SIZE, state.program_point_size);
        // SAFETY: plain state setters.
        unsafe {
            self.gl.depth_mask(state.depth_write);
            if state.blend {
                self.gl
                    .blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            }
        }
    }

    #[allow(unsafe_code)]
    fn set_line_width(&self, width: f32) {
        use glow::HasContext;

        // SAFETY: plain state setter.
        unsafe { self.gl.line_width(width) };
    }

    fn set_point_size(&self, _size: f32) {
        // Point size comes from gl_PointSize with PROGRAM_POINT_SIZE enabled.
    }

    #[allow(unsafe_code)]
    fn delete_shader(&self, handle: u32) {
        use glow::HasContext;

        if let Some(s) = shader(handle) {
            // SAFETY: called only from the recycle bin, after every draw
            // of the frame.
            unsafe { self.gl.delete_shader(s) };
        }
    }

    #[allow(unsafe_code)]
    fn delete_program(&self, handle: u32) {
        use glow::HasContext;

        if let Some(p) = program(handle) {
            // SAFETY: see delete_shader.
            unsafe { self.gl.delete_program(p) };
        }
    }

    #[allow(unsafe_code)]
    fn delete_buffer(&self, handle: u32) {
        use glow::HasContext;

        if let Some(b) = buffer(handle) {
            // SAFETY: see delete_shader.
            unsafe { self.gl.delete_buffer(b) };
        }
    }

    #[allow(unsafe_code)]
    fn delete_texture(&self, handle: u32) {
        use glow::HasContext;

        if let Some(t) = texture(handle) {
            // SAFETY: see delete_shader.
            unsafe { self.gl.delete_texture(t) };
        }
    }
}

/// Checks that `len` bytes hold exactly a `width` by `height` RGBA8 image.
fn check_rgba8_len(width: u32, height: u32, len: usize) -> Result<(), String> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| format!("{width}x{height} RGBA8 image is too large"))?;
    if len != expected {
        return Err(format!(
            "{width}x{height} RGBA8 image needs {expected} bytes, got {len}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_versions() {
        assert!(version_supported(3, 3, false));
        assert!(version_supported(4, 6, false));
        assert!(!version_supported(3, 2, false));
        assert!(!version_supported(2, 1, false));
        assert!(version_supported(3, 0, true));
        assert!(!version_supported(2, 0, true));
    }

    #[test]
    fn stage_enums_are_distinct() {
        let enums: std::collections::HashSet<u32> =
            StageKind::ALL.into_iter().map(stage_enum).collect();
        assert_eq!(enums.len(), 5);
        assert_eq!(stage_enum(StageKind::Vertex), glow::VERTEX_SHADER);
    }

    #[test]
    fn zero_handle_maps_to_none() {
        assert!(shader(0).is_none());
        assert!(program(0).is_none());
        assert!(texture(7).is_some());
    }

    #[test]
    fn rgba8_pixels_must_match_the_dimensions() {
        assert!(check_rgba8_len(2, 3, 24).is_ok());
        assert!(check_rgba8_len(0, 0, 0).is_ok());

        let err = check_rgba8_len(2, 2, 15).unwrap_err();
        assert_eq!(err, "2x2 RGBA8 image needs 16 bytes, got 15");
        assert!(check_rgba8_len(1, 1, 8).is_err());
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let err = check_rgba8_len(u32::MAX, u32::MAX, 0).unwrap_err();
        assert!(err.contains("too large"), "got: {err}");
    }
}

//! Reserved uniforms whose values the engine computes every frame.
//!
//! Each [`BuiltIn`] pairs its metadata with a setup function. Setup resolves
//! the uniform in the program being drawn and uploads the value derived from
//! the [`SetupContext`]; a program that does not declare the uniform is
//! skipped silently.
//!
//! Texture units 1 through 5 are reserved for the captured-buffer samplers.
//! User samplers start at [`FIRST_USER_TEXTURE_UNIT`].

use std::collections::HashMap;
use std::time::Instant;

use chrono::{Datelike, Local, Timelike};
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::Serialize;

use crate::error::EngineError;
use crate::frame_cache::{BufferKind, FrameCache};
use crate::gl::{GraphicsApi, UniformData, NO_HANDLE};
use crate::recycle::RecycleBin;
use crate::scan::split_array_suffix;

pub const COLOR_BUFFER_UNIT: u32 = 1;
pub const DEPTH_BUFFER_UNIT: u32 = 2;
pub const INITIAL_COLOR_BUFFER_UNIT: u32 = 3;
pub const INITIAL_DEPTH_BUFFER_UNIT: u32 = 4;
pub const PREVIOUS_COLOR_BUFFER_UNIT: u32 = 5;
pub const FIRST_USER_TEXTURE_UNIT: u32 = 6;

pub const INITIAL_COLOR_BUFFER: &str = "_initialColorBuffer";
pub const INITIAL_DEPTH_BUFFER: &str = "_initialDepthBuffer";
pub const PREVIOUS_COLOR_BUFFER: &str = "_previousColorBuffer";

/// Lights beyond this count are ignored.
pub const MAX_LIGHTS: usize = 4;

/// Attribute names a mesh feeds automatically.
pub const MESH_VERTEX: &str = "_meshVertex";
pub const MESH_NORMAL: &str = "_meshNormal";
pub const MESH_TEXTURE_COORDINATE: &str = "_meshTextureCoordinate";
pub const MESH_VERTEX_COLOR: &str = "_meshVertexColor";

/// Metadata for an attribute the engine fills from mesh data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuiltInAttribute {
    pub name: &'static str,
    pub type_tag: &'static str,
    pub description: &'static str,
}

pub const MESH_ATTRIBUTES: [BuiltInAttribute; 4] = [
    BuiltInAttribute {
        name: MESH_VERTEX,
        type_tag: "vec3",
        description: "mesh vertex position",
    },
    BuiltInAttribute {
        name: MESH_NORMAL,
        type_tag: "vec3",
        description: "mesh vertex normal",
    },
    BuiltInAttribute {
        name: MESH_TEXTURE_COORDINATE,
        type_tag: "vec2",
        description: "mesh texture coordinate",
    },
    BuiltInAttribute {
        name: MESH_VERTEX_COLOR,
        type_tag: "vec4",
        description: "mesh vertex color, channels in [0, 1]",
    },
];

/// A light as the host reports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub direction: Vec3,
    /// Whether position and direction are relative to the camera.
    pub camera_space: bool,
}

impl Light {
    /// The headlight used when the host cannot enumerate scene lights.
    pub fn fallback() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::new(1.0, -1.0, -3.0),
            camera_space: true,
        }
    }
}

/// Raw mouse input for one view, in top-left-origin pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MouseInput {
    pub position: Vec2,
    /// Left, middle, right.
    pub buttons: [bool; 3],
}

/// Mouse state as the built-ins publish it, in bottom-left-origin pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MouseSnapshot {
    pub position: Vec2,
    pub down_anchor: Option<Vec2>,
    pub buttons: [bool; 3],
}

/// Holds the position where the current button press began.
///
/// The anchor is set on the first frame any button is down and held until
/// every button is released.
#[derive(Debug, Clone, Default)]
pub struct MouseTracker {
    anchor: Option<Vec2>,
}

impl MouseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchor(&self) -> Option<Vec2> {
        self.anchor
    }

    /// Advances the tracker by one frame of input for a view
    /// `viewport_height` pixels tall.
    pub fn update(&mut self, input: &MouseInput, viewport_height: f32) -> MouseSnapshot {
        let position = Vec2::new(input.position.x, viewport_height - input.position.y);
        if input.buttons.iter().any(|&down| down) {
            if self.anchor.is_none() {
                self.anchor = Some(position);
            }
        } else {
            self.anchor = None;
        }
        MouseSnapshot {
            position,
            down_anchor: self.anchor,
            buttons: input.buttons,
        }
    }
}

/// Per-view frame timestamps for delta time.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last: HashMap<u64, Instant>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since `view` last ticked, `0` on its first tick.
    pub fn tick(&mut self, view: u64, now: Instant) -> f32 {
        let delta = self
            .last
            .get(&view)
            .map(|&last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last.insert(view, now);
        delta
    }
}

/// Local wall-clock date as `(year, month, day, seconds since midnight)`.
pub fn local_date() -> [f32; 4] {
    let now = Local::now();
    let seconds = now.num_seconds_from_midnight() as f32 + now.nanosecond() as f32 * 1e-9;
    [now.year() as f32, now.month() as f32, now.day() as f32, seconds]
}

/// What the host can provide, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// The host can enumerate scene lights.
    pub scene_lights: bool,
    /// The host can read back the depth buffer.
    pub depth_capture: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            scene_lights: true,
            depth_capture: true,
        }
    }
}

/// One viewport's camera and frame geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub view_id: u64,
    pub width: u32,
    pub height: u32,
    pub world_to_camera: Mat4,
    pub camera_to_clip: Mat4,
    pub camera_location: Vec3,
    pub near: f32,
    pub far: f32,
    pub parallel: bool,
    /// Scene lights. Ignored when the host lacks the scene-lights capability.
    pub lights: Vec<Light>,
    pub mouse: MouseInput,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            view_id: 0,
            width: 1,
            height: 1,
            world_to_camera: Mat4::IDENTITY,
            camera_to_clip: Mat4::IDENTITY,
            camera_location: Vec3::ZERO,
            near: 0.1,
            far: 1000.0,
            parallel: false,
            lights: Vec::new(),
            mouse: MouseInput::default(),
        }
    }
}

impl ViewState {
    pub fn world_to_clip(&self) -> Mat4 {
        self.camera_to_clip * self.world_to_camera
    }

    /// Inverse-transpose of the world-to-camera rotation, for normals.
    pub fn world_to_camera_normal(&self) -> Mat3 {
        Mat3::from_mat4(self.world_to_camera).inverse().transpose()
    }

    /// Clip space to pixels with a top-left origin. Depth is flipped so
    /// nearer points map to larger values.
    pub fn clip_to_screen(&self) -> Mat4 {
        let w = self.width as f32;
        let h = self.height as f32;
        Mat4::from_cols(
            Vec4::new(w * 0.5, 0.0, 0.0, 0.0),
            Vec4::new(0.0, -h * 0.5, 0.0, 0.0),
            Vec4::new(0.0, 0.0, -0.5, 0.0),
            Vec4::new(w * 0.5, h * 0.5, 0.5, 1.0),
        )
    }

    pub fn world_to_screen(&self) -> Mat4 {
        self.clip_to_screen() * self.world_to_clip()
    }
}

/// Everything a built-in may read (or capture into) while being set up.
pub struct SetupContext<'a> {
    pub view: &'a ViewState,
    pub mouse: MouseSnapshot,
    /// Seconds since the program being drawn was last linked.
    pub time: f32,
    pub time_delta: f32,
    pub date: [f32; 4],
    pub capabilities: HostCapabilities,
    pub frame_cache: &'a FrameCache,
    pub recycle_bin: &'a mut RecycleBin,
}

impl SetupContext<'_> {
    /// The lights published to shaders, at most [`MAX_LIGHTS`].
    pub fn lights(&self) -> Vec<Light> {
        if self.capabilities.scene_lights {
            self.view.lights.iter().take(MAX_LIGHTS).copied().collect()
        } else {
            vec![Light::fallback()]
        }
    }
}

pub type SetupFn = fn(&dyn GraphicsApi, u32, &mut SetupContext<'_>) -> Result<(), EngineError>;

/// A reserved uniform.
#[derive(Clone, Copy)]
pub struct BuiltIn {
    /// Registered name, possibly with an `[N]` array suffix.
    pub name: &'static str,
    pub type_tag: &'static str,
    pub description: &'static str,
    pub setup: SetupFn,
}

impl BuiltIn {
    /// The name as it appears in GLSL, without any array suffix.
    pub fn uniform_name(&self) -> &'static str {
        split_array_suffix(self.name).0
    }

    pub fn array_length(&self) -> usize {
        split_array_suffix(self.name).1
    }
}

impl std::fmt::Debug for BuiltIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltIn")
            .field("name", &self.name)
            .field("type_tag", &self.type_tag)
            .finish_non_exhaustive()
    }
}

/// The table of reserved uniforms, sorted by name.
#[derive(Debug, Clone)]
pub struct BuiltInRegistry {
    entries: Vec<BuiltIn>,
}

impl Default for BuiltInRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl BuiltInRegistry {
    /// The standard catalogue.
    pub fn standard() -> Self {
        let mut registry = Self {
            entries: standard_entries(),
        };
        registry.entries.sort_by(|a, b| a.name.cmp(b.name));
        registry
    }

    /// Adds an entry, replacing any with the same uniform name.
    pub fn register(&mut self, entry: BuiltIn) {
        self.entries
            .retain(|e| e.uniform_name() != entry.uniform_name());
        self.entries.push(entry);
        self.entries.sort_by(|a, b| a.name.cmp(b.name));
    }

    pub fn entries(&self) -> &[BuiltIn] {
        &self.entries
    }

    /// Looks up an entry by registered name or bare uniform name.
    pub fn get(&self, name: &str) -> Option<&BuiltIn> {
        self.entries
            .iter()
            .find(|e| e.name == name || e.uniform_name() == name)
    }

    /// Whether `name` is a reserved uniform or mesh attribute name.
    pub fn is_reserved(&self, name: &str) -> bool {
        self.get(name).is_some() || MESH_ATTRIBUTES.iter().any(|a| a.name == name)
    }

    /// Applies one entry to `program`.
    ///
    /// Returns `Ok(false)` when the entry is unknown or the program does not
    /// declare the uniform.
    pub fn setup(
        &self,
        name: &str,
        api: &dyn GraphicsApi,
        program: u32,
        ctx: &mut SetupContext<'_>,
    ) -> Result<bool, EngineError> {
        let Some(entry) = self.get(name) else {
            return Ok(false);
        };
        apply(entry, api, program, ctx)
    }

    /// Applies every entry, collecting failures instead of stopping.
    pub fn setup_all(
        &self,
        api: &dyn GraphicsApi,
        program: u32,
        ctx: &mut SetupContext<'_>,
    ) -> Vec<(&'static str, EngineError)> {
        self.entries
            .iter()
            .filter_map(|entry| {
                apply(entry, api, program, ctx)
                    .err()
                    .map(|e| (entry.name, e))
            })
            .collect()
    }
}

fn apply(
    entry: &BuiltIn,
    api: &dyn GraphicsApi,
    program: u32,
    ctx: &mut SetupContext<'_>,
) -> Result<bool, EngineError> {
    match api.uniform_location(program, entry.uniform_name()) {
        Some(location) => (entry.setup)(api, location, ctx).map(|()| true),
        None => Ok(false),
    }
}

/// Flattens a matrix to row-major order.
pub fn row_major4(m: Mat4) -> [f32; 16] {
    m.transpose().to_cols_array()
}

pub fn row_major3(m: Mat3) -> [f32; 9] {
    m.transpose().to_cols_array()
}

fn bind_sampler(api: &dyn GraphicsApi, location: u32, unit: u32, texture: u32) {
    if texture == NO_HANDLE {
        return;
    }
    api.bind_texture(unit, texture);
    api.set_uniform(location, UniformData::Int(&[unit as i32]));
}

fn setup_color_buffer(
    api: &dyn GraphicsApi,
    location: u32,
    ctx: &mut SetupContext<'_>,
) -> Result<(), EngineError> {
    let texture = api
        .capture_framebuffer(BufferKind::Color, ctx.view.width, ctx.view.height)
        .map_err(EngineError::Graphics)?;
    ctx.recycle_bin.add_texture(texture);
    bind_sampler(api, location, COLOR_BUFFER_UNIT, texture);
    Ok(())
}

fn setup_depth_buffer(
    api: &dyn GraphicsApi,
    location: u32,
    ctx: &mut SetupContext<'_>,
) -> Result<(), EngineError> {
    if !ctx.capabilities.depth_capture {
        return Err(EngineError::Unsupported(
            "_depthBuffer requires depth capture support from the host".to_string(),
        ));
    }
    let texture = api
        .capture_framebuffer(BufferKind::Depth, ctx.view.width, ctx.view.height)
        .map_err(EngineError::Graphics)?;
    ctx.recycle_bin.add_texture(texture);
    bind_sampler(api, location, DEPTH_BUFFER_UNIT, texture);
    Ok(())
}

fn setup_initial_color(
    api: &dyn GraphicsApi,
    location: u32,
    ctx: &mut SetupContext<'_>,
) -> Result<(), EngineError> {
    let texture = ctx.frame_cache.initial(BufferKind::Color);
    bind_sampler(api, location, INITIAL_COLOR_BUFFER_UNIT, texture);
    Ok(())
}

fn setup_initial_depth(
    api: &dyn GraphicsApi,
    location: u32,
    ctx: &mut SetupContext<'_>,
) -> Result<(), EngineError> {
    let texture = ctx.frame_cache.initial(BufferKind::Depth);
    bind_sampler(api, location, INITIAL_DEPTH_BUFFER_UNIT, texture);
    Ok(())
}

fn setup_previous_color(
    api: &dyn GraphicsApi,
    location: u32,
    ctx: &mut SetupContext<'_>,
) -> Result<(), EngineError> {
    let texture = ctx.frame_cache.previous_color();
    bind_sampler(api, location, PREVIOUS_COLOR_BUFFER_UNIT, texture);
    Ok(())
}

fn upload_mat4(api: &dyn GraphicsApi, location: u32, m: Mat4) {
    api.set_uniform(location, UniformData::Mat4(&row_major4(m)));
}

fn upload_float(api: &dyn GraphicsApi, location: u32, value: f32) {
    api.set_uniform(location, UniformData::Float(&[value]));
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn light_array(lights: &[Light], pick: impl Fn(&Light) -> Vec3) -> [f32; 3 * MAX_LIGHTS] {
    let mut out = [0.0; 3 * MAX_LIGHTS];
    for (i, light) in lights.iter().take(MAX_LIGHTS).enumerate() {
        out[i * 3..i * 3 + 3].copy_from_slice(&pick(light).to_array());
    }
    out
}

fn standard_entries() -> Vec<BuiltIn> {
    vec![
        BuiltIn {
            name: "_colorBuffer",
            type_tag: "sampler2D",
            description: "color buffer as it is right before this component draws",
            setup: setup_color_buffer,
        },
        BuiltIn {
            name: "_depthBuffer",
            type_tag: "sampler2D",
            description: "depth buffer as it is right before this component draws",
            setup: setup_depth_buffer,
        },
        BuiltIn {
            name: INITIAL_COLOR_BUFFER,
            type_tag: "sampler2D",
            description: "color buffer before any shader component drew this frame",
            setup: setup_initial_color,
        },
        BuiltIn {
            name: INITIAL_DEPTH_BUFFER,
            type_tag: "sampler2D",
            description: "depth buffer before any shader component drew this frame",
            setup: setup_initial_depth,
        },
        BuiltIn {
            name: PREVIOUS_COLOR_BUFFER,
            type_tag: "sampler2D",
            description: "color buffer after the previous shader component drew",
            setup: setup_previous_color,
        },
        BuiltIn {
            name: "_worldToClip",
            type_tag: "mat4",
            description: "transformation from world to clipping coordinates",
            setup: |api, loc, ctx| {
                upload_mat4(api, loc, ctx.view.world_to_clip());
                Ok(())
            },
        },
        BuiltIn {
            name: "_worldToCamera",
            type_tag: "mat4",
            description: "transformation from world to camera coordinates",
            setup: |api, loc, ctx| {
                upload_mat4(api, loc, ctx.view.world_to_camera);
                Ok(())
            },
        },
        BuiltIn {
            name: "_cameraToClip",
            type_tag: "mat4",
            description: "transformation from camera to clipping coordinates",
            setup: |api, loc, ctx| {
                upload_mat4(api, loc, ctx.view.camera_to_clip);
                Ok(())
            },
        },
        BuiltIn {
            name: "_worldToCameraNormal",
            type_tag: "mat3",
            description: "transformation for normals from world to camera coordinates",
            setup: |api, loc, ctx| {
                let m = row_major3(ctx.view.world_to_camera_normal());
                api.set_uniform(loc, UniformData::Mat3(&m));
                Ok(())
            },
        },
        BuiltIn {
            name: "_worldToScreen",
            type_tag: "mat4",
            description: "transformation from world to screen pixels, origin at top left",
            setup: |api, loc, ctx| {
                upload_mat4(api, loc, ctx.view.world_to_screen());
                Ok(())
            },
        },
        BuiltIn {
            name: "_viewportSize",
            type_tag: "vec2",
            description: "viewport width and height in pixels",
            setup: |api, loc, ctx| {
                let size = [ctx.view.width as f32, ctx.view.height as f32];
                api.set_uniform(loc, UniformData::Vec2(&size));
                Ok(())
            },
        },
        BuiltIn {
            name: "_time",
            type_tag: "float",
            description: "seconds since the shader was last compiled",
            setup: |api, loc, ctx| {
                upload_float(api, loc, ctx.time);
                Ok(())
            },
        },
        BuiltIn {
            name: "_timeDelta",
            type_tag: "float",
            description: "seconds since this viewport last drew",
            setup: |api, loc, ctx| {
                upload_float(api, loc, ctx.time_delta);
                Ok(())
            },
        },
        BuiltIn {
            name: "_date",
            type_tag: "vec4",
            description: "local date as (year, month, day, seconds since midnight)",
            setup: |api, loc, ctx| {
                api.set_uniform(loc, UniformData::Vec4(&ctx.date));
                Ok(())
            },
        },
        BuiltIn {
            name: "_cameraLocation",
            type_tag: "vec3",
            description: "camera position in world coordinates",
            setup: |api, loc, ctx| {
                api.set_uniform(loc, UniformData::Vec3(&ctx.view.camera_location.to_array()));
                Ok(())
            },
        },
        BuiltIn {
            name: "_cameraNear",
            type_tag: "float",
            description: "distance to the near clipping plane",
            setup: |api, loc, ctx| {
                upload_float(api, loc, ctx.view.near);
                Ok(())
            },
        },
        BuiltIn {
            name: "_cameraFar",
            type_tag: "float",
            description: "distance to the far clipping plane",
            setup: |api, loc, ctx| {
                upload_float(api, loc, ctx.view.far);
                Ok(())
            },
        },
        BuiltIn {
            name: "_parallelView",
            type_tag: "int",
            description: "1 for a parallel projection, 0 for perspective",
            setup: |api, loc, ctx| {
                api.set_uniform(loc, UniformData::Int(&[i32::from(ctx.view.parallel)]));
                Ok(())
            },
        },
        BuiltIn {
            name: "_mousePosition",
            type_tag: "vec2",
            description: "mouse position in pixels, origin at bottom left",
            setup: |api, loc, ctx| {
                api.set_uniform(loc, UniformData::Vec2(&ctx.mouse.position.to_array()));
                Ok(())
            },
        },
        BuiltIn {
            name: "_mouseDownPosition",
            type_tag: "vec2",
            description: "where the current button press began, (-1, -1) when no button is down",
            setup: |api, loc, ctx| {
                let anchor = ctx.mouse.down_anchor.unwrap_or(Vec2::splat(-1.0));
                api.set_uniform(loc, UniformData::Vec2(&anchor.to_array()));
                Ok(())
            },
        },
        BuiltIn {
            name: "_mouseState",
            type_tag: "vec3",
            description: "left, middle and right button state as 0 or 1",
            setup: |api, loc, ctx| {
                let [l, m, r] = ctx.mouse.buttons;
                api.set_uniform(loc, UniformData::Vec3(&[flag(l), flag(m), flag(r)]));
                Ok(())
            },
        },
        BuiltIn {
            name: "_lightCount",
            type_tag: "int",
            description: "number of lights, at most 4",
            setup: |api, loc, ctx| {
                let count = ctx.lights().len() as i32;
                api.set_uniform(loc, UniformData::Int(&[count]));
                Ok(())
            },
        },
        BuiltIn {
            name: "_lightPosition[4]",
            type_tag: "vec3",
            description: "light positions",
            setup: |api, loc, ctx| {
                let values = light_array(&ctx.lights(), |l| l.position);
                api.set_uniform(loc, UniformData::Vec3(&values));
                Ok(())
            },
        },
        BuiltIn {
            name: "_lightDirection[4]",
            type_tag: "vec3",
            description: "light directions",
            setup: |api, loc, ctx| {
                let values = light_array(&ctx.lights(), |l| l.direction);
                api.set_uniform(loc, UniformData::Vec3(&values));
                Ok(())
            },
        },
        BuiltIn {
            name: "_lightInCameraSpace[4]",
            type_tag: "int",
            description: "1 where the light is attached to the camera",
            setup: |api, loc, ctx| {
                let mut values = [0_i32; MAX_LIGHTS];
                for (slot, light) in values.iter_mut().zip(ctx.lights()) {
                    *slot = i32::from(light.camera_space);
                }
                api.set_uniform(loc, UniformData::Int(&values));
                Ok(())
            },
        },
    ]
}

#![deny(unsafe_code)]
//! Core of the shaderlab shader pipeline.
//!
//! Provides `ShaderStage`/`ProgramModel` compilation with accumulated
//! diagnostics, the `RecycleBin` for deferred GPU object deletion, the
//! `BuiltInRegistry` of reserved uniforms, `UniformAttributeBinder` for
//! per-draw inputs, `FrameCache` for captured framebuffers and the
//! `DrawOrderResolver`. `ShaderEngine` ties them together behind the
//! `GraphicsApi` seam.

pub mod binder;
pub mod builtins;
pub mod component;
pub mod document;
pub mod draw_order;
pub mod engine;
pub mod error;
pub mod frame_cache;
pub mod gl;
pub mod image_cache;
pub mod mesh;
pub mod pack;
pub mod program;
pub mod recycle;
pub mod scan;
pub mod stage;

pub use binder::{AttributeValues, SamplerSource, UniformAttributeBinder, UniformValues};
pub use builtins::{BuiltInRegistry, HostCapabilities, MouseInput, ViewState};
pub use component::{ComponentId, InputValue, ShaderComponent};
pub use document::{ComponentDocument, SceneDocument};
pub use draw_order::{DrawNode, DrawOrderResolver};
pub use engine::{FrameReport, ShaderEngine};
pub use error::{EngineError, ShaderError};
pub use frame_cache::{BufferKind, FrameCache, OutputKey};
pub use gl::GraphicsApi;
pub use mesh::Mesh;
pub use pack::ShaderPack;
pub use program::{DrawMode, ProgramModel, ProgramSettings};
pub use recycle::RecycleBin;
pub use stage::{ShaderStage, StageKind};

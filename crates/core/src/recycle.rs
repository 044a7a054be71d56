//! Deferred deletion of GPU objects.
//!
//! Objects replaced mid-frame may still be referenced by draws issued
//! earlier in the same frame, so nothing is deleted directly. Handles are
//! queued here and destroyed in one pass after every component has drawn.

use std::collections::BTreeSet;

use crate::gl::{GraphicsApi, NO_HANDLE};

/// Duplicate-safe queues of handles awaiting deletion, one per object kind.
#[derive(Debug, Default)]
pub struct RecycleBin {
    shaders: BTreeSet<u32>,
    programs: BTreeSet<u32>,
    buffers: BTreeSet<u32>,
    textures: BTreeSet<u32>,
    vertex_arrays: BTreeSet<u32>,
}

impl RecycleBin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_shader(&mut self, handle: u32) {
        if handle != NO_HANDLE {
            self.shaders.insert(handle);
        }
    }

    pub fn add_program(&mut self, handle: u32) {
        if handle != NO_HANDLE {
            self.programs.insert(handle);
        }
    }

    pub fn add_buffer(&mut self, handle: u32) {
        if handle != NO_HANDLE {
            self.buffers.insert(handle);
        }
    }

    pub fn add_texture(&mut self, handle: u32) {
        if handle != NO_HANDLE {
            self.textures.insert(handle);
        }
    }

    pub fn add_vertex_array(&mut self, handle: u32) {
        if handle != NO_HANDLE {
            self.vertex_arrays.insert(handle);
        }
    }

    pub fn contains_shader(&self, handle: u32) -> bool {
        self.shaders.contains(&handle)
    }

    pub fn contains_program(&self, handle: u32) -> bool {
        self.programs.contains(&handle)
    }

    pub fn contains_buffer(&self, handle: u32) -> bool {
        self.buffers.contains(&handle)
    }

    pub fn contains_texture(&self, handle: u32) -> bool {
        self.textures.contains(&handle)
    }

    pub fn contains_vertex_array(&self, handle: u32) -> bool {
        self.vertex_arrays.contains(&handle)
    }

    /// Total number of handles waiting across every queue.
    pub fn pending(&self) -> usize {
        self.shaders.len()
            + self.programs.len()
            + self.buffers.len()
            + self.textures.len()
            + self.vertex_arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Destroys every queued handle exactly once and empties all queues.
    ///
    /// Returns the number of objects destroyed.
    pub fn recycle(&mut self, api: &dyn GraphicsApi) -> usize {
        let count = self.pending();
        for shader in std::mem::take(&mut self.shaders) {
            api.delete_shader(shader);
        }
        for program in std::mem::take(&mut self.programs) {
            api.delete_program(program);
        }
        for buffer in std::mem::take(&mut self.buffers) {
            api.delete_buffer(buffer);
        }
        for texture in std::mem::take(&mut self.textures) {
            api.delete_texture(texture);
        }
        for vertex_array in std::mem::take(&mut self.vertex_arrays) {
            api.delete_vertex_array(vertex_array);
        }
        if count > 0 {
            log::debug!("recycled {count} GPU object(s)");
        }
        count
    }
}

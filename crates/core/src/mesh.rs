//! Indexed polygon meshes and their GPU-side index expansions.

use glam::{Vec2, Vec3};

/// A triangle or quad face, as vertex indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Triangle([u32; 3]),
    Quad([u32; 4]),
}

/// A polygon mesh with optional per-vertex streams.
///
/// A stream is only uploaded when its length equals the vertex count;
/// otherwise the matching attribute keeps its constant default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texture_coordinates: Vec<Vec2>,
    /// 8-bit RGBA colors, normalized to `[0, 1]` on upload.
    pub vertex_colors: Vec<[u8; 4]>,
    pub faces: Vec<Face>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Triangle list indices. Quads `ABCD` become `ABC` and `CDA`.
    pub fn triangle_indices(&self) -> Vec<u32> {
        let mut indices = Vec::with_capacity(self.faces.len() * 6);
        for face in &self.faces {
            match *face {
                Face::Triangle([a, b, c]) => indices.extend_from_slice(&[a, b, c]),
                Face::Quad([a, b, c, d]) => indices.extend_from_slice(&[a, b, c, c, d, a]),
            }
        }
        indices
    }

    /// Line list indices, one segment per face edge.
    pub fn line_indices(&self) -> Vec<u32> {
        let mut indices = Vec::with_capacity(self.faces.len() * 8);
        for face in &self.faces {
            match *face {
                Face::Triangle([a, b, c]) => indices.extend_from_slice(&[a, b, b, c, c, a]),
                Face::Quad([a, b, c, d]) => {
                    indices.extend_from_slice(&[a, b, b, c, c, d, d, a])
                }
            }
        }
        indices
    }

    /// Vertex colors as normalized RGBA floats.
    pub fn normalized_colors(&self) -> Vec<f32> {
        self.vertex_colors
            .iter()
            .flat_map(|c| c.map(|channel| f32::from(channel) / 255.0))
            .collect()
    }
}

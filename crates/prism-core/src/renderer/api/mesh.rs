// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CPU-side description of meshes.

use crate::math::{Aabb, Vec3};
use bytemuck::{Pod, Zeroable};
use std::ops::Range;

/// The interleaved vertex layout shared by every material.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// First texture coordinate set.
    pub uv: [f32; 2],
    /// Vertex colour.
    pub color: [f32; 4],
}

impl Vertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

    /// A white vertex with the given position, normal and uv.
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            color: [1.0; 4],
        }
    }
}

/// The extra per-vertex stream used by skinned meshes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SkinVertex {
    /// Indices into the joint palette.
    pub joints: [u32; 4],
    /// Blend weights, summing to one.
    pub weights: [f32; 4],
}

/// How indices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    /// Independent triangles.
    #[default]
    Triangles,
    /// Independent lines.
    Lines,
    /// A connected line strip.
    LineStrip,
    /// A connected triangle strip.
    TriangleStrip,
}

/// A contiguous index range drawn with one material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubMesh {
    /// The index range.
    pub indices: Range<u32>,
}

/// A mesh as declared by its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Debug label.
    pub label: String,
    /// Interleaved vertices.
    pub vertices: Vec<Vertex>,
    /// Joint data, present only for skinned meshes.
    pub skin: Option<Vec<SkinVertex>>,
    /// Triangle or line indices.
    pub indices: Vec<u32>,
    /// Index ranges addressable by `draw_mesh`'s `submesh` argument.
    pub submeshes: Vec<SubMesh>,
    /// Primitive assembly.
    pub topology: Topology,
}

impl Mesh {
    /// A mesh with a single submesh covering all indices.
    pub fn new(label: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let count = indices.len() as u32;
        Self {
            label: label.into(),
            vertices,
            skin: None,
            indices,
            submeshes: vec![SubMesh { indices: 0..count }],
            topology: Topology::Triangles,
        }
    }

    /// The two-triangle plane covering clip space, used by screen passes.
    pub fn fullscreen_quad() -> Self {
        let vertices = vec![
            Vertex::new([-1.0, -1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([1.0, -1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
            Vertex::new([-1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
        ];
        Self::new("fullscreen_quad", vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// A unit cube centred at the origin, used for light volumes.
    pub fn unit_cube() -> Self {
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            ([0.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let n = Vec3::from(normal);
            let (u, v) = (Vec3::from(u), Vec3::from(v));
            let base = vertices.len() as u32;
            for (su, sv, uv) in [
                (-1.0, -1.0, [0.0, 1.0]),
                (1.0, -1.0, [1.0, 1.0]),
                (1.0, 1.0, [1.0, 0.0]),
                (-1.0, 1.0, [0.0, 0.0]),
            ] {
                let p = (n + u * su + v * sv) * 0.5;
                vertices.push(Vertex::new(p.to_array(), normal, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        Self::new("unit_cube", vertices, indices)
    }

    /// The object-space bounds of the vertices.
    pub fn bounds(&self) -> Aabb {
        let points: Vec<Vec3> = self
            .vertices
            .iter()
            .map(|v| Vec3::from(v.position))
            .collect();
        Aabb::from_points(&points).unwrap_or(Aabb::INVALID)
    }

    /// Vertex bytes as uploaded to the device.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index bytes as uploaded to the device.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Checks that every index and submesh range is in bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.vertices.is_empty() {
            return Err(format!("mesh '{}' has no vertices", self.label));
        }
        let vertex_count = self.vertices.len() as u32;
        if let Some(bad) = self.indices.iter().find(|i| **i >= vertex_count) {
            return Err(format!(
                "mesh '{}' index {bad} is out of range ({vertex_count} vertices)",
                self.label
            ));
        }
        if let Some(skin) = &self.skin {
            if skin.len() != self.vertices.len() {
                return Err(format!(
                    "mesh '{}' skin stream has {} entries for {} vertices",
                    self.label,
                    skin.len(),
                    self.vertices.len()
                ));
            }
        }
        let index_count = self.indices.len() as u32;
        for (i, sub) in self.submeshes.iter().enumerate() {
            if sub.indices.start > sub.indices.end || sub.indices.end > index_count {
                return Err(format!("mesh '{}' submesh {i} is out of range", self.label));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_meshes_are_valid() {
        assert!(Mesh::fullscreen_quad().validate().is_ok());
        let cube = Mesh::unit_cube();
        assert!(cube.validate().is_ok());
        assert_eq!(cube.indices.len(), 36);
        let bounds = cube.bounds();
        assert_eq!(bounds.min, Vec3::splat(-0.5));
        assert_eq!(bounds.max, Vec3::splat(0.5));
    }

    #[test]
    fn out_of_range_submesh_is_invalid() {
        let mut quad = Mesh::fullscreen_quad();
        quad.submeshes.push(SubMesh { indices: 4..12 });
        assert!(quad.validate().is_err());
    }

    #[test]
    fn vertex_stride_matches_layout() {
        assert_eq!(Vertex::STRIDE, 48);
        assert_eq!(Mesh::fullscreen_quad().vertex_bytes().len(), 4 * 48);
    }
}

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

//! Uniform values and their std140 packing.

use crate::math::{Mat4, Vec2, Vec3, Vec4};

/// Alignment of dynamic uniform offsets. Matches the strictest value
/// reported by desktop drivers.
pub const UNIFORM_OFFSET_ALIGNMENT: u64 = 256;

/// Rounds `size` up to the next multiple of `alignment`.
pub const fn align_to(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment) * alignment
}

/// A value bound to a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// A signed integer.
    Int(i32),
    /// A float.
    Float(f32),
    /// A 2-component vector.
    Vec2(Vec2),
    /// A 3-component vector.
    Vec3(Vec3),
    /// A 4-component vector.
    Vec4(Vec4),
    /// A column-major 4x4 matrix.
    Mat4(Mat4),
}

impl UniformValue {
    /// std140 base alignment of the value.
    pub fn alignment(&self) -> usize {
        match self {
            UniformValue::Int(_) | UniformValue::Float(_) => 4,
            UniformValue::Vec2(_) => 8,
            UniformValue::Vec3(_) | UniformValue::Vec4(_) | UniformValue::Mat4(_) => 16,
        }
    }

    /// Appends the value to `out`, padding for alignment first.
    pub fn write_std140(&self, out: &mut Vec<u8>) {
        let aligned = out.len().div_ceil(self.alignment()) * self.alignment();
        out.resize(aligned, 0);
        match self {
            UniformValue::Int(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Float(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec3(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec4(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Mat4(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
        }
    }

    /// Returns `true` if both values have the same variant.
    pub fn same_type(&self, other: &UniformValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

/// Packs values in order into a std140 block, padded to 16 bytes.
pub fn pack_std140<'a>(values: impl IntoIterator<Item = &'a UniformValue>) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        value.write_std140(&mut out);
    }
    let padded = out.len().div_ceil(16) * 16;
    out.resize(padded, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std140_aligns_vectors_to_sixteen_bytes() {
        let block = pack_std140(&[
            UniformValue::Float(1.0),
            UniformValue::Vec3(Vec3::ONE),
            UniformValue::Vec2(Vec2::ONE),
        ]);
        // float at 0, vec3 at 16, vec2 at 28 rounded to 32, end at 40 padded to 48.
        assert_eq!(block.len(), 48);
        assert_eq!(&block[16..20], bytemuck::bytes_of(&1.0f32));
    }

    #[test]
    fn align_to_rounds_up() {
        assert_eq!(align_to(1, UNIFORM_OFFSET_ALIGNMENT), 256);
        assert_eq!(align_to(256, UNIFORM_OFFSET_ALIGNMENT), 256);
        assert_eq!(align_to(0, UNIFORM_OFFSET_ALIGNMENT), 0);
    }
}

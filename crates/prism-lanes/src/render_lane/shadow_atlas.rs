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

//! The shadow atlas: tile placement on a shared depth surface.
//!
//! The atlas only decides *where* each light renders its shadows. It is
//! divided into units of the smallest tile (`tile_resolution >> (max_lods -
//! 1)`); a tile of LOD `n` covers a square of `2^(max_lods - 1 - n)` units,
//! aligned to its own size. Tiles are keyed by (light id, LOD) and a
//! repeated key returns the same tiles.
//!
//! When a request does not fit, the least recently requested keys are
//! evicted one at a time. Keys requested during the current frame are never
//! evicted since their tiles may already hold this frame's depth. Keys not
//! requested for `max_tile_age` frames are freed at the start of a frame.

use prism_core::config::ShadowConfig;
use prism_core::math::{Mat4, Rect, Vec4};
use std::collections::HashMap;

/// One square region of the atlas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowTile {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width and height.
    pub size: u32,
}

impl ShadowTile {
    /// The tile as a viewport rectangle.
    pub fn rect(&self) -> Rect {
        Rect::new(self.x as i32, self.y as i32, self.size, self.size)
    }

    /// The tile in normalized atlas coordinates: `(x, y, w, h)`.
    pub fn uv(&self, atlas_size: u32) -> Vec4 {
        let page = atlas_size.max(1) as f32;
        Vec4::new(
            self.x as f32 / page,
            self.y as f32 / page,
            self.size as f32 / page,
            self.size as f32 / page,
        )
    }
}

/// The key of a tile set.
pub type TileKey = (u64, u32);

#[derive(Debug, Clone)]
struct TileSet {
    tiles: Vec<ShadowTile>,
    last_request: u64,
    last_frame: u64,
}

/// What the shadow pass rendered for one light, read by the lighting pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowProjection {
    /// World-to-shadow-clip matrix per tile.
    pub matrices: Vec<Mat4>,
    /// Normalized tile rectangles, matching `matrices`.
    pub tiles: Vec<Vec4>,
    /// View depth of each cascade split (directional lights only).
    pub plane_distance: Vec4,
}

/// Tile allocator over the shared shadow surface.
#[derive(Debug, Clone)]
pub struct ShadowAtlas {
    config: ShadowConfig,
    unit: u32,
    units_per_side: u32,
    occupied: Vec<bool>,
    sets: HashMap<TileKey, TileSet>,
    projections: HashMap<u64, ShadowProjection>,
    frame: u64,
    clock: u64,
}

impl ShadowAtlas {
    /// An empty atlas.
    ///
    /// `max_lods` is clamped to the LODs the tile resolution can hold.
    pub fn new(mut config: ShadowConfig) -> Self {
        config.max_lods = config.lod_count();
        let unit = (config.tile_resolution >> (config.max_lods - 1)).max(1);
        let units_per_side = (config.atlas_size / unit).max(1);
        Self {
            config,
            unit,
            units_per_side,
            occupied: vec![false; (units_per_side * units_per_side) as usize],
            sets: HashMap::new(),
            projections: HashMap::new(),
            frame: 0,
            clock: 0,
        }
    }

    /// Width and height of the atlas surface in pixels.
    pub fn size(&self) -> u32 {
        self.config.atlas_size
    }

    /// The settings the atlas was built with.
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Pixel size of a LOD `lod` tile.
    pub fn tile_resolution(&self, lod: u32) -> u32 {
        (self.config.tile_resolution >> self.clamp_lod(lod)).max(1)
    }

    /// The current frame number.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Starts a frame: frees keys that aged out and forgets last frame's
    /// projections.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.projections.clear();
        let max_age = self.config.max_tile_age;
        let frame = self.frame;
        let stale: Vec<TileKey> = self
            .sets
            .iter()
            .filter(|(_, set)| frame.saturating_sub(set.last_frame) > max_age)
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            log::trace!("Shadow tiles of light {} (lod {}) aged out", key.0, key.1);
            self.free(key);
        }
    }

    /// Returns `count` tiles of LOD `lod` for `light`, placing them if the
    /// key is new.
    ///
    /// Returns `None` when the tiles cannot fit even after evicting every
    /// key not requested this frame.
    pub fn request(&mut self, light: u64, lod: u32, count: u32) -> Option<Vec<ShadowTile>> {
        let key = (light, self.clamp_lod(lod));
        self.clock += 1;
        let (clock, frame) = (self.clock, self.frame);

        if let Some(set) = self.sets.get_mut(&key) {
            if set.tiles.len() == count as usize {
                set.last_request = clock;
                set.last_frame = frame;
                return Some(set.tiles.clone());
            }
        }
        // Same key, different shape: start over.
        self.free(key);

        loop {
            if let Some(tiles) = self.place(key.1, count) {
                self.sets.insert(
                    key,
                    TileSet {
                        tiles: tiles.clone(),
                        last_request: clock,
                        last_frame: frame,
                    },
                );
                return Some(tiles);
            }
            let victim = self
                .sets
                .iter()
                .filter(|(_, set)| set.last_frame != frame)
                .min_by_key(|(_, set)| set.last_request)
                .map(|(key, _)| *key)?;
            log::debug!(
                "Shadow atlas full, evicting light {} (lod {})",
                victim.0,
                victim.1
            );
            self.free(victim);
        }
    }

    /// The tiles currently placed for a key.
    pub fn tiles(&self, light: u64, lod: u32) -> Option<&[ShadowTile]> {
        self.sets
            .get(&(light, self.clamp_lod(lod)))
            .map(|set| set.tiles.as_slice())
    }

    /// Number of placed keys.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns `true` if no tile is placed.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Records what the shadow pass rendered for `light` this frame.
    pub fn publish(&mut self, light: u64, projection: ShadowProjection) {
        self.projections.insert(light, projection);
    }

    /// What the shadow pass rendered for `light` this frame.
    pub fn projection(&self, light: u64) -> Option<&ShadowProjection> {
        self.projections.get(&light)
    }

    /// Frees every tile.
    pub fn clear(&mut self) {
        self.sets.clear();
        self.projections.clear();
        self.occupied.fill(false);
    }

    fn clamp_lod(&self, lod: u32) -> u32 {
        lod.min(self.config.max_lods - 1)
    }

    fn span(&self, lod: u32) -> u32 {
        1 << (self.config.max_lods - 1 - self.clamp_lod(lod))
    }

    fn free(&mut self, key: TileKey) {
        let Some(set) = self.sets.remove(&key) else {
            return;
        };
        for tile in set.tiles {
            self.mark(tile, false);
        }
    }

    fn mark(&mut self, tile: ShadowTile, value: bool) {
        let (ux, uy, span) = (tile.x / self.unit, tile.y / self.unit, tile.size / self.unit);
        for y in uy..uy + span {
            for x in ux..ux + span {
                let index = (y * self.units_per_side + x) as usize;
                if let Some(cell) = self.occupied.get_mut(index) {
                    *cell = value;
                }
            }
        }
    }

    fn is_free(&self, ux: u32, uy: u32, span: u32) -> bool {
        (uy..uy + span).all(|y| {
            (ux..ux + span).all(|x| !self.occupied[(y * self.units_per_side + x) as usize])
        })
    }

    /// Places `count` tiles, all or nothing.
    fn place(&mut self, lod: u32, count: u32) -> Option<Vec<ShadowTile>> {
        let span = self.span(lod);
        if span > self.units_per_side {
            return None;
        }
        let mut placed = Vec::with_capacity(count as usize);
        'tiles: for _ in 0..count {
            for uy in (0..=self.units_per_side - span).step_by(span as usize) {
                for ux in (0..=self.units_per_side - span).step_by(span as usize) {
                    if self.is_free(ux, uy, span) {
                        let tile = ShadowTile {
                            x: ux * self.unit,
                            y: uy * self.unit,
                            size: span * self.unit,
                        };
                        self.mark(tile, true);
                        placed.push(tile);
                        continue 'tiles;
                    }
                }
            }
            for tile in placed {
                self.mark(tile, false);
            }
            return None;
        }
        Some(placed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Four LOD 0 cells, each splitting into four LOD 1 cells.
    fn small() -> ShadowConfig {
        ShadowConfig {
            atlas_size: 2048,
            tile_resolution: 1024,
            max_lods: 2,
            max_tile_age: 8,
        }
    }

    #[test]
    fn same_key_returns_same_tiles() {
        let mut atlas = ShadowAtlas::new(small());
        atlas.begin_frame();
        let first = atlas.request(7, 0, 1).unwrap();
        atlas.begin_frame();
        let again = atlas.request(7, 0, 1).unwrap();

        assert_eq!(first, again);
        assert_eq!(atlas.len(), 1);
    }

    #[test]
    fn tile_resolution_halves_per_lod() {
        let atlas = ShadowAtlas::new(ShadowConfig::default());
        assert_eq!(atlas.tile_resolution(0), 1024);
        assert_eq!(atlas.tile_resolution(1), 512);
        assert_eq!(atlas.tile_resolution(3), 128);
        // Clamped to the last LOD.
        assert_eq!(atlas.tile_resolution(9), 128);
    }

    #[test]
    fn lod_one_tiles_pack_into_a_lod_zero_cell() {
        let mut atlas = ShadowAtlas::new(small());
        atlas.begin_frame();
        let point = atlas.request(1, 1, 6).unwrap();
        assert_eq!(point.len(), 6);
        assert!(point.iter().all(|t| t.size == 512));

        // 6 of 16 quarter cells used: two full LOD 0 cells remain.
        let sun = atlas.request(2, 0, 2).unwrap();
        assert!(sun.iter().all(|t| t.size == 1024));
        for a in &sun {
            for b in &point {
                let overlap_x = a.x < b.x + b.size && b.x < a.x + a.size;
                let overlap_y = a.y < b.y + b.size && b.y < a.y + a.size;
                assert!(!(overlap_x && overlap_y), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn full_atlas_evicts_least_recently_requested() {
        let mut atlas = ShadowAtlas::new(small());
        for light in 0..4 {
            atlas.begin_frame();
            atlas.request(light, 0, 1).unwrap();
        }
        // Touch light 0 so light 1 becomes the oldest.
        atlas.begin_frame();
        let kept = atlas.request(0, 0, 1).unwrap();

        atlas.begin_frame();
        let fresh = atlas.request(9, 0, 1).unwrap();

        assert!(atlas.tiles(1, 0).is_none());
        assert_eq!(atlas.tiles(0, 0), Some(kept.as_slice()));
        assert_eq!(fresh.len(), 1);
        assert_eq!(atlas.len(), 4);
    }

    #[test]
    fn keys_requested_this_frame_are_never_evicted() {
        let mut atlas = ShadowAtlas::new(small());
        atlas.begin_frame();
        for light in 0..4 {
            atlas.request(light, 0, 1).unwrap();
        }

        assert!(atlas.request(9, 0, 1).is_none());
        assert_eq!(atlas.len(), 4);
    }

    #[test]
    fn excessive_lod_counts_are_clamped() {
        let mut atlas = ShadowAtlas::new(ShadowConfig {
            atlas_size: 128,
            tile_resolution: 64,
            max_lods: 40,
            max_tile_age: 8,
        });
        // 64 pixels halve six times.
        assert_eq!(atlas.config().max_lods, 7);
        assert_eq!(atlas.tile_resolution(0), 64);
        assert_eq!(atlas.tile_resolution(39), 1);

        atlas.begin_frame();
        let sun = atlas.request(1, 0, 4).unwrap();
        assert!(sun.iter().all(|t| t.size == 64));
        assert!(atlas.request(2, 39, 1).is_none());
    }

    #[test]
    fn unrequested_keys_age_out() {
        let mut atlas = ShadowAtlas::new(ShadowConfig {
            max_tile_age: 2,
            ..small()
        });
        atlas.begin_frame();
        atlas.request(3, 0, 4).unwrap();

        atlas.begin_frame();
        atlas.begin_frame();
        assert_eq!(atlas.len(), 1);

        atlas.begin_frame();
        assert!(atlas.is_empty());
        // Space is reusable at once.
        assert_eq!(atlas.request(4, 0, 4).map(|t| t.len()), Some(4));
    }

    #[test]
    fn oversized_request_fails_without_leaking_cells() {
        let mut atlas = ShadowAtlas::new(small());
        atlas.begin_frame();
        assert!(atlas.request(1, 0, 5).is_none());
        assert!(atlas.is_empty());
        assert_eq!(atlas.request(2, 0, 4).map(|t| t.len()), Some(4));
    }

    #[test]
    fn uv_is_normalized_by_atlas_size() {
        let tile = ShadowTile {
            x: 1024,
            y: 0,
            size: 512,
        };
        assert_eq!(tile.uv(2048), Vec4::new(0.5, 0.0, 0.25, 0.25));
        assert_eq!(tile.rect(), Rect::new(1024, 0, 512, 512));
    }
}

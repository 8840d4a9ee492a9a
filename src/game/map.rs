//! Playable area description and spawn-point sampling

use glam::Vec2;
use rand::Rng;

/// Margin kept between spawn points and every map edge, in tiles
pub const SPAWN_MARGIN_TILES: f32 = 2.0;

/// Immutable map dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameMapData {
    pub width_tiles: u32,
    pub height_tiles: u32,
    pub tile_size: f32,
}

impl GameMapData {
    pub fn new(width_tiles: u32, height_tiles: u32, tile_size: f32) -> Self {
        Self {
            width_tiles,
            height_tiles,
            tile_size,
        }
    }

    pub fn width(&self) -> f32 {
        self.width_tiles as f32 * self.tile_size
    }

    pub fn height(&self) -> f32 {
        self.height_tiles as f32 * self.tile_size
    }

    pub fn is_out_of_bounds(&self, point: Vec2) -> bool {
        point.x < 0.0 || point.y < 0.0 || point.x > self.width() || point.y > self.height()
    }

    /// Clamp a body of `radius` so it stays fully inside the map. On maps
    /// narrower than the body the center is pinned to the middle.
    pub fn clamp(&self, point: Vec2, radius: f32) -> Vec2 {
        Vec2::new(
            clamp_axis(point.x, radius, self.width()),
            clamp_axis(point.y, radius, self.height()),
        )
    }

    /// Uniform random point at least two tiles from every edge. The margin
    /// drops to zero when the map is smaller than four margins on either axis.
    pub fn random_spawn_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        let (width, height) = (self.width(), self.height());
        let mut margin = SPAWN_MARGIN_TILES * self.tile_size;
        if width < 4.0 * margin || height < 4.0 * margin {
            margin = 0.0;
        }

        Vec2::new(
            sample_axis(rng, margin, width - margin),
            sample_axis(rng, margin, height - margin),
        )
    }
}

fn clamp_axis(value: f32, radius: f32, extent: f32) -> f32 {
    if extent <= 2.0 * radius {
        extent * 0.5
    } else {
        value.clamp(radius, extent - radius)
    }
}

fn sample_axis<R: Rng + ?Sized>(rng: &mut R, low: f32, high: f32) -> f32 {
    if high > low {
        rng.gen_range(low..=high)
    } else {
        low.max(0.0)
    }
}

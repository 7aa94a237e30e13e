//! Hit-test geometry shared by all widgets
//!
//! Positions and regions live in the same coordinate space as the input
//! source: x grows to the right, y grows downwards.

use serde::{Deserialize, Serialize};

/// A position in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Inclusive on all four edges
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Vertical offset of `y` inside the rectangle, 0.0 at the top edge and
    /// 1.0 at the bottom edge, clamped.
    pub fn vertical_ratio(&self, y: f64) -> f64 {
        if self.height <= 0.0 || !y.is_finite() {
            return 0.0;
        }
        ((y - self.y) / self.height).clamp(0.0, 1.0)
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// One hit region: a rectangle, its stacking order and the target it resolves to
#[derive(Debug, Clone)]
struct HitRegion<T> {
    rect: Rect,
    z: i32,
    target: T,
}

/// Z-ordered set of hit regions.
///
/// Overlaps resolve to the region with the highest `z`; equal `z` resolves to
/// the region inserted first, so a position always maps to at most one target.
#[derive(Debug, Clone)]
pub struct HitMap<T> {
    regions: Vec<HitRegion<T>>,
}

impl<T: Copy> HitMap<T> {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    pub fn insert(&mut self, rect: Rect, z: i32, target: T) {
        self.regions.push(HitRegion { rect, z, target });
    }

    pub fn hit_test(&self, p: Point) -> Option<(T, Rect)> {
        let mut best: Option<&HitRegion<T>> = None;
        for region in self.regions.iter().filter(|r| r.rect.contains(p)) {
            match best {
                Some(b) if b.z >= region.z => {}
                _ => best = Some(region),
            }
        }
        best.map(|r| (r.target, r.rect))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl<T: Copy> Default for HitMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

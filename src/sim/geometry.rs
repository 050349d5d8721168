//! Geometric primitives for hit tests
//!
//! Axis-aligned boxes, segment intersection and point-to-segment distance.
//! Everything here is pure and allocation free.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::direction;

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Square/rectangle centered on a point
    pub fn centered(center: Vec2, half_extent: Vec2) -> Self {
        Self::new(center - half_extent, center + half_extent)
    }

    /// Smallest box containing every point
    pub fn bounding(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut rect = Self::new(*first, *first);
        for p in rest {
            rect.min = rect.min.min(*p);
            rect.max = rect.max.max(*p);
        }
        Some(rect)
    }

    #[inline]
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }
}

/// A straight bar (spikes, bouncer) given by its center, length and angle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub center: Vec2,
    pub length: f32,
    pub angle: f32,
    pub thickness: f32,
}

impl Bar {
    pub fn endpoints(&self) -> (Vec2, Vec2) {
        let half = direction(self.angle) * (self.length / 2.0);
        (self.center - half, self.center + half)
    }

    /// Unit normal (left of the bar direction)
    pub fn normal(&self) -> Vec2 {
        direction(self.angle).perp()
    }

    /// Does a circle touch the thickened bar?
    pub fn hits_circle(&self, center: Vec2, radius: f32) -> bool {
        let (a, b) = self.endpoints();
        distance_to_segment(center, a, b) < radius + self.thickness / 2.0
    }
}

/// Closest point on segment `a`-`b` to `p`
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let line_vec = b - a;
    let line_len_sq = line_vec.length_squared();
    if line_len_sq < 0.0001 {
        return a; // Degenerate segment
    }
    let t = ((p - a).dot(line_vec) / line_len_sq).clamp(0.0, 1.0);
    a + line_vec * t
}

#[inline]
pub fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    (p - closest_point_on_segment(p, a, b)).length()
}

/// Do segments `a1`-`a2` and `b1`-`b2` intersect?
///
/// Touching endpoints count as an intersection; parallel segments never
/// intersect, even when collinear and overlapping.
pub fn segments_intersect(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> bool {
    let da = a2 - a1;
    let db = b2 - b1;
    let denom = da.perp_dot(db);
    if denom.abs() < 1e-9 {
        return false;
    }
    let offset = b1 - a1;
    let t = offset.perp_dot(db) / denom;
    let u = offset.perp_dot(da) / denom;
    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}

/// Do two circles overlap?
#[inline]
pub fn circles_overlap(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    a.distance_squared(b) < (ra + rb) * (ra + rb)
}

/// Reflect velocity off a surface
///
/// Standard reflection: v' = v - 2(v·n)n
#[inline]
pub fn reflect_velocity(velocity: Vec2, normal: Vec2) -> Vec2 {
    velocity - 2.0 * velocity.dot(normal) * normal
}

//! Elastic rope (bungee)
//!
//! A rope is a chain of points from a pinned anchor to the candy's point.
//! Inner links are rigid; the candy hangs on a rubber-band link so a slack
//! rope never pushes it. Cutting severs one link; the rope then counts down
//! and is removed.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::point::{ConstrainedPoint, ConstraintKind, PointArena, PointId};
use crate::consts::*;

/// Strain tiers reported through `Rope::relaxed`
pub const STRAIN_SLACK: u8 = 0;
pub const STRAIN_TAUT: u8 = 1;
pub const STRAIN_STRAINED: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rope {
    /// Anchor first, candy point last
    pub parts: Vec<PointId>,
    /// Rest length of each segment (`parts[i]` to `parts[i + 1]`)
    pub rest_lengths: Vec<f32>,
    /// First severed segment
    pub cut: Option<usize>,
    /// Seconds left before a cut rope is removed
    pub cut_time: f32,
    /// Countdown the cut started from
    pub cut_timeout: f32,
    /// Strain tier: 0 slack, 1 taut, 2 strained
    pub relaxed: u8,
    /// Rope drives its candy's rotation this frame
    pub chosen_one: bool,
    // Presentation flags, untouched by physics. The fragment still hanging
    // from the candy is hidden for the second half of the cut fade.
    pub hide_tail_parts: bool,
    pub force_white: bool,
    pub highlighted: bool,
    /// Smoothed polyline for drawing and tap hit tests
    #[serde(skip)]
    pub draw_path: Vec<Vec2>,
}

impl Rope {
    /// Build a rope of `length` from `anchor_pos` to an existing tail point
    pub fn new(points: &mut PointArena, anchor_pos: Vec2, tail: PointId, length: f32) -> Self {
        let tail_pos = points.pos(tail).unwrap_or(anchor_pos);
        let length = length.max(1.0);
        let segments = ((length / ROPE_SEGMENT_LEN).ceil() as usize).max(1);
        let rest = length / segments as f32;

        let mut parts = Vec::with_capacity(segments + 1);
        parts.push(points.insert(ConstrainedPoint::pinned(anchor_pos)));
        for i in 1..segments {
            let t = i as f32 / segments as f32;
            let pos = anchor_pos.lerp(tail_pos, t);
            parts.push(points.insert(ConstrainedPoint::new(pos, ROPE_POINT_WEIGHT)));
        }
        parts.push(tail);

        for pair in parts[..segments].windows(2) {
            points.link(pair[0], pair[1], rest, ConstraintKind::Distance);
        }
        let last = parts[segments - 1];
        points.constrain(last, tail, rest, ConstraintKind::Distance);
        points.constrain(tail, last, rest, ConstraintKind::NotMoreThan);

        let mut rope = Self {
            parts,
            rest_lengths: vec![rest; segments],
            cut: None,
            cut_time: 0.0,
            cut_timeout: 0.0,
            relaxed: STRAIN_SLACK,
            chosen_one: false,
            hide_tail_parts: false,
            force_white: false,
            highlighted: false,
            draw_path: Vec::new(),
        };
        rope.rebuild_draw_path(points);
        rope
    }

    #[inline]
    pub fn anchor(&self) -> PointId {
        self.parts[0]
    }

    #[inline]
    pub fn tail(&self) -> PointId {
        self.parts[self.parts.len() - 1]
    }

    pub fn segment_count(&self) -> usize {
        self.parts.len() - 1
    }

    pub fn total_rest_length(&self) -> f32 {
        self.rest_lengths.iter().sum()
    }

    pub fn is_cut(&self) -> bool {
        self.cut.is_some()
    }

    /// Cut and fully counted down
    pub fn is_finished(&self) -> bool {
        self.cut.is_some() && self.cut_time <= 0.0
    }

    /// Endpoints of segment `index`, current positions
    pub fn segment(&self, points: &PointArena, index: usize) -> Option<(Vec2, Vec2)> {
        let a = points.pos(*self.parts.get(index)?)?;
        let b = points.pos(*self.parts.get(index + 1)?)?;
        Some((a, b))
    }

    /// Move the pinned anchor to follow its attachment
    pub fn set_anchor(&self, points: &mut PointArena, pos: Vec2) {
        if let Some(anchor) = points.get_mut(self.anchor()) {
            anchor.pin = Some(pos);
        }
    }

    /// Sever segment `index`; a rope can only be cut once
    pub fn set_cut(&mut self, points: &mut PointArena, index: usize, timeout: f32) -> bool {
        if self.cut.is_some() || index >= self.segment_count() {
            return false;
        }
        points.unlink(self.parts[index], self.parts[index + 1]);
        self.cut = Some(index);
        self.cut_time = timeout;
        self.cut_timeout = timeout;
        self.force_white = true;
        self.highlighted = false;
        self.chosen_one = false;
        true
    }

    /// Advance the cut countdown and relax the chain
    pub fn update(&mut self, points: &mut PointArena, delta: f32, iterations: u32) {
        if self.cut.is_some() && self.cut_time > 0.0 {
            self.cut_time = (self.cut_time - delta).max(0.0);
            if self.force_white && self.cut_time < CUT_DISAPPEAR_TIMEOUT - 0.05 {
                self.force_white = false;
            }
            if self.cut_time < self.cut_timeout * 0.5 {
                self.hide_tail_parts = true;
            }
        }

        for _ in 0..iterations {
            for &id in &self.parts {
                points.satisfy(id);
            }
        }

        self.relaxed = if self.cut.is_some() {
            STRAIN_SLACK
        } else {
            self.strain(points)
        };
        self.rebuild_draw_path(points);
    }

    fn strain(&self, points: &PointArena) -> u8 {
        let (Some(anchor), Some(tail)) = (points.pos(self.anchor()), points.pos(self.tail())) else {
            return STRAIN_SLACK;
        };
        let rest = self.total_rest_length();
        if rest <= 0.0 {
            return STRAIN_SLACK;
        }
        let ratio = anchor.distance(tail) / rest;
        if ratio < 0.95 {
            STRAIN_SLACK
        } else if ratio < 1.02 {
            STRAIN_TAUT
        } else {
            STRAIN_STRAINED
        }
    }

    /// Angle of the link that holds the candy
    pub fn tail_angle(&self, points: &PointArena) -> Option<f32> {
        let n = self.parts.len();
        let prev = points.pos(self.parts[n - 2])?;
        let tail = points.pos(self.tail())?;
        let d = prev - tail;
        Some(d.y.atan2(d.x))
    }

    /// Point `distance` along the intact part of the rope, measured from the anchor
    pub fn point_along(&self, points: &PointArena, distance: f32) -> Option<Vec2> {
        let mut remaining = distance.max(0.0);
        let last = self.cut.unwrap_or(self.segment_count());
        for i in 0..last {
            let (a, b) = self.segment(points, i)?;
            let len = a.distance(b);
            if remaining <= len {
                return Some(if len > 0.0 { a.lerp(b, remaining / len) } else { a });
            }
            remaining -= len;
        }
        self.segment(points, last.saturating_sub(1)).map(|(_, b)| b)
    }

    /// Current length of the intact rope
    pub fn intact_length(&self, points: &PointArena) -> f32 {
        let last = self.cut.unwrap_or(self.segment_count());
        (0..last)
            .filter_map(|i| self.segment(points, i))
            .map(|(a, b)| a.distance(b))
            .sum()
    }

    /// Hand the rope over to a new candy point (two-part merge)
    pub fn retarget_tail(&mut self, new_tail: PointId) {
        let n = self.parts.len();
        self.parts[n - 1] = new_tail;
    }

    /// Remove every point the rope owns; the candy point stays
    pub fn destroy(self, points: &mut PointArena) {
        let tail = self.tail();
        for id in self.parts {
            if id != tail {
                points.remove(id);
            }
        }
    }

    /// One Chaikin smoothing pass over the part positions
    fn rebuild_draw_path(&mut self, points: &PointArena) {
        self.draw_path.clear();
        let positions: Vec<Vec2> = self.parts.iter().filter_map(|id| points.pos(*id)).collect();
        let Some((first, _)) = positions.split_first() else {
            return;
        };
        self.draw_path.push(*first);
        for pair in positions.windows(2) {
            self.draw_path.push(pair[0].lerp(pair[1], 0.25));
            self.draw_path.push(pair[0].lerp(pair[1], 0.75));
        }
        if let Some(last) = positions.last() {
            self.draw_path.push(*last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hanging_rope(length: f32) -> (PointArena, Rope, PointId) {
        let mut points = PointArena::new();
        let candy = points.insert(ConstrainedPoint::new(Vec2::new(0.0, length), CANDY_WEIGHT));
        let rope = Rope::new(&mut points, Vec2::ZERO, candy, length);
        (points, rope, candy)
    }

    #[test]
    fn test_rope_layout() {
        let (points, rope, candy) = hanging_rope(95.0);
        // ceil(95 / 30) = 4 segments
        assert_eq!(rope.segment_count(), 4);
        assert_eq!(rope.tail(), candy);
        assert!((rope.total_rest_length() - 95.0).abs() < 1e-3);
        assert!(points.get(rope.anchor()).unwrap().pin.is_some());
        // Candy hangs on a rubber band to the last rope point
        let c = &points.get(candy).unwrap().constraints[0];
        assert_eq!(c.kind, ConstraintKind::NotMoreThan);
        assert_eq!(c.other, rope.parts[3]);
    }

    #[test]
    fn test_rope_holds_candy() {
        let (mut points, mut rope, candy) = hanging_rope(90.0);
        let dt = 1.0 / 60.0;
        for _ in 0..240 {
            points.integrate_all(dt, Vec2::new(0.0, GRAVITY), DAMPING);
            rope.update(&mut points, dt, ROPE_RELAXATION_ITERATIONS);
        }
        let y = points.pos(candy).unwrap().y;
        assert!(y > 80.0 && y < 100.0, "candy at {}", y);
        assert_ne!(rope.relaxed, STRAIN_SLACK);
    }

    #[test]
    fn test_cut_is_monotonic() {
        let (mut points, mut rope, _) = hanging_rope(90.0);
        assert!(rope.set_cut(&mut points, 1, CUT_DISAPPEAR_TIMEOUT));
        assert!(!rope.set_cut(&mut points, 0, CUT_DISAPPEAR_TIMEOUT));
        assert_eq!(rope.cut, Some(1));
        for _ in 0..10 {
            rope.update(&mut points, 0.1, 5);
            assert_eq!(rope.cut, Some(1));
        }
        assert!(!points
            .get(rope.parts[1])
            .unwrap()
            .has_constraint_to(rope.parts[2]));
    }

    #[test]
    fn test_cut_counts_down_to_finished() {
        let (mut points, mut rope, _) = hanging_rope(60.0);
        rope.set_cut(&mut points, 0, 1.0);
        assert!(rope.force_white);
        rope.update(&mut points, 0.3, 1);
        assert!(!rope.hide_tail_parts);
        rope.update(&mut points, 0.3, 1);
        assert!(rope.hide_tail_parts);
        assert!(!rope.is_finished());
        rope.update(&mut points, 0.6, 1);
        assert!(rope.is_finished());
    }

    #[test]
    fn test_cut_candy_falls_free() {
        let (mut points, mut rope, candy) = hanging_rope(60.0);
        let last = rope.segment_count() - 1;
        rope.set_cut(&mut points, last, CUT_DISAPPEAR_TIMEOUT);
        let start = points.pos(candy).unwrap().y;
        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            points.integrate_all(dt, Vec2::new(0.0, GRAVITY), DAMPING);
            rope.update(&mut points, dt, ROPE_RELAXATION_ITERATIONS);
        }
        // One second of free fall
        assert!(points.pos(candy).unwrap().y - start > 300.0);
    }

    #[test]
    fn test_destroy_keeps_candy() {
        let (mut points, rope, candy) = hanging_rope(90.0);
        rope.destroy(&mut points);
        assert_eq!(points.len(), 1);
        assert!(points.get(candy).unwrap().constraints.is_empty());
    }

    #[test]
    fn test_point_along() {
        let (points, rope, _) = hanging_rope(90.0);
        let p = rope.point_along(&points, 45.0).unwrap();
        assert!((p.y - 45.0).abs() < 0.01);
        let end = rope.point_along(&points, 500.0).unwrap();
        assert!((end.y - 90.0).abs() < 0.01);
    }
}

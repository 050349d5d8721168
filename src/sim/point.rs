//! Verlet point masses and distance constraints
//!
//! Points live in a [`PointArena`] and refer to each other by [`PointId`].
//! A constraint belongs to one point and only ever moves that point; two-way
//! links register a constraint on each side. A pinned point snaps to its pin
//! and is never moved by constraints.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Handle to a point in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointId(pub u32);

/// How a constraint corrects distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Rigid: always pulled to the exact rest length
    Distance,
    /// Rubber band: only corrected when stretched past the rest length
    NotMoreThan,
}

/// A link from the owning point to another point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub other: PointId,
    pub rest_length: f32,
    pub kind: ConstraintKind,
}

/// A 2D point mass integrated with Verlet integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstrainedPoint {
    pub pos: Vec2,
    pub prev_pos: Vec2,
    /// Velocity derived from the last step (pixels/s)
    pub v: Vec2,
    /// Position change over the last step
    pub pos_delta: Vec2,
    pub weight: f32,
    /// Skip gravity (candy carried by a rocket)
    pub disable_gravity: bool,
    /// Externally driven position; constraints never move a pinned point
    pub pin: Option<Vec2>,
    pub constraints: Vec<Constraint>,
    /// Accumulated force for the next step
    force: Vec2,
}

impl ConstrainedPoint {
    pub fn new(pos: Vec2, weight: f32) -> Self {
        Self {
            pos,
            prev_pos: pos,
            v: Vec2::ZERO,
            pos_delta: Vec2::ZERO,
            weight,
            disable_gravity: false,
            pin: None,
            constraints: Vec::new(),
            force: Vec2::ZERO,
        }
    }

    /// Pinned anchor point
    pub fn pinned(pos: Vec2) -> Self {
        let mut point = Self::new(pos, 1.0);
        point.pin = Some(pos);
        point
    }

    /// Inverse mass used for constraint splitting (zero when pinned)
    #[inline]
    pub fn inv_weight(&self) -> f32 {
        if self.pin.is_some() || self.weight <= 0.0 {
            0.0
        } else {
            1.0 / self.weight
        }
    }

    /// Velocity change that takes effect on the next step
    ///
    /// `impulse` is in pixels/s; moving `prev_pos` against it makes the next
    /// integration carry the extra velocity.
    pub fn apply_impulse(&mut self, impulse: Vec2, delta: f32) {
        if impulse == Vec2::ZERO || self.pin.is_some() {
            return;
        }
        self.prev_pos -= impulse * delta;
        self.v += impulse;
    }

    /// Add a force (pixels/s² times weight) for the next step
    pub fn add_force(&mut self, force: Vec2) {
        self.force += force;
    }

    /// Place the point at rest somewhere else
    pub fn teleport(&mut self, pos: Vec2) {
        self.pos = pos;
        self.prev_pos = pos;
        self.v = Vec2::ZERO;
        self.pos_delta = Vec2::ZERO;
    }

    /// Place the point moving with `velocity`, keeping `v` and `pos_delta` in sync
    pub fn launch(&mut self, pos: Vec2, velocity: Vec2, delta: f32) {
        self.pos = pos;
        self.prev_pos = pos - velocity * delta;
        self.v = velocity;
        self.pos_delta = velocity * delta;
    }

    /// One Verlet step
    pub fn integrate(&mut self, delta: f32, gravity: Vec2, damping: f32) {
        if let Some(pin) = self.pin {
            self.prev_pos = self.pos;
            self.pos = pin;
            self.pos_delta = self.pos - self.prev_pos;
            self.v = if delta > 0.0 { self.pos_delta / delta } else { Vec2::ZERO };
            return;
        }
        if delta <= 0.0 {
            return;
        }

        let mut acceleration = self.force * self.inv_weight();
        if !self.disable_gravity {
            acceleration += gravity;
        }
        let old = self.pos;
        self.pos = old + (old - self.prev_pos) * damping + acceleration * delta * delta;
        self.prev_pos = old;
        self.pos_delta = self.pos - old;
        self.v = self.pos_delta / delta;
        self.force = Vec2::ZERO;
    }

    pub fn add_constraint(&mut self, other: PointId, rest_length: f32, kind: ConstraintKind) {
        self.constraints.push(Constraint {
            other,
            rest_length,
            kind,
        });
    }

    pub fn remove_constraint(&mut self, other: PointId) {
        self.constraints.retain(|c| c.other != other);
    }

    pub fn remove_constraints(&mut self) {
        self.constraints.clear();
    }

    pub fn change_rest_length(&mut self, other: PointId, rest_length: f32) -> bool {
        let mut changed = false;
        for c in self.constraints.iter_mut().filter(|c| c.other == other) {
            c.rest_length = rest_length;
            changed = true;
        }
        changed
    }

    pub fn has_constraint_to(&self, other: PointId) -> bool {
        self.constraints.iter().any(|c| c.other == other)
    }
}

/// Owner of every simulated point
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointArena {
    slots: Vec<Option<ConstrainedPoint>>,
    free: Vec<u32>,
}

impl PointArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, point: ConstrainedPoint) -> PointId {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(point);
            PointId(index)
        } else {
            self.slots.push(Some(point));
            PointId(self.slots.len() as u32 - 1)
        }
    }

    /// Remove a point and every constraint that targets it
    pub fn remove(&mut self, id: PointId) -> Option<ConstrainedPoint> {
        let point = self.slots.get_mut(id.0 as usize)?.take()?;
        self.free.push(id.0);
        for p in self.slots.iter_mut().flatten() {
            p.remove_constraint(id);
        }
        Some(point)
    }

    #[inline]
    pub fn get(&self, id: PointId) -> Option<&ConstrainedPoint> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: PointId) -> Option<&mut ConstrainedPoint> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn contains(&self, id: PointId) -> bool {
        self.get(id).is_some()
    }

    /// Position of a point, if it still exists
    #[inline]
    pub fn pos(&self, id: PointId) -> Option<Vec2> {
        self.get(id).map(|p| p.pos)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate live points in id order
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &ConstrainedPoint)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (PointId(i as u32), p)))
    }

    /// Register a one-way constraint on `from`
    pub fn constrain(&mut self, from: PointId, to: PointId, rest_length: f32, kind: ConstraintKind) {
        if let Some(p) = self.get_mut(from) {
            p.add_constraint(to, rest_length, kind);
        }
    }

    /// Register the constraint on both points
    pub fn link(&mut self, a: PointId, b: PointId, rest_length: f32, kind: ConstraintKind) {
        self.constrain(a, b, rest_length, kind);
        self.constrain(b, a, rest_length, kind);
    }

    /// Remove the constraints between two points in both directions
    pub fn unlink(&mut self, a: PointId, b: PointId) {
        if let Some(p) = self.get_mut(a) {
            p.remove_constraint(b);
        }
        if let Some(p) = self.get_mut(b) {
            p.remove_constraint(a);
        }
    }

    /// Advance every point one Verlet step
    pub fn integrate_all(&mut self, delta: f32, gravity: Vec2, damping: f32) {
        for p in self.slots.iter_mut().flatten() {
            p.integrate(delta, gravity, damping);
        }
    }

    /// Move one point toward satisfying its constraints
    ///
    /// Corrections are split by relative inverse mass; only the owning point
    /// moves. Constraints to missing points are ignored.
    pub fn satisfy(&mut self, id: PointId) {
        let Some(point) = self.get(id) else { return };
        if let Some(pin) = point.pin {
            if let Some(p) = self.get_mut(id) {
                p.pos = pin;
            }
            return;
        }

        let inv_self = point.inv_weight();
        let mut pos = point.pos;
        for c in &point.constraints {
            let Some(other) = self.get(c.other) else {
                continue;
            };
            let offset = pos - other.pos;
            let len = offset.length();
            if len < 1e-6 {
                continue;
            }
            if c.kind == ConstraintKind::NotMoreThan && len <= c.rest_length {
                continue;
            }
            let total = inv_self + other.inv_weight();
            if total <= 0.0 {
                continue;
            }
            let diff = (len - c.rest_length) / (len * total);
            pos -= offset * (inv_self * diff);
        }

        if let Some(p) = self.get_mut(id) {
            p.pos = pos;
        }
    }

    /// Replace two points with one at `pos`
    ///
    /// The new point inherits both constraint lists (minus the link between
    /// the two) and every reference to either old point is retargeted to it.
    pub fn merge(&mut self, a: PointId, b: PointId, pos: Vec2) -> Option<PointId> {
        let pa = self.get(a)?.clone();
        let pb = self.get(b)?.clone();

        let mut merged = ConstrainedPoint::new(pos, pa.weight.max(pb.weight));
        let velocity = (pa.v + pb.v) * 0.5;
        merged.prev_pos = pos - (pa.pos_delta + pb.pos_delta) * 0.5;
        merged.v = velocity;
        merged.disable_gravity = pa.disable_gravity && pb.disable_gravity;
        merged.constraints = pa
            .constraints
            .iter()
            .chain(pb.constraints.iter())
            .filter(|c| c.other != a && c.other != b)
            .copied()
            .collect();

        let id = self.insert(merged);
        for (other_id, p) in self
            .slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, p)| p.as_mut().map(|p| (i as u32, p)))
        {
            if other_id == id.0 {
                continue;
            }
            for c in p.constraints.iter_mut() {
                if c.other == a || c.other == b {
                    c.other = id;
                }
            }
        }

        // Slots are removed after retargeting so nothing drops the new links
        self.slots[a.0 as usize] = None;
        self.slots[b.0 as usize] = None;
        self.free.push(a.0);
        self.free.push(b.0);
        Some(id)
    }
}

//! Collectible stars and bubbles

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::candy::Side;
use super::geometry::circles_overlap;
use crate::consts::*;

/// A collectible star
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Star {
    pub id: u32,
    pub pos: Vec2,
    /// Seconds until a timed star fades out uncollected
    pub time_left: Option<f32>,
    pub collected: bool,
    pub expired: bool,
}

impl Star {
    pub fn new(id: u32, pos: Vec2, lifetime: Option<f32>) -> Self {
        Self {
            id,
            pos,
            time_left: lifetime,
            collected: false,
            expired: false,
        }
    }

    pub fn is_available(&self) -> bool {
        !self.collected && !self.expired
    }

    /// Count down a timed star; true on the frame it expires
    pub fn tick(&mut self, dt: f32) -> bool {
        if !self.is_available() {
            return false;
        }
        if let Some(left) = &mut self.time_left {
            *left -= dt;
            if *left <= 0.0 {
                self.expired = true;
                return true;
            }
        }
        false
    }

    pub fn touches(&self, candy_pos: Vec2, candy_radius: f32) -> bool {
        self.is_available() && circles_overlap(self.pos, STAR_RADIUS, candy_pos, candy_radius)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BubbleState {
    Free,
    Carrying(Side),
    Popped,
}

/// A bubble that captures the candy and floats it upward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bubble {
    pub id: u32,
    pub pos: Vec2,
    pub state: BubbleState,
}

impl Bubble {
    pub fn new(id: u32, pos: Vec2) -> Self {
        Self {
            id,
            pos,
            state: BubbleState::Free,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == BubbleState::Free
    }

    pub fn captures(&self, candy_pos: Vec2, candy_radius: f32) -> bool {
        self.is_free() && circles_overlap(self.pos, BUBBLE_RADIUS, candy_pos, candy_radius)
    }

    /// Tap lands on the bubble
    pub fn hit_by_touch(&self, p: Vec2) -> bool {
        self.state != BubbleState::Popped && self.pos.distance(p) < BUBBLE_RADIUS
    }

    pub fn pop(&mut self) -> Option<Side> {
        match self.state {
            BubbleState::Carrying(side) => {
                self.state = BubbleState::Popped;
                Some(side)
            }
            BubbleState::Free => {
                self.state = BubbleState::Popped;
                None
            }
            BubbleState::Popped => None,
        }
    }
}

/// Lift and drag applied to a bubbled point this frame, as a velocity change
pub fn buoyancy_impulse(velocity: Vec2, gravity: Vec2, dt: f32) -> Vec2 {
    let lift = -gravity * BUBBLE_LIFT * dt;
    let drag = -velocity * (1.0 - BUBBLE_DRAG.powf(dt));
    lift + drag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_star_expires_once() {
        let mut star = Star::new(1, Vec2::ZERO, Some(1.0));
        assert!(!star.tick(0.6));
        assert!(star.tick(0.6));
        assert!(!star.tick(0.6));
        assert!(!star.touches(Vec2::ZERO, CANDY_RADIUS));
    }

    #[test]
    fn test_star_touch() {
        let star = Star::new(1, Vec2::new(100.0, 100.0), None);
        assert!(star.touches(Vec2::new(120.0, 110.0), CANDY_RADIUS));
        assert!(!star.touches(Vec2::new(200.0, 100.0), CANDY_RADIUS));
    }

    #[test]
    fn test_bubble_pop_states() {
        let mut bubble = Bubble::new(2, Vec2::ZERO);
        assert!(bubble.captures(Vec2::new(20.0, 0.0), CANDY_RADIUS));
        bubble.state = BubbleState::Carrying(Side::Whole);
        assert!(!bubble.captures(Vec2::new(20.0, 0.0), CANDY_RADIUS));
        assert_eq!(bubble.pop(), Some(Side::Whole));
        assert_eq!(bubble.pop(), None);
        assert!(!bubble.hit_by_touch(Vec2::ZERO));
    }

    #[test]
    fn test_buoyancy_rises() {
        let gravity = Vec2::new(0.0, GRAVITY);
        let impulse = buoyancy_impulse(Vec2::ZERO, gravity, 1.0 / 60.0);
        // Net of gravity and lift points up
        assert!(gravity.y / 60.0 + impulse.y < 0.0);
    }
}

//! Rope anchors
//!
//! A grab holds at most one rope. It may ride a path, be dragged along a
//! slider by the player, auto-attach when the candy comes close, and carry a
//! spider that crawls down its rope.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::candy::Side;
use super::point::{PointArena, PointId};
use super::rope::Rope;
use crate::consts::*;

/// Ping-pong movement along waypoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mover {
    pub path: Vec<Vec2>,
    pub speed: f32,
    target: usize,
    forward: bool,
}

impl Mover {
    pub fn new(path: Vec<Vec2>, speed: f32) -> Self {
        Self {
            target: if path.len() > 1 { 1 } else { 0 },
            path,
            speed,
            forward: true,
        }
    }

    /// Next position, moving at most `speed * dt` toward the current waypoint
    pub fn advance(&mut self, pos: Vec2, dt: f32) -> Vec2 {
        let Some(&target) = self.path.get(self.target) else {
            return pos;
        };
        let to_target = target - pos;
        let max_step = self.speed * dt;
        if to_target.length() <= max_step {
            self.next_waypoint();
            return target;
        }
        pos + to_target.normalize_or_zero() * max_step
    }

    fn next_waypoint(&mut self) {
        let last = self.path.len().saturating_sub(1);
        if last == 0 {
            return;
        }
        if self.forward {
            if self.target == last {
                self.forward = false;
                self.target -= 1;
            } else {
                self.target += 1;
            }
        } else if self.target == 0 {
            self.forward = true;
            self.target = 1;
        } else {
            self.target -= 1;
        }
    }
}

/// Player-draggable track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slider {
    pub origin: Vec2,
    /// Unit direction of the track
    pub axis: Vec2,
    pub length: f32,
    /// Touch index dragging the handle
    #[serde(skip)]
    pub touch: Option<usize>,
}

impl Slider {
    /// Closest point on the track to `p`
    pub fn project(&self, p: Vec2) -> Vec2 {
        let t = (p - self.origin).dot(self.axis).clamp(0.0, self.length);
        self.origin + self.axis * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpiderState {
    /// Waiting for a rope, then for the wake delay
    Sleeping { wake_in: f32 },
    /// Crawling; distance from the anchor along the rope
    Crawling { distance: f32 },
    /// Fell off a cut rope
    Fallen,
    /// Reached the candy
    Arrived,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spider {
    pub state: SpiderState,
    pub pos: Vec2,
}

impl Spider {
    pub fn new(pos: Vec2) -> Self {
        Self {
            state: SpiderState::Sleeping {
                wake_in: SPIDER_WAKE_DELAY,
            },
            pos,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            SpiderState::Sleeping { .. } | SpiderState::Crawling { .. }
        )
    }
}

/// What a spider did this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiderEvent {
    Woke,
    Fell,
    Arrived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grab {
    pub id: u32,
    pub pos: Vec2,
    /// Auto-attach trigger radius; `None` means the rope is built at load
    pub radius: Option<f32>,
    /// Fixed rope length; auto-attached ropes use the attach distance
    pub length: Option<f32>,
    /// Half of a two-part candy this grab is tied to
    pub part: Option<Side>,
    pub rope: Option<Rope>,
    pub mover: Option<Mover>,
    pub slider: Option<Slider>,
    pub spider: Option<Spider>,
    /// Auto-attach is allowed (re-armed once the candy leaves the radius)
    pub armed: bool,
}

impl Grab {
    pub fn new(id: u32, pos: Vec2) -> Self {
        Self {
            id,
            pos,
            radius: None,
            length: None,
            part: None,
            rope: None,
            mover: None,
            slider: None,
            spider: None,
            armed: true,
        }
    }

    /// Follow the path mover; the slider is driven by touches instead
    pub fn update_position(&mut self, dt: f32) {
        if let Some(mover) = &mut self.mover {
            self.pos = mover.advance(self.pos, dt);
        }
    }

    /// Attach a rope to `tail`
    pub fn attach(&mut self, points: &mut PointArena, tail: PointId, length: f32) {
        self.rope = Some(Rope::new(points, self.pos, tail, length));
        self.armed = false;
    }

    /// Does this grab hold an uncut rope on `tail`?
    pub fn holds(&self, tail: PointId) -> bool {
        self.rope
            .as_ref()
            .is_some_and(|r| !r.is_cut() && r.tail() == tail)
    }

    pub fn hits_handle(&self, p: Vec2) -> bool {
        self.slider.is_some() && self.pos.distance(p) < GRAB_HANDLE_RADIUS
    }

    /// Advance the spider along the rope
    pub fn update_spider(&mut self, points: &PointArena, dt: f32) -> Option<SpiderEvent> {
        let spider = self.spider.as_mut()?;
        let rope = self.rope.as_ref();
        match spider.state {
            SpiderState::Sleeping { wake_in } => {
                let rope = rope.filter(|r| !r.is_cut())?;
                spider.pos = points.pos(rope.anchor()).unwrap_or(self.pos);
                let wake_in = wake_in - dt;
                if wake_in <= 0.0 {
                    spider.state = SpiderState::Crawling { distance: 0.0 };
                    Some(SpiderEvent::Woke)
                } else {
                    spider.state = SpiderState::Sleeping { wake_in };
                    None
                }
            }
            SpiderState::Crawling { distance } => {
                let Some(rope) = rope.filter(|r| !r.is_cut()) else {
                    spider.state = SpiderState::Fallen;
                    return Some(SpiderEvent::Fell);
                };
                let distance = distance + SPIDER_SPEED * dt;
                if distance >= rope.intact_length(points) {
                    spider.pos = points.pos(rope.tail()).unwrap_or(spider.pos);
                    spider.state = SpiderState::Arrived;
                    return Some(SpiderEvent::Arrived);
                }
                spider.pos = rope.point_along(points, distance).unwrap_or(spider.pos);
                spider.state = SpiderState::Crawling { distance };
                None
            }
            SpiderState::Fallen | SpiderState::Arrived => None,
        }
    }

    /// Rope cut or removed under a crawling spider
    pub fn drop_spider(&mut self) -> bool {
        match &mut self.spider {
            Some(spider) if spider.is_active() => {
                let crawling = matches!(spider.state, SpiderState::Crawling { .. });
                spider.state = SpiderState::Fallen;
                crawling
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::point::ConstrainedPoint;

    #[test]
    fn test_mover_ping_pong() {
        let mut mover = Mover::new(vec![Vec2::ZERO, Vec2::new(10.0, 0.0)], 10.0);
        let mut pos = Vec2::ZERO;
        pos = mover.advance(pos, 0.5);
        assert!((pos.x - 5.0).abs() < 1e-4);
        pos = mover.advance(pos, 0.5);
        assert!((pos.x - 10.0).abs() < 1e-4);
        // Turns around
        pos = mover.advance(pos, 0.5);
        assert!((pos.x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_slider_projection_clamped() {
        let slider = Slider {
            origin: Vec2::new(100.0, 100.0),
            axis: Vec2::X,
            length: 200.0,
            touch: None,
        };
        assert_eq!(slider.project(Vec2::new(150.0, 40.0)), Vec2::new(150.0, 100.0));
        assert_eq!(slider.project(Vec2::new(900.0, 100.0)), Vec2::new(300.0, 100.0));
        assert_eq!(slider.project(Vec2::new(0.0, 100.0)), Vec2::new(100.0, 100.0));
    }

    #[test]
    fn test_spider_crawls_to_candy() {
        let mut points = PointArena::new();
        let candy = points.insert(ConstrainedPoint::new(Vec2::new(0.0, 60.0), 1.0));
        let mut grab = Grab::new(1, Vec2::ZERO);
        grab.spider = Some(Spider::new(Vec2::ZERO));
        grab.attach(&mut points, candy, 60.0);

        assert_eq!(grab.update_spider(&points, 0.6), Some(SpiderEvent::Woke));
        let mut arrived = false;
        for _ in 0..10 {
            if grab.update_spider(&points, 0.1) == Some(SpiderEvent::Arrived) {
                arrived = true;
                break;
            }
        }
        assert!(arrived);
        assert_eq!(grab.spider.unwrap().state, SpiderState::Arrived);
    }

    #[test]
    fn test_spider_falls_when_cut() {
        let mut points = PointArena::new();
        let candy = points.insert(ConstrainedPoint::new(Vec2::new(0.0, 60.0), 1.0));
        let mut grab = Grab::new(1, Vec2::ZERO);
        grab.spider = Some(Spider::new(Vec2::ZERO));
        grab.attach(&mut points, candy, 60.0);
        grab.update_spider(&points, 1.0);
        grab.rope.as_mut().unwrap().set_cut(&mut points, 0, 2.0);
        assert_eq!(grab.update_spider(&points, 0.1), Some(SpiderEvent::Fell));
        assert_eq!(grab.update_spider(&points, 0.1), None);
    }
}

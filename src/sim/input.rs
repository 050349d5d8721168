//! Touch input
//!
//! Screen touches are moved into scene space by the camera offset and handed
//! to the first interactive element that claims them. Unclaimed touches
//! become cut gestures.

use glam::Vec2;

use super::cut::nearest_segment;
use super::pickup::BubbleState;
use super::state::{AnimationCue, Phase, Scene, SimEvent};
use crate::audio::SoundEffect;
use crate::consts::*;
use crate::normalize_angle;

/// What a touch is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchClaim {
    /// Swipe that cuts ropes
    Cut,
    /// Turning the wheel at this index
    Wheel(usize),
    /// Dragging the slider of the grab at this index
    Slider(usize),
    /// Tap already handled on touch down
    Consumed,
}

/// One active touch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    pub pos: Vec2,
    pub claim: TouchClaim,
    /// Ropes cut by this gesture so far
    pub cuts: u32,
}

impl Scene {
    /// Screen coordinates to scene coordinates
    pub fn to_scene(&self, x: f32, y: f32) -> Vec2 {
        Vec2::new(x, y) + self.camera
    }

    /// True when an interactive control sits under `p`
    pub fn active_element_at(&self, p: Vec2) -> bool {
        self.wheels.iter().any(|w| w.hits_handle(p))
            || self.grabs.iter().any(|g| g.hits_handle(p))
            || self.bubbles.iter().any(|b| b.hit_by_touch(p))
            || self.pumps.iter().any(|pump| pump.hit_by_touch(p))
            || self.gravity_buttons.iter().any(|b| b.hit_by_touch(p))
    }

    pub fn touch_down(&mut self, x: f32, y: f32, index: usize) -> bool {
        if index >= MAX_TOUCHES || self.phase != Phase::Playing {
            return false;
        }
        let p = self.to_scene(x, y);
        self.last_touch = Some(p);
        let claim = self.claim_touch(p, index);
        self.touches[index] = Some(Touch {
            pos: p,
            claim,
            cuts: 0,
        });
        true
    }

    fn claim_touch(&mut self, p: Vec2, index: usize) -> TouchClaim {
        if let Some(wi) = self.wheels.iter().position(|w| w.hits_handle(p)) {
            let wheel = &mut self.wheels[wi];
            wheel.drag = Some((index, wheel.touch_angle(p)));
            self.play(SoundEffect::WheelTurn);
            return TouchClaim::Wheel(wi);
        }
        if let Some(gi) = self.grabs.iter().position(|g| g.hits_handle(p)) {
            if let Some(slider) = self.grabs[gi].slider.as_mut() {
                slider.touch = Some(index);
            }
            return TouchClaim::Slider(gi);
        }
        if let Some(bi) = self.bubbles.iter().position(|b| b.hit_by_touch(p)) {
            self.pop_bubble(bi);
            return TouchClaim::Consumed;
        }
        if let Some(pi) = self.pumps.iter().position(|pump| pump.hit_by_touch(p)) {
            self.pumps[pi].blow();
            self.play(SoundEffect::Pump);
            return TouchClaim::Consumed;
        }
        if self.gravity_buttons.iter().any(|b| b.hit_by_touch(p)) {
            self.gravity_flipped = !self.gravity_flipped;
            self.play(SoundEffect::GravityFlip);
            self.emit(SimEvent::GravityFlipped {
                flipped: self.gravity_flipped,
            });
            return TouchClaim::Consumed;
        }
        if self.settings.click_to_cut {
            // The highlight is from the last frame; the tap decides
            self.highlight = nearest_segment(self, p, CLICK_TO_CUT_RADIUS);
            if let Some((gi, segment)) = self.highlight {
                self.cut_rope(gi, segment, false);
            }
            return TouchClaim::Consumed;
        }
        TouchClaim::Cut
    }

    /// Pop a bubble, freeing whatever it carried
    pub fn pop_bubble(&mut self, index: usize) {
        let Some(bubble) = self.bubbles.get_mut(index) else {
            return;
        };
        if bubble.state == BubbleState::Popped {
            return;
        }
        let id = bubble.id;
        if let Some(side) = bubble.pop() {
            if let Some(candy) = self.candy.get_mut(side) {
                candy.bubble = None;
            }
        }
        self.play(SoundEffect::BubblePop);
        self.emit(SimEvent::Animation(AnimationCue::BubblePop { bubble: id }));
    }

    pub fn touch_move(&mut self, x: f32, y: f32, index: usize) {
        if self.phase != Phase::Playing {
            return;
        }
        let p = self.to_scene(x, y);
        let Some(touch) = self.touches.get(index).copied().flatten() else {
            return;
        };
        self.last_touch = Some(p);

        let mut cuts = touch.cuts;
        match touch.claim {
            TouchClaim::Cut => cuts += self.cut_swipe(touch.pos, p),
            TouchClaim::Wheel(wi) => self.drag_wheel(wi, p),
            TouchClaim::Slider(gi) => {
                if let Some(grab) = self.grabs.get_mut(gi) {
                    if let Some(slider) = &grab.slider {
                        grab.pos = slider.project(p);
                    }
                }
            }
            TouchClaim::Consumed => {}
        }
        self.touches[index] = Some(Touch {
            pos: p,
            claim: touch.claim,
            cuts,
        });
    }

    pub fn touch_up(&mut self, x: f32, y: f32, index: usize) {
        let Some(touch) = self.touches.get_mut(index).and_then(Option::take) else {
            return;
        };
        let p = self.to_scene(x, y);
        let mut cuts = touch.cuts;
        match touch.claim {
            TouchClaim::Cut if self.phase == Phase::Playing => {
                cuts += self.cut_swipe(touch.pos, p);
            }
            TouchClaim::Wheel(wi) => {
                if let Some(wheel) = self.wheels.get_mut(wi) {
                    wheel.drag = None;
                }
            }
            TouchClaim::Slider(gi) => {
                if let Some(slider) = self.grabs.get_mut(gi).and_then(|g| g.slider.as_mut()) {
                    slider.touch = None;
                }
            }
            _ => {}
        }
        if cuts >= 2 {
            self.emit(SimEvent::MultiCut { count: cuts });
        }
    }

    fn drag_wheel(&mut self, index: usize, p: Vec2) {
        let Some(wheel) = self.wheels.get_mut(index) else {
            return;
        };
        let Some((touch, last_angle)) = wheel.drag else {
            return;
        };
        let angle = wheel.touch_angle(p);
        let delta = normalize_angle(angle - last_angle);
        wheel.drag = Some((touch, angle));
        self.rotate_wheel(index, delta);
    }

    /// Turn a wheel and everything mounted on it
    pub fn rotate_wheel(&mut self, index: usize, delta: f32) {
        let Some(wheel) = self.wheels.get_mut(index) else {
            return;
        };
        wheel.angle = normalize_angle(wheel.angle + delta);
        let wheel = wheel.clone();

        for grab in self.grabs.iter_mut().filter(|g| wheel.contains(g.pos)) {
            grab.pos = wheel.rotate_point(grab.pos, delta);
        }
        for spikes in self.spikes.iter_mut().filter(|s| wheel.contains(s.bar.center)) {
            spikes.bar.center = wheel.rotate_point(spikes.bar.center, delta);
            spikes.bar.angle = normalize_angle(spikes.bar.angle + delta);
        }
        for bouncer in self.bouncers.iter_mut().filter(|b| wheel.contains(b.bar.center)) {
            bouncer.bar.center = wheel.rotate_point(bouncer.bar.center, delta);
            bouncer.bar.angle = normalize_angle(bouncer.bar.angle + delta);
        }
    }
}

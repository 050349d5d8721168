//! Hazards and level mechanisms
//!
//! Each kind owns its geometry and a local response. The orchestrator decides
//! ordering and what a response means for the candy.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::candy::Side;
use super::geometry::{Bar, Rect, closest_point_on_segment, reflect_velocity};
use super::point::ConstrainedPoint;
use crate::consts::*;
use crate::{direction, normalize_angle, rotate_around};

/// On/off cycle of electro spikes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectroCycle {
    pub on_time: f32,
    pub off_time: f32,
    pub active: bool,
    timer: f32,
}

impl ElectroCycle {
    /// Starts switched off
    pub fn new(on_time: f32, off_time: f32) -> Self {
        Self {
            on_time,
            off_time,
            active: false,
            timer: off_time,
        }
    }

    /// Returns true on the frame the spikes switch on
    pub fn update(&mut self, dt: f32) -> bool {
        self.timer -= dt;
        if self.timer > 0.0 {
            return false;
        }
        self.active = !self.active;
        self.timer += if self.active { self.on_time } else { self.off_time };
        self.active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spikes {
    pub id: u32,
    pub bar: Bar,
    pub electro: Option<ElectroCycle>,
}

impl Spikes {
    pub fn new(id: u32, center: Vec2, length: f32, angle: f32) -> Self {
        Self {
            id,
            bar: Bar {
                center,
                length,
                angle,
                thickness: SPIKE_THICKNESS,
            },
            electro: None,
        }
    }

    /// Plain spikes are always deadly; electro spikes only while on
    pub fn is_dangerous(&self) -> bool {
        self.electro.is_none_or(|e| e.active)
    }

    pub fn hits(&self, pos: Vec2, radius: f32) -> bool {
        self.is_dangerous() && self.bar.hits_circle(pos, radius)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bouncer {
    pub id: u32,
    pub bar: Bar,
    /// Seconds until each candy piece can bounce off this bar again
    pub cooldowns: Vec<(Side, f32)>,
}

impl Bouncer {
    pub fn new(id: u32, center: Vec2, length: f32, angle: f32) -> Self {
        Self {
            id,
            bar: Bar {
                center,
                length,
                angle,
                thickness: BOUNCER_THICKNESS,
            },
            cooldowns: Vec::new(),
        }
    }

    pub fn cooling_down(&self, side: Side) -> bool {
        self.cooldowns.iter().any(|(s, _)| *s == side)
    }

    /// Bounce a candy piece off the bar; true when it bounced
    pub fn bounce(
        &mut self,
        side: Side,
        point: &mut ConstrainedPoint,
        radius: f32,
        dt: f32,
    ) -> bool {
        if self.cooling_down(side) || !self.bar.hits_circle(point.pos, radius) {
            return false;
        }
        let (a, b) = self.bar.endpoints();
        let contact = closest_point_on_segment(point.pos, a, b);
        let mut normal = self.bar.normal();
        if (point.pos - contact).dot(normal) < 0.0 {
            normal = -normal;
        }

        // Push out of the bar, keeping the implicit velocity
        let depth = radius + self.bar.thickness / 2.0 - (point.pos - contact).length();
        if depth > 0.0 {
            point.pos += normal * depth;
            point.prev_pos += normal * depth;
        }

        let v = point.v;
        let outgoing = if v.dot(normal) < 0.0 {
            reflect_velocity(v, normal)
        } else {
            v
        };
        point.apply_impulse(outgoing + normal * BOUNCER_BOOST - v, dt);
        self.cooldowns.push((side, BOUNCER_COOLDOWN));
        true
    }

    pub fn update(&mut self, dt: f32) {
        for (_, left) in &mut self.cooldowns {
            *left -= dt;
        }
        self.cooldowns.retain(|(_, left)| *left > 0.0);
    }
}

/// Air pump, blows along its angle when touched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pump {
    pub id: u32,
    pub pos: Vec2,
    pub angle: f32,
    pub blow_time: f32,
}

impl Pump {
    pub fn new(id: u32, pos: Vec2, angle: f32) -> Self {
        Self {
            id,
            pos,
            angle,
            blow_time: 0.0,
        }
    }

    pub fn blow(&mut self) {
        self.blow_time = PUMP_BLOW_TIME;
    }

    pub fn is_blowing(&self) -> bool {
        self.blow_time > 0.0
    }

    pub fn update(&mut self, dt: f32) {
        self.blow_time = (self.blow_time - dt).max(0.0);
    }

    pub fn hit_by_touch(&self, p: Vec2) -> bool {
        self.pos.distance(p) < PUMP_TOUCH_RADIUS
    }

    /// Flow acceleration at `p`, fading with distance from the nozzle
    pub fn flow_at(&self, p: Vec2) -> Option<Vec2> {
        if !self.is_blowing() {
            return None;
        }
        let local = direction(-self.angle).rotate(p - self.pos);
        if local.x <= 0.0 || local.x >= PUMP_RANGE || local.y.abs() >= PUMP_WIDTH / 2.0 {
            return None;
        }
        Some(direction(self.angle) * PUMP_POWER * (1.0 - local.x / PUMP_RANGE))
    }
}

/// Spinning blade that cuts any rope passing through it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Razor {
    pub id: u32,
    pub pos: Vec2,
    pub size: f32,
    pub rotation: f32,
    pub rotation_speed: f32,
}

impl Razor {
    pub fn new(id: u32, pos: Vec2, size: f32, rotation_speed: f32) -> Self {
        Self {
            id,
            pos,
            size,
            rotation: 0.0,
            rotation_speed,
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.rotation = normalize_angle(self.rotation + self.rotation_speed * dt);
    }

    pub fn bounds(&self) -> Rect {
        Rect::centered(self.pos, Vec2::splat(self.size / 2.0))
    }
}

/// Wheel the player turns by its handles, carrying what sits on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatedCircle {
    pub id: u32,
    pub center: Vec2,
    pub radius: f32,
    pub angle: f32,
    /// Touch index turning the wheel and the angle it last saw
    #[serde(skip)]
    pub drag: Option<(usize, f32)>,
}

impl RotatedCircle {
    pub fn new(id: u32, center: Vec2, radius: f32, angle: f32) -> Self {
        Self {
            id,
            center,
            radius,
            angle,
            drag: None,
        }
    }

    /// The two handles sit on the rim, opposite each other
    pub fn handles(&self) -> [Vec2; 2] {
        let offset = direction(self.angle) * self.radius;
        [self.center + offset, self.center - offset]
    }

    pub fn hits_handle(&self, p: Vec2) -> bool {
        self.handles()
            .iter()
            .any(|h| h.distance(p) < WHEEL_HANDLE_RADIUS)
    }

    pub fn contains(&self, p: Vec2) -> bool {
        self.center.distance(p) <= self.radius
    }

    /// Rope segments lying on the wheel can't be cut by a swipe
    pub fn protects(&self, a: Vec2, b: Vec2) -> bool {
        self.contains(a) && self.contains(b)
    }

    pub fn touch_angle(&self, p: Vec2) -> f32 {
        let d = p - self.center;
        d.y.atan2(d.x)
    }

    pub fn rotate_point(&self, p: Vec2, delta_angle: f32) -> Vec2 {
        rotate_around(p, self.center, delta_angle)
    }
}

/// Teleporting sock; candy entering one leaves through its pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sock {
    pub id: u32,
    pub pos: Vec2,
    /// Opening faces along this angle
    pub angle: f32,
    pub group: u32,
}

impl Sock {
    pub fn new(id: u32, pos: Vec2, angle: f32, group: u32) -> Self {
        Self {
            id,
            pos,
            angle,
            group,
        }
    }

    /// Candy reaches the opening while moving into it
    pub fn swallows(&self, pos: Vec2, velocity: Vec2, radius: f32) -> bool {
        self.pos.distance(pos) < SOCK_RADIUS + radius
            && velocity.dot(direction(self.angle)) < 0.0
    }

    /// Exit position and velocity for a candy that entered at `entry_speed`
    pub fn exit(&self, entry_speed: f32, radius: f32) -> (Vec2, Vec2) {
        let dir = direction(self.angle);
        let speed = (entry_speed * SOCK_SPEED_FACTOR).max(SOCK_MIN_SPEED);
        (self.pos + dir * (SOCK_RADIUS + radius), dir * speed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RocketState {
    Idle,
    Flying { side: Side, fuel: f32 },
    Spent,
}

/// Rocket that grabs the candy and flies it along its angle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rocket {
    pub id: u32,
    pub pos: Vec2,
    pub angle: f32,
    pub speed: f32,
    pub fuel: f32,
    pub state: RocketState,
}

impl Rocket {
    pub fn new(id: u32, pos: Vec2, angle: f32) -> Self {
        Self {
            id,
            pos,
            angle,
            speed: ROCKET_SPEED,
            fuel: ROCKET_FUEL,
            state: RocketState::Idle,
        }
    }

    pub fn catches(&self, pos: Vec2, radius: f32) -> bool {
        self.state == RocketState::Idle && self.pos.distance(pos) < ROCKET_RADIUS + radius
    }

    pub fn ignite(&mut self, side: Side) {
        self.state = RocketState::Flying {
            side,
            fuel: self.fuel,
        };
    }

    /// Steer the carried point and burn fuel; returns true when the fuel ran out
    pub fn propel(&mut self, point: &mut ConstrainedPoint, dt: f32) -> bool {
        let RocketState::Flying { side, fuel } = self.state else {
            return false;
        };
        let desired = direction(self.angle) * self.speed;
        point.apply_impulse(desired - point.v, dt);
        self.pos = point.pos;

        let fuel = fuel - dt;
        if fuel <= 0.0 {
            self.state = RocketState::Spent;
            true
        } else {
            self.state = RocketState::Flying { side, fuel };
            false
        }
    }

    pub fn carrying(&self) -> Option<Side> {
        match self.state {
            RocketState::Flying { side, .. } => Some(side),
            _ => None,
        }
    }
}

/// Button that flips gravity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GravityButton {
    pub id: u32,
    pub pos: Vec2,
}

impl GravityButton {
    pub fn hit_by_touch(&self, p: Vec2) -> bool {
        self.pos.distance(p) < GRAVITY_BUTTON_RADIUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_electro_cycle() {
        let mut spikes = Spikes::new(1, Vec2::ZERO, 100.0, 0.0);
        spikes.electro = Some(ElectroCycle::new(1.0, 2.0));
        assert!(!spikes.hits(Vec2::ZERO, CANDY_RADIUS));
        let cycle = spikes.electro.as_mut().unwrap();
        assert!(!cycle.update(1.5));
        assert!(cycle.update(0.6));
        assert!(spikes.hits(Vec2::ZERO, CANDY_RADIUS));
        let cycle = spikes.electro.as_mut().unwrap();
        assert!(!cycle.update(1.0));
        assert!(!spikes.is_dangerous());
    }

    #[test]
    fn test_bouncer_reflects_and_boosts() {
        let mut bouncer = Bouncer::new(1, Vec2::new(0.0, 100.0), 100.0, 0.0);
        let mut point = ConstrainedPoint::new(Vec2::new(0.0, 85.0), 1.0);
        let dt = 1.0 / 60.0;
        point.launch(Vec2::new(0.0, 85.0), Vec2::new(0.0, 200.0), dt);

        assert!(bouncer.bounce(Side::Whole, &mut point, CANDY_RADIUS, dt));
        assert!(point.v.y < -400.0);
        // Cooldown blocks an immediate second bounce
        assert!(!bouncer.bounce(Side::Whole, &mut point, CANDY_RADIUS, dt));
        point.integrate(dt, Vec2::ZERO, 1.0);
        assert!(point.pos.y < 85.0);
        bouncer.update(BOUNCER_COOLDOWN + 0.01);
        assert!(!bouncer.cooling_down(Side::Whole));
    }

    #[test]
    fn test_bouncer_cooldown_per_half() {
        let mut bouncer = Bouncer::new(1, Vec2::new(0.0, 100.0), 200.0, 0.0);
        let dt = 1.0 / 60.0;
        let mut left = ConstrainedPoint::new(Vec2::new(-40.0, 85.0), 1.0);
        let mut right = ConstrainedPoint::new(Vec2::new(40.0, 85.0), 1.0);
        left.launch(Vec2::new(-40.0, 85.0), Vec2::new(0.0, 200.0), dt);
        right.launch(Vec2::new(40.0, 85.0), Vec2::new(0.0, 200.0), dt);

        assert!(bouncer.bounce(Side::Left, &mut left, CANDY_HALF_RADIUS, dt));
        assert!(bouncer.bounce(Side::Right, &mut right, CANDY_HALF_RADIUS, dt));
        assert!(right.v.y < 0.0);
        assert!(bouncer.cooling_down(Side::Left) && bouncer.cooling_down(Side::Right));
    }

    #[test]
    fn test_pump_flow_cone() {
        let mut pump = Pump::new(1, Vec2::ZERO, FRAC_PI_2);
        assert!(pump.flow_at(Vec2::new(0.0, 100.0)).is_none());
        pump.blow();
        let flow = pump.flow_at(Vec2::new(0.0, 100.0)).unwrap();
        assert!(flow.y > 0.0 && flow.x.abs() < 1e-3);
        // Behind and beside the nozzle
        assert!(pump.flow_at(Vec2::new(0.0, -100.0)).is_none());
        assert!(pump.flow_at(Vec2::new(200.0, 100.0)).is_none());
        pump.update(1.0);
        assert!(!pump.is_blowing());
    }

    #[test]
    fn test_wheel_handles_and_protection() {
        let wheel = RotatedCircle::new(1, Vec2::new(100.0, 100.0), 50.0, 0.0);
        assert!(wheel.hits_handle(Vec2::new(150.0, 105.0)));
        assert!(wheel.hits_handle(Vec2::new(50.0, 100.0)));
        assert!(!wheel.hits_handle(Vec2::new(100.0, 100.0)));
        assert!(wheel.protects(Vec2::new(90.0, 100.0), Vec2::new(110.0, 110.0)));
        assert!(!wheel.protects(Vec2::new(90.0, 100.0), Vec2::new(300.0, 100.0)));
        let rotated = wheel.rotate_point(Vec2::new(150.0, 100.0), PI);
        assert!((rotated - Vec2::new(50.0, 100.0)).length() < 1e-3);
    }

    #[test]
    fn test_sock_swallow_direction() {
        let sock = Sock::new(1, Vec2::ZERO, -FRAC_PI_2, 0);
        // Opening faces up; falling candy enters
        assert!(sock.swallows(Vec2::new(0.0, -20.0), Vec2::new(0.0, 100.0), CANDY_RADIUS));
        assert!(!sock.swallows(Vec2::new(0.0, -20.0), Vec2::new(0.0, -100.0), CANDY_RADIUS));
        let (pos, vel) = sock.exit(100.0, CANDY_RADIUS);
        assert!(pos.y < 0.0);
        assert!((vel.length() - SOCK_MIN_SPEED).abs() < 1e-3);
    }

    #[test]
    fn test_rocket_burns_out() {
        let mut rocket = Rocket::new(1, Vec2::ZERO, 0.0);
        let mut point = ConstrainedPoint::new(Vec2::ZERO, 1.0);
        assert!(rocket.catches(point.pos, CANDY_RADIUS));
        rocket.ignite(Side::Whole);
        assert!(!rocket.catches(point.pos, CANDY_RADIUS));
        assert!(!rocket.propel(&mut point, 1.0));
        assert!((point.v.x - ROCKET_SPEED).abs() < 1e-3);
        assert!(rocket.propel(&mut point, 1.5));
        assert_eq!(rocket.state, RocketState::Spent);
        assert_eq!(rocket.carrying(), None);
    }
}

//! Candy Rope - rope-cutting puzzle level simulation
//!
//! Core modules:
//! - `sim`: Per-frame simulation (Verlet ropes, hazards, candy lifecycle, win/loss)
//! - `settings`: Data-driven physics and timing configuration
//! - `audio`: Sound effect identifiers and the fire-and-forget sound seam

pub mod audio;
pub mod settings;
pub mod sim;

pub use settings::{SettingsError, SimSettings};
pub use sim::{LevelData, LevelError, Scene, SimEvent};

use glam::Vec2;

/// Simulation constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;

    /// Gravity acceleration (pixels/s², +y is down)
    pub const GRAVITY: f32 = 784.0;
    /// Verlet velocity retention per step
    pub const DAMPING: f32 = 0.999;
    /// Constraint relaxation passes per rope update
    pub const ROPE_RELAXATION_ITERATIONS: u32 = 30;
    /// Rest length of one rope segment
    pub const ROPE_SEGMENT_LEN: f32 = 30.0;
    /// Mass factor of rope points (lighter than candy)
    pub const ROPE_POINT_WEIGHT: f32 = 0.5;
    /// Mass factor of a candy point
    pub const CANDY_WEIGHT: f32 = 1.0;
    /// Seconds between a cut and the rope being removed
    pub const CUT_DISAPPEAR_TIMEOUT: f32 = 2.0;

    /// Candy collision radius
    pub const CANDY_RADIUS: f32 = 15.0;
    /// Radius of one half of a two-part candy
    pub const CANDY_HALF_RADIUS: f32 = 12.0;

    /// Collectible star pickup radius
    pub const STAR_RADIUS: f32 = 20.0;
    /// Bubble capture radius
    pub const BUBBLE_RADIUS: f32 = 30.0;
    /// Upward lift while bubbled, as a multiple of gravity
    pub const BUBBLE_LIFT: f32 = 1.3;
    /// Velocity retention per second while bubbled
    pub const BUBBLE_DRAG: f32 = 0.2;

    /// Target mouth half extent (square bounding box)
    pub const TARGET_HALF_SIZE: f32 = 20.0;

    /// Spike bar thickness
    pub const SPIKE_THICKNESS: f32 = 10.0;
    /// Bouncer bar thickness
    pub const BOUNCER_THICKNESS: f32 = 10.0;
    /// Extra speed added along the bouncer normal
    pub const BOUNCER_BOOST: f32 = 300.0;
    /// Seconds a bouncer ignores the candy after a bounce
    pub const BOUNCER_COOLDOWN: f32 = 0.1;

    /// Pump flow reach (pixels in front of the nozzle)
    pub const PUMP_RANGE: f32 = 300.0;
    /// Pump flow width
    pub const PUMP_WIDTH: f32 = 120.0;
    /// Pump acceleration at the nozzle (pixels/s²)
    pub const PUMP_POWER: f32 = 3000.0;
    /// Seconds a pump blows per touch
    pub const PUMP_BLOW_TIME: f32 = 0.25;
    /// Touch radius of a pump
    pub const PUMP_TOUCH_RADIUS: f32 = 40.0;

    /// Default razor size (square side)
    pub const RAZOR_SIZE: f32 = 50.0;

    /// Touch radius of a wheel handle
    pub const WHEEL_HANDLE_RADIUS: f32 = 30.0;

    /// Sock opening radius
    pub const SOCK_RADIUS: f32 = 25.0;
    /// Exit speed retained after a teleport
    pub const SOCK_SPEED_FACTOR: f32 = 0.9;
    /// Minimum exit speed after a teleport
    pub const SOCK_MIN_SPEED: f32 = 150.0;
    /// Seconds the candy ignores socks after leaving one
    pub const SOCK_COOLDOWN: f32 = 0.5;

    /// Rocket capture radius
    pub const ROCKET_RADIUS: f32 = 25.0;
    /// Rocket cruise speed
    pub const ROCKET_SPEED: f32 = 300.0;
    /// Rocket burn time in seconds
    pub const ROCKET_FUEL: f32 = 2.0;

    /// Spider crawl speed along its rope
    pub const SPIDER_SPEED: f32 = 117.0;
    /// Seconds before a spider starts crawling
    pub const SPIDER_WAKE_DELAY: f32 = 0.5;

    /// Touch radius of a gravity button
    pub const GRAVITY_BUTTON_RADIUS: f32 = 30.0;
    /// Touch radius of a grab slider handle
    pub const GRAB_HANDLE_RADIUS: f32 = 30.0;
    /// Max distance from the touch to a rope for click-to-cut highlighting
    pub const CLICK_TO_CUT_RADIUS: f32 = 40.0;
    /// Simultaneous touches tracked
    pub const MAX_TOUCHES: usize = 5;

    /// Maximum shatter particles alive
    pub const MAX_PARTICLES: usize = 256;
    /// Particles spawned per candy shatter
    pub const SHATTER_PARTICLES: usize = 12;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Unit vector pointing along `angle`
#[inline]
pub fn direction(angle: f32) -> Vec2 {
    Vec2::new(angle.cos(), angle.sin())
}

/// Rotate `point` around `center` by `angle` radians
#[inline]
pub fn rotate_around(point: Vec2, center: Vec2, angle: f32) -> Vec2 {
    center + direction(angle).rotate(point - center)
}

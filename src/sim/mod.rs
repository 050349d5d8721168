//! Deterministic simulation module
//!
//! All level logic lives here. This module must be pure and deterministic:
//! - Delta supplied by the caller, no wall clock
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod candy;
pub mod cut;
pub mod geometry;
pub mod grab;
pub mod hazard;
pub mod input;
pub mod level;
pub mod pickup;
pub mod point;
pub mod rope;
pub mod state;
pub mod tick;
pub mod timer;

pub use candy::{Candy, CandyTopology, Side};
pub use geometry::{Bar, Rect};
pub use grab::{Grab, Mover, Slider, Spider, SpiderState};
pub use hazard::{
    Bouncer, ElectroCycle, GravityButton, Pump, Razor, Rocket, RocketState, RotatedCircle, Sock,
    Spikes,
};
pub use input::{Touch, TouchClaim};
pub use level::{ItemKind, LevelData, LevelError, LevelItem};
pub use pickup::{Bubble, BubbleState, Star};
pub use point::{ConstrainedPoint, ConstraintKind, PointArena, PointId};
pub use rope::Rope;
pub use state::{AnimationCue, CandyLoss, Outcome, Particle, Phase, Scene, SimEvent, Target};
pub use tick::tick;
pub use timer::{DelayedAction, Dispatcher, TimerOwner};

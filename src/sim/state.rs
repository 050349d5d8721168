//! Scene state and candy lifecycle
//!
//! The [`Scene`] owns every entity of one running level. Systems in the
//! other modules borrow it for the duration of a tick or an input event.

use std::collections::BTreeMap;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::candy::{CandyTopology, Side, candy_bounds};
use super::geometry::Rect;
use super::grab::Grab;
use super::hazard::{
    Bouncer, GravityButton, Pump, Razor, Rocket, RocketState, RotatedCircle, Sock, Spikes,
};
use super::input::Touch;
use super::level::{LevelData, LevelError};
use super::pickup::{Bubble, BubbleState, Star};
use super::point::{PointArena, PointId};
use super::timer::{DelayedAction, Dispatcher, TimerOwner};
use crate::audio::SoundEffect;
use crate::consts::*;
use crate::settings::SimSettings;

/// Seconds a collected or expired star takes to fade
pub const STAR_FADE_TIME: f32 = 0.5;

/// Current phase of the level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Candy in play
    Playing,
    /// Candy eaten, waiting to report
    Won,
    /// Candy lost, waiting to report
    Lost,
}

/// Level result handed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Won,
    Lost,
}

/// How a candy piece left play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandyLoss {
    /// Hit spikes
    Shattered,
    /// Drifted past the top or bottom bound
    OffScreen,
    /// Taken by a spider
    Stolen,
}

/// Named animations the host should start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationCue {
    MouthOpen,
    MouthClose,
    /// Target eats the candy
    Eat,
    /// Target reacts to a lost candy
    Sad,
    /// Target reacts to a collected star
    Excited,
    BubblePop { bubble: u32 },
    StarFade { star: u32 },
    SpiderBusted { grab: u32 },
}

/// Everything the host needs to hear about, drained once per frame
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Sound(SoundEffect),
    Animation(AnimationCue),
    RopeAttached { grab: u32 },
    RopeCut { grab: u32, segment: usize },
    /// One swipe cut several ropes
    MultiCut { count: u32 },
    StarCollected { star: u32, total: u32 },
    StarExpired { star: u32 },
    CandyShattered { side: Side, pos: Vec2 },
    CandyLost { side: Side },
    CandyMerged { pos: Vec2 },
    CandyTeleported { side: Side, to_sock: u32 },
    GravityFlipped { flipped: bool },
    LevelOutcome(Outcome),
}

/// The target creature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub pos: Vec2,
    pub mouth_open: bool,
    /// Seconds until an open mouth closes
    pub close_timer: f32,
}

impl Target {
    pub fn new(pos: Vec2) -> Self {
        Self {
            pos,
            mouth_open: false,
            close_timer: 0.0,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::centered(self.pos, Vec2::splat(TARGET_HALF_SIZE))
    }
}

/// A particle for visual effects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    pub pos: Vec2,
    pub vel: Vec2,
    pub life: f32, // 0-1, decreases over time
    pub size: f32,
}

/// One running level
#[derive(Debug, Clone)]
pub struct Scene {
    pub settings: SimSettings,
    /// Level the scene was built from, kept for restarts
    pub level: LevelData,
    pub width: f32,
    pub height: f32,
    pub seed: u64,

    pub points: PointArena,
    pub candy: CandyTopology,
    pub target: Target,

    // Entities, sorted by id
    pub grabs: Vec<Grab>,
    pub stars: Vec<Star>,
    pub bubbles: Vec<Bubble>,
    pub spikes: Vec<Spikes>,
    pub bouncers: Vec<Bouncer>,
    pub pumps: Vec<Pump>,
    pub razors: Vec<Razor>,
    pub wheels: Vec<RotatedCircle>,
    pub socks: Vec<Sock>,
    pub rockets: Vec<Rocket>,
    pub gravity_buttons: Vec<GravityButton>,

    pub phase: Phase,
    pub gravity_flipped: bool,
    pub timers: Dispatcher,
    /// Uncut ropes currently holding candy
    pub attach_count: u32,
    pub stars_collected: u32,
    /// Seconds since the level started
    pub time: f32,
    /// Delta of the frame being simulated
    pub frame_dt: f32,
    /// A fade-in restart is pending
    pub restarting: bool,

    // Input
    pub camera: Vec2,
    pub touches: Vec<Option<Touch>>,
    pub last_touch: Option<Vec2>,
    /// Rope (grab index, segment) under the cursor in click-to-cut mode
    pub highlight: Option<(usize, usize)>,

    /// Fade timers of retired stars, by star id
    pub star_fades: BTreeMap<u32, f32>,
    pub particles: Vec<Particle>,

    outcome_reported: bool,
    rng: Pcg32,
    events: Vec<SimEvent>,
    next_id: u32,
}

impl Scene {
    /// Empty scene; the level loader fills it in
    pub fn new(settings: SimSettings, width: f32, height: f32, seed: u64) -> Self {
        Self {
            settings,
            level: LevelData::empty(width, height, seed),
            width,
            height,
            seed,
            points: PointArena::new(),
            candy: CandyTopology::Gone,
            target: Target::new(Vec2::new(width / 2.0, height - 80.0)),
            grabs: Vec::new(),
            stars: Vec::new(),
            bubbles: Vec::new(),
            spikes: Vec::new(),
            bouncers: Vec::new(),
            pumps: Vec::new(),
            razors: Vec::new(),
            wheels: Vec::new(),
            socks: Vec::new(),
            rockets: Vec::new(),
            gravity_buttons: Vec::new(),
            phase: Phase::Playing,
            gravity_flipped: false,
            timers: Dispatcher::new(),
            attach_count: 0,
            stars_collected: 0,
            time: 0.0,
            frame_dt: SIM_DT,
            restarting: false,
            camera: Vec2::ZERO,
            touches: vec![None; MAX_TOUCHES],
            last_touch: None,
            highlight: None,
            star_fades: BTreeMap::new(),
            particles: Vec::new(),
            outcome_reported: false,
            rng: Pcg32::seed_from_u64(seed),
            events: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Ensure entities are sorted by ID for deterministic iteration
    pub fn normalize_order(&mut self) {
        self.grabs.sort_by_key(|g| g.id);
        self.stars.sort_by_key(|s| s.id);
        self.bubbles.sort_by_key(|b| b.id);
        self.spikes.sort_by_key(|s| s.id);
        self.bouncers.sort_by_key(|b| b.id);
        self.pumps.sort_by_key(|p| p.id);
        self.razors.sort_by_key(|r| r.id);
        self.wheels.sort_by_key(|w| w.id);
        self.socks.sort_by_key(|s| s.id);
        self.rockets.sort_by_key(|r| r.id);
        self.gravity_buttons.sort_by_key(|b| b.id);
    }

    pub fn gravity(&self) -> Vec2 {
        let g = self.settings.gravity;
        Vec2::new(0.0, if self.gravity_flipped { -g } else { g })
    }

    pub fn emit(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub fn play(&mut self, effect: SoundEffect) {
        self.events.push(SimEvent::Sound(effect));
    }

    /// Take every event produced since the last call
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn candy_pos(&self, side: Side) -> Option<Vec2> {
        self.points.pos(self.candy.point_of(side)?)
    }

    /// Is an uncut rope holding this point?
    pub fn is_held(&self, point: PointId) -> bool {
        self.grabs.iter().any(|g| g.holds(point))
    }

    /// The outcome has been handed to the host
    pub fn is_finished(&self) -> bool {
        self.outcome_reported
    }

    /// Destroy every rope tied to `point`; returns how many held it uncut
    pub fn release_ropes(&mut self, point: PointId) -> u32 {
        let mut released = 0;
        for grab in &mut self.grabs {
            if !grab.rope.as_ref().is_some_and(|r| r.tail() == point) {
                continue;
            }
            let Some(rope) = grab.rope.take() else {
                continue;
            };
            if !rope.is_cut() {
                released += 1;
            }
            rope.destroy(&mut self.points);
            if grab.drop_spider() {
                self.events.push(SimEvent::Sound(SoundEffect::SpiderFall));
            }
        }
        self.attach_count = self.attach_count.saturating_sub(released);
        if released > 0 {
            self.highlight = None;
        }
        released
    }

    /// Remove a candy piece with everything attached to it
    ///
    /// Returns the last position of the piece, or `None` if it was already gone.
    fn take_candy(&mut self, side: Side) -> Option<Vec2> {
        let candy = self.candy.remove(side)?;
        let pos = self.points.pos(candy.point).unwrap_or(Vec2::ZERO);
        self.release_ropes(candy.point);

        if let Some(bubble_id) = candy.bubble {
            if let Some(bubble) = self.bubbles.iter_mut().find(|b| b.id == bubble_id) {
                bubble.state = BubbleState::Popped;
            }
        }
        if let Some(rocket_id) = candy.rocket {
            if let Some(rocket) = self.rockets.iter_mut().find(|r| r.id == rocket_id) {
                rocket.state = RocketState::Spent;
            }
        }
        self.points.remove(candy.point);
        Some(pos)
    }

    /// Take a candy piece out of play
    ///
    /// A second call for the same side does nothing. When the last piece is
    /// gone the lose sequence is scheduled, unless a restart is pending.
    pub fn destroy_candy(&mut self, side: Side, loss: CandyLoss) -> bool {
        let Some(pos) = self.take_candy(side) else {
            return false;
        };
        log::debug!("Candy {:?} lost ({:?}) at {:?}", side, loss, pos);

        if loss == CandyLoss::Shattered {
            self.play(SoundEffect::CandyBreak);
            self.spawn_shatter(pos);
            self.emit(SimEvent::CandyShattered { side, pos });
        }
        self.emit(SimEvent::CandyLost { side });

        if self.candy.is_gone() && self.phase == Phase::Playing && !self.restarting {
            self.timers.call_object(
                TimerOwner::Scene,
                DelayedAction::Lose,
                self.settings.lose_delay,
            );
        }
        true
    }

    fn spawn_shatter(&mut self, pos: Vec2) {
        for _ in 0..SHATTER_PARTICLES {
            if self.particles.len() >= MAX_PARTICLES {
                break;
            }
            let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
            let speed = self.rng.random_range(80.0..260.0);
            let size = self.rng.random_range(2.0..6.0);
            self.particles.push(Particle {
                pos,
                vel: crate::direction(angle) * speed,
                life: 1.0,
                size,
            });
        }
    }

    /// The candy reached the target
    pub fn win(&mut self) {
        if self.phase != Phase::Playing {
            return;
        }
        self.phase = Phase::Won;
        self.timers.cancel_all_dispatches();
        self.take_candy(Side::Whole);
        self.target.mouth_open = false;
        self.play(SoundEffect::Win);
        self.emit(SimEvent::Animation(AnimationCue::Eat));
        log::info!("Level won with {} stars", self.stars_collected);
        self.timers.call_object(
            TimerOwner::Scene,
            DelayedAction::ReportOutcome(Outcome::Won),
            self.settings.win_outcome_delay,
        );
    }

    pub fn lose(&mut self) {
        if self.phase != Phase::Playing {
            return;
        }
        self.phase = Phase::Lost;
        self.timers.cancel_all_dispatches();
        self.play(SoundEffect::Lose);
        self.emit(SimEvent::Animation(AnimationCue::Sad));
        log::info!("Level lost");
        self.timers.call_object(
            TimerOwner::Scene,
            DelayedAction::ReportOutcome(Outcome::Lost),
            self.settings.lose_outcome_delay,
        );
    }

    /// Hand the outcome to the host, at most once per level run
    fn report_outcome(&mut self, outcome: Outcome) {
        if self.outcome_reported {
            return;
        }
        self.outcome_reported = true;
        self.emit(SimEvent::LevelOutcome(outcome));
    }

    /// Run a timer that came due
    pub fn run_delayed(&mut self, owner: TimerOwner, action: DelayedAction) {
        match action {
            DelayedAction::Lose => self.lose(),
            DelayedAction::ReportOutcome(outcome) => self.report_outcome(outcome),
            DelayedAction::Teleport { side, to_sock } => self.finish_teleport(owner, side, to_sock),
        }
    }

    /// Pop a socked candy out of the paired sock
    fn finish_teleport(&mut self, owner: TimerOwner, side: Side, to_sock: u32) {
        let Some(exit) = self.socks.iter().find(|s| s.id == to_sock).cloned() else {
            return;
        };
        let dt = self.frame_dt;
        let Some(candy) = self.candy.get_mut(side) else {
            return;
        };
        if !candy.in_sock {
            return;
        }
        let (pos, vel) = exit.exit(candy.entry_speed, candy.radius);
        candy.in_sock = false;
        candy.sock_cooldown = SOCK_COOLDOWN;
        let point = candy.point;
        if let Some(p) = self.points.get_mut(point) {
            p.pin = None;
            p.launch(pos, vel, dt);
        }
        log::debug!("Candy {:?} teleported via {:?} to sock {}", side, owner, to_sock);
        self.emit(SimEvent::CandyTeleported { side, to_sock });
    }

    /// Start a fade-in restart: stop pending transitions and suppress new losses
    pub fn begin_restart(&mut self) {
        if self.restarting {
            return;
        }
        self.restarting = true;
        self.timers.cancel_all_dispatches();
        log::info!("Restart requested");
    }

    /// Rebuild the scene from its level data
    ///
    /// Equivalent to loading the level again; the current state is dropped
    /// only if the rebuild succeeds.
    pub fn restart(&mut self) -> Result<(), LevelError> {
        self.timers.cancel_all_dispatches();
        let fresh = Scene::from_level(self.level.clone(), self.settings.clone())?;
        *self = fresh;
        log::info!("Level '{}' restarted", self.level.name);
        Ok(())
    }
}

/// Square bounding box of a candy piece, by side
pub fn piece_bounds(scene: &Scene, side: Side) -> Option<Rect> {
    let candy = scene.candy.get(side)?;
    Some(candy_bounds(scene.points.pos(candy.point)?, candy.radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::candy::Candy;
    use crate::sim::point::ConstrainedPoint;

    fn scene_with_candy() -> Scene {
        let mut scene = Scene::new(SimSettings::default(), 640.0, 960.0, 7);
        let point = scene
            .points
            .insert(ConstrainedPoint::new(Vec2::new(320.0, 300.0), CANDY_WEIGHT));
        scene.candy = CandyTopology::Single(Candy::new(point, CANDY_RADIUS));
        let mut grab = Grab::new(scene.next_entity_id(), Vec2::new(320.0, 200.0));
        grab.attach(&mut scene.points, point, 100.0);
        scene.grabs.push(grab);
        scene.attach_count = 1;
        scene
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut scene = scene_with_candy();
        assert!(scene.destroy_candy(Side::Whole, CandyLoss::Shattered));
        let particles = scene.particles.len();
        assert_eq!(particles, SHATTER_PARTICLES);
        assert!(!scene.destroy_candy(Side::Whole, CandyLoss::Shattered));
        assert_eq!(scene.particles.len(), particles);

        let events = scene.drain_events();
        let shattered = events
            .iter()
            .filter(|e| matches!(e, SimEvent::CandyShattered { .. }))
            .count();
        assert_eq!(shattered, 1);
        assert_eq!(scene.timers.len(), 1);
        assert_eq!(scene.attach_count, 0);
        // Rope points and the candy point are gone; nothing dangles
        assert!(scene.points.is_empty());
        assert!(scene.grabs[0].rope.is_none());
    }

    #[test]
    fn test_restart_pending_suppresses_lose() {
        let mut scene = scene_with_candy();
        scene.begin_restart();
        scene.destroy_candy(Side::Whole, CandyLoss::OffScreen);
        assert!(scene.timers.is_empty());
    }

    #[test]
    fn test_outcome_reported_once() {
        let mut scene = scene_with_candy();
        scene.win();
        scene.lose();
        assert_eq!(scene.phase, Phase::Won);
        scene.run_delayed(TimerOwner::Scene, DelayedAction::ReportOutcome(Outcome::Won));
        scene.run_delayed(TimerOwner::Scene, DelayedAction::ReportOutcome(Outcome::Won));
        let outcomes = scene
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, SimEvent::LevelOutcome(_)))
            .count();
        assert_eq!(outcomes, 1);
        assert!(scene.is_finished());
    }

    #[test]
    fn test_gravity_flip() {
        let mut scene = scene_with_candy();
        assert!(scene.gravity().y > 0.0);
        scene.gravity_flipped = true;
        assert!(scene.gravity().y < 0.0);
    }
}

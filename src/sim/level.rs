//! Level loading
//!
//! A level is a flat list of items. Each item kind has a loader that builds
//! its entity into the scene. Candies and the target are placed before
//! anything else so grabs can tie ropes to the candy at load time.

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::candy::{Candy, CandyTopology, Side};
use super::grab::{Grab, Mover, Slider, Spider};
use super::hazard::{
    Bouncer, ElectroCycle, GravityButton, Pump, Razor, Rocket, RotatedCircle, Sock, Spikes,
};
use super::pickup::{Bubble, Star};
use super::point::ConstrainedPoint;
use super::state::{Scene, Target};
use crate::consts::*;
use crate::settings::SimSettings;

/// Errors that can occur while loading a level
#[derive(Debug, Error)]
pub enum LevelError {
    /// Level file could not be read
    #[error("failed to read level: {0}")]
    Io(#[from] std::io::Error),

    /// Level JSON is malformed
    #[error("failed to parse level: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("level has no candy")]
    MissingCandy,

    #[error("level has no target")]
    MissingTarget,

    /// Candy items that don't form one candy or one pair of halves
    #[error("invalid candy setup: {0}")]
    InvalidSplit(String),
}

/// One placed item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LevelItem {
    pub kind: String,
    pub x: f32,
    pub y: f32,
    /// Degrees, clockwise on screen
    pub angle: f32,
    pub width: f32,
    pub height: f32,
    /// Grab auto-attach radius; wheel radius
    pub radius: Option<f32>,
    /// Fixed rope length
    pub length: Option<f32>,
    /// Waypoints after the start position, for moving grabs
    pub path: Vec<Vec2>,
    pub speed: Option<f32>,
    /// Slider track length, for draggable grabs
    pub move_length: Option<f32>,
    /// Slider track runs vertically
    pub vertical: bool,
    pub spider: bool,
    /// "L" or "R": the candy half a grab ties to
    pub part: Option<String>,
    /// Sock pairing group
    pub group: u32,
    /// Timed star lifetime in seconds
    pub lifetime: Option<f32>,
    pub on_time: Option<f32>,
    pub off_time: Option<f32>,
    pub rotation_speed: Option<f32>,
}

impl LevelItem {
    pub fn new(kind: &str, x: f32, y: f32) -> Self {
        Self {
            kind: kind.to_string(),
            x,
            y,
            ..Default::default()
        }
    }

    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    fn angle_radians(&self) -> f32 {
        self.angle.to_radians()
    }
}

/// A level as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelData {
    pub name: String,
    pub seed: u64,
    pub width: f32,
    pub height: f32,
    /// Overrides the caller's settings for this level
    pub settings: Option<SimSettings>,
    pub items: Vec<LevelItem>,
}

impl Default for LevelData {
    fn default() -> Self {
        Self::empty(640.0, 960.0, 0)
    }
}

impl LevelData {
    pub fn empty(width: f32, height: f32, seed: u64) -> Self {
        Self {
            name: String::new(),
            seed,
            width,
            height,
            settings: None,
            items: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LevelError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Builds one item into the scene
pub type Loader = fn(&mut Scene, &LevelItem);

/// Every item kind the loader knows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Candy,
    CandyLeft,
    CandyRight,
    Target,
    Grab,
    Star,
    Bubble,
    Spikes,
    ElectroSpikes,
    Bouncer,
    Pump,
    Razor,
    RotatedCircle,
    Sock,
    Rocket,
    GravityButton,
}

impl ItemKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "candy" => Self::Candy,
            "candyL" => Self::CandyLeft,
            "candyR" => Self::CandyRight,
            "target" => Self::Target,
            "grab" => Self::Grab,
            "star" => Self::Star,
            "bubble" => Self::Bubble,
            "spikes" => Self::Spikes,
            "electroSpikes" => Self::ElectroSpikes,
            "bouncer" => Self::Bouncer,
            "pump" => Self::Pump,
            "razor" => Self::Razor,
            "rotatedCircle" => Self::RotatedCircle,
            "sock" => Self::Sock,
            "rocket" => Self::Rocket,
            "gravityButton" => Self::GravityButton,
            _ => return None,
        })
    }

    pub fn loader(self) -> Loader {
        match self {
            Self::Candy => load_candy,
            Self::CandyLeft => load_candy_left,
            Self::CandyRight => load_candy_right,
            Self::Target => load_target,
            Self::Grab => load_grab,
            Self::Star => load_star,
            Self::Bubble => load_bubble,
            Self::Spikes => load_spikes,
            Self::ElectroSpikes => load_electro_spikes,
            Self::Bouncer => load_bouncer,
            Self::Pump => load_pump,
            Self::Razor => load_razor,
            Self::RotatedCircle => load_wheel,
            Self::Sock => load_sock,
            Self::Rocket => load_rocket,
            Self::GravityButton => load_gravity_button,
        }
    }

    fn loads_first(self) -> bool {
        matches!(
            self,
            Self::Candy | Self::CandyLeft | Self::CandyRight | Self::Target
        )
    }
}

fn check_candy(kinds: &[(ItemKind, &LevelItem)]) -> Result<(), LevelError> {
    let count = |kind| kinds.iter().filter(|(k, _)| *k == kind).count();
    let (single, left, right) = (
        count(ItemKind::Candy),
        count(ItemKind::CandyLeft),
        count(ItemKind::CandyRight),
    );
    if single + left + right == 0 {
        return Err(LevelError::MissingCandy);
    }
    if single > 1 {
        return Err(LevelError::InvalidSplit(format!("{} single candies", single)));
    }
    if single == 1 && left + right > 0 {
        return Err(LevelError::InvalidSplit(
            "single candy mixed with halves".to_string(),
        ));
    }
    if single == 0 && (left != 1 || right != 1) {
        return Err(LevelError::InvalidSplit(format!(
            "{} left and {} right halves",
            left, right
        )));
    }
    if count(ItemKind::Target) == 0 {
        return Err(LevelError::MissingTarget);
    }
    Ok(())
}

impl Scene {
    /// Build a scene from level data
    ///
    /// Settings embedded in the level win over `settings`. Unknown item kinds
    /// are skipped with a warning.
    pub fn from_level(level: LevelData, settings: SimSettings) -> Result<Scene, LevelError> {
        let settings = level.settings.clone().unwrap_or(settings);
        let mut kinds = Vec::with_capacity(level.items.len());
        for item in &level.items {
            match ItemKind::from_name(&item.kind) {
                Some(kind) => kinds.push((kind, item)),
                None => log::warn!(
                    "Skipping unknown level item '{}' at ({}, {})",
                    item.kind,
                    item.x,
                    item.y
                ),
            }
        }
        check_candy(&kinds)?;

        let mut scene = Scene::new(settings, level.width, level.height, level.seed);
        for (kind, item) in kinds.iter().filter(|(k, _)| k.loads_first()) {
            (kind.loader())(&mut scene, item);
        }
        for (kind, item) in kinds.iter().filter(|(k, _)| !k.loads_first()) {
            (kind.loader())(&mut scene, item);
        }
        scene.normalize_order();

        log::info!(
            "Loaded level '{}': {} items, {} ropes",
            level.name,
            kinds.len(),
            scene.attach_count
        );
        scene.level = level;
        Ok(scene)
    }

    pub fn from_json(json: &str, settings: SimSettings) -> Result<Scene, LevelError> {
        Self::from_level(LevelData::from_json(json)?, settings)
    }
}

fn load_candy(scene: &mut Scene, item: &LevelItem) {
    let point = scene
        .points
        .insert(ConstrainedPoint::new(item.pos(), CANDY_WEIGHT));
    scene.candy = CandyTopology::Single(Candy::new(point, CANDY_RADIUS));
}

fn load_candy_left(scene: &mut Scene, item: &LevelItem) {
    load_half(scene, item, Side::Left);
}

fn load_candy_right(scene: &mut Scene, item: &LevelItem) {
    load_half(scene, item, Side::Right);
}

/// The first half loaded waits as `HalfLost` until its pair arrives
fn load_half(scene: &mut Scene, item: &LevelItem, side: Side) {
    let point = scene
        .points
        .insert(ConstrainedPoint::new(item.pos(), CANDY_WEIGHT));
    let half = Candy::new(point, CANDY_HALF_RADIUS);
    let current = std::mem::replace(&mut scene.candy, CandyTopology::Gone);
    scene.candy = match (current, side) {
        (CandyTopology::HalfLost { side: Side::Right, candy }, Side::Left) => {
            CandyTopology::Separate {
                left: half,
                right: candy,
            }
        }
        (CandyTopology::HalfLost { side: Side::Left, candy }, Side::Right) => {
            CandyTopology::Separate {
                left: candy,
                right: half,
            }
        }
        _ => CandyTopology::HalfLost { side, candy: half },
    };
}

fn load_target(scene: &mut Scene, item: &LevelItem) {
    scene.target = Target::new(item.pos());
}

fn load_grab(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    let pos = item.pos();
    let mut grab = Grab::new(id, pos);
    grab.radius = item.radius.filter(|r| *r > 0.0);
    grab.length = item.length.filter(|l| *l > 0.0);
    grab.part = match item.part.as_deref() {
        Some("L") => Some(Side::Left),
        Some("R") => Some(Side::Right),
        _ => None,
    };
    if !item.path.is_empty() {
        let path = std::iter::once(pos).chain(item.path.iter().copied()).collect();
        grab.mover = Some(Mover::new(path, item.speed.unwrap_or(60.0)));
    }
    if let Some(length) = item.move_length.filter(|l| *l > 0.0) {
        grab.slider = Some(Slider {
            origin: pos,
            axis: if item.vertical { Vec2::Y } else { Vec2::X },
            length,
            touch: None,
        });
    }
    if item.spider {
        grab.spider = Some(Spider::new(pos));
    }

    if grab.radius.is_none() {
        let side = grab.part.unwrap_or(Side::Whole);
        match scene.candy_pos(side).zip(scene.candy.point_of(side)) {
            Some((candy_pos, point)) => {
                let length = grab.length.unwrap_or_else(|| pos.distance(candy_pos));
                grab.attach(&mut scene.points, point, length);
                scene.attach_count += 1;
            }
            None => log::warn!("Grab {} has no candy {:?} to tie to", id, side),
        }
    }
    scene.grabs.push(grab);
}

fn load_star(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    let lifetime = item.lifetime.filter(|t| *t > 0.0);
    scene.stars.push(Star::new(id, item.pos(), lifetime));
}

fn load_bubble(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    scene.bubbles.push(Bubble::new(id, item.pos()));
}

fn bar_length(item: &LevelItem) -> f32 {
    if item.width > 0.0 { item.width } else { 100.0 }
}

fn load_spikes(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    scene.spikes.push(Spikes::new(
        id,
        item.pos(),
        bar_length(item),
        item.angle_radians(),
    ));
}

fn load_electro_spikes(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    let mut spikes = Spikes::new(id, item.pos(), bar_length(item), item.angle_radians());
    spikes.electro = Some(ElectroCycle::new(
        item.on_time.unwrap_or(1.0),
        item.off_time.unwrap_or(1.0),
    ));
    scene.spikes.push(spikes);
}

fn load_bouncer(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    scene.bouncers.push(Bouncer::new(
        id,
        item.pos(),
        bar_length(item),
        item.angle_radians(),
    ));
}

fn load_pump(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    scene
        .pumps
        .push(Pump::new(id, item.pos(), item.angle_radians()));
}

fn load_razor(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    let size = if item.width > 0.0 { item.width } else { RAZOR_SIZE };
    let speed = item.rotation_speed.unwrap_or(180.0).to_radians();
    scene.razors.push(Razor::new(id, item.pos(), size, speed));
}

fn load_wheel(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    scene.wheels.push(RotatedCircle::new(
        id,
        item.pos(),
        item.radius.unwrap_or(60.0),
        item.angle_radians(),
    ));
}

fn load_sock(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    scene
        .socks
        .push(Sock::new(id, item.pos(), item.angle_radians(), item.group));
}

fn load_rocket(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    let mut rocket = Rocket::new(id, item.pos(), item.angle_radians());
    if let Some(speed) = item.speed {
        rocket.speed = speed;
    }
    scene.rockets.push(rocket);
}

fn load_gravity_button(scene: &mut Scene, item: &LevelItem) {
    let id = scene.next_entity_id();
    scene.gravity_buttons.push(GravityButton {
        id,
        pos: item.pos(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::{Phase, SimEvent};
    use crate::sim::tick::tick;
    use crate::sim::timer::{DelayedAction, TimerOwner};

    const HANGING: &str = r#"{
        "name": "hanging",
        "seed": 5,
        "width": 640,
        "height": 960,
        "items": [
            { "kind": "grab", "x": 320, "y": 100 },
            { "kind": "star", "x": 320, "y": 400 },
            { "kind": "candy", "x": 320, "y": 250 },
            { "kind": "target", "x": 320, "y": 800 }
        ]
    }"#;

    #[test]
    fn test_load_ties_rope_before_candy_in_list() {
        let scene = Scene::from_json(HANGING, SimSettings::default()).unwrap();
        assert!(scene.candy.is_whole());
        assert_eq!(scene.attach_count, 1);
        let candy = scene.candy.point_of(Side::Whole).unwrap();
        assert!(scene.grabs[0].holds(candy));
        assert_eq!(scene.target.pos, Vec2::new(320.0, 800.0));
        assert_eq!(scene.level.name, "hanging");
        assert_eq!(scene.stars.len(), 1);
    }

    #[test]
    fn test_unknown_kind_skipped() {
        let mut level = LevelData::from_json(HANGING).unwrap();
        level.items.push(LevelItem::new("lantern", 10.0, 10.0));
        let scene = Scene::from_level(level, SimSettings::default()).unwrap();
        assert_eq!(scene.grabs.len(), 1);
    }

    #[test]
    fn test_missing_candy_and_target() {
        let mut level = LevelData::empty(640.0, 960.0, 1);
        level.items.push(LevelItem::new("target", 320.0, 800.0));
        assert!(matches!(
            Scene::from_level(level, SimSettings::default()),
            Err(LevelError::MissingCandy)
        ));

        let mut level = LevelData::empty(640.0, 960.0, 1);
        level.items.push(LevelItem::new("candy", 320.0, 200.0));
        assert!(matches!(
            Scene::from_level(level, SimSettings::default()),
            Err(LevelError::MissingTarget)
        ));
    }

    #[test]
    fn test_unpaired_half_rejected() {
        let mut level = LevelData::empty(640.0, 960.0, 1);
        level.items.push(LevelItem::new("candyL", 200.0, 200.0));
        level.items.push(LevelItem::new("target", 320.0, 800.0));
        assert!(matches!(
            Scene::from_level(level, SimSettings::default()),
            Err(LevelError::InvalidSplit(_))
        ));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            LevelData::from_json("{ \"items\": 3 }"),
            Err(LevelError::Parse(_))
        ));
    }

    #[test]
    fn test_two_part_level() {
        let json = r#"{
            "items": [
                { "kind": "grab", "x": 100, "y": 100, "part": "L" },
                { "kind": "grab", "x": 540, "y": 100, "part": "R" },
                { "kind": "candyR", "x": 440, "y": 200 },
                { "kind": "candyL", "x": 200, "y": 200 },
                { "kind": "target", "x": 320, "y": 800 }
            ]
        }"#;
        let scene = Scene::from_json(json, SimSettings::default()).unwrap();
        assert_eq!(scene.candy.sides(), vec![Side::Left, Side::Right]);
        let left = scene.candy.point_of(Side::Left).unwrap();
        let right = scene.candy.point_of(Side::Right).unwrap();
        assert!(scene.grabs[0].holds(left));
        assert!(scene.grabs[1].holds(right));
        assert_eq!(scene.candy.get(Side::Left).unwrap().radius, CANDY_HALF_RADIUS);
    }

    #[test]
    fn test_level_settings_override() {
        let json = r#"{
            "settings": { "gravity": 100.0 },
            "items": [
                { "kind": "candy", "x": 320, "y": 200 },
                { "kind": "target", "x": 320, "y": 800 }
            ]
        }"#;
        let scene = Scene::from_json(json, SimSettings::default()).unwrap();
        assert_eq!(scene.settings.gravity, 100.0);
        assert_eq!(scene.settings.damping, SimSettings::default().damping);
    }

    #[test]
    fn test_item_options() {
        let json = r#"{
            "items": [
                { "kind": "candy", "x": 320, "y": 200 },
                { "kind": "target", "x": 320, "y": 800 },
                { "kind": "grab", "x": 100, "y": 100, "radius": 80, "path": [[200, 100]], "speed": 50 },
                { "kind": "grab", "x": 500, "y": 100, "radius": 80, "moveLength": 120, "vertical": true },
                { "kind": "electroSpikes", "x": 320, "y": 500, "width": 200, "angle": 90, "onTime": 2 },
                { "kind": "star", "x": 100, "y": 300, "lifetime": 3 }
            ]
        }"#;
        let scene = Scene::from_json(json, SimSettings::default()).unwrap();
        assert_eq!(scene.attach_count, 0);
        assert!(scene.grabs[0].mover.is_some());
        assert_eq!(scene.grabs[1].slider.as_ref().unwrap().axis, Vec2::Y);
        let spikes = &scene.spikes[0];
        assert!((spikes.bar.angle - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
        assert_eq!(spikes.electro.unwrap().on_time, 2.0);
        assert_eq!(scene.stars[0].time_left, Some(3.0));
    }

    #[test]
    fn test_restart_rebuilds_level() {
        let mut scene = Scene::from_json(HANGING, SimSettings::default()).unwrap();
        for _ in 0..30 {
            tick(&mut scene, SIM_DT);
        }
        scene.cut_swipe(Vec2::new(300.0, 160.0), Vec2::new(340.0, 170.0));
        scene.restart().unwrap();

        assert_eq!(scene.time, 0.0);
        assert_eq!(scene.attach_count, 1);
        assert_eq!(scene.phase, Phase::Playing);
        assert!(!scene.grabs[0].rope.as_ref().unwrap().is_cut());
        assert!(scene.drain_events().is_empty());
    }

    #[test]
    fn test_restart_drops_pending_timers() {
        let mut scene = Scene::from_json(HANGING, SimSettings::default()).unwrap();
        scene
            .timers
            .call_object(TimerOwner::Scene, DelayedAction::Lose, 0.5);
        scene.timers.call_object(
            TimerOwner::Sock(9),
            DelayedAction::Teleport {
                side: Side::Whole,
                to_sock: 10,
            },
            0.5,
        );
        scene.restart().unwrap();
        assert!(scene.timers.is_empty());

        for _ in 0..60 {
            tick(&mut scene, SIM_DT);
        }
        assert_eq!(scene.phase, Phase::Playing);
        assert!(scene
            .drain_events()
            .iter()
            .all(|e| !matches!(e, SimEvent::CandyTeleported { .. } | SimEvent::LevelOutcome(_))));
    }

    #[test]
    fn test_determinism() {
        let run = || {
            let mut scene = Scene::from_json(HANGING, SimSettings::default()).unwrap();
            let mut events = Vec::new();
            for frame in 0..240 {
                if frame == 30 {
                    scene.touch_down(280.0, 170.0, 0);
                    scene.touch_move(360.0, 175.0, 0);
                    scene.touch_up(360.0, 175.0, 0);
                }
                tick(&mut scene, SIM_DT);
                events.extend(scene.drain_events());
            }
            let particles: Vec<Vec2> = scene.particles.iter().map(|p| p.pos).collect();
            (scene.candy_pos(Side::Whole), scene.phase, particles, events)
        };

        let (pos_a, phase_a, particles_a, events_a) = run();
        let (pos_b, phase_b, particles_b, events_b) = run();
        assert_eq!(pos_a, pos_b);
        assert_eq!(phase_a, phase_b);
        assert_eq!(particles_a, particles_b);
        assert_eq!(events_a, events_b);
        assert!(events_a.iter().any(|e| matches!(e, SimEvent::StarCollected { .. })));
    }
}

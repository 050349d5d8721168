//! Candy Rope headless runner
//!
//! Loads a level, steps it at the fixed timestep with no input and logs what
//! happens until the level reports an outcome or the time limit runs out.
//!
//! Usage: `candy-rope <level.json> [settings.json] [seconds]`

#[cfg(not(target_arch = "wasm32"))]
use candy_rope::audio::{AudioManager, SoundEffect, SoundError, SoundSink};
#[cfg(not(target_arch = "wasm32"))]
use candy_rope::consts::SIM_DT;
#[cfg(not(target_arch = "wasm32"))]
use candy_rope::sim::{LevelData, Scene, SimEvent, tick};
#[cfg(not(target_arch = "wasm32"))]
use candy_rope::SimSettings;

/// Sink that writes every sound to the log
#[cfg(not(target_arch = "wasm32"))]
struct LogSink;

#[cfg(not(target_arch = "wasm32"))]
impl SoundSink for LogSink {
    fn play(&mut self, effect: SoundEffect, volume: f32) -> Result<(), SoundError> {
        log::trace!("Sound {:?} at {:.2}", effect, volume);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Candy Rope (headless) starting...");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(level_path) = args.first() else {
        eprintln!("usage: candy-rope <level.json> [settings.json] [seconds]");
        std::process::exit(2);
    };

    let settings = match args.get(1) {
        Some(path) => match SimSettings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("{}", e);
                std::process::exit(1);
            }
        },
        None => SimSettings::default(),
    };
    let seconds: f32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(30.0);

    let scene = LevelData::load(level_path).and_then(|level| Scene::from_level(level, settings));
    let mut scene = match scene {
        Ok(scene) => scene,
        Err(e) => {
            log::error!("Failed to load {}: {}", level_path, e);
            std::process::exit(1);
        }
    };

    let mut audio = AudioManager::new(LogSink, &scene.settings);
    let frames = (seconds / SIM_DT).ceil() as u32;
    for frame in 0..frames {
        tick(&mut scene, SIM_DT);
        let events = scene.drain_events();
        audio.dispatch(&events);
        for event in &events {
            match event {
                SimEvent::Sound(_) => {}
                SimEvent::LevelOutcome(outcome) => {
                    log::info!(
                        "Outcome {:?} after {:.2}s, {} stars",
                        outcome,
                        scene.time,
                        scene.stars_collected
                    );
                }
                other => log::debug!("[{}] {:?}", frame, other),
            }
        }
        if scene.is_finished() {
            return;
        }
    }
    log::info!(
        "No outcome after {:.1}s (phase {:?}, {} ropes attached)",
        seconds,
        scene.phase,
        scene.attach_count
    );
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The simulation is a library on the web; the host drives it
}

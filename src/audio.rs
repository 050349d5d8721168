//! Sound effects
//!
//! The simulation only names sounds. Playback belongs to the host, reached
//! through [`SoundSink`]. Failures are never fatal.

use thiserror::Error;

use crate::settings::SimSettings;
use crate::sim::SimEvent;

/// Sound effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    /// Rope snapped; variant picked by the rope's strain tier (0-2)
    RopeBreak(u8),
    /// Rope attached to the candy
    RopeAttach,
    /// Candy bounced off a bouncer
    Bounce,
    /// Bubble captured the candy
    BubbleCapture,
    /// Bubble popped
    BubblePop,
    /// Star collected (pitch rises with each star)
    Star(u8),
    /// Candy shattered on spikes
    CandyBreak,
    /// Electro spikes switched on
    Electric,
    /// Pump blew
    Pump,
    /// Candy entered a sock
    Teleport,
    /// Rocket ignited
    Rocket,
    /// Gravity flipped
    GravityFlip,
    /// Wheel rotated
    WheelTurn,
    /// Spider woke up
    SpiderActivate,
    /// Spider fell off a cut rope
    SpiderFall,
    /// Spider reached the candy
    SpiderWin,
    /// Candy halves merged
    CandyLink,
    /// Mouth opened
    MouthOpen,
    /// Mouth closed
    MouthClose,
    /// Candy eaten
    Win,
    /// Level lost
    Lose,
}

/// Sound playback failure reported by a sink
#[derive(Debug, Error)]
#[error("sound playback failed: {0}")]
pub struct SoundError(pub String);

/// Host-side sound playback
pub trait SoundSink {
    fn play(&mut self, effect: SoundEffect, volume: f32) -> Result<(), SoundError>;
}

/// Routes simulation sound events to a sink with volume applied
#[derive(Debug)]
pub struct AudioManager<S: SoundSink> {
    sink: S,
    volume: f32,
}

impl<S: SoundSink> AudioManager<S> {
    pub fn new(sink: S, settings: &SimSettings) -> Self {
        Self {
            sink,
            volume: settings.effective_volume(),
        }
    }

    /// Re-read volume and mute state
    pub fn apply_settings(&mut self, settings: &SimSettings) {
        self.volume = settings.effective_volume();
    }

    /// Play a sound effect; errors are logged and dropped
    pub fn play(&mut self, effect: SoundEffect) {
        if self.volume <= 0.0 {
            return;
        }
        if let Err(e) = self.sink.play(effect, self.volume) {
            log::debug!("Ignoring sound failure for {:?}: {}", effect, e);
        }
    }

    /// Play every sound event in a drained event batch
    pub fn dispatch(&mut self, events: &[SimEvent]) {
        for event in events {
            if let SimEvent::Sound(effect) = event {
                self.play(*effect);
            }
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Sink that discards every sound (headless runs)
#[derive(Debug, Default)]
pub struct SilentSink;

impl SoundSink for SilentSink {
    fn play(&mut self, _effect: SoundEffect, _volume: f32) -> Result<(), SoundError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        played: Vec<SoundEffect>,
        fail: bool,
    }

    impl SoundSink for Recorder {
        fn play(&mut self, effect: SoundEffect, _volume: f32) -> Result<(), SoundError> {
            if self.fail {
                return Err(SoundError("device lost".into()));
            }
            self.played.push(effect);
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_only_sounds() {
        let mut audio = AudioManager::new(Recorder::default(), &SimSettings::default());
        audio.dispatch(&[
            SimEvent::Sound(SoundEffect::Bounce),
            SimEvent::MultiCut { count: 2 },
            SimEvent::Sound(SoundEffect::Win),
        ]);
        assert_eq!(audio.sink().played, vec![SoundEffect::Bounce, SoundEffect::Win]);
    }

    #[test]
    fn test_muted_plays_nothing() {
        let settings = SimSettings {
            muted: true,
            ..Default::default()
        };
        let mut audio = AudioManager::new(Recorder::default(), &settings);
        audio.play(SoundEffect::Lose);
        assert!(audio.sink().played.is_empty());
    }

    #[test]
    fn test_failures_are_ignored() {
        let sink = Recorder {
            fail: true,
            ..Default::default()
        };
        let mut audio = AudioManager::new(sink, &SimSettings::default());
        audio.play(SoundEffect::CandyBreak);
        assert!(audio.sink().played.is_empty());
    }
}

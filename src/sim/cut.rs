//! Rope cut detection
//!
//! Two detectors: a swipe segment tested against rope segments, and a razor
//! box tested against the swept bounds of each rope segment. Each rope is cut
//! at most once, at the first segment that hits.

use glam::Vec2;

use super::geometry::{Rect, distance_to_segment, segments_intersect};
use super::hazard::RotatedCircle;
use super::point::PointArena;
use super::rope::Rope;
use super::state::{Scene, SimEvent};
use crate::audio::SoundEffect;

/// First segment of `rope` crossed by the swipe `a`-`b`
///
/// Segments lying on a wheel are skipped.
pub fn find_swipe_hit(
    rope: &Rope,
    points: &PointArena,
    a: Vec2,
    b: Vec2,
    wheels: &[RotatedCircle],
) -> Option<usize> {
    if rope.is_cut() {
        return None;
    }
    (0..rope.segment_count()).find(|&i| {
        let Some((p, q)) = rope.segment(points, i) else {
            return false;
        };
        !wheels.iter().any(|w| w.protects(p, q)) && segments_intersect(a, b, p, q)
    })
}

/// First segment whose swept bounds overlap `blade`
///
/// The bounds cover both endpoints at their current and previous positions,
/// so fast segments can't tunnel through the blade between frames.
pub fn find_swept_box_hit(rope: &Rope, points: &PointArena, blade: &Rect) -> Option<usize> {
    if rope.is_cut() {
        return None;
    }
    (0..rope.segment_count()).find(|&i| {
        let (Some(p), Some(q)) = (points.get(rope.parts[i]), points.get(rope.parts[i + 1])) else {
            return false;
        };
        Rect::bounding(&[p.pos, p.prev_pos, q.pos, q.prev_pos]).is_some_and(|r| r.overlaps(blade))
    })
}

/// Uncut rope segment closest to `p` within `max_distance`, as (grab index, segment)
pub fn nearest_segment(scene: &Scene, p: Vec2, max_distance: f32) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, f32)> = None;
    for (gi, grab) in scene.grabs.iter().enumerate() {
        let Some(rope) = grab.rope.as_ref().filter(|r| !r.is_cut()) else {
            continue;
        };
        for si in 0..rope.segment_count() {
            let Some((a, b)) = rope.segment(&scene.points, si) else {
                continue;
            };
            let d = distance_to_segment(p, a, b);
            if d <= max_distance && best.is_none_or(|(_, _, bd)| d < bd) {
                best = Some((gi, si, d));
            }
        }
    }
    best.map(|(gi, si, _)| (gi, si))
}

impl Scene {
    /// Cut every rope the swipe `a`-`b` crosses; returns the number cut
    pub fn cut_swipe(&mut self, a: Vec2, b: Vec2) -> u32 {
        let mut count = 0;
        for gi in 0..self.grabs.len() {
            let hit = self.grabs[gi]
                .rope
                .as_ref()
                .and_then(|r| find_swipe_hit(r, &self.points, a, b, &self.wheels));
            if let Some(segment) = hit {
                if self.cut_rope(gi, segment, false) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Cut ropes passing through any razor; returns the number cut
    pub fn cut_with_razors(&mut self) -> u32 {
        let mut count = 0;
        for ri in 0..self.razors.len() {
            let blade = self.razors[ri].bounds();
            for gi in 0..self.grabs.len() {
                let hit = self.grabs[gi]
                    .rope
                    .as_ref()
                    .and_then(|r| find_swept_box_hit(r, &self.points, &blade));
                if let Some(segment) = hit {
                    if self.cut_rope(gi, segment, true) {
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// Sever one segment of the rope held by grab `index`
    ///
    /// An immediate cut removes the rope on the spot instead of letting it
    /// snap back and fade.
    pub fn cut_rope(&mut self, index: usize, segment: usize, immediate: bool) -> bool {
        let timeout = self.settings.cut_disappear_timeout;
        let Some(grab) = self.grabs.get_mut(index) else {
            return false;
        };
        let Some(rope) = grab.rope.as_mut() else {
            return false;
        };
        let relaxed = rope.relaxed;
        if !rope.set_cut(&mut self.points, segment, timeout) {
            return false;
        }
        if immediate {
            rope.cut_time = 0.0;
            if let Some(rope) = grab.rope.take() {
                rope.destroy(&mut self.points);
            }
        }
        let grab_id = grab.id;
        let spider_fell = grab.drop_spider();

        log::debug!("Rope on grab {} cut at segment {}", grab_id, segment);
        self.attach_count = self.attach_count.saturating_sub(1);
        if self.highlight.is_some_and(|(gi, _)| gi == index) {
            self.highlight = None;
        }
        self.play(SoundEffect::RopeBreak(relaxed));
        self.emit(SimEvent::RopeCut {
            grab: grab_id,
            segment,
        });
        if spider_fell {
            self.play(SoundEffect::SpiderFall);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::*;
    use crate::settings::SimSettings;
    use crate::sim::candy::{Candy, CandyTopology};
    use crate::sim::grab::Grab;
    use crate::sim::hazard::Razor;
    use crate::sim::point::ConstrainedPoint;

    fn scene_with_rope(anchor: Vec2, candy: Vec2) -> Scene {
        let mut scene = Scene::new(SimSettings::default(), 640.0, 960.0, 1);
        let point = scene.points.insert(ConstrainedPoint::new(candy, CANDY_WEIGHT));
        scene.candy = CandyTopology::Single(Candy::new(point, CANDY_RADIUS));
        let mut grab = Grab::new(scene.next_entity_id(), anchor);
        grab.attach(&mut scene.points, point, anchor.distance(candy));
        scene.grabs.push(grab);
        scene.attach_count = 1;
        scene
    }

    #[test]
    fn test_swipe_cuts_once() {
        let mut scene = scene_with_rope(Vec2::new(5.0, 0.0), Vec2::new(5.0, 10.0));
        assert_eq!(scene.grabs[0].rope.as_ref().unwrap().segment_count(), 1);

        let count = scene.cut_swipe(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        assert_eq!(count, 1);
        assert_eq!(scene.grabs[0].rope.as_ref().unwrap().cut, Some(0));
        assert_eq!(scene.attach_count, 0);

        // Already cut
        assert_eq!(scene.cut_swipe(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0)), 0);
        let cuts = scene
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, SimEvent::RopeCut { .. }))
            .count();
        assert_eq!(cuts, 1);
    }

    #[test]
    fn test_swipe_cuts_crossed_segment() {
        let mut scene = scene_with_rope(Vec2::new(100.0, 0.0), Vec2::new(100.0, 120.0));
        let count = scene.cut_swipe(Vec2::new(90.0, 45.0), Vec2::new(110.0, 45.0));
        assert_eq!(count, 1);
        assert_eq!(scene.grabs[0].rope.as_ref().unwrap().cut, Some(1));
    }

    #[test]
    fn test_swipe_miss() {
        let mut scene = scene_with_rope(Vec2::new(5.0, 0.0), Vec2::new(5.0, 10.0));
        assert_eq!(scene.cut_swipe(Vec2::new(20.0, 0.0), Vec2::new(30.0, 10.0)), 0);
        assert!(!scene.grabs[0].rope.as_ref().unwrap().is_cut());
    }

    #[test]
    fn test_wheel_protects_segments() {
        let mut scene = scene_with_rope(Vec2::new(100.0, 100.0), Vec2::new(100.0, 120.0));
        scene
            .wheels
            .push(RotatedCircle::new(9, Vec2::new(100.0, 110.0), 40.0, 0.0));
        assert_eq!(scene.cut_swipe(Vec2::new(80.0, 105.0), Vec2::new(120.0, 115.0)), 0);
    }

    #[test]
    fn test_razor_cuts_immediately() {
        let mut scene = scene_with_rope(Vec2::new(100.0, 0.0), Vec2::new(100.0, 200.0));
        scene.razors.push(Razor::new(3, Vec2::new(100.0, 100.0), RAZOR_SIZE, 1.0));
        assert_eq!(scene.cut_with_razors(), 1);
        assert!(scene.grabs[0].rope.is_none());
        // Only the candy point is left
        assert_eq!(scene.points.len(), 1);
        let events = scene.drain_events();
        assert!(events.contains(&SimEvent::Sound(SoundEffect::RopeBreak(0))));
    }

    #[test]
    fn test_swept_box_catches_fast_segment() {
        let mut points = PointArena::new();
        let tail = points.insert(ConstrainedPoint::new(Vec2::new(0.0, 10.0), 1.0));
        let rope = Rope::new(&mut points, Vec2::ZERO, tail, 10.0);
        // The tail jumped across the blade this frame
        let p = points.get_mut(tail).unwrap();
        p.prev_pos = Vec2::new(-100.0, 10.0);
        p.pos = Vec2::new(100.0, 10.0);
        let blade = Rect::centered(Vec2::new(0.0, 30.0), Vec2::splat(25.0));
        assert_eq!(find_swept_box_hit(&rope, &points, &blade), Some(0));
    }

    #[test]
    fn test_nearest_segment() {
        let scene = scene_with_rope(Vec2::new(100.0, 0.0), Vec2::new(100.0, 90.0));
        assert_eq!(nearest_segment(&scene, Vec2::new(120.0, 80.0), 40.0), Some((0, 2)));
        assert_eq!(nearest_segment(&scene, Vec2::new(300.0, 80.0), 40.0), None);
    }
}

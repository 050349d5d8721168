//! Candy and its topology
//!
//! The candy is either one piece or two halves that must meet before it can
//! be eaten. Destroyed pieces are removed from the topology, so "lost" is the
//! absence of a piece rather than a flag next to it.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::point::PointId;

/// Which piece of the candy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// The single (or merged) candy
    Whole,
    Left,
    Right,
}

/// One simulated candy piece
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candy {
    pub point: PointId,
    pub radius: f32,
    /// Visual rotation, driven by the chosen rope
    pub rotation: f32,
    /// Bubble currently carrying this piece
    pub bubble: Option<u32>,
    /// Rocket currently carrying this piece
    pub rocket: Option<u32>,
    /// Hidden inside a sock, waiting to come out of its pair
    pub in_sock: bool,
    /// Speed the candy entered its sock with
    pub entry_speed: f32,
    /// Seconds left ignoring socks
    pub sock_cooldown: f32,
    /// Seconds spent with no rope, bubble or rocket
    pub rope_free_time: f32,
}

impl Candy {
    pub fn new(point: PointId, radius: f32) -> Self {
        Self {
            point,
            radius,
            rotation: 0.0,
            bubble: None,
            rocket: None,
            in_sock: false,
            entry_speed: 0.0,
            sock_cooldown: 0.0,
            rope_free_time: 0.0,
        }
    }
}

/// Two halves closing the gap under a shrinking rubber band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeProgress {
    pub start_distance: f32,
    pub elapsed: f32,
    pub duration: f32,
}

impl MergeProgress {
    pub fn new(start_distance: f32, duration: f32) -> Self {
        Self {
            start_distance,
            elapsed: 0.0,
            duration: duration.max(f32::EPSILON),
        }
    }

    /// Rest length of the closing link right now
    pub fn target_distance(&self) -> f32 {
        let t = (self.elapsed / self.duration).clamp(0.0, 1.0);
        self.start_distance * (1.0 - t)
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// Every legal candy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CandyTopology {
    /// A single candy from the start
    Single(Candy),
    /// Two halves apart
    Separate { left: Candy, right: Candy },
    /// Two halves touching and being pulled together
    Closing {
        left: Candy,
        right: Candy,
        merge: MergeProgress,
    },
    /// The halves became one candy
    Merged(Candy),
    /// One half was lost, the other is still in play
    HalfLost { side: Side, candy: Candy },
    /// Nothing left in play
    Gone,
}

impl CandyTopology {
    /// Live pieces in a stable order (left before right)
    pub fn pieces(&self) -> Vec<(Side, &Candy)> {
        match self {
            CandyTopology::Single(c) | CandyTopology::Merged(c) => vec![(Side::Whole, c)],
            CandyTopology::Separate { left, right } | CandyTopology::Closing { left, right, .. } => {
                vec![(Side::Left, left), (Side::Right, right)]
            }
            CandyTopology::HalfLost { side, candy } => vec![(*side, candy)],
            CandyTopology::Gone => Vec::new(),
        }
    }

    pub fn sides(&self) -> Vec<Side> {
        self.pieces().into_iter().map(|(s, _)| s).collect()
    }

    pub fn get(&self, side: Side) -> Option<&Candy> {
        self.pieces()
            .into_iter()
            .find(|(s, _)| *s == side)
            .map(|(_, c)| c)
    }

    pub fn get_mut(&mut self, side: Side) -> Option<&mut Candy> {
        match (self, side) {
            (CandyTopology::Single(c) | CandyTopology::Merged(c), Side::Whole) => Some(c),
            (
                CandyTopology::Separate { left, .. } | CandyTopology::Closing { left, .. },
                Side::Left,
            ) => Some(left),
            (
                CandyTopology::Separate { right, .. } | CandyTopology::Closing { right, .. },
                Side::Right,
            ) => Some(right),
            (CandyTopology::HalfLost { side: s, candy }, side) if *s == side => Some(candy),
            _ => None,
        }
    }

    /// Which piece owns a point
    pub fn side_of(&self, point: PointId) -> Option<Side> {
        self.pieces()
            .into_iter()
            .find(|(_, c)| c.point == point)
            .map(|(s, _)| s)
    }

    pub fn point_of(&self, side: Side) -> Option<PointId> {
        self.get(side).map(|c| c.point)
    }

    /// One whole candy in play (eligible to be eaten)
    pub fn is_whole(&self) -> bool {
        matches!(self, CandyTopology::Single(_) | CandyTopology::Merged(_))
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, CandyTopology::Gone)
    }

    /// Take a piece out of play; returns it if it was live
    pub fn remove(&mut self, side: Side) -> Option<Candy> {
        let current = std::mem::replace(self, CandyTopology::Gone);
        let (next, removed) = match (current, side) {
            (CandyTopology::Single(c) | CandyTopology::Merged(c), Side::Whole) => {
                (CandyTopology::Gone, Some(c))
            }
            (
                CandyTopology::Separate { left, right } | CandyTopology::Closing { left, right, .. },
                Side::Left,
            ) => (
                CandyTopology::HalfLost {
                    side: Side::Right,
                    candy: right,
                },
                Some(left),
            ),
            (
                CandyTopology::Separate { left, right } | CandyTopology::Closing { left, right, .. },
                Side::Right,
            ) => (
                CandyTopology::HalfLost {
                    side: Side::Left,
                    candy: left,
                },
                Some(right),
            ),
            (CandyTopology::HalfLost { side: s, candy }, side) if s == side => {
                (CandyTopology::Gone, Some(candy))
            }
            (other, _) => (other, None),
        };
        *self = next;
        removed
    }

    /// Halves touching: start closing the gap
    pub fn begin_merge(&mut self, start_distance: f32, duration: f32) -> bool {
        let current = std::mem::replace(self, CandyTopology::Gone);
        match current {
            CandyTopology::Separate { left, right } => {
                *self = CandyTopology::Closing {
                    left,
                    right,
                    merge: MergeProgress::new(start_distance, duration),
                };
                true
            }
            other => {
                *self = other;
                false
            }
        }
    }

    /// Replace the two closing halves with one candy on `point`
    pub fn finish_merge(&mut self, point: PointId, radius: f32) -> Option<(Candy, Candy)> {
        let current = std::mem::replace(self, CandyTopology::Gone);
        match current {
            CandyTopology::Closing { left, right, .. } => {
                let mut merged = Candy::new(point, radius);
                merged.rotation = (left.rotation + right.rotation) * 0.5;
                *self = CandyTopology::Merged(merged);
                Some((left, right))
            }
            other => {
                *self = other;
                None
            }
        }
    }

    pub fn merge_progress_mut(&mut self) -> Option<&mut MergeProgress> {
        match self {
            CandyTopology::Closing { merge, .. } => Some(merge),
            _ => None,
        }
    }
}

/// Square bounding box of a candy piece
pub fn candy_bounds(pos: Vec2, radius: f32) -> super::geometry::Rect {
    super::geometry::Rect::centered(pos, Vec2::splat(radius))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split() -> CandyTopology {
        CandyTopology::Separate {
            left: Candy::new(PointId(0), 12.0),
            right: Candy::new(PointId(1), 12.0),
        }
    }

    #[test]
    fn test_single_remove_is_gone() {
        let mut t = CandyTopology::Single(Candy::new(PointId(3), 15.0));
        assert!(t.is_whole());
        assert!(t.remove(Side::Whole).is_some());
        assert!(t.is_gone());
        // Idempotent
        assert!(t.remove(Side::Whole).is_none());
    }

    #[test]
    fn test_split_needs_both_lost() {
        let mut t = split();
        assert!(t.remove(Side::Left).is_some());
        assert!(!t.is_gone());
        assert_eq!(t.sides(), vec![Side::Right]);
        assert!(t.remove(Side::Left).is_none());
        assert!(t.remove(Side::Right).is_some());
        assert!(t.is_gone());
    }

    #[test]
    fn test_wrong_side_is_noop() {
        let mut t = split();
        assert!(t.remove(Side::Whole).is_none());
        assert_eq!(t.sides(), vec![Side::Left, Side::Right]);
    }

    #[test]
    fn test_merge_transitions_once() {
        let mut t = split();
        assert!(t.begin_merge(24.0, 0.5));
        assert!(!t.begin_merge(24.0, 0.5));
        let progress = t.merge_progress_mut().unwrap();
        progress.elapsed = 0.25;
        assert!((progress.target_distance() - 12.0).abs() < 1e-4);
        let halves = t.finish_merge(PointId(9), 15.0);
        assert!(halves.is_some());
        assert!(t.is_whole());
        assert_eq!(t.point_of(Side::Whole), Some(PointId(9)));
        assert!(t.finish_merge(PointId(10), 15.0).is_none());
    }

    #[test]
    fn test_side_of() {
        let t = split();
        assert_eq!(t.side_of(PointId(1)), Some(Side::Right));
        assert_eq!(t.side_of(PointId(2)), None);
    }
}

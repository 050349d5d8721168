//! Delayed dispatch
//!
//! Cooperative one-shot timers keyed by `(owner, action)`. Scheduling an
//! existing key replaces it. Timers fire from `Dispatcher::advance`, in the
//! order they come due.

use serde::{Deserialize, Serialize};

use super::candy::Side;
use super::state::Outcome;

/// Who a timer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerOwner {
    Scene,
    Sock(u32),
}

/// What happens when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelayedAction {
    /// Every candy is gone: start the lose sequence
    Lose,
    /// Hand the outcome to the host
    ReportOutcome(Outcome),
    /// Pop a candy half out of the paired sock
    Teleport { side: Side, to_sock: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Pending {
    owner: TimerOwner,
    action: DelayedAction,
    remaining: f32,
    seq: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dispatcher {
    pending: Vec<Pending>,
    next_seq: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` after `delay` seconds
    pub fn call_object(&mut self, owner: TimerOwner, action: DelayedAction, delay: f32) {
        self.cancel(owner, action);
        self.pending.push(Pending {
            owner,
            action,
            remaining: delay.max(0.0),
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    pub fn cancel(&mut self, owner: TimerOwner, action: DelayedAction) {
        self.pending
            .retain(|p| !(p.owner == owner && p.action == action));
    }

    pub fn cancel_owner(&mut self, owner: TimerOwner) {
        self.pending.retain(|p| p.owner != owner);
    }

    pub fn cancel_all_dispatches(&mut self) {
        self.pending.clear();
    }

    /// Point pending teleports for `from` at `to`, keeping their due time
    pub fn retarget_teleport(&mut self, from: Side, to: Side) -> bool {
        let mut found = false;
        for p in &mut self.pending {
            if let DelayedAction::Teleport { side, .. } = &mut p.action {
                if *side == from {
                    *side = to;
                    found = true;
                }
            }
        }
        found
    }

    pub fn is_pending(&self, owner: TimerOwner, action: DelayedAction) -> bool {
        self.pending
            .iter()
            .any(|p| p.owner == owner && p.action == action)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Count down and return the actions that came due, earliest first
    pub fn advance(&mut self, delta: f32) -> Vec<(TimerOwner, DelayedAction)> {
        for p in &mut self.pending {
            p.remaining -= delta;
        }
        let mut due: Vec<Pending> = Vec::new();
        self.pending.retain(|p| {
            if p.remaining <= 0.0 {
                due.push(p.clone());
                false
            } else {
                true
            }
        });
        due.sort_by(|a, b| {
            a.remaining
                .partial_cmp(&b.remaining)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
        });
        due.into_iter().map(|p| (p.owner, p.action)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_after_delay() {
        let mut timers = Dispatcher::new();
        timers.call_object(TimerOwner::Scene, DelayedAction::Lose, 0.3);
        assert!(timers.advance(0.2).is_empty());
        assert_eq!(
            timers.advance(0.2),
            vec![(TimerOwner::Scene, DelayedAction::Lose)]
        );
        assert!(timers.advance(1.0).is_empty());
    }

    #[test]
    fn test_same_key_replaces() {
        let mut timers = Dispatcher::new();
        timers.call_object(TimerOwner::Scene, DelayedAction::Lose, 0.1);
        timers.call_object(TimerOwner::Scene, DelayedAction::Lose, 0.5);
        assert_eq!(timers.len(), 1);
        assert!(timers.advance(0.2).is_empty());
    }

    #[test]
    fn test_due_order() {
        let mut timers = Dispatcher::new();
        timers.call_object(
            TimerOwner::Scene,
            DelayedAction::ReportOutcome(Outcome::Won),
            0.2,
        );
        timers.call_object(
            TimerOwner::Sock(4),
            DelayedAction::Teleport {
                side: Side::Whole,
                to_sock: 5,
            },
            0.1,
        );
        let due = timers.advance(0.5);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].0, TimerOwner::Sock(4));
    }

    #[test]
    fn test_cancel_all() {
        let mut timers = Dispatcher::new();
        timers.call_object(TimerOwner::Scene, DelayedAction::Lose, 0.1);
        timers.call_object(
            TimerOwner::Sock(1),
            DelayedAction::Teleport {
                side: Side::Left,
                to_sock: 2,
            },
            0.1,
        );
        timers.cancel_owner(TimerOwner::Sock(1));
        assert_eq!(timers.len(), 1);
        timers.cancel_all_dispatches();
        assert!(timers.is_empty());
        assert!(timers.advance(1.0).is_empty());
    }

    #[test]
    fn test_retarget_teleport_keeps_due_time() {
        let mut timers = Dispatcher::new();
        let from = DelayedAction::Teleport {
            side: Side::Left,
            to_sock: 2,
        };
        timers.call_object(TimerOwner::Sock(1), from, 0.5);
        assert!(timers.retarget_teleport(Side::Left, Side::Whole));
        assert!(!timers.retarget_teleport(Side::Right, Side::Whole));
        assert!(timers.advance(0.3).is_empty());
        assert_eq!(
            timers.advance(0.3),
            vec![(
                TimerOwner::Sock(1),
                DelayedAction::Teleport {
                    side: Side::Whole,
                    to_sock: 2
                }
            )]
        );
    }
}

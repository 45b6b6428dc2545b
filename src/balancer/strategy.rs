//! Built-in balancing strategies (spec §4.6).

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicUsize, Ordering};

// Layer 2: Third-party crate imports
use rand::Rng;

// Layer 3: Internal module imports
use crate::actor::error::ActorError;
use crate::actor::state::ActorState;

/// Picks a child index out of `states` (one entry per child, in
/// registration order), skipping any whose state is not `ready`.
pub trait BalancerStrategy: Send + Sync {
    fn pick(&self, states: &[ActorState]) -> Result<usize, ActorError>;
}

/// Round-robin: skips non-ready children; fails with `no-child` if all
/// are skipped (spec §4.6: "Round-robin").
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BalancerStrategy for RoundRobin {
    fn pick(&self, states: &[ActorState]) -> Result<usize, ActorError> {
        if states.is_empty() {
            return Err(ActorError::NoChild);
        }
        for _ in 0..states.len() {
            let i = self.cursor.fetch_add(1, Ordering::Relaxed) % states.len();
            if states[i].accepts_messages() {
                return Ok(i);
            }
        }
        Err(ActorError::NoChild)
    }
}

/// Random: uniformly samples from ready children (spec §4.6: "Random").
#[derive(Debug, Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl BalancerStrategy for RandomStrategy {
    fn pick(&self, states: &[ActorState]) -> Result<usize, ActorError> {
        let ready: Vec<usize> = states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.accepts_messages())
            .map(|(i, _)| i)
            .collect();
        if ready.is_empty() {
            return Err(ActorError::NoChild);
        }
        let pick = rand::thread_rng().gen_range(0..ready.len());
        Ok(ready[pick])
    }
}

/// A user-registered strategy (spec §4.6: "Custom"): `forward` picks the
/// child index to use, `cluster_changed` is invoked whenever the set of
/// ready children changes.
pub trait CustomStrategy: Send + Sync {
    fn forward(&self, args: &[serde_json::Value], states: &[ActorState]) -> Result<usize, ActorError>;

    fn cluster_changed(&self, _ready: &[usize]) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_skips_non_ready_and_wraps() {
        let strategy = RoundRobin::new();
        let states = vec![ActorState::Ready, ActorState::Crashed, ActorState::Ready];
        let picks: Vec<usize> = (0..6).map(|_| strategy.pick(&states).unwrap()).collect();
        assert_eq!(picks, vec![0, 2, 0, 2, 0, 2]);
    }

    #[test]
    fn round_robin_fails_when_all_not_ready() {
        let strategy = RoundRobin::new();
        let states = vec![ActorState::Crashed, ActorState::Destroyed];
        assert!(matches!(strategy.pick(&states), Err(ActorError::NoChild)));
    }

    #[test]
    fn random_never_picks_non_ready() {
        let strategy = RandomStrategy::new();
        let states = vec![ActorState::Crashed, ActorState::Ready, ActorState::Crashed];
        for _ in 0..20 {
            assert_eq!(strategy.pick(&states).unwrap(), 1);
        }
    }
}

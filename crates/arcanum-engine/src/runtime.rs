//! Per-actor runtime state for time-windowed effects.
//!
//! One [`ActorRuntime`] record per actor consolidates every small piece
//! of bookkeeping the effect formulas need: combo stacks, per-effect
//! cooldowns, the absorb shield, and idle timestamps. Records live in a
//! single concurrent map and are torn down explicitly when the actor
//! disconnects.
//!
//! All timestamps are host-supplied monotonic seconds; nothing in this
//! module reads a wall clock.

use crate::catalog::EffectId;
use ahash::AHashMap;
use arcanum_common::ActorId;
use dashmap::DashMap;

/// Maximum consecutive-hit combo stacks.
pub const MAX_COMBO_STACKS: u32 = 5;

/// Consecutive-hit combo bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComboState {
    /// Current stack count
    pub stacks: u32,
    /// Time at which the stacks lapse
    pub expires_at: f64,
}

/// The consolidated runtime record for one actor.
#[derive(Debug, Clone, Default)]
pub struct ActorRuntime {
    /// When the actor last attacked, if ever.
    pub last_attack_at: Option<f64>,
    /// When the actor last took damage, if ever.
    pub last_damaged_at: Option<f64>,
    /// Consecutive-hit combo state.
    pub combo: ComboState,
    /// Remaining absorb shield.
    pub shield: f64,
    /// Whether idle stealth is currently active.
    pub stealthed: bool,
    /// Per-effect timestamps before which the effect may not fire again.
    cooldowns: AHashMap<EffectId, f64>,
}

impl ActorRuntime {
    /// Records an attack at `now`. Attacking breaks stealth.
    pub fn note_attack(&mut self, now: f64) {
        self.last_attack_at = Some(now);
        self.stealthed = false;
    }

    /// Records incoming damage at `now`. Taking damage breaks stealth.
    pub fn note_damaged(&mut self, now: f64) {
        self.last_damaged_at = Some(now);
        self.stealthed = false;
    }

    /// Current combo stacks, zero once the window has lapsed.
    #[must_use]
    pub fn combo_stacks(&self, now: f64) -> u32 {
        if now < self.combo.expires_at {
            self.combo.stacks
        } else {
            0
        }
    }

    /// Adds a combo stack (up to [`MAX_COMBO_STACKS`]) and re-arms the
    /// expiry window. Returns the stack count in effect for this hit,
    /// i.e. the stacks accumulated by previous hits.
    pub fn push_combo(&mut self, now: f64, window: f64) -> u32 {
        let current = self.combo_stacks(now);
        self.combo = ComboState {
            stacks: (current + 1).min(MAX_COMBO_STACKS),
            expires_at: now + window,
        };
        current
    }

    /// Checks whether a per-effect cooldown has elapsed.
    #[must_use]
    pub fn cooldown_ready(&self, effect: &EffectId, now: f64) -> bool {
        self.cooldowns.get(effect).map_or(true, |ready| now >= *ready)
    }

    /// Arms a per-effect cooldown for `duration` seconds.
    pub fn arm_cooldown(&mut self, effect: &EffectId, now: f64, duration: f64) {
        self.cooldowns.insert(effect.clone(), now + duration);
    }

    /// Adds to the absorb shield.
    pub fn add_shield(&mut self, amount: f64) {
        self.shield += amount.max(0.0);
    }

    /// Consumes shield against incoming damage. Returns the amount
    /// absorbed.
    pub fn absorb(&mut self, damage: f64) -> f64 {
        let absorbed = self.shield.min(damage.max(0.0));
        self.shield -= absorbed;
        absorbed
    }

    /// Seconds since the actor last took damage, if ever.
    #[must_use]
    pub fn seconds_unhurt(&self, now: f64) -> Option<f64> {
        self.last_damaged_at.map(|at| (now - at).max(0.0))
    }

    /// Seconds since the actor last attacked or took damage. `None`
    /// until either has happened.
    #[must_use]
    pub fn seconds_idle(&self, now: f64) -> Option<f64> {
        match (self.last_attack_at, self.last_damaged_at) {
            (None, None) => None,
            (a, b) => {
                let latest = a.unwrap_or(f64::MIN).max(b.unwrap_or(f64::MIN));
                Some((now - latest).max(0.0))
            }
        }
    }
}

/// The engine-owned map of actor runtime records.
#[derive(Debug, Default)]
pub struct ActorRuntimeMap {
    map: DashMap<ActorId, ActorRuntime>,
}

impl ActorRuntimeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a closure against the actor's record, creating it on first
    /// touch.
    pub fn with_mut<R>(&self, actor: ActorId, f: impl FnOnce(&mut ActorRuntime) -> R) -> R {
        let mut entry = self.map.entry(actor).or_default();
        f(&mut entry)
    }

    /// A copy of the actor's record, if one exists.
    #[must_use]
    pub fn get(&self, actor: ActorId) -> Option<ActorRuntime> {
        self.map.get(&actor).map(|r| r.value().clone())
    }

    /// Drops the actor's record (disconnect teardown).
    pub fn remove_actor(&self, actor: ActorId) {
        self.map.remove(&actor);
    }

    /// Number of tracked actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Checks whether no actors are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combo_stacks_expire() {
        let mut runtime = ActorRuntime::default();
        assert_eq!(runtime.push_combo(10.0, 3.0), 0);
        assert_eq!(runtime.push_combo(11.0, 3.0), 1);
        assert_eq!(runtime.combo_stacks(12.0), 2);
        // Window lapses.
        assert_eq!(runtime.combo_stacks(14.5), 0);
        assert_eq!(runtime.push_combo(14.5, 3.0), 0);
    }

    #[test]
    fn test_combo_stack_cap() {
        let mut runtime = ActorRuntime::default();
        for i in 0..10 {
            runtime.push_combo(f64::from(i), 100.0);
        }
        assert_eq!(runtime.combo_stacks(9.0), MAX_COMBO_STACKS);
    }

    #[test]
    fn test_cooldown_arm_and_elapse() {
        let mut runtime = ActorRuntime::default();
        let effect = EffectId::new("guardian_spirit");
        assert!(runtime.cooldown_ready(&effect, 0.0));
        runtime.arm_cooldown(&effect, 0.0, 90.0);
        assert!(!runtime.cooldown_ready(&effect, 89.9));
        assert!(runtime.cooldown_ready(&effect, 90.0));
    }

    #[test]
    fn test_shield_absorbs_up_to_its_amount() {
        let mut runtime = ActorRuntime::default();
        runtime.add_shield(8.0);
        assert!((runtime.absorb(5.0) - 5.0).abs() < 1e-9);
        assert!((runtime.absorb(5.0) - 3.0).abs() < 1e-9);
        assert!((runtime.absorb(5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_idle_and_unhurt_clocks() {
        let mut runtime = ActorRuntime::default();
        assert_eq!(runtime.seconds_idle(5.0), None);
        runtime.note_attack(10.0);
        runtime.note_damaged(12.0);
        assert_eq!(runtime.seconds_idle(15.0), Some(3.0));
        assert_eq!(runtime.seconds_unhurt(15.0), Some(3.0));
        runtime.note_attack(14.0);
        assert_eq!(runtime.seconds_idle(15.0), Some(1.0));
    }

    #[test]
    fn test_stealth_breaks_on_activity() {
        let mut runtime = ActorRuntime::default();
        runtime.stealthed = true;
        runtime.note_attack(1.0);
        assert!(!runtime.stealthed);
        runtime.stealthed = true;
        runtime.note_damaged(2.0);
        assert!(!runtime.stealthed);
    }

    #[test]
    fn test_map_teardown() {
        let map = ActorRuntimeMap::new();
        let actor = ActorId::from_raw(9);
        map.with_mut(actor, |r| r.add_shield(4.0));
        assert_eq!(map.len(), 1);
        assert!(map.get(actor).is_some());
        map.remove_actor(actor);
        assert!(map.is_empty());
        assert!(map.get(actor).is_none());
    }
}

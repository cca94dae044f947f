//! Weighted effect rolling with a pity ceiling.
//!
//! This module provides:
//! - Weighted random selection over the enabled definitions for a class
//! - Per-(actor, class) pity counters forcing a top-tier result on the
//!   Nth roll since the last one
//! - Magnitude rolling inside each definition's value ranges
//!
//! Pity counters are memory-only: they live in the roller's concurrent
//! map and do not survive a process restart. Persisting them would be a
//! host-side change and is deliberately not done here.

use crate::catalog::{EffectCatalog, EffectDefinition, ItemClass, RarityTier};
use arcanum_common::ActorId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Roller error types.
#[derive(Debug, Clone, Error)]
pub enum RollError {
    /// The class has no enabled definitions to draw from
    #[error("no available effects for {class} items")]
    NoAvailableEffects {
        /// Class that had no candidates
        class: ItemClass,
    },
}

/// Result type for roll operations.
pub type RollResult<T> = Result<T, RollError>;

/// One rolled effect with frozen magnitudes.
#[derive(Debug, Clone)]
pub struct RollOutcome {
    /// The definition that was drawn
    pub effect: EffectDefinition,
    /// Rolled primary magnitude
    pub value1: f64,
    /// Rolled secondary parameter
    pub value2: i32,
    /// Whether the pity ceiling forced this result
    pub forced: bool,
}

/// Weighted roller with per-(actor, class) pity counters.
#[derive(Debug)]
pub struct AugmentRoller {
    catalog: Arc<EffectCatalog>,
    pity: DashMap<(ActorId, ItemClass), u32>,
    rng: Mutex<fastrand::Rng>,
}

impl AugmentRoller {
    /// Creates a roller over the given catalog.
    #[must_use]
    pub fn new(catalog: Arc<EffectCatalog>) -> Self {
        Self {
            catalog,
            pity: DashMap::new(),
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Creates a roller with a fixed RNG seed (deterministic rolls).
    #[must_use]
    pub fn with_seed(catalog: Arc<EffectCatalog>, seed: u64) -> Self {
        Self {
            catalog,
            pity: DashMap::new(),
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    /// Rolls one effect for an actor augmenting an item of the given
    /// class.
    ///
    /// The actor's pity counter for the class is incremented first; at
    /// the configured threshold the draw is forced uniformly from the
    /// enabled top-tier definitions (falling back to the next lower tier
    /// that has any). Any top-tier result, forced or natural, resets the
    /// counter to 0.
    ///
    /// A class with zero enabled definitions fails without touching the
    /// pity counter, so callers can surface the error before consuming
    /// anything.
    pub fn roll(&self, actor: ActorId, class: ItemClass) -> RollResult<RollOutcome> {
        let table = self.catalog.snapshot();
        let candidates: Vec<&EffectDefinition> = table.effects_for(class).collect();
        if candidates.is_empty() {
            return Err(RollError::NoAvailableEffects { class });
        }

        let threshold = table.pity_threshold();
        let count = {
            let mut entry = self.pity.entry((actor, class)).or_insert(0);
            *entry += 1;
            *entry
        };
        let forced = count >= threshold;

        let outcome = {
            let mut rng = self.rng.lock();
            let effect = if forced {
                Self::draw_ceiling(&candidates, &mut rng)
            } else {
                let weights: Vec<f64> = candidates.iter().map(|e| table.weight(e)).collect();
                Self::draw_weighted(&candidates, &weights, &mut rng)
            };
            let value1 = roll_value1(effect, &mut rng);
            let value2 = roll_value2(effect, &mut rng);
            RollOutcome {
                effect: effect.clone(),
                value1,
                value2,
                forced,
            }
        };

        if forced || outcome.effect.tier.is_ceiling() {
            self.pity.insert((actor, class), 0);
        }
        if forced {
            debug!(
                "Pity ceiling forced {} for actor {:?} on roll {}",
                outcome.effect.id, actor, count
            );
        }
        Ok(outcome)
    }

    /// Rolls remaining before the ceiling forces a top-tier result.
    #[must_use]
    pub fn pity_remaining(&self, actor: ActorId, class: ItemClass) -> u32 {
        let threshold = self.catalog.snapshot().pity_threshold();
        let count = self
            .pity
            .get(&(actor, class))
            .map(|entry| *entry)
            .unwrap_or(0);
        threshold.saturating_sub(count)
    }

    /// Resets one pity counter to 0.
    pub fn reset_pity(&self, actor: ActorId, class: ItemClass) {
        self.pity.remove(&(actor, class));
    }

    /// Drops all pity state for an actor (disconnect teardown).
    pub fn remove_actor(&self, actor: ActorId) {
        self.pity.retain(|(owner, _), _| *owner != actor);
    }

    /// Uniform draw over the ceiling tier, falling back tier by tier
    /// when the ceiling has no enabled candidates.
    fn draw_ceiling<'a>(
        candidates: &[&'a EffectDefinition],
        rng: &mut fastrand::Rng,
    ) -> &'a EffectDefinition {
        let mut tier = Some(RarityTier::Legendary);
        while let Some(t) = tier {
            let pool: Vec<&EffectDefinition> = candidates
                .iter()
                .copied()
                .filter(|e| e.tier == t)
                .collect();
            if !pool.is_empty() {
                return pool[rng.usize(..pool.len())];
            }
            tier = t.next_lower();
        }
        // Candidates are non-empty, so some tier always matched; this
        // arm is unreachable but keeps the scan total.
        candidates[0]
    }

    /// Cumulative weighted draw. If floating-point rounding leaves the
    /// draw at or past the total, the last candidate wins; the draw
    /// never fails.
    fn draw_weighted<'a>(
        candidates: &[&'a EffectDefinition],
        weights: &[f64],
        rng: &mut fastrand::Rng,
    ) -> &'a EffectDefinition {
        let total: f64 = weights.iter().sum();
        let draw = rng.f64() * total;
        let mut cumulative = 0.0;
        for (effect, weight) in candidates.iter().zip(weights) {
            cumulative += weight;
            if draw < cumulative {
                return effect;
            }
        }
        candidates[candidates.len() - 1]
    }
}

/// Rolls a primary magnitude inside the definition's continuous range.
fn roll_value1(effect: &EffectDefinition, rng: &mut fastrand::Rng) -> f64 {
    let range = effect.value1;
    if (range.max - range.min).abs() < f64::EPSILON {
        range.min
    } else {
        range.min + rng.f64() * (range.max - range.min)
    }
}

/// Rolls a secondary parameter inside the definition's integer range,
/// uniform inclusive.
fn roll_value2(effect: &EffectDefinition, rng: &mut fastrand::Rng) -> i32 {
    let range = effect.value2;
    if range.min == range.max {
        range.min
    } else {
        rng.i32(range.min..=range.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogConfig, EffectCategory};
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn roller_with(config: CatalogConfig, seed: u64) -> AugmentRoller {
        let catalog = Arc::new(EffectCatalog::from_config(config).expect("valid config"));
        AugmentRoller::with_seed(catalog, seed)
    }

    /// Standard config with the legendary tier made unreachable by
    /// weight, so only the ceiling can produce one.
    fn config_without_natural_legendary() -> CatalogConfig {
        let mut config = CatalogConfig::standard();
        config.tier_weights.legendary = 0.0;
        config
    }

    #[test]
    fn test_empty_class_is_an_error_and_leaves_pity_untouched() {
        let mut config = CatalogConfig::standard();
        config
            .effects
            .retain(|e| e.category != EffectCategory::Gather && e.category != EffectCategory::Universal);
        let roller = roller_with(config, 7);
        let actor = ActorId::from_raw(1);

        let before = roller.pity_remaining(actor, ItemClass::Gather);
        assert!(matches!(
            roller.roll(actor, ItemClass::Gather),
            Err(RollError::NoAvailableEffects {
                class: ItemClass::Gather
            })
        ));
        assert_eq!(roller.pity_remaining(actor, ItemClass::Gather), before);
    }

    #[test]
    fn test_pity_forces_on_exactly_the_threshold_roll() {
        let mut config = config_without_natural_legendary();
        config.pity_threshold = 25;
        let roller = roller_with(config, 11);
        let actor = ActorId::from_raw(2);

        for n in 1..25 {
            let outcome = roller.roll(actor, ItemClass::Offense).expect("rolls");
            assert!(!outcome.forced, "forced early on roll {n}");
            assert_ne!(outcome.effect.tier, RarityTier::Legendary);
        }
        let outcome = roller.roll(actor, ItemClass::Offense).expect("rolls");
        assert!(outcome.forced);
        assert_eq!(outcome.effect.tier, RarityTier::Legendary);

        // The counter reset: the next ceiling is exactly 25 rolls away.
        assert_eq!(roller.pity_remaining(actor, ItemClass::Offense), 25);
        for _ in 1..25 {
            let outcome = roller.roll(actor, ItemClass::Offense).expect("rolls");
            assert!(!outcome.forced);
        }
        assert!(roller
            .roll(actor, ItemClass::Offense)
            .expect("rolls")
            .forced);
    }

    #[test]
    fn test_natural_top_tier_resets_pity() {
        let mut config = CatalogConfig::standard();
        // Make legendary overwhelmingly likely.
        config.tier_weights = crate::catalog::TierWeights {
            common: 0.0,
            uncommon: 0.0,
            rare: 0.0,
            epic: 0.0,
            legendary: 1.0,
        };
        let roller = roller_with(config, 3);
        let actor = ActorId::from_raw(3);

        let outcome = roller.roll(actor, ItemClass::Offense).expect("rolls");
        assert!(!outcome.forced);
        assert_eq!(outcome.effect.tier, RarityTier::Legendary);
        let threshold = roller.catalog.snapshot().pity_threshold();
        assert_eq!(roller.pity_remaining(actor, ItemClass::Offense), threshold);
    }

    #[test]
    fn test_pity_counters_are_per_actor_and_per_class() {
        let mut config = config_without_natural_legendary();
        config.pity_threshold = 5;
        let roller = roller_with(config, 13);
        let a = ActorId::from_raw(10);
        let b = ActorId::from_raw(11);

        for _ in 0..4 {
            roller.roll(a, ItemClass::Offense).expect("rolls");
        }
        assert_eq!(roller.pity_remaining(a, ItemClass::Offense), 1);
        assert_eq!(roller.pity_remaining(a, ItemClass::Defense), 5);
        assert_eq!(roller.pity_remaining(b, ItemClass::Offense), 5);

        // The other actor's ceiling is unaffected by a's progress.
        assert!(!roller.roll(b, ItemClass::Offense).expect("rolls").forced);
        assert!(roller.roll(a, ItemClass::Offense).expect("rolls").forced);
    }

    #[test]
    fn test_ceiling_falls_back_when_top_tier_disabled() {
        let mut config = config_without_natural_legendary();
        config.pity_threshold = 1;
        for effect in &mut config.effects {
            if effect.tier == RarityTier::Legendary {
                effect.enabled = false;
            }
        }
        let roller = roller_with(config, 17);
        let actor = ActorId::from_raw(4);

        let outcome = roller.roll(actor, ItemClass::Offense).expect("rolls");
        assert!(outcome.forced);
        assert_eq!(outcome.effect.tier, RarityTier::Epic);
    }

    #[test]
    fn test_remove_actor_clears_pity() {
        let mut config = config_without_natural_legendary();
        config.pity_threshold = 10;
        let roller = roller_with(config, 19);
        let actor = ActorId::from_raw(5);

        for _ in 0..6 {
            roller.roll(actor, ItemClass::Defense).expect("rolls");
        }
        assert_eq!(roller.pity_remaining(actor, ItemClass::Defense), 4);
        roller.remove_actor(actor);
        assert_eq!(roller.pity_remaining(actor, ItemClass::Defense), 10);
    }

    #[test]
    fn test_tier_distribution_tracks_weights() {
        let roller = roller_with(CatalogConfig::standard(), 23);
        let actor = ActorId::from_raw(6);
        let table = roller.catalog.snapshot();

        let mut by_tier: HashMap<RarityTier, u32> = HashMap::new();
        let rolls = 40_000;
        for _ in 0..rolls {
            let outcome = roller.roll(actor, ItemClass::Offense).expect("rolls");
            *by_tier.entry(outcome.effect.tier).or_insert(0) += 1;
            // Keep the ceiling out of the sample.
            roller.reset_pity(actor, ItemClass::Offense);
        }

        let expected_total: f64 = table
            .effects_for(ItemClass::Offense)
            .map(|e| table.weight(e))
            .sum();
        for tier in [RarityTier::Common, RarityTier::Uncommon, RarityTier::Rare] {
            let tier_weight: f64 = table
                .effects_for(ItemClass::Offense)
                .filter(|e| e.tier == tier)
                .map(|e| table.weight(e))
                .sum();
            let expected = tier_weight / expected_total;
            let observed = f64::from(by_tier.get(&tier).copied().unwrap_or(0)) / f64::from(rolls);
            assert!(
                (observed - expected).abs() < 0.02,
                "{tier:?}: observed {observed:.4}, expected {expected:.4}"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_rolled_values_stay_in_range(seed in any::<u64>()) {
            let roller = roller_with(CatalogConfig::standard(), seed);
            let actor = ActorId::from_raw(100);
            for class in ItemClass::ALL {
                let outcome = roller.roll(actor, class).expect("rolls");
                prop_assert!(outcome.effect.value1.contains(outcome.value1));
                prop_assert!(outcome.effect.value2.contains(outcome.value2));
                prop_assert!(outcome.effect.category.applies_to(class));
            }
        }
    }
}

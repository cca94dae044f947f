//! Effect formula dispatch table.
//!
//! Every effect resolves through a pure formula registered here once at
//! construction time; adding an effect means adding a definition and a
//! registry entry, never editing a monolithic conditional. Formulas
//! mutate the action state and queue side-effect requests; they perform
//! no I/O and never touch collaborators directly.

use crate::catalog::{keys, EffectId, RarityTier};
use crate::runtime::ActorRuntime;
use ahash::AHashMap;
use arcanum_common::ActorId;
use serde::{Deserialize, Serialize};

/// Gameplay action categories that invoke effect formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    /// Outgoing hit from the actor's offense item.
    Offense,
    /// Incoming hit against the actor's defense items.
    Defense,
    /// Mining/chopping style resource gathering.
    Gather,
    /// Crop harvesting.
    Harvest,
    /// Fishing catch events.
    Catch,
    /// Experience gain from any source.
    Experience,
    /// Lethal-outcome interception, before the outcome is finalized.
    Lethal,
    /// Fixed-interval sweep for absence-triggered effects.
    Tick,
}

/// How multiple slot instances of one effect combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregation {
    /// Each slot instance rolls/fires independently.
    PerSlot,
    /// `value1` sums across slots and items; the formula runs once.
    /// `value2` is a parameter (threshold, window), so the largest
    /// instance wins rather than the sum.
    Summed,
    /// Contributions pool across the offense item and all defense items
    /// into one pass/fail critical check, computed before any formula
    /// side effect fires. The entry has no formula body of its own.
    CritPool,
}

/// What kind of activity earned bonus experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperienceKind {
    /// Combat kills and damage.
    Combat,
    /// Mining/chopping gathering.
    Gather,
    /// Crop harvesting.
    Harvest,
    /// Fishing.
    Fishing,
    /// Anything else.
    Generic,
}

/// A side effect the engine asks the host or a collaborator to perform.
///
/// Formulas only queue these; delivery happens after resolution so that
/// cross-item aggregation is complete before anything fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SideEffectRequest {
    /// Heal the acting actor.
    Heal {
        /// Amount of health to restore
        amount: f64,
    },
    /// Grant currency to the acting actor.
    GrantCurrency {
        /// Amount of currency
        amount: u64,
    },
    /// Send a text notification to the acting actor.
    Notify {
        /// Notification text
        text: String,
    },
    /// Play rarity-keyed feedback for the acting actor.
    Feedback {
        /// Rarity tier of the cue
        tier: RarityTier,
    },
    /// Grant bonus experience to the acting actor.
    BonusExperience {
        /// Activity that earned the bonus
        kind: ExperienceKind,
        /// Bonus amount
        amount: f64,
    },
    /// Give the acting actor a temporary speed burst.
    SpeedBurst {
        /// Speed increase in percent
        percent: f64,
        /// Burst duration in seconds
        duration: f64,
    },
    /// Slow another actor.
    SlowTarget {
        /// Actor to slow
        target: ActorId,
        /// Slow strength in percent
        percent: f64,
        /// Slow duration in seconds
        duration: f64,
    },
    /// Reflect damage back at an attacker.
    ReflectDamage {
        /// Actor to damage
        target: ActorId,
        /// Damage amount
        amount: f64,
    },
    /// Toggle the acting actor's stealth.
    Stealth {
        /// Whether stealth is now active
        active: bool,
    },
}

// ============================================================================
// Action state
// ============================================================================

/// Mutable state of an outgoing hit.
#[derive(Debug, Clone, PartialEq)]
pub struct OffenseState {
    /// Damage before any augment effects
    pub base_damage: f64,
    /// Running damage total
    pub damage: f64,
    /// Whether the hit is a ranged attack
    pub ranged: bool,
    /// Target actor, if the target is an actor
    pub target: Option<ActorId>,
    /// Target's health before the hit
    pub target_health: f64,
    /// Target's maximum health
    pub target_max_health: f64,
    /// Whether the pooled critical check passed
    pub critical: bool,
}

impl OffenseState {
    /// Creates hit state from base damage and target vitals.
    #[must_use]
    pub fn new(base_damage: f64, target_health: f64, target_max_health: f64) -> Self {
        Self {
            base_damage,
            damage: base_damage,
            ranged: false,
            target: None,
            target_health,
            target_max_health,
            critical: false,
        }
    }

    /// Marks the hit as ranged.
    #[must_use]
    pub fn ranged(mut self) -> Self {
        self.ranged = true;
        self
    }

    /// Sets the target actor.
    #[must_use]
    pub fn against(mut self, target: ActorId) -> Self {
        self.target = Some(target);
        self
    }

    /// Target's health as a fraction of maximum.
    #[must_use]
    pub fn target_health_fraction(&self) -> f64 {
        if self.target_max_health > 0.0 {
            (self.target_health / self.target_max_health).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Whether the running damage total would kill the target.
    #[must_use]
    pub fn killing_blow(&self) -> bool {
        self.damage >= self.target_health
    }
}

/// Mutable state of an incoming hit.
#[derive(Debug, Clone, PartialEq)]
pub struct DefenseState {
    /// Damage before any augment effects
    pub incoming: f64,
    /// Running damage total after mitigation
    pub damage: f64,
    /// Attacking actor, if known
    pub attacker: Option<ActorId>,
}

impl DefenseState {
    /// Creates incoming-hit state.
    #[must_use]
    pub fn new(incoming: f64) -> Self {
        Self {
            incoming,
            damage: incoming,
            attacker: None,
        }
    }

    /// Sets the attacking actor.
    #[must_use]
    pub fn from_attacker(mut self, attacker: ActorId) -> Self {
        self.attacker = Some(attacker);
        self
    }
}

/// Mutable state of a gathering action.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherState {
    /// Yield before any augment effects
    pub base_yield: u32,
    /// Running yield multiplier
    pub yield_multiplier: f64,
    /// Flat extra yield
    pub bonus_yield: u32,
    /// Gathering speed bonus in percent
    pub speed_bonus_percent: f64,
}

impl GatherState {
    /// Creates gathering state for a base yield.
    #[must_use]
    pub fn new(base_yield: u32) -> Self {
        Self {
            base_yield,
            yield_multiplier: 1.0,
            bonus_yield: 0,
            speed_bonus_percent: 0.0,
        }
    }

    /// Final yield after multiplier and flat bonuses.
    #[must_use]
    pub fn final_yield(&self) -> u32 {
        let multiplied = (f64::from(self.base_yield) * self.yield_multiplier).round();
        multiplied as u32 + self.bonus_yield
    }
}

/// Mutable state of a crop-harvest action.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestState {
    /// Yield before any augment effects
    pub base_yield: u32,
    /// Flat extra yield
    pub bonus_yield: u32,
    /// Whether the crop replants itself
    pub replant: bool,
}

impl HarvestState {
    /// Creates harvest state for a base yield.
    #[must_use]
    pub fn new(base_yield: u32) -> Self {
        Self {
            base_yield,
            bonus_yield: 0,
            replant: false,
        }
    }

    /// Final yield after bonuses.
    #[must_use]
    pub const fn final_yield(&self) -> u32 {
        self.base_yield + self.bonus_yield
    }
}

/// Mutable state of a fishing catch event.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchState {
    /// Wait time before any augment effects, in seconds
    pub base_wait: f64,
    /// Running wait time
    pub wait: f64,
}

impl CatchState {
    /// Creates catch state for a base wait.
    #[must_use]
    pub fn new(base_wait: f64) -> Self {
        Self {
            base_wait,
            wait: base_wait,
        }
    }
}

/// Mutable state of an experience gain.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceState {
    /// Amount before any augment effects
    pub base_amount: f64,
    /// Running amount
    pub amount: f64,
    /// Activity that produced the experience
    pub kind: ExperienceKind,
}

impl ExperienceState {
    /// Creates experience state.
    #[must_use]
    pub fn new(base_amount: f64, kind: ExperienceKind) -> Self {
        Self {
            base_amount,
            amount: base_amount,
            kind,
        }
    }
}

/// Mutable state of a lethal-outcome check.
#[derive(Debug, Clone, PartialEq)]
pub struct LethalState {
    /// Damage of the would-be-lethal hit
    pub incoming: f64,
    /// Actor health before the hit
    pub health: f64,
    /// Whether a revival effect intercepted the outcome
    pub survived: bool,
    /// Health the actor is left with when revived
    pub restored: f64,
}

impl LethalState {
    /// Creates lethal-check state.
    #[must_use]
    pub fn new(incoming: f64, health: f64) -> Self {
        Self {
            incoming,
            health,
            survived: false,
            restored: 0.0,
        }
    }
}

/// Mutable state of one actor's periodic sweep step.
#[derive(Debug, Clone, PartialEq)]
pub struct TickState {
    /// Seconds covered by this sweep step
    pub interval: f64,
    /// Healing accumulated this step
    pub healing: f64,
}

impl TickState {
    /// Creates tick state for a sweep interval.
    #[must_use]
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            healing: 0.0,
        }
    }
}

/// The action state a formula mutates, by trigger.
#[derive(Debug)]
pub enum ActionState<'a> {
    /// Outgoing hit.
    Offense(&'a mut OffenseState),
    /// Incoming hit.
    Defense(&'a mut DefenseState),
    /// Gathering.
    Gather(&'a mut GatherState),
    /// Harvesting.
    Harvest(&'a mut HarvestState),
    /// Fishing.
    Catch(&'a mut CatchState),
    /// Experience gain.
    Experience(&'a mut ExperienceState),
    /// Lethal check.
    Lethal(&'a mut LethalState),
    /// Periodic sweep.
    Tick(&'a mut TickState),
}

/// Everything one formula invocation sees.
pub struct FormulaCtx<'a, 'b> {
    /// Acting actor
    pub actor: ActorId,
    /// Effect id of the invoking slot (cooldown key)
    pub effect: &'a EffectId,
    /// Rolled (or summed) primary magnitude
    pub value1: f64,
    /// Rolled (or largest) secondary parameter
    pub value2: i32,
    /// Host-supplied monotonic seconds
    pub now: f64,
    /// Resolution RNG
    pub rng: &'a mut fastrand::Rng,
    /// Acting actor's runtime record
    pub runtime: &'a mut ActorRuntime,
    /// Action state for the trigger
    pub state: &'a mut ActionState<'b>,
    /// Side-effect accumulator
    pub requests: &'a mut Vec<SideEffectRequest>,
}

/// A pure effect formula.
pub type EffectFormula = fn(&mut FormulaCtx<'_, '_>);

/// One registered effect: its trigger, aggregation mode, and formula.
#[derive(Clone, Copy)]
pub struct FormulaEntry {
    /// Action category that invokes the formula
    pub trigger: Trigger,
    /// How slot instances combine
    pub aggregation: Aggregation,
    /// The formula body
    pub formula: EffectFormula,
}

impl std::fmt::Debug for FormulaEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormulaEntry")
            .field("trigger", &self.trigger)
            .field("aggregation", &self.aggregation)
            .finish_non_exhaustive()
    }
}

/// The effect-id-to-formula dispatch table.
#[derive(Debug, Default)]
pub struct FormulaRegistry {
    entries: AHashMap<EffectId, FormulaEntry>,
}

impl FormulaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a formula for an effect key. A later registration for
    /// the same key replaces the earlier one.
    pub fn register(
        &mut self,
        key: &str,
        trigger: Trigger,
        aggregation: Aggregation,
        formula: EffectFormula,
    ) {
        self.entries.insert(
            EffectId::new(key),
            FormulaEntry {
                trigger,
                aggregation,
                formula,
            },
        );
    }

    /// Looks up the entry for an effect id.
    #[must_use]
    pub fn get(&self, id: &EffectId) -> Option<&FormulaEntry> {
        self.entries.get(id)
    }

    /// Number of registered formulas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The standard registry covering the built-in effect table.
    #[must_use]
    pub fn standard() -> Self {
        use Aggregation::{CritPool, PerSlot, Summed};

        let mut registry = Self::new();
        // Offense
        registry.register(keys::KEEN_EDGE, Trigger::Offense, Summed, keen_edge);
        registry.register(keys::SAVAGE_STRIKE, Trigger::Offense, Summed, savage_strike);
        registry.register(keys::EXECUTIONER, Trigger::Offense, Summed, executioner);
        registry.register(keys::LONGSHOT, Trigger::Offense, Summed, longshot);
        registry.register(keys::REAPER_MARK, Trigger::Offense, Summed, reaper_mark);
        registry.register(keys::STORMFURY, Trigger::Offense, Summed, stormfury);
        registry.register(keys::ADRENALINE, Trigger::Offense, Summed, adrenaline);
        registry.register(keys::VAMPIRIC_EDGE, Trigger::Offense, PerSlot, vampiric_edge);
        registry.register(keys::BOUNTY_HUNTER, Trigger::Offense, PerSlot, bounty_hunter);
        registry.register(keys::FROST_EDGE, Trigger::Offense, PerSlot, frost_edge);
        // Defense
        registry.register(keys::IRON_BULWARK, Trigger::Defense, Summed, iron_bulwark);
        registry.register(keys::DEFLECTION, Trigger::Defense, Summed, deflection);
        registry.register(keys::THORNS, Trigger::Defense, PerSlot, thorns);
        registry.register(keys::AEGIS_BARRIER, Trigger::Defense, PerSlot, aegis_barrier);
        registry.register(keys::GUARDIAN_SPIRIT, Trigger::Lethal, PerSlot, guardian_spirit);
        registry.register(keys::SECOND_WIND, Trigger::Tick, Summed, second_wind);
        registry.register(keys::SHADOWMELD, Trigger::Tick, Summed, shadowmeld);
        // Gathering
        registry.register(keys::QUARRY_HASTE, Trigger::Gather, Summed, quarry_haste);
        registry.register(keys::PROSPECTOR, Trigger::Gather, PerSlot, prospector);
        registry.register(keys::GILDED_TOUCH, Trigger::Gather, PerSlot, gilded_touch);
        registry.register(keys::MOTHERLODE, Trigger::Gather, PerSlot, motherlode);
        registry.register(keys::GREEN_THUMB, Trigger::Harvest, PerSlot, green_thumb);
        registry.register(keys::ANGLERS_LUCK, Trigger::Catch, Summed, anglers_luck);
        registry.register(keys::TREASURE_LINE, Trigger::Catch, PerSlot, treasure_line);
        // Universal
        registry.register(
            keys::SCHOLARS_INSIGHT,
            Trigger::Experience,
            Summed,
            scholars_insight,
        );
        registry.register(keys::CRITICAL_FOCUS, Trigger::Offense, CritPool, no_formula);
        registry
    }
}

/// Rolls a percent chance.
fn roll_chance(rng: &mut fastrand::Rng, percent: i32) -> bool {
    if percent <= 0 {
        return false;
    }
    rng.f64() * 100.0 < f64::from(percent)
}

// ============================================================================
// Offense formulas
// ============================================================================

/// Target health fraction below which weakened-target bonuses apply.
const WEAKENED_FRACTION: f64 = 0.30;

/// Seconds a frost slow lasts.
const FROST_SLOW_DURATION: f64 = 3.0;

fn keen_edge(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    state.damage += ctx.value1;
}

fn savage_strike(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    state.damage += state.base_damage * ctx.value1 / 100.0;
}

fn executioner(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    if state.target_health_fraction() * 100.0 < f64::from(ctx.value2) {
        state.damage += state.base_damage * ctx.value1 / 100.0;
    }
}

fn longshot(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    if state.ranged {
        state.damage += state.base_damage * ctx.value1 / 100.0;
    }
}

fn reaper_mark(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    if state.target_health_fraction() < WEAKENED_FRACTION {
        state.damage += state.base_damage * ctx.value1 / 100.0;
    }
    if state.killing_blow() {
        ctx.requests.push(SideEffectRequest::Heal {
            amount: f64::from(ctx.value2),
        });
    }
}

fn stormfury(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    let stacks = ctx.runtime.push_combo(ctx.now, f64::from(ctx.value2));
    if stacks > 0 {
        state.damage += state.base_damage * ctx.value1 * f64::from(stacks) / 100.0;
    }
}

fn adrenaline(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    if state.killing_blow() {
        ctx.requests.push(SideEffectRequest::SpeedBurst {
            percent: ctx.value1,
            duration: f64::from(ctx.value2),
        });
    }
}

fn vampiric_edge(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    let amount = state.damage * ctx.value1 / 100.0;
    if amount > 0.0 {
        ctx.requests.push(SideEffectRequest::Heal { amount });
    }
}

fn bounty_hunter(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    if state.killing_blow() && roll_chance(ctx.rng, ctx.value2) {
        ctx.requests.push(SideEffectRequest::GrantCurrency {
            amount: ctx.value1.round().max(0.0) as u64,
        });
    }
}

fn frost_edge(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Offense(state) = &mut *ctx.state else {
        return;
    };
    let Some(target) = state.target else {
        return;
    };
    if roll_chance(ctx.rng, ctx.value2) {
        ctx.requests.push(SideEffectRequest::SlowTarget {
            target,
            percent: ctx.value1,
            duration: FROST_SLOW_DURATION,
        });
    }
}

// ============================================================================
// Defense formulas
// ============================================================================

/// Cap on summed percentage mitigation.
const MAX_DEFLECTION_PERCENT: f64 = 80.0;

fn iron_bulwark(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Defense(state) = &mut *ctx.state else {
        return;
    };
    state.damage = (state.damage - ctx.value1).max(0.0);
}

fn deflection(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Defense(state) = &mut *ctx.state else {
        return;
    };
    let percent = ctx.value1.min(MAX_DEFLECTION_PERCENT);
    state.damage = (state.damage - state.incoming * percent / 100.0).max(0.0);
}

fn thorns(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Defense(state) = &mut *ctx.state else {
        return;
    };
    let Some(attacker) = state.attacker else {
        return;
    };
    if roll_chance(ctx.rng, ctx.value2) {
        ctx.requests.push(SideEffectRequest::ReflectDamage {
            target: attacker,
            amount: state.incoming * ctx.value1 / 100.0,
        });
    }
}

fn aegis_barrier(ctx: &mut FormulaCtx<'_, '_>) {
    if !matches!(ctx.state, ActionState::Defense(_)) {
        return;
    }
    if roll_chance(ctx.rng, ctx.value2) {
        ctx.runtime.add_shield(ctx.value1);
    }
}

fn guardian_spirit(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Lethal(state) = &mut *ctx.state else {
        return;
    };
    if state.survived || !ctx.runtime.cooldown_ready(ctx.effect, ctx.now) {
        return;
    }
    state.survived = true;
    state.restored = ctx.value1;
    ctx.runtime
        .arm_cooldown(ctx.effect, ctx.now, f64::from(ctx.value2));
    ctx.requests.push(SideEffectRequest::Notify {
        text: "A guardian spirit pulls you back from the brink!".to_string(),
    });
}

fn second_wind(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Tick(state) = &mut *ctx.state else {
        return;
    };
    let eligible = ctx
        .runtime
        .seconds_unhurt(ctx.now)
        .map_or(true, |unhurt| unhurt >= f64::from(ctx.value2));
    if eligible {
        state.healing += ctx.value1 * state.interval;
    }
}

fn shadowmeld(ctx: &mut FormulaCtx<'_, '_>) {
    if !matches!(ctx.state, ActionState::Tick(_)) {
        return;
    }
    if ctx.runtime.stealthed {
        return;
    }
    let idle_long_enough = ctx
        .runtime
        .seconds_idle(ctx.now)
        .is_some_and(|idle| idle >= f64::from(ctx.value2));
    if idle_long_enough {
        ctx.runtime.stealthed = true;
        ctx.requests.push(SideEffectRequest::Stealth { active: true });
    }
}

// ============================================================================
// Gathering formulas
// ============================================================================

fn quarry_haste(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Gather(state) = &mut *ctx.state else {
        return;
    };
    state.speed_bonus_percent += ctx.value1;
}

fn prospector(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Gather(state) = &mut *ctx.state else {
        return;
    };
    if roll_chance(ctx.rng, ctx.value2) {
        state.yield_multiplier *= ctx.value1.max(1.0);
    }
}

fn gilded_touch(ctx: &mut FormulaCtx<'_, '_>) {
    if !matches!(ctx.state, ActionState::Gather(_)) {
        return;
    }
    if roll_chance(ctx.rng, ctx.value2) {
        ctx.requests.push(SideEffectRequest::GrantCurrency {
            amount: ctx.value1.round().max(0.0) as u64,
        });
    }
}

fn motherlode(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Gather(state) = &mut *ctx.state else {
        return;
    };
    if roll_chance(ctx.rng, ctx.value2) {
        state.yield_multiplier *= 3.0;
        ctx.requests.push(SideEffectRequest::GrantCurrency {
            amount: ctx.value1.round().max(0.0) as u64,
        });
    }
}

fn green_thumb(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Harvest(state) = &mut *ctx.state else {
        return;
    };
    if roll_chance(ctx.rng, ctx.value2) {
        state.bonus_yield += ctx.value1.round().max(0.0) as u32;
        state.replant = true;
    }
}

fn anglers_luck(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Catch(state) = &mut *ctx.state else {
        return;
    };
    state.wait = (state.wait - state.base_wait * ctx.value1 / 100.0).max(0.0);
}

fn treasure_line(ctx: &mut FormulaCtx<'_, '_>) {
    if !matches!(ctx.state, ActionState::Catch(_)) {
        return;
    }
    if roll_chance(ctx.rng, ctx.value2) {
        ctx.requests.push(SideEffectRequest::GrantCurrency {
            amount: ctx.value1.round().max(0.0) as u64,
        });
        ctx.requests.push(SideEffectRequest::Notify {
            text: "Something heavy is on the line — treasure!".to_string(),
        });
    }
}

// ============================================================================
// Universal formulas
// ============================================================================

fn scholars_insight(ctx: &mut FormulaCtx<'_, '_>) {
    let ActionState::Experience(state) = &mut *ctx.state else {
        return;
    };
    state.amount += state.base_amount * ctx.value1 / 100.0;
}

/// Placeholder body for pool-aggregated entries; the dispatcher computes
/// the pooled check itself.
fn no_formula(_ctx: &mut FormulaCtx<'_, '_>) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        entry_key: &str,
        value1: f64,
        value2: i32,
        state: &mut ActionState<'_>,
        runtime: &mut ActorRuntime,
        now: f64,
    ) -> Vec<SideEffectRequest> {
        let registry = FormulaRegistry::standard();
        let effect = EffectId::new(entry_key);
        let entry = registry.get(&effect).expect("registered");
        let mut rng = fastrand::Rng::with_seed(42);
        let mut requests = Vec::new();
        let mut ctx = FormulaCtx {
            actor: ActorId::from_raw(1),
            effect: &effect,
            value1,
            value2,
            now,
            rng: &mut rng,
            runtime,
            state,
            requests: &mut requests,
        };
        (entry.formula)(&mut ctx);
        requests
    }

    #[test]
    fn test_standard_registry_covers_standard_catalog() {
        let registry = FormulaRegistry::standard();
        let table = crate::catalog::CatalogTable::build(crate::catalog::CatalogConfig::standard())
            .expect("valid config");
        for class in crate::catalog::ItemClass::ALL {
            for effect in table.effects_for(class) {
                assert!(
                    registry.get(&effect.id).is_some(),
                    "no formula registered for {}",
                    effect.id
                );
            }
        }
    }

    #[test]
    fn test_keen_edge_adds_flat_damage() {
        let mut state = OffenseState::new(10.0, 100.0, 100.0);
        let mut runtime = ActorRuntime::default();
        run(
            keys::KEEN_EDGE,
            3.0,
            0,
            &mut ActionState::Offense(&mut state),
            &mut runtime,
            0.0,
        );
        assert!((state.damage - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_executioner_only_below_threshold() {
        let mut runtime = ActorRuntime::default();

        let mut healthy = OffenseState::new(10.0, 90.0, 100.0);
        run(
            keys::EXECUTIONER,
            20.0,
            30,
            &mut ActionState::Offense(&mut healthy),
            &mut runtime,
            0.0,
        );
        assert!((healthy.damage - 10.0).abs() < 1e-9);

        let mut weakened = OffenseState::new(10.0, 20.0, 100.0);
        run(
            keys::EXECUTIONER,
            20.0,
            30,
            &mut ActionState::Offense(&mut weakened),
            &mut runtime,
            0.0,
        );
        assert!((weakened.damage - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_longshot_requires_ranged() {
        let mut runtime = ActorRuntime::default();

        let mut melee = OffenseState::new(10.0, 100.0, 100.0);
        run(
            keys::LONGSHOT,
            10.0,
            0,
            &mut ActionState::Offense(&mut melee),
            &mut runtime,
            0.0,
        );
        assert!((melee.damage - 10.0).abs() < 1e-9);

        let mut ranged = OffenseState::new(10.0, 100.0, 100.0).ranged();
        run(
            keys::LONGSHOT,
            10.0,
            0,
            &mut ActionState::Offense(&mut ranged),
            &mut runtime,
            0.0,
        );
        assert!((ranged.damage - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_stormfury_scales_with_prior_hits() {
        let mut runtime = ActorRuntime::default();

        let mut first = OffenseState::new(10.0, 100.0, 100.0);
        run(
            keys::STORMFURY,
            5.0,
            4,
            &mut ActionState::Offense(&mut first),
            &mut runtime,
            0.0,
        );
        assert!((first.damage - 10.0).abs() < 1e-9);

        let mut second = OffenseState::new(10.0, 100.0, 100.0);
        run(
            keys::STORMFURY,
            5.0,
            4,
            &mut ActionState::Offense(&mut second),
            &mut runtime,
            1.0,
        );
        assert!((second.damage - 10.5).abs() < 1e-9);

        // Stacks lapse outside the window.
        let mut later = OffenseState::new(10.0, 100.0, 100.0);
        run(
            keys::STORMFURY,
            5.0,
            4,
            &mut ActionState::Offense(&mut later),
            &mut runtime,
            60.0,
        );
        assert!((later.damage - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_vampiric_edge_requests_heal() {
        let mut state = OffenseState::new(20.0, 100.0, 100.0);
        let mut runtime = ActorRuntime::default();
        let requests = run(
            keys::VAMPIRIC_EDGE,
            5.0,
            0,
            &mut ActionState::Offense(&mut state),
            &mut runtime,
            0.0,
        );
        assert_eq!(
            requests,
            vec![SideEffectRequest::Heal { amount: 1.0 }]
        );
    }

    #[test]
    fn test_bounty_hunter_needs_killing_blow() {
        let mut runtime = ActorRuntime::default();

        let mut survivor = OffenseState::new(5.0, 100.0, 100.0);
        let requests = run(
            keys::BOUNTY_HUNTER,
            10.0,
            100,
            &mut ActionState::Offense(&mut survivor),
            &mut runtime,
            0.0,
        );
        assert!(requests.is_empty());

        let mut lethal = OffenseState::new(5.0, 3.0, 100.0);
        let requests = run(
            keys::BOUNTY_HUNTER,
            10.0,
            100,
            &mut ActionState::Offense(&mut lethal),
            &mut runtime,
            0.0,
        );
        assert_eq!(
            requests,
            vec![SideEffectRequest::GrantCurrency { amount: 10 }]
        );
    }

    #[test]
    fn test_mitigation_formulas() {
        let mut runtime = ActorRuntime::default();

        let mut state = DefenseState::new(20.0);
        run(
            keys::IRON_BULWARK,
            3.0,
            0,
            &mut ActionState::Defense(&mut state),
            &mut runtime,
            0.0,
        );
        assert!((state.damage - 17.0).abs() < 1e-9);

        run(
            keys::DEFLECTION,
            10.0,
            0,
            &mut ActionState::Defense(&mut state),
            &mut runtime,
            0.0,
        );
        assert!((state.damage - 15.0).abs() < 1e-9);

        // Over-capped percent mitigation never drops damage below zero.
        let mut small = DefenseState::new(1.0);
        run(
            keys::IRON_BULWARK,
            5.0,
            0,
            &mut ActionState::Defense(&mut small),
            &mut runtime,
            0.0,
        );
        assert!(small.damage.abs() < 1e-9);
    }

    #[test]
    fn test_thorns_reflects_to_attacker_only() {
        let mut runtime = ActorRuntime::default();
        let attacker = ActorId::from_raw(77);

        let mut anonymous = DefenseState::new(10.0);
        let requests = run(
            keys::THORNS,
            50.0,
            100,
            &mut ActionState::Defense(&mut anonymous),
            &mut runtime,
            0.0,
        );
        assert!(requests.is_empty());

        let mut known = DefenseState::new(10.0).from_attacker(attacker);
        let requests = run(
            keys::THORNS,
            50.0,
            100,
            &mut ActionState::Defense(&mut known),
            &mut runtime,
            0.0,
        );
        assert_eq!(
            requests,
            vec![SideEffectRequest::ReflectDamage {
                target: attacker,
                amount: 5.0
            }]
        );
    }

    #[test]
    fn test_guardian_spirit_respects_cooldown() {
        let mut runtime = ActorRuntime::default();

        let mut first = LethalState::new(50.0, 10.0);
        run(
            keys::GUARDIAN_SPIRIT,
            4.0,
            90,
            &mut ActionState::Lethal(&mut first),
            &mut runtime,
            0.0,
        );
        assert!(first.survived);
        assert!((first.restored - 4.0).abs() < 1e-9);

        // A second lethal hit inside the cooldown is not intercepted.
        let mut second = LethalState::new(50.0, 4.0);
        run(
            keys::GUARDIAN_SPIRIT,
            4.0,
            90,
            &mut ActionState::Lethal(&mut second),
            &mut runtime,
            30.0,
        );
        assert!(!second.survived);

        // After the cooldown it fires again.
        let mut third = LethalState::new(50.0, 4.0);
        run(
            keys::GUARDIAN_SPIRIT,
            4.0,
            90,
            &mut ActionState::Lethal(&mut third),
            &mut runtime,
            120.0,
        );
        assert!(third.survived);
    }

    #[test]
    fn test_second_wind_waits_out_the_unhurt_window() {
        let mut runtime = ActorRuntime::default();
        runtime.note_damaged(100.0);

        let mut early = TickState::new(1.0);
        run(
            keys::SECOND_WIND,
            2.0,
            8,
            &mut ActionState::Tick(&mut early),
            &mut runtime,
            104.0,
        );
        assert!(early.healing.abs() < 1e-9);

        let mut later = TickState::new(1.0);
        run(
            keys::SECOND_WIND,
            2.0,
            8,
            &mut ActionState::Tick(&mut later),
            &mut runtime,
            109.0,
        );
        assert!((later.healing - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_shadowmeld_requires_idle_baseline() {
        let mut runtime = ActorRuntime::default();

        // No recorded activity: no baseline, no stealth.
        let mut state = TickState::new(1.0);
        let requests = run(
            keys::SHADOWMELD,
            1.0,
            8,
            &mut ActionState::Tick(&mut state),
            &mut runtime,
            50.0,
        );
        assert!(requests.is_empty());
        assert!(!runtime.stealthed);

        runtime.note_attack(100.0);
        let mut state = TickState::new(1.0);
        let requests = run(
            keys::SHADOWMELD,
            1.0,
            8,
            &mut ActionState::Tick(&mut state),
            &mut runtime,
            109.0,
        );
        assert_eq!(requests, vec![SideEffectRequest::Stealth { active: true }]);
        assert!(runtime.stealthed);
    }

    #[test]
    fn test_gather_yield_pipeline() {
        let mut runtime = ActorRuntime::default();
        let mut state = GatherState::new(3);
        run(
            keys::PROSPECTOR,
            2.0,
            100,
            &mut ActionState::Gather(&mut state),
            &mut runtime,
            0.0,
        );
        run(
            keys::QUARRY_HASTE,
            10.0,
            0,
            &mut ActionState::Gather(&mut state),
            &mut runtime,
            0.0,
        );
        assert_eq!(state.final_yield(), 6);
        assert!((state.speed_bonus_percent - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_green_thumb_replants() {
        let mut runtime = ActorRuntime::default();
        let mut state = HarvestState::new(2);
        run(
            keys::GREEN_THUMB,
            2.0,
            100,
            &mut ActionState::Harvest(&mut state),
            &mut runtime,
            0.0,
        );
        assert_eq!(state.final_yield(), 4);
        assert!(state.replant);
    }

    #[test]
    fn test_anglers_luck_shortens_wait() {
        let mut runtime = ActorRuntime::default();
        let mut state = CatchState::new(10.0);
        run(
            keys::ANGLERS_LUCK,
            20.0,
            0,
            &mut ActionState::Catch(&mut state),
            &mut runtime,
            0.0,
        );
        assert!((state.wait - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_scholars_insight_scales_experience() {
        let mut runtime = ActorRuntime::default();
        let mut state = ExperienceState::new(50.0, ExperienceKind::Combat);
        run(
            keys::SCHOLARS_INSIGHT,
            10.0,
            0,
            &mut ActionState::Experience(&mut state),
            &mut runtime,
            0.0,
        );
        assert!((state.amount - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_chance_never_fires() {
        let mut rng = fastrand::Rng::with_seed(0);
        for _ in 0..100 {
            assert!(!roll_chance(&mut rng, 0));
        }
    }

    #[test]
    fn test_wrong_state_is_a_noop() {
        let mut runtime = ActorRuntime::default();
        let mut state = DefenseState::new(10.0);
        let requests = run(
            keys::KEEN_EDGE,
            5.0,
            0,
            &mut ActionState::Defense(&mut state),
            &mut runtime,
            0.0,
        );
        assert!(requests.is_empty());
        assert!((state.damage - 10.0).abs() < 1e-9);
    }
}

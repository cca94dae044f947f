//! Event-driven effect resolution across equipped items.
//!
//! For each gameplay action category the dispatcher reads the relevant
//! equipped items, collects their non-empty slot records in a stable
//! order (items in equip order, slot index ascending within each item),
//! and drives the matching formulas:
//!
//! - pool-aggregated entries (critical chance) are summed across the
//!   offense item and all defense items and decided with a single roll
//!   before anything else fires
//! - summed entries fold `value1` across all matching slots and run once
//! - per-slot entries roll independently for every slot instance
//!
//! Unknown or disabled effect ids on stored slots are skipped silently;
//! a stale record must never break resolution of the remaining slots.

use crate::catalog::{CatalogTable, EffectCatalog, EffectId, RarityTier};
use crate::formula::{
    ActionState, Aggregation, CatchState, DefenseState, ExperienceState, FormulaCtx,
    FormulaEntry, FormulaRegistry, GatherState, HarvestState, LethalState, OffenseState,
    SideEffectRequest, TickState, Trigger,
};
use crate::runtime::ActorRuntimeMap;
use crate::slots::{ItemStore, SlotStore};
use arcanum_common::{ActorId, ItemHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Damage multiplier applied when the pooled critical check passes.
pub const CRIT_MULTIPLIER: f64 = 1.5;

/// Snapshot of an actor's equipped items, supplied by the host per
/// action. Defense items are in equip order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquippedItems {
    /// The active offense item, if any
    pub offense: Option<ItemHandle>,
    /// All worn defense items, in equip order
    pub defense: Vec<ItemHandle>,
    /// The active gathering item, if any
    pub gather: Option<ItemHandle>,
}

impl EquippedItems {
    /// No equipment.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the active offense item.
    #[must_use]
    pub fn with_offense(mut self, item: ItemHandle) -> Self {
        self.offense = Some(item);
        self
    }

    /// Adds a worn defense item.
    #[must_use]
    pub fn with_defense(mut self, item: ItemHandle) -> Self {
        self.defense.push(item);
        self
    }

    /// Sets the active gathering item.
    #[must_use]
    pub fn with_gather(mut self, item: ItemHandle) -> Self {
        self.gather = Some(item);
        self
    }

    /// Every equipped item, in stable order.
    fn all(&self) -> Vec<ItemHandle> {
        let mut items = Vec::with_capacity(2 + self.defense.len());
        if let Some(item) = self.offense {
            items.push(item);
        }
        items.extend(self.defense.iter().copied());
        if let Some(item) = self.gather {
            items.push(item);
        }
        items
    }
}

// ============================================================================
// Collaborator contracts
// ============================================================================

/// Currency ledger collaborator.
pub trait CurrencyLedger {
    /// Grants currency to an actor.
    fn grant(&mut self, actor: ActorId, amount: u64);
}

/// Text notification collaborator.
pub trait Notifier {
    /// Sends a text notification to an actor.
    fn notify(&mut self, actor: ActorId, text: &str);
}

/// Sound/visual feedback collaborator, keyed by rarity tier.
pub trait FeedbackSink {
    /// Plays the cue for a rarity tier.
    fn play_feedback(&mut self, actor: ActorId, tier: RarityTier);
}

/// Bonus experience collaborator.
pub trait ExperienceGranter {
    /// Grants bonus experience of a given kind.
    fn grant_bonus_experience(
        &mut self,
        actor: ActorId,
        kind: crate::formula::ExperienceKind,
        amount: f64,
    );
}

/// The collaborator bundle side effects are delivered to.
pub struct Collaborators<'a> {
    /// Currency ledger
    pub currency: &'a mut dyn CurrencyLedger,
    /// Notifications
    pub notifier: &'a mut dyn Notifier,
    /// Rarity feedback cues
    pub feedback: &'a mut dyn FeedbackSink,
    /// Bonus experience
    pub experience: &'a mut dyn ExperienceGranter,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Resolved outgoing hit.
#[derive(Debug, Clone, PartialEq)]
pub struct OffenseOutcome {
    /// Final damage
    pub damage: f64,
    /// Whether the pooled critical check passed
    pub critical: bool,
    /// Whether the final damage kills the target
    pub killing_blow: bool,
    /// Side effects to deliver
    pub requests: Vec<SideEffectRequest>,
}

/// Resolved incoming hit.
#[derive(Debug, Clone, PartialEq)]
pub struct DefenseOutcome {
    /// Final damage after mitigation and shield
    pub damage: f64,
    /// Damage eaten by the absorb shield
    pub absorbed: f64,
    /// Side effects to deliver
    pub requests: Vec<SideEffectRequest>,
}

/// Resolved gathering action.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherOutcome {
    /// Final yield
    pub yield_amount: u32,
    /// Gathering speed bonus in percent
    pub speed_bonus_percent: f64,
    /// Side effects to deliver
    pub requests: Vec<SideEffectRequest>,
}

/// Resolved harvest action.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestOutcome {
    /// Final yield
    pub yield_amount: u32,
    /// Whether the crop replants itself
    pub replant: bool,
    /// Side effects to deliver
    pub requests: Vec<SideEffectRequest>,
}

/// Resolved fishing catch event.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchOutcome {
    /// Final wait time in seconds
    pub wait: f64,
    /// Side effects to deliver
    pub requests: Vec<SideEffectRequest>,
}

/// Resolved experience gain.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceOutcome {
    /// Final amount including bonuses
    pub amount: f64,
    /// Side effects to deliver
    pub requests: Vec<SideEffectRequest>,
}

/// Resolved lethal-outcome check.
#[derive(Debug, Clone, PartialEq)]
pub struct LethalOutcome {
    /// Whether a revival effect intercepted the death
    pub survived: bool,
    /// Health the actor is left with when revived
    pub restored: f64,
    /// Side effects to deliver
    pub requests: Vec<SideEffectRequest>,
}

/// One actor's periodic sweep result.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Healing accumulated this sweep step
    pub healing: f64,
    /// Side effects to deliver
    pub requests: Vec<SideEffectRequest>,
}

/// One active slot record paired with its registry entry.
struct ActiveEffect {
    effect: EffectId,
    value1: f64,
    value2: i32,
    entry: FormulaEntry,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// The effect-resolution dispatcher.
///
/// Owns the per-actor runtime map and the resolution RNG; reads slot
/// state fresh from the item store on every action (no cached copies).
#[derive(Debug)]
pub struct EffectResolutionDispatcher {
    catalog: Arc<EffectCatalog>,
    registry: FormulaRegistry,
    slots: SlotStore,
    runtime: ActorRuntimeMap,
    rng: Mutex<fastrand::Rng>,
}

impl EffectResolutionDispatcher {
    /// Creates a dispatcher with the standard formula registry.
    #[must_use]
    pub fn new(catalog: Arc<EffectCatalog>) -> Self {
        Self::with_registry(catalog, FormulaRegistry::standard())
    }

    /// Creates a dispatcher with a custom formula registry.
    #[must_use]
    pub fn with_registry(catalog: Arc<EffectCatalog>, registry: FormulaRegistry) -> Self {
        Self {
            catalog,
            registry,
            slots: SlotStore::new(),
            runtime: ActorRuntimeMap::new(),
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Creates a dispatcher with a fixed RNG seed (deterministic procs).
    #[must_use]
    pub fn with_seed(catalog: Arc<EffectCatalog>, seed: u64) -> Self {
        let mut dispatcher = Self::new(catalog);
        dispatcher.rng = Mutex::new(fastrand::Rng::with_seed(seed));
        dispatcher
    }

    /// The per-actor runtime map.
    #[must_use]
    pub fn runtime(&self) -> &ActorRuntimeMap {
        &self.runtime
    }

    /// Drops all runtime state for an actor (disconnect teardown).
    pub fn remove_actor(&self, actor: ActorId) {
        self.runtime.remove_actor(actor);
    }

    /// Resolves an outgoing hit from the actor's offense item.
    ///
    /// The pooled critical chance spans the offense item and all defense
    /// items; when it passes, the multiplier applies once, after
    /// magnitude stacking and before proc effects see the damage.
    pub fn resolve_offense<S: ItemStore>(
        &self,
        store: &S,
        actor: ActorId,
        equipped: &EquippedItems,
        mut state: OffenseState,
        now: f64,
    ) -> OffenseOutcome {
        let table = self.catalog.snapshot();
        let offense_items: Vec<ItemHandle> = equipped.offense.into_iter().collect();
        let active = self.collect(store, &offense_items, &table, Trigger::Offense);

        let mut crit_items = offense_items.clone();
        crit_items.extend(equipped.defense.iter().copied());
        let crit_pool = self.pooled_value1(store, &crit_items, &table, Trigger::Offense);

        let mut requests = Vec::new();
        let mut rng = self.rng.lock();
        state.critical = crit_pool > 0.0 && rng.f64() * 100.0 < crit_pool;

        self.runtime.with_mut(actor, |runtime| {
            runtime.note_attack(now);
            let mut action = ActionState::Offense(&mut state);
            run_summed(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
            if let ActionState::Offense(state) = &mut action {
                if state.critical {
                    state.damage *= CRIT_MULTIPLIER;
                }
            }
            run_per_slot(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
        });

        OffenseOutcome {
            damage: state.damage,
            critical: state.critical,
            killing_blow: state.killing_blow(),
            requests,
        }
    }

    /// Resolves an incoming hit against the actor's defense items.
    ///
    /// Summed mitigation applies first, then the existing absorb shield,
    /// then per-slot procs (a shield gained from a proc protects future
    /// hits, not this one).
    pub fn resolve_defense<S: ItemStore>(
        &self,
        store: &S,
        actor: ActorId,
        equipped: &EquippedItems,
        mut state: DefenseState,
        now: f64,
    ) -> DefenseOutcome {
        let table = self.catalog.snapshot();
        let active = self.collect(store, &equipped.defense, &table, Trigger::Defense);

        let mut requests = Vec::new();
        let mut rng = self.rng.lock();
        let mut absorbed = 0.0;

        self.runtime.with_mut(actor, |runtime| {
            runtime.note_damaged(now);
            let mut action = ActionState::Defense(&mut state);
            run_summed(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
            if let ActionState::Defense(state) = &mut action {
                absorbed = runtime.absorb(state.damage);
                state.damage -= absorbed;
            }
            run_per_slot(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
        });

        DefenseOutcome {
            damage: state.damage,
            absorbed,
            requests,
        }
    }

    /// Resolves a gathering action with the active gathering item.
    pub fn resolve_gather<S: ItemStore>(
        &self,
        store: &S,
        actor: ActorId,
        equipped: &EquippedItems,
        mut state: GatherState,
        now: f64,
    ) -> GatherOutcome {
        let mut requests = Vec::new();
        self.resolve_gather_trigger(
            store,
            actor,
            equipped,
            &mut ActionState::Gather(&mut state),
            Trigger::Gather,
            now,
            &mut requests,
        );
        GatherOutcome {
            yield_amount: state.final_yield(),
            speed_bonus_percent: state.speed_bonus_percent,
            requests,
        }
    }

    /// Resolves a crop-harvest action with the active gathering item.
    pub fn resolve_harvest<S: ItemStore>(
        &self,
        store: &S,
        actor: ActorId,
        equipped: &EquippedItems,
        mut state: HarvestState,
        now: f64,
    ) -> HarvestOutcome {
        let mut requests = Vec::new();
        self.resolve_gather_trigger(
            store,
            actor,
            equipped,
            &mut ActionState::Harvest(&mut state),
            Trigger::Harvest,
            now,
            &mut requests,
        );
        HarvestOutcome {
            yield_amount: state.final_yield(),
            replant: state.replant,
            requests,
        }
    }

    /// Resolves a fishing catch event with the active gathering item.
    pub fn resolve_catch<S: ItemStore>(
        &self,
        store: &S,
        actor: ActorId,
        equipped: &EquippedItems,
        mut state: CatchState,
        now: f64,
    ) -> CatchOutcome {
        let mut requests = Vec::new();
        self.resolve_gather_trigger(
            store,
            actor,
            equipped,
            &mut ActionState::Catch(&mut state),
            Trigger::Catch,
            now,
            &mut requests,
        );
        CatchOutcome {
            wait: state.wait,
            requests,
        }
    }

    /// Resolves an experience gain across every equipped item.
    ///
    /// The earned bonus (anything above the base amount) is also queued
    /// as a [`SideEffectRequest::BonusExperience`] for the collaborator.
    pub fn resolve_experience<S: ItemStore>(
        &self,
        store: &S,
        actor: ActorId,
        equipped: &EquippedItems,
        mut state: ExperienceState,
        now: f64,
    ) -> ExperienceOutcome {
        let table = self.catalog.snapshot();
        let active = self.collect(store, &equipped.all(), &table, Trigger::Experience);

        let mut requests = Vec::new();
        let mut rng = self.rng.lock();
        self.runtime.with_mut(actor, |runtime| {
            let mut action = ActionState::Experience(&mut state);
            run_summed(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
            run_per_slot(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
        });

        let bonus = state.amount - state.base_amount;
        if bonus > 0.0 {
            requests.push(SideEffectRequest::BonusExperience {
                kind: state.kind,
                amount: bonus,
            });
        }
        ExperienceOutcome {
            amount: state.amount,
            requests,
        }
    }

    /// Intercepts a lethal outcome before it is finalized.
    ///
    /// Revival effects on the actor's defense items run here; when one
    /// triggers, the outcome reports survival and the health to restore.
    pub fn resolve_lethal<S: ItemStore>(
        &self,
        store: &S,
        actor: ActorId,
        equipped: &EquippedItems,
        mut state: LethalState,
        now: f64,
    ) -> LethalOutcome {
        let table = self.catalog.snapshot();
        let active = self.collect(store, &equipped.defense, &table, Trigger::Lethal);

        let mut requests = Vec::new();
        let mut rng = self.rng.lock();
        self.runtime.with_mut(actor, |runtime| {
            let mut action = ActionState::Lethal(&mut state);
            run_summed(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
            run_per_slot(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
        });

        LethalOutcome {
            survived: state.survived,
            restored: state.restored,
            requests,
        }
    }

    /// One actor's step of the fixed-interval sweep.
    ///
    /// Absence-triggered effects (idle regeneration, idle stealth) are
    /// evaluated here rather than on any triggering action, since their
    /// activation condition is the lack of events.
    pub fn tick<S: ItemStore>(
        &self,
        store: &S,
        actor: ActorId,
        equipped: &EquippedItems,
        interval: f64,
        now: f64,
    ) -> TickOutcome {
        let table = self.catalog.snapshot();
        let active = self.collect(store, &equipped.all(), &table, Trigger::Tick);

        let mut state = TickState::new(interval);
        let mut requests = Vec::new();
        let mut rng = self.rng.lock();
        self.runtime.with_mut(actor, |runtime| {
            let mut action = ActionState::Tick(&mut state);
            run_summed(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
            run_per_slot(&active, actor, now, &mut rng, runtime, &mut action, &mut requests);
        });

        TickOutcome {
            healing: state.healing,
            requests,
        }
    }

    /// Sweeps every listed actor once.
    pub fn tick_all<S: ItemStore>(
        &self,
        store: &S,
        actors: &[(ActorId, EquippedItems)],
        interval: f64,
        now: f64,
    ) -> Vec<(ActorId, TickOutcome)> {
        actors
            .iter()
            .map(|(actor, equipped)| {
                (*actor, self.tick(store, *actor, equipped, interval, now))
            })
            .collect()
    }

    /// Delivers collaborator-bound side effects and returns the rest
    /// (heals, movement, stealth) for the host to apply.
    pub fn deliver(
        &self,
        actor: ActorId,
        requests: Vec<SideEffectRequest>,
        collaborators: &mut Collaborators<'_>,
    ) -> Vec<SideEffectRequest> {
        let mut host_requests = Vec::new();
        for request in requests {
            match request {
                SideEffectRequest::GrantCurrency { amount } => {
                    collaborators.currency.grant(actor, amount);
                }
                SideEffectRequest::Notify { text } => {
                    collaborators.notifier.notify(actor, &text);
                }
                SideEffectRequest::Feedback { tier } => {
                    collaborators.feedback.play_feedback(actor, tier);
                }
                SideEffectRequest::BonusExperience { kind, amount } => {
                    collaborators
                        .experience
                        .grant_bonus_experience(actor, kind, amount);
                }
                other => host_requests.push(other),
            }
        }
        host_requests
    }

    /// Shared driver for the three gather-item triggers.
    #[allow(clippy::too_many_arguments)]
    fn resolve_gather_trigger<S: ItemStore>(
        &self,
        store: &S,
        actor: ActorId,
        equipped: &EquippedItems,
        action: &mut ActionState<'_>,
        trigger: Trigger,
        now: f64,
        requests: &mut Vec<SideEffectRequest>,
    ) {
        let table = self.catalog.snapshot();
        let gather_items: Vec<ItemHandle> = equipped.gather.into_iter().collect();
        let active = self.collect(store, &gather_items, &table, trigger);

        let mut rng = self.rng.lock();
        self.runtime.with_mut(actor, |runtime| {
            run_summed(&active, actor, now, &mut rng, runtime, action, requests);
            run_per_slot(&active, actor, now, &mut rng, runtime, action, requests);
        });
    }

    /// Collects active records for a trigger from the given items, in
    /// stable order. Unknown, disabled, and unregistered effect ids are
    /// skipped; a damaged blob skips that item only.
    fn collect<S: ItemStore>(
        &self,
        store: &S,
        items: &[ItemHandle],
        table: &CatalogTable,
        trigger: Trigger,
    ) -> Vec<ActiveEffect> {
        let mut active = Vec::new();
        for item in items {
            let state = match self.slots.state(store, *item) {
                Ok(state) => state,
                Err(e) => {
                    debug!("Skipping item {:?} during resolution: {}", item, e);
                    continue;
                }
            };
            for slot in state.slots() {
                let Some(effect) = &slot.effect else {
                    continue;
                };
                let Some(definition) = table.get(effect) else {
                    debug!("Skipping unknown effect {} on {:?}", effect, item);
                    continue;
                };
                if !definition.enabled {
                    continue;
                }
                let Some(entry) = self.registry.get(effect) else {
                    debug!("Skipping effect {} with no formula", effect);
                    continue;
                };
                if entry.trigger != trigger {
                    continue;
                }
                active.push(ActiveEffect {
                    effect: effect.clone(),
                    value1: slot.value1,
                    value2: slot.value2,
                    entry: *entry,
                });
            }
        }
        active
    }

    /// Sums pool-aggregated `value1` for a trigger across the given
    /// items (the cross-item critical pool).
    fn pooled_value1<S: ItemStore>(
        &self,
        store: &S,
        items: &[ItemHandle],
        table: &CatalogTable,
        trigger: Trigger,
    ) -> f64 {
        self.collect(store, items, table, trigger)
            .iter()
            .filter(|a| a.entry.aggregation == Aggregation::CritPool)
            .map(|a| a.value1)
            .sum()
    }
}

/// Runs each summed entry once with `value1` folded across its
/// instances and the largest `value2`, in first-appearance order.
#[allow(clippy::too_many_arguments)]
fn run_summed(
    active: &[ActiveEffect],
    actor: ActorId,
    now: f64,
    rng: &mut fastrand::Rng,
    runtime: &mut crate::runtime::ActorRuntime,
    state: &mut ActionState<'_>,
    requests: &mut Vec<SideEffectRequest>,
) {
    let mut folded: Vec<(EffectId, f64, i32, FormulaEntry)> = Vec::new();
    for a in active {
        if a.entry.aggregation != Aggregation::Summed {
            continue;
        }
        match folded.iter_mut().find(|(id, ..)| *id == a.effect) {
            Some((_, value1, value2, _)) => {
                *value1 += a.value1;
                *value2 = (*value2).max(a.value2);
            }
            None => folded.push((a.effect.clone(), a.value1, a.value2, a.entry)),
        }
    }
    for (effect, value1, value2, entry) in &folded {
        let mut ctx = FormulaCtx {
            actor,
            effect,
            value1: *value1,
            value2: *value2,
            now,
            rng,
            runtime,
            state,
            requests,
        };
        (entry.formula)(&mut ctx);
    }
}

/// Runs each per-slot entry independently, in stable slot order.
#[allow(clippy::too_many_arguments)]
fn run_per_slot(
    active: &[ActiveEffect],
    actor: ActorId,
    now: f64,
    rng: &mut fastrand::Rng,
    runtime: &mut crate::runtime::ActorRuntime,
    state: &mut ActionState<'_>,
    requests: &mut Vec<SideEffectRequest>,
) {
    for a in active {
        if a.entry.aggregation != Aggregation::PerSlot {
            continue;
        }
        let mut ctx = FormulaCtx {
            actor,
            effect: &a.effect,
            value1: a.value1,
            value2: a.value2,
            now,
            rng,
            runtime,
            state,
            requests,
        };
        (a.entry.formula)(&mut ctx);
    }
}

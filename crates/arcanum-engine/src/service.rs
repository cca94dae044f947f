//! Augment application service.
//!
//! The facade the host calls when an actor uses an augment token on an
//! item: it validates compatibility, rolls through the pity-aware
//! roller, writes slots, and opens slot-selection sessions when the
//! item is full.
//!
//! The central invariant of the whole flow: every failure is detected
//! before any mutation and before the token is consumed. An actor never
//! loses a token without receiving an effect, and the token is consumed
//! exactly once per successful apply.

use crate::catalog::{EffectCatalog, EffectId, ItemClass, RarityTier};
use crate::codec::SlotRecord;
use crate::dispatch::{FeedbackSink, Notifier};
use crate::events::{EngineEvent, EventBus};
use crate::roller::{AugmentRoller, RollError, RollOutcome};
use crate::session::{SelectionSession, SessionMap, SessionState};
use crate::slots::{ItemStore, SlotError, SlotStore};
use arcanum_common::{ActorId, ItemHandle, TokenHandle};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Apply-flow error types.
///
/// Every variant is raised before any mutation and before the token is
/// consumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The handle does not refer to an augment token
    #[error("not an augment token")]
    NotAnAugmentToken,
    /// The token refers to a broken or unknown augment definition
    #[error("invalid augment definition")]
    InvalidAugmentDefinition,
    /// The target is not augmentable equipment
    #[error("invalid target item")]
    InvalidTargetItem,
    /// The token's class does not match the item's class
    #[error("a {token} augment cannot be applied to a {item} item")]
    IncompatibleItemForCategory {
        /// Token class
        token: ItemClass,
        /// Item class
        item: ItemClass,
    },
    /// The class has no enabled effect definitions
    #[error("no available effects for {class} items")]
    NoAvailableEffects {
        /// Class with no candidates
        class: ItemClass,
    },
    /// The actor has no pending slot selection
    #[error("no pending slot selection")]
    NoPendingSelection,
    /// The pending selection lapsed before the choice
    #[error("slot selection timed out")]
    SessionTimeout,
    /// The chosen slot index is outside the item's capacity
    #[error("invalid slot index {index}: capacity {capacity}")]
    InvalidSlotIndex {
        /// Chosen index
        index: usize,
        /// Capacity at session creation
        capacity: u8,
    },
    /// The item or token changed since the session was created
    #[error("the selection target changed; nothing was applied")]
    StaleSessionTarget,
}

impl From<RollError> for ApplyError {
    fn from(e: RollError) -> Self {
        match e {
            RollError::NoAvailableEffects { class } => Self::NoAvailableEffects { class },
        }
    }
}

impl From<SlotError> for ApplyError {
    fn from(e: SlotError) -> Self {
        match e {
            SlotError::InvalidIndex { index, capacity } => {
                Self::InvalidSlotIndex { index, capacity }
            }
            SlotError::Codec(_) => Self::InvalidTargetItem,
        }
    }
}

/// Result type for apply-flow operations.
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Host collaborator owning augment tokens.
pub trait TokenStore {
    /// Checks whether the handle refers to an augment token.
    fn is_augment(&self, token: TokenHandle) -> bool;

    /// The item class this augment targets, or `None` when the token's
    /// definition is broken or unknown.
    fn augment_class(&self, token: TokenHandle) -> Option<ItemClass>;

    /// A value that changes whenever the token's identity or stack
    /// changes. Used to detect stale selection-session targets.
    fn signature(&self, token: TokenHandle) -> u64;

    /// Consumes one unit of the token. The engine calls this exactly
    /// once per successful apply, after validation; `false` signals a
    /// desync (the apply is abandoned with nothing written).
    fn consume(&mut self, actor: ActorId, token: TokenHandle) -> bool;
}

/// A committed augment roll.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAugment {
    /// Rolled effect
    pub effect: EffectId,
    /// Rolled effect's rarity tier
    pub tier: RarityTier,
    /// Slot the roll was written to
    pub slot: usize,
    /// Rolled description, ready to show the actor
    pub description: String,
    /// Whether the pity ceiling forced the roll
    pub forced: bool,
    /// Description of the record this roll overwrote, if any
    pub replaced: Option<String>,
}

/// Successful outcome of [`AugmentService::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// A roll was committed into an empty slot
    Applied(AppliedAugment),
    /// Every slot is occupied; a selection session is now pending
    PendingSelection {
        /// Number of selectable slots
        capacity: u8,
        /// Description of each occupied slot
        slot_descriptions: Vec<String>,
    },
}

/// The augment application service.
#[derive(Debug)]
pub struct AugmentService {
    catalog: Arc<EffectCatalog>,
    roller: AugmentRoller,
    slots: SlotStore,
    sessions: SessionMap,
    events: EventBus,
}

impl AugmentService {
    /// Creates a service over the given catalog.
    #[must_use]
    pub fn new(catalog: Arc<EffectCatalog>) -> Self {
        let roller = AugmentRoller::new(Arc::clone(&catalog));
        Self::with_roller(catalog, roller)
    }

    /// Creates a service with a fixed roll seed (deterministic rolls).
    #[must_use]
    pub fn with_seed(catalog: Arc<EffectCatalog>, seed: u64) -> Self {
        let roller = AugmentRoller::with_seed(Arc::clone(&catalog), seed);
        Self::with_roller(catalog, roller)
    }

    fn with_roller(catalog: Arc<EffectCatalog>, roller: AugmentRoller) -> Self {
        Self {
            catalog,
            roller,
            slots: SlotStore::new(),
            sessions: SessionMap::new(),
            events: EventBus::default(),
        }
    }

    /// The engine event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The actor's pending selection session, if any.
    #[must_use]
    pub fn pending_session(&self, actor: ActorId) -> Option<SelectionSession> {
        self.sessions.get(actor)
    }

    /// Rolls remaining before the ceiling forces a top-tier result.
    #[must_use]
    pub fn pity_remaining(&self, actor: ActorId, class: ItemClass) -> u32 {
        self.roller.pity_remaining(actor, class)
    }

    /// All slot records of an item.
    pub fn get_slots<S: ItemStore>(
        &self,
        store: &S,
        item: ItemHandle,
    ) -> ApplyResult<Vec<SlotRecord>> {
        Ok(self.slots.get_slots(store, item)?)
    }

    /// Grows an item's capacity by one slot. Returns whether it grew.
    pub fn expand_capacity<S: ItemStore>(
        &self,
        store: &mut S,
        item: ItemHandle,
    ) -> ApplyResult<bool> {
        let grown = self.slots.expand_capacity(store, item)?;
        if grown {
            let capacity = self.slots.capacity(store, item)?;
            self.events
                .publish(EngineEvent::CapacityExpanded { item, capacity });
        }
        Ok(grown)
    }

    /// Applies an augment token to an item.
    ///
    /// With an empty slot available this rolls, writes the slot, and
    /// consumes the token. With every slot occupied it opens a selection
    /// session instead — nothing is rolled or consumed until the actor
    /// commits a choice through [`Self::select_slot`].
    pub fn apply<S, T, F>(
        &self,
        store: &mut S,
        tokens: &mut T,
        feedback: &mut F,
        actor: ActorId,
        item: ItemHandle,
        token: TokenHandle,
        now: f64,
    ) -> ApplyResult<ApplyOutcome>
    where
        S: ItemStore,
        T: TokenStore,
        F: FeedbackSink,
    {
        let class = self.validate_target(store, tokens, item, token)?;
        let mut state = self.slots.state(store, item)?;

        let Some(slot) = state.first_empty() else {
            let table = self.catalog.snapshot();
            let slot_descriptions = self.slots.slot_descriptions(store, item, &table)?;
            let session = SelectionSession::new(
                actor,
                item,
                store.signature(item),
                token,
                tokens.signature(token),
                state.capacity(),
                slot_descriptions.clone(),
                now,
                table.session_timeout(),
            );
            self.sessions.open(session);
            self.events.publish(EngineEvent::SelectionOpened {
                actor,
                item,
                capacity: state.capacity(),
            });
            debug!(
                "Item {:?} is full; opened slot selection for actor {:?}",
                item, actor
            );
            return Ok(ApplyOutcome::PendingSelection {
                capacity: state.capacity(),
                slot_descriptions,
            });
        };

        let roll = self.roller.roll(actor, class)?;
        if !tokens.consume(actor, token) {
            return Err(ApplyError::NotAnAugmentToken);
        }
        state.set_slot(
            slot,
            SlotRecord::filled(roll.effect.id.clone(), roll.value1, roll.value2),
        );
        self.slots.write_state(store, item, &state);

        let applied = self.report(actor, item, class, slot, &roll, None, feedback);
        Ok(ApplyOutcome::Applied(applied))
    }

    /// Commits a pending slot selection: re-validates the live item and
    /// token against the session snapshot, rolls now, overwrites the
    /// chosen slot, and consumes the token.
    pub fn select_slot<S, T, F>(
        &self,
        store: &mut S,
        tokens: &mut T,
        feedback: &mut F,
        actor: ActorId,
        index: usize,
        now: f64,
    ) -> ApplyResult<AppliedAugment>
    where
        S: ItemStore,
        T: TokenStore,
        F: FeedbackSink,
    {
        // A fumbled index keeps the session pending; the actor can pick
        // again.
        let pending = self
            .sessions
            .get(actor)
            .ok_or(ApplyError::NoPendingSelection)?;
        if !pending.index_in_range(index) {
            return Err(ApplyError::InvalidSlotIndex {
                index,
                capacity: pending.capacity,
            });
        }

        // Atomic commit point: whoever removes the session owns it, and
        // a concurrent expiry sweep loses the race here.
        let Some(mut session) = self.sessions.take(actor) else {
            return Err(ApplyError::NoPendingSelection);
        };
        if session.is_expired(now) {
            session.finish(SessionState::Expired);
            return Err(ApplyError::SessionTimeout);
        }
        if store.signature(session.item) != session.item_signature
            || tokens.signature(session.token) != session.token_signature
        {
            session.finish(SessionState::Cancelled);
            return Err(ApplyError::StaleSessionTarget);
        }

        let item = session.item;
        let token = session.token;
        let class = self.validate_target(store, tokens, item, token)?;
        let mut state = self.slots.state(store, item)?;
        if index >= state.capacity() as usize {
            return Err(ApplyError::InvalidSlotIndex {
                index,
                capacity: state.capacity(),
            });
        }

        // The roll happens at commit time, not at session creation, so a
        // cancelled or expired selection costs the actor nothing.
        let roll = self.roller.roll(actor, class)?;
        if !tokens.consume(actor, token) {
            return Err(ApplyError::NotAnAugmentToken);
        }
        let replaced = state
            .set_slot(
                index,
                SlotRecord::filled(roll.effect.id.clone(), roll.value1, roll.value2),
            )
            .and_then(|previous| {
                let effect = previous.effect?;
                Some(
                    self.catalog
                        .describe(&effect, previous.value1, previous.value2),
                )
            });
        self.slots.write_state(store, item, &state);

        session.finish(SessionState::Applied);
        self.events.publish(EngineEvent::SelectionResolved {
            actor,
            item,
            slot: index,
        });
        Ok(self.report(actor, item, class, index, &roll, replaced, feedback))
    }

    /// Cancels the actor's pending selection, if any. Returns whether a
    /// session was cancelled.
    pub fn cancel_session(&self, actor: ActorId) -> bool {
        match self.sessions.take(actor) {
            Some(mut session) => {
                session.finish(SessionState::Cancelled);
                debug!("Cancelled slot selection for actor {:?}", actor);
                true
            }
            None => false,
        }
    }

    /// Expires every lapsed session, notifying each affected actor.
    /// Returns the number of sessions expired.
    ///
    /// The host schedules this sweep independently of the tick loop; a
    /// selection racing the sweep is decided by whoever removes the
    /// session first.
    pub fn expire_sessions<N: Notifier>(&self, now: f64, notifier: &mut N) -> usize {
        let expired = self.sessions.expire_due(now);
        for session in &expired {
            notifier.notify(
                session.actor,
                "Your augment slot selection timed out; the token was not used.",
            );
            self.events.publish(EngineEvent::SessionExpired {
                actor: session.actor,
                item: session.item,
            });
        }
        expired.len()
    }

    /// Drops all service-owned state for an actor (disconnect teardown).
    pub fn remove_actor(&self, actor: ActorId) {
        self.cancel_session(actor);
        self.roller.remove_actor(actor);
    }

    /// Fail-closed validation shared by both apply paths: every check
    /// runs before any mutation or consumption.
    fn validate_target<S: ItemStore, T: TokenStore>(
        &self,
        store: &S,
        tokens: &T,
        item: ItemHandle,
        token: TokenHandle,
    ) -> ApplyResult<ItemClass> {
        if !tokens.is_augment(token) {
            return Err(ApplyError::NotAnAugmentToken);
        }
        let token_class = tokens
            .augment_class(token)
            .ok_or(ApplyError::InvalidAugmentDefinition)?;
        let item_class = store
            .item_class(item)
            .ok_or(ApplyError::InvalidTargetItem)?;
        if token_class != item_class {
            return Err(ApplyError::IncompatibleItemForCategory {
                token: token_class,
                item: item_class,
            });
        }
        Ok(item_class)
    }

    /// Publishes success events, plays the rarity cue, and builds the
    /// caller's report.
    fn report<F: FeedbackSink>(
        &self,
        actor: ActorId,
        item: ItemHandle,
        class: ItemClass,
        slot: usize,
        roll: &RollOutcome,
        replaced: Option<String>,
        feedback: &mut F,
    ) -> AppliedAugment {
        let description = self
            .catalog
            .describe(&roll.effect.id, roll.value1, roll.value2);
        info!(
            "Actor {:?} rolled {} ({}) into slot {} of {:?}",
            actor,
            roll.effect.id,
            roll.effect.tier.display_name(),
            slot,
            item
        );
        self.events.publish(EngineEvent::AugmentApplied {
            actor,
            item,
            effect: roll.effect.id.clone(),
            tier: roll.effect.tier,
            slot,
            forced: roll.forced,
        });
        if roll.forced {
            self.events
                .publish(EngineEvent::PityTriggered { actor, class });
        }
        feedback.play_feedback(actor, roll.effect.tier);
        AppliedAugment {
            effect: roll.effect.id.clone(),
            tier: roll.effect.tier,
            slot,
            description,
            forced: roll.forced,
            replaced,
        }
    }
}

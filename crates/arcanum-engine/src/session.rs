//! Slot-selection sessions.
//!
//! When every slot on the target item is occupied, the apply flow opens
//! a short-lived session instead of rolling: the actor must pick which
//! slot to overwrite. The session snapshots the item and token
//! signatures so a changed inventory invalidates it, and it expires
//! after a fixed timeout.
//!
//! At most one session exists per actor; opening a new one cancels the
//! prior. Manual selection and the expiry sweep race by atomically
//! removing the session from the map — whichever side wins owns it, and
//! the loser observes no pending session.

use arcanum_common::{ActorId, ItemHandle, TokenHandle};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lifecycle state of a selection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Waiting for the actor's choice.
    Created,
    /// A slot was chosen and the roll committed.
    Applied,
    /// Cancelled by the actor or replaced by a newer session.
    Cancelled,
    /// Timed out before a choice was made.
    Expired,
}

impl SessionState {
    /// Checks whether the session has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Created)
    }
}

/// One pending "which slot to overwrite" choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSession {
    /// Actor the choice belongs to
    pub actor: ActorId,
    /// Target item at session creation
    pub item: ItemHandle,
    /// Item signature at session creation (staleness snapshot)
    pub item_signature: u64,
    /// Augment token at session creation
    pub token: TokenHandle,
    /// Token signature at session creation (staleness snapshot)
    pub token_signature: u64,
    /// Item capacity at session creation
    pub capacity: u8,
    /// Human-readable description of each occupied slot
    pub slot_descriptions: Vec<String>,
    /// Creation time (host-supplied monotonic seconds)
    pub created_at: f64,
    /// Seconds until the session expires
    pub timeout: f64,
    /// Lifecycle state
    pub state: SessionState,
}

impl SelectionSession {
    /// Opens a new session in the `Created` state.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        actor: ActorId,
        item: ItemHandle,
        item_signature: u64,
        token: TokenHandle,
        token_signature: u64,
        capacity: u8,
        slot_descriptions: Vec<String>,
        created_at: f64,
        timeout: f64,
    ) -> Self {
        Self {
            actor,
            item,
            item_signature,
            token,
            token_signature,
            capacity,
            slot_descriptions,
            created_at,
            timeout,
            state: SessionState::Created,
        }
    }

    /// Time at which the session lapses.
    #[must_use]
    pub fn expires_at(&self) -> f64 {
        self.created_at + self.timeout
    }

    /// Checks whether the session has lapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expires_at()
    }

    /// Checks whether a slot index is valid for the snapshot capacity.
    #[must_use]
    pub fn index_in_range(&self, index: usize) -> bool {
        index < self.capacity as usize
    }

    /// Moves the session to a terminal state.
    pub fn finish(&mut self, state: SessionState) {
        debug_assert!(state.is_terminal());
        self.state = state;
    }
}

/// The engine-owned map of pending sessions, one per actor.
#[derive(Debug, Default)]
pub struct SessionMap {
    map: DashMap<ActorId, SelectionSession>,
}

impl SessionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for its actor, silently cancelling any prior
    /// session. Returns the cancelled prior, if there was one.
    pub fn open(&self, session: SelectionSession) -> Option<SelectionSession> {
        let actor = session.actor;
        let mut prior = self.map.insert(actor, session);
        if let Some(prior) = &mut prior {
            debug!("Replacing pending selection for actor {:?}", actor);
            prior.finish(SessionState::Cancelled);
        }
        prior
    }

    /// A copy of the actor's pending session, if any.
    #[must_use]
    pub fn get(&self, actor: ActorId) -> Option<SelectionSession> {
        self.map.get(&actor).map(|s| s.value().clone())
    }

    /// Atomically takes the actor's pending session. This is the commit
    /// point both for manual selection and for cancellation; only one
    /// caller can win it.
    pub fn take(&self, actor: ActorId) -> Option<SelectionSession> {
        self.map.remove(&actor).map(|(_, session)| session)
    }

    /// Atomically removes and returns every session that has lapsed at
    /// `now`, in `Expired` state. A session resolved concurrently by its
    /// actor is not returned.
    pub fn expire_due(&self, now: f64) -> Vec<SelectionSession> {
        let due: Vec<ActorId> = self
            .map
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| *entry.key())
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for actor in due {
            if let Some((_, mut session)) = self.map.remove_if(&actor, |_, s| s.is_expired(now)) {
                session.finish(SessionState::Expired);
                expired.push(session);
            }
        }
        expired
    }

    /// Number of pending sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Checks whether no sessions are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(actor: u64, created_at: f64) -> SelectionSession {
        SelectionSession::new(
            ActorId::from_raw(actor),
            ItemHandle::new(1),
            11,
            TokenHandle::new(2),
            22,
            4,
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            created_at,
            30.0,
        )
    }

    #[test]
    fn test_open_replaces_prior_session() {
        let sessions = SessionMap::new();
        assert!(sessions.open(session(1, 0.0)).is_none());
        let prior = sessions.open(session(1, 5.0)).expect("prior exists");
        assert_eq!(prior.state, SessionState::Cancelled);
        assert_eq!(sessions.len(), 1);
        assert_eq!(
            sessions.get(ActorId::from_raw(1)).map(|s| s.created_at),
            Some(5.0)
        );
    }

    #[test]
    fn test_take_is_single_winner() {
        let sessions = SessionMap::new();
        sessions.open(session(1, 0.0));
        assert!(sessions.take(ActorId::from_raw(1)).is_some());
        assert!(sessions.take(ActorId::from_raw(1)).is_none());
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_expiry_boundaries() {
        let s = session(1, 10.0);
        assert!(!s.is_expired(39.9));
        assert!(s.is_expired(40.0));
        assert!((s.expires_at() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_expire_due_removes_only_lapsed_sessions() {
        let sessions = SessionMap::new();
        sessions.open(session(1, 0.0));
        sessions.open(session(2, 20.0));

        let expired = sessions.expire_due(35.0);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].actor, ActorId::from_raw(1));
        assert_eq!(expired[0].state, SessionState::Expired);
        assert_eq!(sessions.len(), 1);
        assert!(sessions.get(ActorId::from_raw(2)).is_some());
    }

    #[test]
    fn test_expired_loser_sees_nothing() {
        let sessions = SessionMap::new();
        sessions.open(session(1, 0.0));

        // The actor resolves first; the sweep then finds nothing.
        assert!(sessions.take(ActorId::from_raw(1)).is_some());
        assert!(sessions.expire_due(100.0).is_empty());
    }

    #[test]
    fn test_index_range_uses_snapshot_capacity() {
        let s = session(1, 0.0);
        assert!(s.index_in_range(3));
        assert!(!s.index_in_range(4));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Created.is_terminal());
        assert!(SessionState::Applied.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(SessionState::Expired.is_terminal());
    }
}

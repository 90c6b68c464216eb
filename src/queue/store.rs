//! Per-server queue storage
//!
//! The store owns every queue entry of one server. Entries are kept in join
//! order; each mutation preserves the queue invariants (one entry per player,
//! symmetric duo links with distinct roles).

use crate::error::{EngineResult, QueueError};
use crate::types::{PlayerId, Role, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A player's active request to be matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub server_id: ServerId,
    pub role: Role,
    /// Partner entry on the same server, if queued as a duo
    pub duo: Option<PlayerId>,
    pub queued_at: DateTime<Utc>,
    /// Monotonic join order within the server
    pub sequence: u64,
}

/// Queue of one server
#[derive(Debug, Clone)]
pub struct QueueStore {
    server_id: ServerId,
    entries: Vec<QueueEntry>,
    next_sequence: u64,
}

impl QueueStore {
    pub fn new(server_id: ServerId) -> Self {
        Self {
            server_id,
            entries: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Entries in join order
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.player_id == player_id)
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.get(player_id).is_some()
    }

    /// Insert a solo entry
    pub fn join(
        &mut self,
        player_id: PlayerId,
        role: Role,
        now: DateTime<Utc>,
    ) -> EngineResult<&QueueEntry> {
        if self.contains(player_id) {
            return Err(QueueError::AlreadyQueued { player_id });
        }

        let entry = self.new_entry(player_id, role, None, now);
        self.entries.push(entry);
        debug_assert!(self.is_consistent());

        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Insert two linked entries, or nothing
    pub fn join_duo(
        &mut self,
        (player_a, role_a): (PlayerId, Role),
        (player_b, role_b): (PlayerId, Role),
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if role_a == role_b {
            return Err(QueueError::SameRolesForDuo { role: role_a });
        }
        if player_a == player_b {
            return Err(QueueError::InvalidQueueRequest {
                reason: "a player cannot duo with themselves".to_string(),
            });
        }
        for player_id in [player_a, player_b] {
            if self.contains(player_id) {
                return Err(QueueError::AlreadyQueued { player_id });
            }
        }

        let entry_a = self.new_entry(player_a, role_a, Some(player_b), now);
        let entry_b = self.new_entry(player_b, role_b, Some(player_a), now);
        self.entries.push(entry_a);
        self.entries.push(entry_b);
        debug_assert!(self.is_consistent());

        Ok(())
    }

    /// Remove a player's entry; the partner stays queued without its link
    pub fn leave(&mut self, player_id: PlayerId) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|e| e.player_id == player_id)?;
        let removed = self.entries.remove(index);

        if let Some(partner) = removed.duo {
            self.unlink(partner);
        }
        debug_assert!(self.is_consistent());

        Some(removed)
    }

    /// Remove every listed player at once
    ///
    /// Fails with [`QueueError::StaleCandidate`] without touching the queue if
    /// any of them is no longer queued.
    pub fn remove_participants(&mut self, player_ids: &[PlayerId]) -> EngineResult<Vec<QueueEntry>> {
        if let Some(missing) = player_ids.iter().find(|id| !self.contains(**id)) {
            return Err(QueueError::StaleCandidate {
                player_id: *missing,
            });
        }

        let leaving: HashSet<PlayerId> = player_ids.iter().copied().collect();
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| leaving.contains(&e.player_id));
        self.entries = kept;

        for entry in &removed {
            if let Some(partner) = entry.duo {
                if !leaving.contains(&partner) {
                    self.unlink(partner);
                }
            }
        }
        debug_assert!(self.is_consistent());

        Ok(removed)
    }

    /// Drop every entry, returning how many were removed
    pub fn reset(&mut self) -> usize {
        self.reset_except(&[])
    }

    /// Drop every entry except those of `kept`
    pub fn reset_except(&mut self, kept: &[PlayerId]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| kept.contains(&e.player_id));

        let remaining: HashSet<PlayerId> = self.entries.iter().map(|e| e.player_id).collect();
        for entry in &mut self.entries {
            if entry.duo.is_some_and(|partner| !remaining.contains(&partner)) {
                entry.duo = None;
            }
        }
        debug_assert!(self.is_consistent());

        before - self.entries.len()
    }

    /// Check the queue invariants
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.server_id != self.server_id || !seen.insert(entry.player_id) {
                return false;
            }
            if let Some(partner_id) = entry.duo {
                match self.get(partner_id) {
                    Some(partner) => {
                        if partner.duo != Some(entry.player_id) || partner.role == entry.role {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
        }
        true
    }

    fn new_entry(
        &mut self,
        player_id: PlayerId,
        role: Role,
        duo: Option<PlayerId>,
        now: DateTime<Utc>,
    ) -> QueueEntry {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        QueueEntry {
            player_id,
            server_id: self.server_id,
            role,
            duo,
            queued_at: now,
            sequence,
        }
    }

    fn unlink(&mut self, player_id: PlayerId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.player_id == player_id) {
            entry.duo = None;
        }
    }
}

//! Role-based matchmaking
//!
//! The matchmaker looks at a server's queue and proposes at most one game.
//! Players are picked earliest-queued-first for roles that are still open;
//! duos are picked as a unit and always share a side. Once the players are
//! picked, sides are assigned to even out the summed ratings.

use crate::config::server::GameMode;
use crate::queue::store::QueueEntry;
use crate::rating::calculator::RatingCalculator;
use crate::rating::weng_lin::WengLinRatingCalculator;
use crate::types::{PlayerId, PlayerRating, Role, ServerId, Side};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One player's place in a proposed game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub player_id: PlayerId,
    pub role: Role,
    pub side: Side,
}

/// A proposed, unconfirmed team assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateGame {
    pub server_id: ServerId,
    /// Name of the game mode the candidate was built for
    pub mode: String,
    /// Slots ordered by side, then by the mode's role order
    pub slots: Vec<CandidateSlot>,
    /// Predicted chance of the blue side winning, for two-sided modes
    pub blue_expected_score: Option<f64>,
}

impl CandidateGame {
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.slots.iter().map(|s| s.player_id).collect()
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.slots.iter().any(|s| s.player_id == player_id)
    }

    pub fn slot(&self, player_id: PlayerId) -> Option<&CandidateSlot> {
        self.slots.iter().find(|s| s.player_id == player_id)
    }

    /// Slots of one side
    pub fn side(&self, side: Side) -> impl Iterator<Item = &CandidateSlot> {
        self.slots.iter().filter(move |s| s.side == side)
    }
}

/// Trait for matchmaking algorithms
pub trait Matchmaker: Send + Sync {
    /// Propose a game from the queue, or nothing if no full game can be formed
    ///
    /// Must be deterministic and must not depend on anything but its inputs.
    fn propose(
        &self,
        server_id: ServerId,
        entries: &[QueueEntry],
        mode: &GameMode,
        ratings: &HashMap<PlayerId, PlayerRating>,
    ) -> Option<CandidateGame>;
}

/// Players that have to be placed together
#[derive(Debug, Clone)]
struct Unit {
    members: Vec<(PlayerId, Role)>,
}

/// Role-constrained matchmaker with rating-balanced sides
pub struct RoleMatchmaker {
    rating_calculator: Arc<dyn RatingCalculator>,
}

impl RoleMatchmaker {
    pub fn new(rating_calculator: Arc<dyn RatingCalculator>) -> Self {
        Self { rating_calculator }
    }

    /// Group entries into units in join order; a duo sits at its earlier member's place
    fn units_in_order(entries: &[QueueEntry]) -> Vec<Unit> {
        let mut ordered: Vec<&QueueEntry> = entries.iter().collect();
        ordered.sort_by_key(|e| e.sequence);

        let by_id: HashMap<PlayerId, &QueueEntry> =
            ordered.iter().map(|e| (e.player_id, *e)).collect();
        let mut consumed = HashSet::new();
        let mut units = Vec::new();

        for entry in ordered {
            if !consumed.insert(entry.player_id) {
                continue;
            }

            let partner = entry
                .duo
                .and_then(|id| by_id.get(&id))
                .filter(|partner| !consumed.contains(&partner.player_id));

            let members = match partner {
                Some(partner) => {
                    consumed.insert(partner.player_id);
                    vec![
                        (entry.player_id, entry.role),
                        (partner.player_id, partner.role),
                    ]
                }
                None => vec![(entry.player_id, entry.role)],
            };
            units.push(Unit { members });
        }

        units
    }

    fn fits(unit: &Unit, side: Side, occupied: &HashSet<(Side, Role)>) -> bool {
        unit.members
            .iter()
            .all(|(_, role)| !occupied.contains(&(side, *role)))
    }

    fn occupy(unit: &Unit, side: Side, occupied: &mut HashSet<(Side, Role)>, taken: bool) {
        for (_, role) in &unit.members {
            if taken {
                occupied.insert((side, *role));
            } else {
                occupied.remove(&(side, *role));
            }
        }
    }

    /// Whether the units can be placed with every role at most once per side
    fn feasible(
        units: &[Unit],
        sides: &[Side],
        index: usize,
        occupied: &mut HashSet<(Side, Role)>,
    ) -> bool {
        let Some(unit) = units.get(index) else {
            return true;
        };

        for &side in sides {
            if Self::fits(unit, side, occupied) {
                Self::occupy(unit, side, occupied, true);
                let placed = Self::feasible(units, sides, index + 1, occupied);
                Self::occupy(unit, side, occupied, false);
                if placed {
                    return true;
                }
            }
        }

        false
    }

    /// Search every valid placement and keep the one with the smallest rating gap
    #[allow(clippy::too_many_arguments)]
    fn balance(
        units: &[Unit],
        sides: &[Side],
        ratings: &[f64],
        index: usize,
        occupied: &mut HashSet<(Side, Role)>,
        current: &mut Vec<Side>,
        best: &mut Option<(f64, Vec<Side>)>,
    ) {
        if index == units.len() {
            let gap = Self::rating_gap(current, ratings);
            let better = match best {
                Some((best_gap, _)) => gap < *best_gap - 1e-9,
                None => true,
            };
            if better {
                *best = Some((gap, current.clone()));
            }
            return;
        }

        // The first unit always plays blue, mirrored placements are equivalent
        let candidates: &[Side] = if index == 0 { &sides[..1] } else { sides };

        for &side in candidates {
            if Self::fits(&units[index], side, occupied) {
                Self::occupy(&units[index], side, occupied, true);
                current.push(side);
                Self::balance(units, sides, ratings, index + 1, occupied, current, best);
                current.pop();
                Self::occupy(&units[index], side, occupied, false);
            }
        }
    }

    fn rating_gap(placement: &[Side], unit_ratings: &[f64]) -> f64 {
        let blue: f64 = placement
            .iter()
            .zip(unit_ratings)
            .filter(|(side, _)| **side == Side::Blue)
            .map(|(_, rating)| rating)
            .sum();
        let red: f64 = placement
            .iter()
            .zip(unit_ratings)
            .filter(|(side, _)| **side == Side::Red)
            .map(|(_, rating)| rating)
            .sum();

        (blue - red).abs()
    }

    fn rating_of(&self, player_id: PlayerId, ratings: &HashMap<PlayerId, PlayerRating>) -> PlayerRating {
        ratings
            .get(&player_id)
            .cloned()
            .unwrap_or_else(|| self.rating_calculator.get_initial_rating())
    }
}

impl Default for RoleMatchmaker {
    fn default() -> Self {
        Self::new(Arc::new(WengLinRatingCalculator::default()))
    }
}

impl Matchmaker for RoleMatchmaker {
    fn propose(
        &self,
        server_id: ServerId,
        entries: &[QueueEntry],
        mode: &GameMode,
        ratings: &HashMap<PlayerId, PlayerRating>,
    ) -> Option<CandidateGame> {
        let needed = mode.player_count();
        let sides = mode.sides();
        if entries.len() < needed {
            return None;
        }

        let mut selected: Vec<Unit> = Vec::new();
        let mut count = 0;

        for unit in Self::units_in_order(entries) {
            if count == needed {
                break;
            }
            if count + unit.members.len() > needed {
                continue;
            }
            if !unit.members.iter().all(|(_, role)| mode.requires(*role)) {
                continue;
            }

            selected.push(unit);
            if Self::feasible(&selected, sides, 0, &mut HashSet::new()) {
                count += selected[selected.len() - 1].members.len();
            } else {
                // Skipped for this attempt only, the entries stay queued
                selected.pop();
            }
        }

        if count < needed {
            return None;
        }

        let unit_ratings: Vec<f64> = selected
            .iter()
            .map(|unit| {
                unit.members
                    .iter()
                    .map(|(id, _)| self.rating_of(*id, ratings).rating)
                    .sum()
            })
            .collect();

        let mut best = None;
        Self::balance(
            &selected,
            sides,
            &unit_ratings,
            0,
            &mut HashSet::new(),
            &mut Vec::with_capacity(selected.len()),
            &mut best,
        );
        let (_, placement) = best?;

        let role_order = |role: Role| mode.roles.iter().position(|r| *r == role).unwrap_or(usize::MAX);
        let mut slots: Vec<CandidateSlot> = selected
            .iter()
            .zip(&placement)
            .flat_map(|(unit, side)| {
                unit.members.iter().map(move |(player_id, role)| CandidateSlot {
                    player_id: *player_id,
                    role: *role,
                    side: *side,
                })
            })
            .collect();
        slots.sort_by_key(|slot| (slot.side, role_order(slot.role)));

        let blue_expected_score = (sides.len() == 2).then(|| {
            let team = |side: Side| -> Vec<PlayerRating> {
                slots
                    .iter()
                    .filter(|s| s.side == side)
                    .map(|s| self.rating_of(s.player_id, ratings))
                    .collect()
            };
            self.rating_calculator
                .expected_team_score(&team(Side::Blue), &team(Side::Red))
        });

        Some(CandidateGame {
            server_id,
            mode: mode.name.clone(),
            slots,
            blue_expected_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::QueueStore;
    use crate::utils::current_timestamp;

    fn top_jungle() -> GameMode {
        GameMode::single_side("duel", &[Role::Top, Role::Jungle])
    }

    fn top_mid_support() -> GameMode {
        GameMode::single_side("trio", &[Role::Top, Role::Mid, Role::Support])
    }

    fn propose(queue: &QueueStore, mode: &GameMode) -> Option<CandidateGame> {
        RoleMatchmaker::default().propose(queue.server_id(), queue.entries(), mode, &HashMap::new())
    }

    fn assigned(candidate: &CandidateGame) -> Vec<(PlayerId, Role)> {
        candidate
            .slots
            .iter()
            .map(|s| (s.player_id, s.role))
            .collect()
    }

    #[test]
    fn test_two_role_game() {
        let mut queue = QueueStore::new(1);
        let now = current_timestamp();
        queue.join(1, Role::Top, now).unwrap();
        assert!(propose(&queue, &top_jungle()).is_none());

        queue.join(2, Role::Jungle, now).unwrap();
        let candidate = propose(&queue, &top_jungle()).unwrap();

        assert_eq!(assigned(&candidate), vec![(1, Role::Top), (2, Role::Jungle)]);
        assert!(candidate.blue_expected_score.is_none());
    }

    #[test]
    fn test_missing_role_gives_nothing() {
        let mut queue = QueueStore::new(1);
        let now = current_timestamp();
        queue.join(1, Role::Top, now).unwrap();
        queue.join(2, Role::Top, now).unwrap();
        queue.join(3, Role::Mid, now).unwrap();

        assert!(propose(&queue, &top_jungle()).is_none());
    }

    #[test]
    fn test_earliest_queued_wins_the_role() {
        let mut queue = QueueStore::new(1);
        let now = current_timestamp();
        queue.join(1, Role::Top, now).unwrap();
        queue.join(2, Role::Top, now).unwrap();
        queue.join(3, Role::Jungle, now).unwrap();

        let candidate = propose(&queue, &top_jungle()).unwrap();
        assert!(candidate.contains(1));
        assert!(!candidate.contains(2));
    }

    #[test]
    fn test_duo_with_solo() {
        let mut queue = QueueStore::new(1);
        let now = current_timestamp();
        queue.join_duo((3, Role::Mid), (4, Role::Support), now).unwrap();
        queue.join(5, Role::Top, now).unwrap();
        queue.join(6, Role::Top, now).unwrap();

        let candidate = propose(&queue, &top_mid_support()).unwrap();
        assert_eq!(
            assigned(&candidate),
            vec![(5, Role::Top), (3, Role::Mid), (4, Role::Support)]
        );
    }

    #[test]
    fn test_duo_skipped_when_a_role_is_taken() {
        let mut queue = QueueStore::new(1);
        let now = current_timestamp();
        queue.join(1, Role::Top, now).unwrap();
        queue.join_duo((2, Role::Top), (3, Role::Mid), now).unwrap();
        queue.join(4, Role::Mid, now).unwrap();
        queue.join(5, Role::Support, now).unwrap();

        let candidate = propose(&queue, &top_mid_support()).unwrap();
        assert_eq!(
            assigned(&candidate),
            vec![(1, Role::Top), (4, Role::Mid), (5, Role::Support)]
        );
        // The duo is skipped, not removed
        assert!(queue.contains(2) && queue.contains(3));
    }

    #[test]
    fn test_duo_with_role_outside_mode_is_skipped() {
        let mut queue = QueueStore::new(1);
        let now = current_timestamp();
        queue.join_duo((1, Role::Top), (2, Role::Bot), now).unwrap();
        queue.join(3, Role::Top, now).unwrap();
        queue.join(4, Role::Jungle, now).unwrap();

        let candidate = propose(&queue, &top_jungle()).unwrap();
        assert_eq!(assigned(&candidate), vec![(3, Role::Top), (4, Role::Jungle)]);
    }

    fn fill_five_versus_five(queue: &mut QueueStore, first_id: PlayerId) {
        let now = current_timestamp();
        let mut id = first_id;
        for _ in 0..2 {
            for role in Role::ALL {
                queue.join(id, role, now).unwrap();
                id += 1;
            }
        }
    }

    #[test]
    fn test_five_versus_five_covers_every_role_per_side() {
        let mut queue = QueueStore::new(1);
        fill_five_versus_five(&mut queue, 1);

        let candidate = propose(&queue, &GameMode::default()).unwrap();
        assert_eq!(candidate.slots.len(), 10);
        for side in Side::ALL {
            let roles: Vec<Role> = candidate.side(side).map(|s| s.role).collect();
            assert_eq!(roles, Role::ALL.to_vec());
        }
        assert!(candidate.blue_expected_score.is_some());
    }

    #[test]
    fn test_sides_are_balanced_by_rating() {
        let mut queue = QueueStore::new(1);
        fill_five_versus_five(&mut queue, 1);

        // Players 1..=5 are much stronger than 6..=10
        let ratings: HashMap<PlayerId, PlayerRating> = (1..=10)
            .map(|id| {
                let rating = if id <= 5 { 2000.0 } else { 1000.0 };
                (
                    id,
                    PlayerRating {
                        rating,
                        uncertainty: 100.0,
                    },
                )
            })
            .collect();

        let candidate = RoleMatchmaker::default()
            .propose(1, queue.entries(), &GameMode::default(), &ratings)
            .unwrap();

        let sum = |side: Side| -> f64 {
            candidate
                .side(side)
                .map(|s| ratings[&s.player_id].rating)
                .sum()
        };
        // Five strong players cannot split evenly, the best gap is one swap
        assert_eq!((sum(Side::Blue) - sum(Side::Red)).abs(), 1000.0);

        let expected = candidate.blue_expected_score.unwrap();
        assert!(expected > 0.0 && expected < 1.0);
    }

    #[test]
    fn test_duo_shares_a_side() {
        let mut queue = QueueStore::new(1);
        let now = current_timestamp();
        queue.join_duo((100, Role::Mid), (101, Role::Support), now).unwrap();
        fill_five_versus_five(&mut queue, 1);

        let candidate = propose(&queue, &GameMode::default()).unwrap();
        let duo_a = candidate.slot(100).unwrap();
        let duo_b = candidate.slot(101).unwrap();
        assert_eq!(duo_a.side, duo_b.side);
    }

    #[test]
    fn test_unplaceable_duo_is_skipped() {
        // Three duos whose roles cannot share two sides
        let mut queue = QueueStore::new(1);
        let now = current_timestamp();
        let mode = GameMode {
            name: "3v3".to_string(),
            roles: vec![Role::Top, Role::Jungle, Role::Mid],
            sides: 2,
        };
        queue.join_duo((1, Role::Top), (2, Role::Jungle), now).unwrap();
        queue.join_duo((3, Role::Jungle), (4, Role::Mid), now).unwrap();
        queue.join_duo((5, Role::Top), (6, Role::Mid), now).unwrap();
        assert!(propose(&queue, &mode).is_none());

        queue.join(7, Role::Top, now).unwrap();
        queue.join(8, Role::Mid, now).unwrap();

        let candidate = propose(&queue, &mode).unwrap();
        assert!(!candidate.contains(5) && !candidate.contains(6));
        assert_eq!(candidate.slots.len(), 6);
    }

    #[test]
    fn test_proposal_is_deterministic() {
        let mut queue = QueueStore::new(1);
        fill_five_versus_five(&mut queue, 1);
        fill_five_versus_five(&mut queue, 11);

        let first = propose(&queue, &GameMode::default()).unwrap();
        let second = propose(&queue, &GameMode::default()).unwrap();
        assert_eq!(first, second);
        assert!(first.player_ids().iter().all(|id| *id <= 10));
    }
}

//! Reconciliation log for optimistic local changes
//!
//! Every consumption, kill or death the client decides on its own is
//! recorded here with the exact award it granted. A later authoritative
//! snapshot either confirms the entry (the entity is gone) or contradicts it
//! (the entity is still there), in which case the award is handed back.
//!
//! An entry can only be settled by a snapshot whose pull was issued after the
//! server answered the entry's notification; older pulls may have been
//! served before the server knew about it.

use super::state::{EntityId, PowerUpKind, WorldSnapshot};

/// What kind of optimistic change an entry represents
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A food pellet was eaten
    Food,
    /// A power-up was picked up; its effect waits for confirmation.
    /// `awaiting_effect` clears once the server answers the notification,
    /// otherwise the snapshot that confirms the pickup starts the effect.
    PowerUp {
        kind: PowerUpKind,
        duration_secs: Option<f32>,
        awaiting_effect: bool,
    },
    /// Another player was eaten
    Kill,
    /// The local player was eaten by `id`
    Death,
}

/// `decided_by` of an entry whose notification is still in flight
pub const UNDECIDED: u64 = u64::MAX;

/// Which entity set a pending entry hides entities from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Food,
    PowerUp,
    Player,
}

/// One unconfirmed local change
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub tag: u64,
    /// Entity consumed (or, for a death, the player that ate us)
    pub id: EntityId,
    pub change: Change,
    /// Mass/money awarded locally
    pub mass: u64,
    /// Score awarded locally
    pub score: u64,
    /// First pull sequence number allowed to settle this entry
    pub decided_by: u64,
}

impl Pending {
    pub fn target(&self) -> Option<Target> {
        match self.change {
            Change::Food => Some(Target::Food),
            Change::PowerUp { .. } => Some(Target::PowerUp),
            Change::Kill => Some(Target::Player),
            Change::Death => None,
        }
    }

    /// Whether `snapshot` shows this change never happened
    fn contradicted_by(&self, snapshot: &WorldSnapshot, local_id: &str) -> bool {
        match self.change {
            Change::Food => snapshot.food.iter().any(|f| f.id == self.id),
            Change::PowerUp { .. } => snapshot.power_ups.iter().any(|p| p.id == self.id),
            Change::Kill => snapshot
                .players
                .iter()
                .any(|p| p.id == self.id && p.is_alive),
            Change::Death => snapshot
                .players
                .iter()
                .any(|p| p.id == local_id && p.is_alive),
        }
    }
}

/// Entries settled by one snapshot
#[derive(Debug, Default)]
pub struct Settlement {
    pub confirmed: Vec<Pending>,
    /// Contradicted entries whose awards must be reverted
    pub reverted: Vec<Pending>,
}

/// Ordered log of unconfirmed changes
#[derive(Debug, Default)]
pub struct ReconcileLog {
    entries: Vec<Pending>,
    next_tag: u64,
}

impl ReconcileLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change; returns its tag
    pub fn record(
        &mut self,
        id: impl Into<EntityId>,
        change: Change,
        mass: u64,
        score: u64,
        decided_by: u64,
    ) -> u64 {
        let tag = self.next_tag;
        self.next_tag += 1;
        self.entries.push(Pending {
            tag,
            id: id.into(),
            change,
            mass,
            score,
            decided_by,
        });
        tag
    }

    /// Set the first pull allowed to settle the entries tagged `tags`
    pub fn decide(&mut self, tags: &[u64], decided_by: u64) {
        for entry in self.entries.iter_mut().filter(|e| tags.contains(&e.tag)) {
            entry.decided_by = decided_by;
        }
    }

    /// The server answered the notification for `tags`; their effects (if
    /// any) came with the answer
    pub fn effects_answered(&mut self, tags: &[u64]) {
        for entry in self.entries.iter_mut().filter(|e| tags.contains(&e.tag)) {
            if let Change::PowerUp {
                awaiting_effect, ..
            } = &mut entry.change
            {
                *awaiting_effect = false;
            }
        }
    }

    /// True while an unsettled entry keeps `id` out of the `target` set
    /// for snapshots up to and including `seq`
    pub fn hides(&self, target: Target, id: &str, seq: u64) -> bool {
        self.entries
            .iter()
            .any(|e| e.decided_by > seq && e.target() == Some(target) && e.id == id)
    }

    /// True if `id` is consumed and not yet settled by any snapshot
    pub fn is_pending(&self, target: Target, id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.target() == Some(target) && e.id == id)
    }

    /// Settle every entry this snapshot is allowed to decide
    pub fn settle(&mut self, snapshot: &WorldSnapshot, seq: u64, local_id: &str) -> Settlement {
        let mut settlement = Settlement::default();
        let mut kept = Vec::with_capacity(self.entries.len());

        for entry in self.entries.drain(..) {
            if entry.decided_by > seq {
                kept.push(entry);
            } else if entry.contradicted_by(snapshot, local_id) {
                settlement.reverted.push(entry);
            } else {
                settlement.confirmed.push(entry);
            }
        }

        self.entries = kept;
        settlement
    }

    /// Drop pending deaths once the server has confirmed the death directly
    pub fn confirm_death(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.change != Change::Death);
        before - self.entries.len()
    }

    pub fn has_pending_death(&self) -> bool {
        self.entries.iter().any(|e| e.change == Change::Death)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pending> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::{Food, RemotePlayer};
    use glam::Vec2;

    fn snapshot_with_food(ids: &[&str]) -> WorldSnapshot {
        WorldSnapshot {
            food: ids
                .iter()
                .map(|id| Food {
                    id: id.to_string(),
                    pos: Vec2::ZERO,
                    color: "#fff".to_string(),
                    value: 1,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn player(id: &str, alive: bool) -> RemotePlayer {
        RemotePlayer {
            id: id.to_string(),
            name: id.to_string(),
            pos: Vec2::ZERO,
            mass: 100,
            score: 0,
            kills: 0,
            is_alive: alive,
            color: "#000".to_string(),
        }
    }

    #[test]
    fn test_absent_entity_is_confirmed() {
        let mut log = ReconcileLog::new();
        log.record("f1", Change::Food, 5, 5, 1);

        let settled = log.settle(&snapshot_with_food(&["f2"]), 1, "me");
        assert_eq!(settled.confirmed.len(), 1);
        assert!(settled.reverted.is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_present_entity_is_reverted() {
        let mut log = ReconcileLog::new();
        log.record("f1", Change::Food, 5, 10, 1);

        let settled = log.settle(&snapshot_with_food(&["f1"]), 1, "me");
        assert_eq!(settled.reverted.len(), 1);
        assert_eq!(settled.reverted[0].mass, 5);
        assert_eq!(settled.reverted[0].score, 10);
    }

    #[test]
    fn test_older_pull_cannot_settle() {
        let mut log = ReconcileLog::new();
        log.record("f1", Change::Food, 5, 5, 3);

        let settled = log.settle(&snapshot_with_food(&["f1"]), 2, "me");
        assert!(settled.confirmed.is_empty() && settled.reverted.is_empty());
        assert!(log.hides(Target::Food, "f1", 2));
        assert!(!log.hides(Target::Food, "f1", 3));
        assert!(log.is_pending(Target::Food, "f1"));
    }

    #[test]
    fn test_undecided_until_notification_answered() {
        let mut log = ReconcileLog::new();
        let tag = log.record("f1", Change::Food, 5, 5, UNDECIDED);
        let settled = log.settle(&snapshot_with_food(&["f1"]), 10, "me");
        assert!(settled.reverted.is_empty());
        assert!(log.hides(Target::Food, "f1", 10));

        log.decide(&[tag], 11);
        assert!(!log.hides(Target::Food, "f1", 11));
        let settled = log.settle(&snapshot_with_food(&["f1"]), 11, "me");
        assert_eq!(settled.reverted.len(), 1);
    }

    #[test]
    fn test_kill_contradicted_only_by_living_victim() {
        let mut log = ReconcileLog::new();
        log.record("bot", Change::Kill, 80, 80, 1);
        let snapshot = WorldSnapshot {
            players: vec![player("bot", false)],
            ..Default::default()
        };
        let settled = log.settle(&snapshot, 1, "me");
        assert_eq!(settled.confirmed.len(), 1);

        log.record("bot", Change::Kill, 80, 80, 2);
        let snapshot = WorldSnapshot {
            players: vec![player("bot", true)],
            ..Default::default()
        };
        let settled = log.settle(&snapshot, 2, "me");
        assert_eq!(settled.reverted.len(), 1);
    }

    #[test]
    fn test_death_reverted_when_server_says_alive() {
        let mut log = ReconcileLog::new();
        log.record("big", Change::Death, 0, 0, 1);
        assert!(log.has_pending_death());
        assert_eq!(log.iter().next().and_then(Pending::target), None);

        let snapshot = WorldSnapshot {
            players: vec![player("me", true)],
            ..Default::default()
        };
        let settled = log.settle(&snapshot, 1, "me");
        assert_eq!(settled.reverted.len(), 1);
        assert!(!log.has_pending_death());
    }

    #[test]
    fn test_confirm_death_clears_only_deaths() {
        let mut log = ReconcileLog::new();
        log.record("f1", Change::Food, 1, 1, 1);
        log.record("big", Change::Death, 0, 0, 1);
        assert_eq!(log.confirm_death(), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_tags_are_unique() {
        let mut log = ReconcileLog::new();
        let a = log.record("a", Change::Food, 1, 1, 0);
        let b = log.record("b", Change::Food, 1, 1, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_answered_power_up_no_longer_awaits_effect() {
        let mut log = ReconcileLog::new();
        let shield = Change::PowerUp {
            kind: PowerUpKind::Shield,
            duration_secs: Some(5.0),
            awaiting_effect: true,
        };
        let answered = log.record("p1", shield.clone(), 40, 40, 1);
        log.record("p2", shield, 40, 40, 1);
        log.effects_answered(&[answered]);

        let settled = log.settle(&WorldSnapshot::default(), 1, "me");
        let awaiting: Vec<_> = settled
            .confirmed
            .iter()
            .filter(|e| {
                matches!(
                    e.change,
                    Change::PowerUp {
                        awaiting_effect: true,
                        ..
                    }
                )
            })
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(awaiting, vec!["p2"]);
    }
}

//! Vector clocks for detecting concurrent peer updates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of comparing two vector clocks.
///
/// The comparison is taken from the perspective of the left operand: local
/// clock compared against a remote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// Both clocks are identical; nothing to do.
    Equal,
    /// Only the local clock has advanced; the local side wins.
    LocalAhead,
    /// Only the remote clock has advanced; the remote change applies cleanly.
    RemoteAhead,
    /// Both sides advanced independently; a true conflict.
    Concurrent,
}

impl ClockOrdering {
    /// Returns the ordering as seen from the other operand's perspective.
    pub fn flipped(self) -> Self {
        match self {
            ClockOrdering::LocalAhead => ClockOrdering::RemoteAhead,
            ClockOrdering::RemoteAhead => ClockOrdering::LocalAhead,
            other => other,
        }
    }
}

/// A per-actor monotonic counter map.
///
/// Keys are actor DIDs. A missing entry is equivalent to a counter of zero,
/// so clocks from devices that have never seen each other still compare
/// correctly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Creates an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter for an actor (zero if absent).
    pub fn get(&self, actor: &str) -> u64 {
        self.counters.get(actor).copied().unwrap_or(0)
    }

    /// Increments the counter for an actor and returns the new value.
    pub fn increment(&mut self, actor: &str) -> u64 {
        let counter = self.counters.entry(actor.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Merges another clock into this one, taking the pointwise maximum.
    pub fn merge(&mut self, other: &VectorClock) {
        for (actor, &value) in &other.counters {
            let entry = self.counters.entry(actor.clone()).or_insert(0);
            *entry = (*entry).max(value);
        }
    }

    /// Returns true if no actor has ever ticked this clock.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Iterates over known actors.
    pub fn actors(&self) -> impl Iterator<Item = &str> {
        self.counters.keys().map(String::as_str)
    }

    /// Compares this (local) clock against a remote clock.
    ///
    /// Walks the union of actor ids on both sides. If some actor advanced
    /// only locally and some other actor advanced only remotely, the updates
    /// are concurrent.
    pub fn compare(&self, remote: &VectorClock) -> ClockOrdering {
        let mut local_ahead = false;
        let mut remote_ahead = false;

        for actor in self.counters.keys().chain(remote.counters.keys()) {
            let l = self.get(actor);
            let r = remote.get(actor);
            if l > r {
                local_ahead = true;
            } else if r > l {
                remote_ahead = true;
            }
        }

        match (local_ahead, remote_ahead) {
            (true, true) => ClockOrdering::Concurrent,
            (true, false) => ClockOrdering::LocalAhead,
            (false, true) => ClockOrdering::RemoteAhead,
            (false, false) => ClockOrdering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        let mut c = VectorClock::new();
        for (actor, count) in entries {
            for _ in 0..*count {
                c.increment(actor);
            }
        }
        c
    }

    #[test]
    fn missing_actor_reads_zero() {
        let c = VectorClock::new();
        assert_eq!(c.get("did:peer:a"), 0);
        assert!(c.is_empty());
    }

    #[test]
    fn increment_is_monotonic() {
        let mut c = VectorClock::new();
        assert_eq!(c.increment("a"), 1);
        assert_eq!(c.increment("a"), 2);
        assert_eq!(c.get("a"), 2);
    }

    #[test]
    fn equal_clocks() {
        let a = clock(&[("a", 2), ("b", 1)]);
        let b = clock(&[("a", 2), ("b", 1)]);
        assert_eq!(a.compare(&b), ClockOrdering::Equal);
    }

    #[test]
    fn local_dominates() {
        let a = clock(&[("a", 3), ("b", 1)]);
        let b = clock(&[("a", 2), ("b", 1)]);
        assert_eq!(a.compare(&b), ClockOrdering::LocalAhead);
        assert_eq!(b.compare(&a), ClockOrdering::RemoteAhead);
    }

    #[test]
    fn concurrent_updates() {
        let a = clock(&[("a", 2), ("b", 1)]);
        let b = clock(&[("a", 1), ("b", 2)]);
        assert_eq!(a.compare(&b), ClockOrdering::Concurrent);
        assert_eq!(b.compare(&a), ClockOrdering::Concurrent);
    }

    #[test]
    fn disjoint_actors_are_concurrent() {
        let a = clock(&[("a", 1)]);
        let b = clock(&[("b", 1)]);
        assert_eq!(a.compare(&b), ClockOrdering::Concurrent);
    }

    #[test]
    fn empty_clock_is_behind() {
        let a = VectorClock::new();
        let b = clock(&[("b", 1)]);
        assert_eq!(a.compare(&b), ClockOrdering::RemoteAhead);
    }

    #[test]
    fn merge_takes_pointwise_max() {
        let mut a = clock(&[("a", 3), ("b", 1)]);
        let b = clock(&[("a", 1), ("b", 4), ("c", 2)]);
        a.merge(&b);
        assert_eq!(a.get("a"), 3);
        assert_eq!(a.get("b"), 4);
        assert_eq!(a.get("c"), 2);
    }

    #[test]
    fn merged_clock_dominates_both_inputs() {
        let a = clock(&[("a", 2)]);
        let b = clock(&[("b", 3)]);
        let mut merged = a.clone();
        merged.merge(&b);
        assert_ne!(merged.compare(&a), ClockOrdering::RemoteAhead);
        assert_ne!(merged.compare(&b), ClockOrdering::RemoteAhead);
    }

    #[test]
    fn serde_is_a_plain_map() {
        let c = clock(&[("did:peer:a", 2)]);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"did:peer:a":2}"#);
        let back: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    proptest! {
        #[test]
        fn comparison_is_symmetric(
            entries_a in proptest::collection::btree_map("[a-d]", 0u64..5, 0..4),
            entries_b in proptest::collection::btree_map("[a-d]", 0u64..5, 0..4),
        ) {
            let a = VectorClock { counters: entries_a };
            let b = VectorClock { counters: entries_b };
            prop_assert_eq!(a.compare(&b), b.compare(&a).flipped());
        }
    }
}

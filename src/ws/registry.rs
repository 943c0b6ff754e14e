//! Desired subscription state.
//!
//! The registry records which instruments the application wants and at which
//! mode, whether or not a connection is currently open. It is the only thing
//! replayed onto the wire after a (re)connect.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use crate::types::{InstrumentToken, Mode};

/// The registry contents grouped by mode.
///
/// Modes iterate in ascending order and tokens are sorted, so two snapshots
/// of equal registries compare equal.
pub type Snapshot = BTreeMap<Mode, Vec<InstrumentToken>>;

/// Authoritative `InstrumentToken → Mode` map.
///
/// Pure data: no I/O and no locking. The ticker keeps it behind a mutex so
/// that [`snapshot`](Self::snapshot) is a consistent point-in-time copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    entries: HashMap<InstrumentToken, Mode>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tokens that are not yet subscribed at the default mode.
    ///
    /// Tokens already present keep their mode. Returns the tokens that were
    /// newly added.
    pub fn subscribe(&mut self, tokens: &[InstrumentToken]) -> Vec<InstrumentToken> {
        let mut added = Vec::new();
        for &token in tokens {
            if let Entry::Vacant(slot) = self.entries.entry(token) {
                slot.insert(Mode::default());
                added.push(token);
            }
        }
        added
    }

    /// Insert or update tokens at `mode`. Returns the tokens that were newly
    /// added.
    pub fn add(&mut self, tokens: &[InstrumentToken], mode: Mode) -> Vec<InstrumentToken> {
        let mut added = Vec::new();
        for &token in tokens {
            if self.entries.insert(token, mode).is_none() && !added.contains(&token) {
                added.push(token);
            }
        }
        added
    }

    /// Remove tokens. Unknown tokens are ignored.
    pub fn remove(&mut self, tokens: &[InstrumentToken]) {
        for token in tokens {
            self.entries.remove(token);
        }
    }

    /// Set the mode of tokens, subscribing any that are not present yet.
    ///
    /// Returns the tokens that were implicitly subscribed.
    pub fn set_mode(&mut self, mode: Mode, tokens: &[InstrumentToken]) -> Vec<InstrumentToken> {
        self.add(tokens, mode)
    }

    /// Mode a token is subscribed at, if it is subscribed.
    pub fn mode_of(&self, token: InstrumentToken) -> Option<Mode> {
        self.entries.get(&token).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Desired state grouped by mode. Modes with no tokens are omitted.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for (&token, &mode) in &self.entries {
            snapshot.entry(mode).or_default().push(token);
        }
        for tokens in snapshot.values_mut() {
            tokens.sort_unstable();
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_uses_default_mode_and_keeps_existing() {
        let mut reg = SubscriptionRegistry::new();
        reg.add(&[1], Mode::Full);
        let added = reg.subscribe(&[1, 2, 2]);
        assert_eq!(added, vec![2]);
        assert_eq!(reg.mode_of(1), Some(Mode::Full));
        assert_eq!(reg.mode_of(2), Some(Mode::Quote));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(&[1]);
        reg.remove(&[99]);
        assert_eq!(reg.len(), 1);
        reg.remove(&[1, 1]);
        assert!(reg.is_empty());
    }

    #[test]
    fn set_mode_implicitly_subscribes() {
        let mut a = SubscriptionRegistry::new();
        a.subscribe(&[408065]);
        a.set_mode(Mode::Full, &[408065]);

        let mut b = SubscriptionRegistry::new();
        assert_eq!(b.set_mode(Mode::Full, &[408065]), vec![408065]);

        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(a.mode_of(408065), Some(Mode::Full));
    }

    #[test]
    fn set_mode_reports_only_new_tokens() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(&[1]);
        assert_eq!(reg.set_mode(Mode::Ltp, &[1, 2, 2, 3]), vec![2, 3]);
        assert!(reg.set_mode(Mode::Full, &[1, 2, 3]).is_empty());
        assert_eq!(reg.mode_of(3), Some(Mode::Full));
    }

    #[test]
    fn snapshot_groups_by_mode_sorted() {
        let mut reg = SubscriptionRegistry::new();
        reg.add(&[30, 10], Mode::Full);
        reg.add(&[20], Mode::Ltp);
        reg.subscribe(&[5, 40]);
        reg.set_mode(Mode::Ltp, &[40]);

        let snap = reg.snapshot();
        let groups: Vec<_> = snap.iter().map(|(m, t)| (*m, t.clone())).collect();
        assert_eq!(
            groups,
            vec![
                (Mode::Ltp, vec![20, 40]),
                (Mode::Quote, vec![5]),
                (Mode::Full, vec![10, 30]),
            ]
        );
    }

    #[test]
    fn replaying_a_sequence_gives_the_same_snapshot() {
        enum Op {
            Sub(Vec<u32>),
            Unsub(Vec<u32>),
            Mode(Mode, Vec<u32>),
        }
        let ops = [
            Op::Sub(vec![1, 2, 3]),
            Op::Mode(Mode::Full, vec![2, 4]),
            Op::Unsub(vec![1, 7]),
            Op::Sub(vec![2, 5]),
            Op::Mode(Mode::Ltp, vec![3]),
            Op::Unsub(vec![4]),
        ];
        let run = || {
            let mut reg = SubscriptionRegistry::new();
            for op in &ops {
                match op {
                    Op::Sub(t) => {
                        reg.subscribe(t);
                    }
                    Op::Unsub(t) => reg.remove(t),
                    Op::Mode(m, t) => {
                        reg.set_mode(*m, t);
                    }
                }
            }
            reg.snapshot()
        };

        let first = run();
        assert_eq!(first, run());
        assert_eq!(first.get(&Mode::Full), Some(&vec![2]));
        assert_eq!(first.get(&Mode::Ltp), Some(&vec![3]));
        assert_eq!(first.get(&Mode::Quote), Some(&vec![5]));
    }
}

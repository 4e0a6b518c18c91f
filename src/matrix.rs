use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::mutant::MutantId;
use crate::platform::TestId;

/// Coverage recorded for one mutant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoverageEntry {
    /// Tests that executed the mutant's site during the coverage run.
    pub tests: BTreeSet<TestId>,

    /// The site was reached from a one-time initializer; the trigger is not
    /// test-scoped, so the mutant must be run against all tests.
    pub is_static: bool,
}

/// Mapping from live mutants to the tests that cover them.
///
/// Every live mutant appears exactly once: mutants are registered up front
/// and the coverage run only ever adds test ids to existing entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageMatrix {
    entries: BTreeMap<MutantId, CoverageEntry>,
}

impl CoverageMatrix {
    /// Register a live mutant with no coverage yet.
    pub fn register(&mut self, id: MutantId) {
        self.entries.entry(id).or_default();
    }

    /// Record that `test` executed the site of each mutant in `hits`.
    ///
    /// Hits for unregistered mutants are dropped: they belong to mutants
    /// already rolled back or ignored.
    pub fn record_hits(&mut self, test: &TestId, hits: &[MutantId]) {
        for id in hits {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.tests.insert(test.clone());
            }
        }
    }

    /// Record static-initializer hits attributed to `test`.
    pub fn record_static_hits(&mut self, test: &TestId, hits: &[MutantId]) {
        for id in hits {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.tests.insert(test.clone());
                entry.is_static = true;
            }
        }
    }

    /// Record hits that happened before any test ran. The mutants are
    /// static-triggered but no test can be credited.
    pub fn record_out_of_test_hits(&mut self, hits: &[MutantId]) {
        for id in hits {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.is_static = true;
            }
        }
    }

    pub fn entry(&self, id: MutantId) -> Option<&CoverageEntry> {
        self.entries.get(&id)
    }

    /// Mutants with no covering test that are not static-triggered.
    pub fn uncovered(&self) -> Vec<MutantId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.tests.is_empty() && !e.is_static)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MutantId, &CoverageEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: &str) -> TestId {
        TestId::new(id)
    }

    #[test]
    fn every_registered_mutant_appears_exactly_once() {
        let mut matrix = CoverageMatrix::default();
        matrix.register(MutantId(0));
        matrix.register(MutantId(1));
        matrix.register(MutantId(0));

        assert_eq!(matrix.len(), 2);
    }

    #[test]
    fn hits_for_unknown_mutants_are_dropped() {
        let mut matrix = CoverageMatrix::default();
        matrix.register(MutantId(0));

        matrix.record_hits(&t("t1"), &[MutantId(0), MutantId(99)]);

        assert_eq!(matrix.len(), 1);
        assert!(matrix.entry(MutantId(99)).is_none());
        assert!(matrix
            .entry(MutantId(0))
            .expect("registered entry")
            .tests
            .contains(&t("t1")));
    }

    #[test]
    fn static_hits_mark_the_entry_static() {
        let mut matrix = CoverageMatrix::default();
        matrix.register(MutantId(5));
        matrix.record_static_hits(&t("t2"), &[MutantId(5)]);

        let entry = matrix.entry(MutantId(5)).expect("entry");
        assert!(entry.is_static);
        assert!(entry.tests.contains(&t("t2")));
    }

    #[test]
    fn uncovered_excludes_static_mutants() {
        let mut matrix = CoverageMatrix::default();
        matrix.register(MutantId(0));
        matrix.register(MutantId(1));
        matrix.register(MutantId(2));

        matrix.record_hits(&t("t1"), &[MutantId(0)]);
        matrix.record_out_of_test_hits(&[MutantId(1)]);

        assert_eq!(matrix.uncovered(), vec![MutantId(2)]);
    }
}

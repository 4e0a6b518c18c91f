//! Session state.
//!
//! The session owns the mutated units, the discovered test set and the
//! coverage matrix, and is the single writer of mutant statuses. Status
//! transitions are monotone: once a mutant is terminal it never changes
//! again, whatever later runs report.

use crate::matrix::CoverageMatrix;
use crate::mutant::{Mutant, MutantId, MutantStatus, MutatedUnit};
use crate::options::Options;
use crate::platform::{TestDescription, TestId};

/// One mutation-testing session.
#[derive(Debug)]
pub struct Session {
    pub options: Options,
    pub units: Vec<MutatedUnit>,
    pub tests: Vec<TestDescription>,
    pub matrix: CoverageMatrix,
}

impl Session {
    pub fn new(options: Options) -> Session {
        Session {
            options,
            units: Vec::new(),
            tests: Vec::new(),
            matrix: CoverageMatrix::default(),
        }
    }

    /// All mutants across units, in id order (units are traversed in the
    /// order they were mutated, and ids are assigned in traversal order).
    pub fn mutants(&self) -> impl Iterator<Item = &Mutant> {
        self.units.iter().flat_map(|u| u.mutants.iter())
    }

    pub fn mutant(&self, id: MutantId) -> Option<&Mutant> {
        self.mutants().find(|m| m.id == id)
    }

    fn mutant_mut(&mut self, id: MutantId) -> Option<&mut Mutant> {
        self.units
            .iter_mut()
            .flat_map(|u| u.mutants.iter_mut())
            .find(|m| m.id == id)
    }

    /// Ids of mutants still awaiting a verdict.
    pub fn live(&self) -> Vec<MutantId> {
        self.mutants()
            .filter(|m| m.status == MutantStatus::Pending)
            .map(|m| m.id)
            .collect()
    }

    /// Register every live mutant in the coverage matrix, exactly once.
    pub fn seed_matrix(&mut self) {
        let live = self.live();
        for id in live {
            self.matrix.register(id);
        }
    }

    /// Copy matrix coverage onto the mutants for reporting.
    pub fn adopt_coverage(&mut self) {
        let snapshot: Vec<(MutantId, Vec<TestId>, bool)> = self
            .matrix
            .iter()
            .map(|(id, e)| (id, e.tests.iter().cloned().collect(), e.is_static))
            .collect();

        for (id, tests, is_static) in snapshot {
            if let Some(mutant) = self.mutant_mut(id) {
                mutant.covering_tests = tests.iter().map(|t| t.0.clone()).collect();
                mutant.is_static = is_static;
            }
        }
    }

    /// Transition a mutant to `status`. Returns false (and changes nothing)
    /// when the mutant is already terminal or unknown.
    pub fn set_status(&mut self, id: MutantId, status: MutantStatus, reason: &str) -> bool {
        match self.mutant_mut(id) {
            Some(mutant) if !mutant.status.is_terminal() => {
                mutant.status = status;
                mutant.status_reason = reason.to_string();
                true
            }
            _ => false,
        }
    }

    /// Record a scheduler verdict with its evidence.
    pub fn record_verdict(
        &mut self,
        id: MutantId,
        status: MutantStatus,
        reason: &str,
        killing_tests: Vec<TestId>,
        duration_ms: Option<u64>,
    ) -> bool {
        match self.mutant_mut(id) {
            Some(mutant) if !mutant.status.is_terminal() => {
                mutant.status = status;
                mutant.status_reason = reason.to_string();
                mutant.killing_tests = killing_tests.into_iter().map(|t| t.0).collect();
                mutant.duration_ms = duration_ms;
                true
            }
            _ => false,
        }
    }

    pub fn test_ids(&self) -> Vec<TestId> {
        self.tests.iter().map(|t| t.id.clone()).collect()
    }
}

//! Compile/rollback loop.
//!
//! The instrumented trees are handed to the compiler collaborator; when it
//! reports errors, each diagnostic span is mapped back to the smallest
//! enclosing placement and the offending mutants are excised from the trees
//! (original branch only) and marked `CompileError`. Every iteration strictly
//! shrinks the live-mutant set, so the loop terminates in at most
//! live-mutant-count iterations.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;

use crate::error::EngineError;
use crate::frontend::{CompileOutcome, LanguageFrontend};
use crate::mutant::{MutantId, MutantStatus, MutatedUnit};
use crate::placer::{excise_mutants, PlacementRegistry};

/// What the loop did before reaching a clean compile.
#[derive(Debug, Default)]
pub struct RollbackOutcome {
    /// Compile attempts, including the successful one.
    pub attempts: usize,

    /// Mutants removed for breaking the build.
    pub rolled_back: Vec<MutantId>,
}

/// Compile `units`, rolling back mutants until the build is clean.
///
/// On success the instrumented artifact has been written to `output` by the
/// frontend. Mutants excised along the way are marked `CompileError` with
/// the diagnostic that blamed them.
pub fn compile_with_rollback<F: LanguageFrontend + ?Sized>(
    frontend: &F,
    units: &mut [MutatedUnit],
    placements: &mut PlacementRegistry,
    output: &Path,
) -> Result<RollbackOutcome> {
    let live: usize = units
        .iter()
        .flat_map(|u| &u.mutants)
        .filter(|m| m.status == MutantStatus::Pending)
        .count();

    let mut outcome = RollbackOutcome::default();

    // `live + 1` attempts suffice: each retry removes at least one mutant.
    for _ in 0..=live {
        outcome.attempts += 1;

        let trees: Vec<_> = units.iter().map(|u| u.mutated.clone()).collect();
        match frontend.compile(&trees, output)? {
            CompileOutcome::Ok => return Ok(outcome),
            CompileOutcome::Errors(diags) => {
                let mut doomed: BTreeMap<MutantId, String> = BTreeMap::new();
                for diag in &diags {
                    // A zero-width span carries no position to blame a
                    // placement for; never excise a mutant on its account.
                    if diag.span.is_empty() {
                        continue;
                    }
                    if let Some(id) = placements.smallest_enclosing(&diag.span) {
                        doomed.entry(id).or_insert_with(|| diag.message.clone());
                    }
                }

                if doomed.is_empty() {
                    let first = diags
                        .first()
                        .map(|d| d.message.clone())
                        .unwrap_or_else(|| "unknown compile error".to_string());
                    return Err(EngineError::CompileUnrecoverable(first).into());
                }

                let ids: BTreeSet<MutantId> = doomed.keys().copied().collect();
                for unit in units.iter_mut() {
                    unit.mutated = excise_mutants(&unit.mutated, &ids);
                    for mutant in &mut unit.mutants {
                        if let Some(message) = doomed.get(&mutant.id) {
                            mutant.status = MutantStatus::CompileError;
                            mutant.status_reason = message.clone();
                        }
                    }
                }
                for id in &ids {
                    placements.remove(*id);
                }
                outcome.rolled_back.extend(ids);
            }
        }
    }

    Err(EngineError::CompileUnrecoverable(
        "rollback attempts exhausted without a clean compile".to_string(),
    )
    .into())
}

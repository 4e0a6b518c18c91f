//! Mutation score and break-threshold verdict.

use serde::Serialize;

use crate::mutant::{Mutant, MutantStatus};

/// Status tallies for a finished (or cancelled) session.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct ScoreSummary {
    pub killed: usize,
    pub survived: usize,
    pub timeout: usize,
    pub no_coverage: usize,
    pub compile_errors: usize,
    pub ignored: usize,
    pub pending: usize,
    pub total: usize,
}

impl ScoreSummary {
    pub fn tally<'a>(mutants: impl Iterator<Item = &'a Mutant>) -> ScoreSummary {
        let mut summary = ScoreSummary::default();
        for m in mutants {
            summary.total += 1;
            match m.status {
                MutantStatus::Killed => summary.killed += 1,
                MutantStatus::Survived => summary.survived += 1,
                MutantStatus::Timeout => summary.timeout += 1,
                MutantStatus::NoCoverage => summary.no_coverage += 1,
                MutantStatus::CompileError => summary.compile_errors += 1,
                MutantStatus::Ignored => summary.ignored += 1,
                MutantStatus::Pending => summary.pending += 1,
            }
        }
        summary
    }

    /// Mutants counted as detected: timeouts are treated as kills.
    pub fn detected(&self) -> usize {
        self.killed + self.timeout
    }

    /// Mutants the score is computed over. `count_uncovered` folds uncovered
    /// mutants in as survivors; ignored and compile-error mutants never
    /// count.
    pub fn denominator(&self, count_uncovered: bool) -> usize {
        let base = self.killed + self.timeout + self.survived;
        if count_uncovered {
            base + self.no_coverage
        } else {
            base
        }
    }

    /// Mutation score in `[0, 1]`, or NaN when nothing was testable.
    pub fn score(&self, count_uncovered: bool) -> f64 {
        let denominator = self.denominator(count_uncovered);
        if denominator == 0 {
            return f64::NAN;
        }
        self.detected() as f64 / denominator as f64
    }

    pub fn score_percent(&self, count_uncovered: bool) -> f64 {
        self.score(count_uncovered) * 100.0
    }
}

/// Final verdict surfaced to the caller as the process exit code.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitVerdict {
    Success,
    BreakThresholdViolated { score_percent: f64, break_at: f64 },
}

impl ExitVerdict {
    /// Compare the score against the configured threshold.
    ///
    /// An undefined score (no testable mutants) always succeeds: there is
    /// nothing to hold against the threshold.
    pub fn evaluate(score: f64, break_at: Option<f64>) -> ExitVerdict {
        let Some(break_at) = break_at else {
            return ExitVerdict::Success;
        };
        if score.is_nan() {
            return ExitVerdict::Success;
        }

        let score_percent = score * 100.0;
        if score_percent < break_at {
            ExitVerdict::BreakThresholdViolated {
                score_percent,
                break_at,
            }
        } else {
            ExitVerdict::Success
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ExitVerdict::Success => 0,
            ExitVerdict::BreakThresholdViolated { .. } => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutant::{MutantId, MutationKind};
    use crate::span::SourceSpan;

    fn mutant_with_status(id: i32, status: MutantStatus) -> Mutant {
        Mutant {
            id: MutantId(id),
            kind: MutationKind::Boolean,
            display_name: "true -> false".to_string(),
            span: SourceSpan::new("src/calc.cs", 0, 4, 1, 1),
            original_snippet: "true".to_string(),
            mutated_snippet: "false".to_string(),
            status,
            status_reason: String::new(),
            covering_tests: Default::default(),
            is_static: false,
            killing_tests: Vec::new(),
            duration_ms: None,
        }
    }

    fn summary_of(statuses: &[MutantStatus]) -> ScoreSummary {
        let mutants: Vec<Mutant> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| mutant_with_status(i as i32, *s))
            .collect();
        ScoreSummary::tally(mutants.iter())
    }

    #[test]
    fn tested_counts_add_up_to_the_denominator() {
        let summary = summary_of(&[
            MutantStatus::Killed,
            MutantStatus::Killed,
            MutantStatus::Survived,
            MutantStatus::Timeout,
            MutantStatus::NoCoverage,
            MutantStatus::Ignored,
            MutantStatus::CompileError,
        ]);

        assert_eq!(
            summary.killed + summary.survived + summary.timeout,
            summary.denominator(false)
        );
        assert_eq!(summary.denominator(false), 4);
        assert_eq!(summary.denominator(true), 5);
    }

    #[test]
    fn score_stays_in_unit_range_or_nan() {
        let summary = summary_of(&[
            MutantStatus::Killed,
            MutantStatus::Timeout,
            MutantStatus::Survived,
        ]);
        let score = summary.score(false);
        assert!((0.0..=1.0).contains(&score));
        assert!((score - 2.0 / 3.0).abs() < 1e-9);

        let empty = summary_of(&[MutantStatus::Ignored]);
        assert!(empty.score(false).is_nan());
    }

    #[test]
    fn threshold_violation_maps_to_exit_code_2() {
        let verdict = ExitVerdict::evaluate(0.3, Some(40.0));
        assert_eq!(verdict.exit_code(), 2);
        match verdict {
            ExitVerdict::BreakThresholdViolated {
                score_percent,
                break_at,
            } => {
                assert!((score_percent - 30.0).abs() < 1e-9);
                assert!((break_at - 40.0).abs() < 1e-9);
            }
            ExitVerdict::Success => panic!("0.3 < 0.4 must violate"),
        }
    }

    #[test]
    fn undefined_score_succeeds_regardless_of_threshold() {
        let verdict = ExitVerdict::evaluate(f64::NAN, Some(40.0));
        assert_eq!(verdict, ExitVerdict::Success);
        assert_eq!(verdict.exit_code(), 0);
    }

    #[test]
    fn meeting_the_threshold_succeeds() {
        assert_eq!(
            ExitVerdict::evaluate(0.4, Some(40.0)),
            ExitVerdict::Success
        );
        assert_eq!(ExitVerdict::evaluate(0.1, None), ExitVerdict::Success);
    }
}

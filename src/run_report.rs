use std::path::PathBuf;

use serde::Serialize;

use crate::mutant::Mutant;
use crate::score::ScoreSummary;

/// Coverage-phase metadata included in the run report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageReport {
    /// Tests executed during the coverage run.
    pub tests: usize,

    /// Longest coverage-run test in milliseconds.
    pub longest_test_ms: u64,

    /// Derived per-mutant timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Machine-readable report for a mutation test run.
///
/// In `--json` mode we print this to stdout as pretty JSON.
#[derive(Debug, Serialize)]
pub struct MutationRunReport {
    /// Tool name, stable across versions.
    pub tool: &'static str,

    /// Current crate version.
    pub version: &'static str,

    /// The project root used for this run.
    pub project_root: PathBuf,

    /// Number of mutants discovered by orchestration.
    pub discovered: usize,

    /// Coverage-phase metadata.
    pub coverage: CoverageReport,

    /// Status tallies.
    pub summary: ScoreSummary,

    /// Mutation score in percent; `null` when no mutant was testable.
    pub score_percent: Option<f64>,

    /// Configured break threshold in percent, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_at: Option<f64>,

    /// Every tracked mutant with its final status and evidence.
    pub mutants: Vec<Mutant>,

    /// Optional high-level error message (for example a failing baseline).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MutationRunReport {
    pub fn success(
        project_root: PathBuf,
        coverage: CoverageReport,
        summary: ScoreSummary,
        score_percent: f64,
        break_at: Option<f64>,
        mutants: Vec<Mutant>,
    ) -> Self {
        Self {
            tool: "sharp-mutant",
            version: env!("CARGO_PKG_VERSION"),
            project_root,
            discovered: mutants.len(),
            coverage,
            summary,
            score_percent: if score_percent.is_nan() {
                None
            } else {
                Some(score_percent)
            },
            break_at,
            mutants,
            error: None,
        }
    }

    pub fn failure(project_root: PathBuf, error: String) -> Self {
        Self {
            tool: "sharp-mutant",
            version: env!("CARGO_PKG_VERSION"),
            project_root,
            discovered: 0,
            coverage: CoverageReport::default(),
            summary: ScoreSummary::default(),
            score_percent: None,
            break_at: None,
            mutants: Vec::new(),
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_score_serializes_as_null() {
        let report = MutationRunReport::success(
            "proj".into(),
            CoverageReport::default(),
            ScoreSummary::default(),
            f64::NAN,
            Some(60.0),
            Vec::new(),
        );

        let json = serde_json::to_string(&report).expect("serialize report");
        assert!(json.contains("\"score_percent\":null"));
    }

    #[test]
    fn failure_report_carries_the_error() {
        let report = MutationRunReport::failure("proj".into(), "baseline failed".to_string());
        let json = serde_json::to_string_pretty(&report).expect("serialize report");

        assert!(json.contains("baseline failed"));
        assert!(json.contains("\"tool\": \"sharp-mutant\""));
    }
}

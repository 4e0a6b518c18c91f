use std::path::PathBuf;

use crate::error::EngineError;
use crate::mutant::MutationLevel;

/// One `--mutate` pattern: a `*`-wildcard path pattern, optionally prefixed
/// with `!` to exclude matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutatePattern {
    pub pattern: String,
    pub exclude: bool,
}

impl MutatePattern {
    /// Parse `"src/*"` or `"!src/Generated*"`.
    pub fn parse(raw: &str) -> MutatePattern {
        match raw.strip_prefix('!') {
            Some(rest) => MutatePattern {
                pattern: rest.to_string(),
                exclude: true,
            },
            None => MutatePattern {
                pattern: raw.to_string(),
                exclude: false,
            },
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        wildcard_match(&self.pattern, path)
    }
}

/// Minimal `*` glob. `*` matches any run of characters including `/`.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // Classic two-pointer wildcard walk with backtracking to the last star.
    let (mut pi, mut ti) = (0usize, 0usize);
    let (mut star, mut mark) = (None::<usize>, 0usize);

    while ti < t.len() {
        if pi < p.len() && (p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Configuration snapshot for one engine session, derived from the CLI.
#[derive(Debug, Clone)]
pub struct Options {
    /// Path to the project root holding `.ast.json` compilation units.
    pub project_root: PathBuf,

    /// Session mutation level; mutators below this level stay silent.
    pub level: MutationLevel,

    /// Worker pool width for mutant test runs.
    pub concurrency: usize,

    /// Lower bound for the derived per-mutant timeout.
    pub timeout_floor_ms: u64,

    /// Factor applied to the longest coverage-run test.
    pub timeout_multiplier: f64,

    /// Break threshold in percent; score below it fails the run.
    pub break_at: Option<f64>,

    /// Count uncovered mutants as survivors in the score denominator.
    pub count_uncovered: bool,

    /// File allow/deny patterns; an empty list mutates everything.
    pub mutate_patterns: Vec<MutatePattern>,

    /// Attribute marker that excludes a member or type from mutation.
    pub excluded_attribute: String,

    /// Command used to launch the test host.
    pub host_cmd: String,

    /// Extra arguments passed to the test host command.
    pub host_args: Vec<String>,

    /// Artifact directory.
    pub out_dir: PathBuf,

    /// When true, emit JSON to stdout and route human output to stderr.
    pub json_output: bool,
}

impl Options {
    /// Construct an `Options` instance with default values.
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            level: MutationLevel::default(),
            concurrency: 4,
            timeout_floor_ms: 5000,
            timeout_multiplier: 1.5,
            break_at: None,
            count_uncovered: false,
            mutate_patterns: Vec::new(),
            excluded_attribute: "ExcludeFromMutation".to_string(),
            host_cmd: "sharp-test-host".to_string(),
            host_args: Vec::new(),
            out_dir: PathBuf::from("mutants.out"),
            json_output: false,
        }
    }

    /// Reject configurations the engine cannot run with. Checked before any
    /// mutation work begins.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.concurrency == 0 {
            return Err(EngineError::ConfigurationInvalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeout_multiplier <= 0.0 {
            return Err(EngineError::ConfigurationInvalid(
                "timeout multiplier must be positive".to_string(),
            ));
        }
        if let Some(b) = self.break_at {
            if !(0.0..=100.0).contains(&b) {
                return Err(EngineError::ConfigurationInvalid(format!(
                    "break threshold {b} is outside 0..=100"
                )));
            }
        }
        if self.host_cmd.trim().is_empty() {
            return Err(EngineError::ConfigurationInvalid(
                "test host command must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Should `path` be mutated under the configured patterns?
    ///
    /// Empty pattern list means "everything". Otherwise at least one include
    /// pattern must match and no exclude pattern may match. Returns the
    /// excluding pattern for status reasons.
    pub fn mutate_decision(&self, path: &str) -> MutateDecision {
        if self.mutate_patterns.is_empty() {
            return MutateDecision::Mutate;
        }

        for p in self.mutate_patterns.iter().filter(|p| p.exclude) {
            if p.matches(path) {
                return MutateDecision::Excluded {
                    pattern: p.pattern.clone(),
                };
            }
        }

        let has_includes = self.mutate_patterns.iter().any(|p| !p.exclude);
        if !has_includes {
            return MutateDecision::Mutate;
        }

        if self
            .mutate_patterns
            .iter()
            .filter(|p| !p.exclude)
            .any(|p| p.matches(path))
        {
            MutateDecision::Mutate
        } else {
            MutateDecision::NotIncluded
        }
    }
}

/// Outcome of matching a unit path against the mutate patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutateDecision {
    Mutate,
    /// No include pattern matched; the unit is skipped silently.
    NotIncluded,
    /// An exclude pattern matched; mutants are reported as ignored.
    Excluded { pattern: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_star_crosses_separators() {
        assert!(wildcard_match("src/*", "src/calc.cs"));
        assert!(wildcard_match("src/*", "src/sub/deep.cs"));
        assert!(wildcard_match("*Tests*", "src/CalcTests.cs"));
        assert!(!wildcard_match("src/*.cs", "lib/calc.cs"));
        assert!(wildcard_match("exact.cs", "exact.cs"));
        assert!(!wildcard_match("exact.cs", "exact.cs.bak"));
    }

    #[test]
    fn exclude_pattern_wins_over_include() {
        let mut options = Options::new(PathBuf::from("."));
        options.mutate_patterns = vec![
            MutatePattern::parse("src/*"),
            MutatePattern::parse("!src/Legacy*"),
        ];

        assert_eq!(
            options.mutate_decision("src/calc.cs"),
            MutateDecision::Mutate
        );
        assert_eq!(
            options.mutate_decision("src/Legacy/old.cs"),
            MutateDecision::Excluded {
                pattern: "src/Legacy*".to_string()
            }
        );
        assert_eq!(
            options.mutate_decision("lib/other.cs"),
            MutateDecision::NotIncluded
        );
    }

    #[test]
    fn empty_pattern_list_mutates_everything() {
        let options = Options::new(PathBuf::from("."));
        assert_eq!(
            options.mutate_decision("anything/at/all.cs"),
            MutateDecision::Mutate
        );
    }

    #[test]
    fn validate_rejects_zero_concurrency_and_bad_threshold() {
        let mut options = Options::new(PathBuf::from("."));
        options.concurrency = 0;
        assert!(options.validate().is_err());

        options.concurrency = 2;
        options.break_at = Some(140.0);
        assert!(options.validate().is_err());

        options.break_at = Some(60.0);
        assert!(options.validate().is_ok());
    }
}

//! Test-platform collaborator contract.
//!
//! Test discovery and execution happen behind `TestPlatform`; the engine only
//! sees opaque test ids, outcomes, durations and the property bag each test
//! reports (which is where the coverage collector ships its data).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitAndAssign, Not};
use std::path::PathBuf;

use crate::error::EngineError;
use crate::mutant::MutantId;

/// Opaque test identifier. Identity and equality are the id, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TestId(pub String);

impl TestId {
    pub fn new(id: impl Into<String>) -> TestId {
        TestId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One discovered test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDescription {
    pub id: TestId,
    pub name: String,
    pub source_path: PathBuf,
    /// Free-form framework hint from the adapter (`nunit`, `xunit`, …).
    #[serde(default)]
    pub framework_tag: String,
}

impl PartialEq for TestDescription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TestDescription {}

/// Outcome of one executed test case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Failed,
    TimedOut,
    Skipped,
}

/// One test result row streamed back from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test: TestId,
    pub outcome: TestOutcome,
    pub duration_ms: u64,
    /// Property bag; the coverage collector reports under `Coverage` and
    /// `OutOfTests`.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Everything a `run` invocation produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestRun {
    pub results: Vec<TestResult>,
}

/// Collector configuration, carried opaquely inside the settings document
/// and decoded by the in-host collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CollectorSettings {
    pub capture_coverage: bool,

    /// Active-mutant assignment per test. One entry with an empty test list
    /// means "active for the whole session" (single-mutant runs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutant_map: Vec<(MutantId, Vec<TestId>)>,

    /// Namespace of the runtime control type injected into the mutated
    /// assembly.
    pub helper_namespace: String,

    /// Redirect debug assertions to test failures instead of host aborts.
    #[serde(default)]
    pub redirect_debug_asserts: bool,
}

/// Settings document handed to the test platform per invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    /// Host-side test parallelism. Batched multi-mutant runs must set 1,
    /// otherwise a test's active mutant cannot be set deterministically.
    pub concurrency: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,

    /// Omitted entirely for the default platform (`AnyCPU`-like).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_platform: Option<String>,

    /// Subset of tests to run; `None` runs everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_filter: Option<Vec<TestId>>,

    #[serde(default)]
    pub design_mode: bool,

    pub collector: CollectorSettings,
}

impl RunSettings {
    /// Settings for the initial coverage run: all tests, capture on, no
    /// active mutant.
    pub fn coverage_run(concurrency: usize, helper_namespace: &str) -> RunSettings {
        RunSettings {
            concurrency,
            timeout_ms: None,
            target_framework: None,
            target_platform: None,
            test_filter: None,
            design_mode: false,
            collector: CollectorSettings {
                capture_coverage: true,
                mutant_map: Vec::new(),
                helper_namespace: helper_namespace.to_string(),
                redirect_debug_asserts: true,
            },
        }
    }
}

/// Test discovery and execution contract.
pub trait TestPlatform {
    fn discover(&self, settings: &RunSettings) -> Result<Vec<TestDescription>, EngineError>;

    fn run(&self, settings: &RunSettings) -> Result<TestRun, EngineError>;
}

/// Bit set of test frameworks seen in a discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frameworks(u8);

impl Frameworks {
    pub const NONE: Frameworks = Frameworks(0);
    pub const NUNIT: Frameworks = Frameworks(1);
    pub const XUNIT: Frameworks = Frameworks(1 << 1);
    pub const MSTEST: Frameworks = Frameworks(1 << 2);

    pub fn contains(self, other: Frameworks) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Frameworks) {
        self.0 |= other.0;
    }

    /// Human-readable names of the retained bits.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::NUNIT) {
            names.push("nunit");
        }
        if self.contains(Self::XUNIT) {
            names.push("xunit");
        }
        if self.contains(Self::MSTEST) {
            names.push("mstest");
        }
        names
    }
}

impl Not for Frameworks {
    type Output = Frameworks;

    fn not(self) -> Frameworks {
        Frameworks(!self.0)
    }
}

impl BitAndAssign for Frameworks {
    fn bitand_assign(&mut self, rhs: Frameworks) {
        self.0 &= rhs.0;
    }
}

/// Detect which frameworks the discovered tests come from.
///
/// NOTE: the MsTest bit is set and then unconditionally cleared before
/// returning. Downstream scheduling only branches on NUnit/XUnit and
/// existing callers rely on MsTest never being reported, so the cleared bit
/// stays cleared.
pub fn detect_frameworks(tests: &[TestDescription]) -> Frameworks {
    let mut detected = Frameworks::NONE;

    for test in tests {
        let tag = test.framework_tag.to_ascii_lowercase();
        if tag.contains("nunit") {
            detected.insert(Frameworks::NUNIT);
        }
        if tag.contains("xunit") {
            detected.insert(Frameworks::XUNIT);
        }
        if tag.contains("mstest") {
            detected.insert(Frameworks::MSTEST);
        }
    }

    detected &= !Frameworks::MSTEST;
    detected
}

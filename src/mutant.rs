use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::span::SourceSpan;
use crate::syntax::{Expr, SyntaxTree};

/// Globally unique mutant identifier.
///
/// Ids are assigned by the session in traversal order and are stable across
/// runs of the same source trees. `-1` is reserved for "no mutant active"
/// inside the test host and never names a mutant.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(transparent)]
pub struct MutantId(pub i32);

impl MutantId {
    /// Sentinel meaning "no mutant active".
    pub const NONE: MutantId = MutantId(-1);
}

impl fmt::Display for MutantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category tag of a mutation rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Arithmetic,
    Equality,
    Boolean,
    String,
    Update,
    CheckedRemoval,
    Assignment,
    NullConditional,
    CollectionInit,
    Linq,
}

impl MutationKind {
    /// Short, stable identifier used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::Arithmetic => "arithmetic",
            Self::Equality => "equality",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Update => "update",
            Self::CheckedRemoval => "checked_removal",
            Self::Assignment => "assignment",
            Self::NullConditional => "null_conditional",
            Self::CollectionInit => "collection_init",
            Self::Linq => "linq",
        }
    }
}

/// Ordinal mutation level; mutators declare their minimum level and only
/// emit when the session level is at least that.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default,
)]
pub enum MutationLevel {
    Basic,
    #[default]
    Standard,
    Advanced,
    Complete,
}

/// A proposed edit at one syntactic site. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Span of the node the mutation replaces (weak locator; the mutated
    /// tree owns its nodes).
    pub original_span: SourceSpan,

    /// Replacement subtree, trivia already carried over.
    pub replacement: Expr,

    /// Human-readable description, e.g. `x++ -> x--`.
    pub display_name: String,

    /// Rule category that produced this mutation.
    pub kind: MutationKind,
}

/// Terminal and non-terminal states of a tracked mutant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MutantStatus {
    /// Created, not yet classified.
    Pending,
    /// Excluded by a filter or an unsupported placement.
    Ignored,
    /// Removed by the rollback loop because it broke compilation.
    CompileError,
    /// No test executed the mutant's site during the coverage run.
    NoCoverage,
    /// At least one covering test failed while the mutant was active.
    Killed,
    /// Every covering test passed while the mutant was active.
    Survived,
    /// A covering test exceeded the per-mutant timeout.
    Timeout,
}

impl MutantStatus {
    /// Once terminal, a mutant's status never changes again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Label used in reports and artifact files.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ignored => "ignored",
            Self::CompileError => "compile_error",
            Self::NoCoverage => "no_coverage",
            Self::Killed => "killed",
            Self::Survived => "survived",
            Self::Timeout => "timeout",
        }
    }
}

/// A tracked instance of a `Mutation` with a stable id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mutant {
    /// Session-global identifier, assigned in traversal order.
    pub id: MutantId,

    /// Rule category that produced the mutation.
    pub kind: MutationKind,

    /// Human-readable description of the edit.
    pub display_name: String,

    /// Location of the mutated site.
    pub span: SourceSpan,

    /// Rendered original subtree.
    pub original_snippet: String,

    /// Rendered replacement subtree.
    pub mutated_snippet: String,

    /// Current classification.
    pub status: MutantStatus,

    /// Why the mutant reached its status (filter pattern, killing test,
    /// compile diagnostic, …). Empty while pending.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_reason: String,

    /// Tests whose coverage fingerprint overlaps this mutant.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub covering_tests: BTreeSet<String>,

    /// First hit came from a one-time initializer; the mutant must be run
    /// against the full test suite.
    #[serde(default)]
    pub is_static: bool,

    /// Tests that killed the mutant, in completion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub killing_tests: Vec<String>,

    /// Wall-clock spent testing this mutant, when it was dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Mutant {
    /// Track a fresh mutant for `mutation` under `id`.
    pub fn from_mutation(id: MutantId, mutation: &Mutation, original: &Expr) -> Mutant {
        Mutant {
            id,
            kind: mutation.kind,
            display_name: mutation.display_name.clone(),
            span: mutation.original_span.clone(),
            original_snippet: original.to_string(),
            mutated_snippet: mutation.replacement.to_string(),
            status: MutantStatus::Pending,
            status_reason: String::new(),
            covering_tests: BTreeSet::new(),
            is_static: false,
            killing_tests: Vec::new(),
            duration_ms: None,
        }
    }
}

/// A compilation unit together with its instrumented form and the mutants
/// placed into it.
#[derive(Debug, Clone)]
pub struct MutatedUnit {
    pub original: SyntaxTree,
    pub mutated: SyntaxTree,
    pub mutants: Vec<Mutant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(MutationLevel::Basic < MutationLevel::Standard);
        assert!(MutationLevel::Standard < MutationLevel::Advanced);
        assert!(MutationLevel::Advanced < MutationLevel::Complete);
    }

    #[test]
    fn pending_is_the_only_non_terminal_status() {
        assert!(!MutantStatus::Pending.is_terminal());
        for s in [
            MutantStatus::Ignored,
            MutantStatus::CompileError,
            MutantStatus::NoCoverage,
            MutantStatus::Killed,
            MutantStatus::Survived,
            MutantStatus::Timeout,
        ] {
            assert!(s.is_terminal(), "{} should be terminal", s.label());
        }
    }

    #[test]
    fn none_sentinel_is_negative_one() {
        assert_eq!(MutantId::NONE, MutantId(-1));
        assert_eq!(MutantId::NONE.to_string(), "-1");
    }
}

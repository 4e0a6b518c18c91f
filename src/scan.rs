use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::mutant::Mutant;
use crate::syntax::{MemberKind, SyntaxTree};

/// High-level overview of a project used by the `scan` subcommand.
#[derive(Debug, Clone)]
pub struct ProjectOverview {
    /// Absolute path to the project root.
    pub root: PathBuf,

    /// Number of tree-file compilation units.
    pub unit_files: usize,

    /// Units skipped because they are generated code.
    pub generated_units: usize,

    /// Type declarations across all units.
    pub types: usize,

    /// Method members across all units.
    pub methods: usize,

    /// Mutation sites found, keyed by mutation kind name.
    pub sites_by_kind: BTreeMap<&'static str, usize>,

    /// Total mutation sites.
    pub total_sites: usize,
}

impl ProjectOverview {
    /// Build an overview from loaded trees and a dry-run discovery.
    pub fn from_discovery(root: PathBuf, trees: &[SyntaxTree], mutants: &[Mutant]) -> Self {
        let generated_units = trees.iter().filter(|t| t.is_generated).count();
        let types = trees.iter().map(|t| t.types.len()).sum();
        let methods = trees
            .iter()
            .flat_map(|t| &t.types)
            .flat_map(|ty| &ty.members)
            .filter(|m| matches!(m.kind, MemberKind::Method { .. }))
            .count();

        let mut sites_by_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
        for m in mutants {
            *sites_by_kind.entry(m.kind.name()).or_default() += 1;
        }

        ProjectOverview {
            root,
            unit_files: trees.len(),
            generated_units,
            types,
            methods,
            sites_by_kind,
            total_sites: mutants.len(),
        }
    }
}

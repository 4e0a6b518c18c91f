use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::frontend::LanguageFrontend;
use crate::source::SourceFile;
use crate::syntax::SyntaxTree;

/// Extension of pre-parsed compilation units.
pub const TREE_EXTENSION: &str = ".ast.json";

/// A source project: a root directory holding tree-file compilation units.
#[derive(Debug, Clone)]
pub struct Project {
    /// Root directory of the project.
    pub root: PathBuf,

    /// Tree files found under the root, sorted by relative path.
    pub units: Vec<SourceFile>,
}

impl Project {
    /// Load a project by finding all `.ast.json` units under `root`.
    pub fn from_root(root: PathBuf) -> Result<Self> {
        let mut relative = Vec::new();
        collect_tree_files(&root, Path::new(""), &mut relative)
            .with_context(|| format!("failed to scan project root {:?}", root))?;

        // Sorted traversal keeps unit order (and therefore mutant ids)
        // stable across runs.
        relative.sort();

        let units = relative
            .iter()
            .map(|rel| SourceFile::from_relative(&root, rel))
            .collect();

        Ok(Self { root, units })
    }

    /// Root directory as a `Path`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up a unit by the path recorded in a span (relative or absolute).
    pub fn find_source(&self, path: &Path) -> Option<&SourceFile> {
        self.units
            .iter()
            .find(|s| s.relative_path() == path || s.path() == path)
    }

    /// Parse every unit through the frontend.
    pub fn load_trees<F: LanguageFrontend>(&self, frontend: &F) -> Result<Vec<SyntaxTree>> {
        self.units
            .iter()
            .map(|unit| {
                frontend
                    .parse(unit.path())
                    .with_context(|| format!("failed to load unit {:?}", unit.relative_path()))
            })
            .collect()
    }
}

fn collect_tree_files(root: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let dir = root.join(rel);
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let child_rel = rel.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_tree_files(root, &child_rel, out)?;
        } else if name.to_string_lossy().ends_with(TREE_EXTENSION) {
            out.push(child_rel);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_units_recursively_and_sorted() {
        let td = TempDir::new().expect("TempDir should create");
        fs::create_dir_all(td.path().join("src/sub")).expect("mkdir");
        fs::write(td.path().join("src/zeta.ast.json"), "{}").expect("write");
        fs::write(td.path().join("src/sub/alpha.ast.json"), "{}").expect("write");
        fs::write(td.path().join("src/readme.md"), "not a unit").expect("write");

        let project = Project::from_root(td.path().to_path_buf()).expect("project loads");

        let rel: Vec<_> = project
            .units
            .iter()
            .map(|u| u.relative_path().to_string_lossy().to_string())
            .collect();
        assert_eq!(rel, vec!["src/sub/alpha.ast.json", "src/zeta.ast.json"]);
    }

    #[test]
    fn find_source_matches_relative_and_absolute() {
        let td = TempDir::new().expect("TempDir should create");
        fs::write(td.path().join("calc.ast.json"), "{}").expect("write");

        let project = Project::from_root(td.path().to_path_buf()).expect("project loads");

        assert!(project.find_source(Path::new("calc.ast.json")).is_some());
        assert!(project
            .find_source(&td.path().join("calc.ast.json"))
            .is_some());
        assert!(project.find_source(Path::new("missing.ast.json")).is_none());
    }
}

use std::path::{Path, PathBuf};

/// One tree-file compilation unit within a project.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the project root (for example `src/Calc.ast.json`).
    pub root_relative: PathBuf,

    /// Absolute path on disk.
    pub absolute_path: PathBuf,
}

impl SourceFile {
    /// Construct a `SourceFile` from a project root and a relative path.
    pub fn from_relative(root: &Path, rel: &Path) -> Self {
        let absolute_path = root.join(rel);
        Self {
            root_relative: rel.to_path_buf(),
            absolute_path,
        }
    }

    /// Absolute path on disk.
    pub fn path(&self) -> &Path {
        &self.absolute_path
    }

    /// Path relative to the project root.
    pub fn relative_path(&self) -> &Path {
        &self.root_relative
    }
}

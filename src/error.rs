use std::path::PathBuf;
use thiserror::Error;

/// Engine-level failures. Mutant verdicts (timeout, redirected assertion)
/// are statuses, not errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The language frontend could not parse a unit. Fatal for that file.
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The rollback loop exhausted its candidates without a clean compile.
    #[error("compilation failed with no identifiable mutant to blame: {0}")]
    CompileUnrecoverable(String),

    /// The test host could not be reached, even after a retry with a fresh
    /// process.
    #[error("test host unreachable: {0}")]
    TestHostUnreachable(String),

    /// Options rejected before any mutation work began.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigurationInvalid(_) => 64,
            Self::Parse { .. } => 65,
            Self::CompileUnrecoverable(_) => 66,
            Self::TestHostUnreachable(_) => 67,
            Self::Io(_) => 74,
        }
    }
}

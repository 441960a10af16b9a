//! Error types for alias-lattice.

use thiserror::Error;

/// Errors surfaced to the fixpoint driver.
///
/// Everything here is an unrecoverable programming error or a misuse of the
/// lattice API; the lattice operations themselves are deterministic, so a
/// failing analysis run is reproducible and should be aborted rather than
/// retried.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// An aliasing set was constructed from zero labels. A variable always
    /// denotes at least one abstract location, so this is a caller bug.
    #[error("Aliasing set must contain at least one label")]
    EmptyAliasingSet,

    /// A strict-mode tuple was asked about an aliasing set it has no
    /// information for.
    #[error("Information for unknown aliasing set requested: {0}")]
    UnknownAliasingSet(String),

    /// A disjoint-set tuple was asked about a key it has never seen.
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// An operation mixed lattice elements or labels from different alias
    /// analyses.
    #[error("Cannot mix lattice elements based on different alias analyses")]
    AnalysisMismatch,

    /// A flow graph operation referenced a vertex that does not exist.
    #[error("Vertex {0} does not exist in the flow graph")]
    GraphVertex(u64),

    /// An error with a custom message.
    #[error("{0}")]
    Custom(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

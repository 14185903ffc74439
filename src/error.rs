use thiserror::Error;

/// Result alias for `canopy`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by clustering, tree construction, retrieval and persistence.
#[derive(Debug, Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Blank text handed to an embedding capability.
    #[error("cannot create an embedding for empty text")]
    EmptyText,

    /// Vector dimension mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Invalid number of clusters requested.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// An embedding, summarization or answer capability failed.
    #[error("{capability} capability failed: {message}")]
    Capability {
        /// Which capability failed (`embedding`, `summarization`, `answer`).
        capability: &'static str,
        /// Message from the underlying provider.
        message: String,
    },

    /// Retrieval method string did not name a supported strategy.
    #[error("unknown retrieval method: {0} (expected \"tree_traversal\" or \"collapsed_tree\")")]
    UnknownRetrievalMethod(String),

    /// A node id did not resolve inside the tree.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The eigensolver produced non-finite output during reduction.
    #[error("eigendecomposition failed: {0}")]
    Eigen(String),

    /// Filesystem error during save/load.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Encoding or decoding a persisted tree failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    pub(crate) fn capability(capability: &'static str, message: impl Into<String>) -> Self {
        Error::Capability {
            capability,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_offending_method() {
        let err = Error::UnknownRetrievalMethod("bfs".into());
        assert!(err.to_string().contains("bfs"));
    }

    #[test]
    fn test_io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}

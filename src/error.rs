use thiserror::Error;

/// Main error type for PrismCast
#[derive(Error, Debug)]
pub enum PrismError {
    /// Unrecoverable malformed box at the top level; stops the pipeline.
    #[error("Malformed box stream: {0}")]
    Parse(String),

    /// Per-moof rewrite fault; the fragment passes through unmodified.
    #[error("Fragment fault: {0}")]
    Fragment(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PrismError>;

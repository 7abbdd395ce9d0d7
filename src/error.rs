use thiserror::Error;

/// Crate-wide error taxonomy. One kind per spec §7 error category, each
/// carrying enough structured context for a caller to decide what to do
/// without string-matching the message.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    #[error(
        "insufficient data: have {have_s:.2}s of overlap, need at least {need_s:.2}s"
    )]
    InsufficientData { have_s: f64, need_s: f64 },

    #[error("insufficient PTT windows: have {have}, need at least {need}")]
    InsufficientWindows { have: usize, need: usize },

    #[error("unstable signal after filtering: {channel} channel std is {std:.6}")]
    UnstableSignal { channel: &'static str, std: f64 },

    #[error("trend store persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum InvalidInputError {
    #[error("non-finite sample value at index {index} in {channel} channel")]
    NonFiniteSample { channel: &'static str, index: usize },

    #[error("mismatched array lengths: {name_a} has {len_a}, {name_b} has {len_b}")]
    MismatchedLengths {
        name_a: &'static str,
        len_a: usize,
        name_b: &'static str,
        len_b: usize,
    },

    #[error("timestamps not monotonic non-decreasing in {channel} channel at index {index}")]
    NonMonotonicTimestamps { channel: &'static str, index: usize },

    #[error("target sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),
}

/// Result alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

//! calibr error types

/// calibr result type
pub type Result<T> = std::result::Result<T, Error>;

/// calibr errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from numr operations
    #[error("numr error: {0}")]
    Numr(#[from] numr::error::Error),

    /// A statistic identifier that cannot be parsed
    #[error("invalid statistic name '{name}': {reason}")]
    InvalidStatistic {
        /// The offending identifier
        name: String,
        /// Why it's invalid
        reason: String,
    },

    /// A configuration option with an invalid or inconsistent value
    #[error("invalid value for '{key}': {reason}")]
    InvalidConfigValue {
        /// Configuration key
        key: &'static str,
        /// Why it's invalid
        reason: String,
    },

    /// A resolved scale below the numeric threshold
    #[error(
        "resolved scale for '{key}' is degenerate (minimum {min:e}): \
         the dataset may contain insufficient variation; {hint}"
    )]
    DegenerateScale {
        /// Configuration key that produced the scale
        key: &'static str,
        /// Minimum of the resolved scale
        min: f64,
        /// How to disable or fix the scaling
        hint: &'static str,
    },

    /// The statistics backend violated its contract
    #[error("statistics backend error: {reason}")]
    StatisticsBackend {
        /// Description of what went wrong
        reason: String,
    },

    /// Insertion anchor not present in the pipeline
    #[error("no stage named '{anchor}' to insert before")]
    MissingStage {
        /// The anchor stage name
        anchor: String,
    },

    /// A stage name is already taken
    #[error("a stage named '{name}' already exists")]
    DuplicateStage {
        /// The colliding stage name
        name: String,
    },

    /// A required field is missing from a batch or state map
    #[error("missing field '{field}'")]
    MissingField {
        /// The field name
        field: String,
    },

    /// Per-atom loss requested on a field that is not graph-level
    #[error(
        "per-atom loss on '{key}' is meaningless: the field is not registered \
         as a graph-level field; per-node fields don't need per-atom normalization"
    )]
    NotGraphField {
        /// The offending quantity key
        key: String,
    },

    /// Loss construction or evaluation mode not supported
    #[error("unsupported loss: {reason}")]
    UnsupportedLoss {
        /// Description of what went wrong
        reason: String,
    },

    /// Invalid argument to an operation
    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// Argument name
        arg: &'static str,
        /// Why it's invalid
        reason: String,
    },
}

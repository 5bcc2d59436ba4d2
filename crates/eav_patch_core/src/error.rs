use thiserror::Error;

/// Definition problems detected before (or at) schema mutation time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(
        "store specific labels and option creation cannot be combined; apply one of them manually"
    )]
    ConflictingOptionLabelConfig,

    #[error("input \"{input}\" is not compatible with options")]
    IncompatibleInputType { input: String },

    #[error("cannot create options, source model \"{source_model}\" is already set")]
    SourceModelConflict { source_model: String },

    #[error("invalid attribute code \"{code}\": {reason}")]
    InvalidAttributeCode { code: String, reason: String },

    #[error("default label must not be blank")]
    MissingDefaultLabel,

    #[error("option #{index} has no labels")]
    EmptyOption { index: usize },
}

/// Everything `apply`/`revert` can fail with.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("schema engine: {0}")]
    SchemaEngine(#[from] anyhow::Error),
}

impl ProvisionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// The validation failure, if this error is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

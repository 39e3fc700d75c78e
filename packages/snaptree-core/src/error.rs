use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("stale draft: {0}")]
    StaleDraft(String),
    #[error("malformed patch: {0}")]
    MalformedPatch(String),
    #[error("cyclic structure: {0}")]
    CyclicStructure(String),
    #[error("missing key: {0}")]
    MissingKey(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("sealed value: {0}")]
    Sealed(String),
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Errors that mean a patch path or operation does not fit the tree it is applied to.
    pub(crate) fn is_resolution(&self) -> bool {
        matches!(self, Error::MissingKey(_) | Error::TypeMismatch(_))
    }
}

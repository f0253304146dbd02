use thiserror::Error;

pub type LakeResult<T> = Result<T, LakeError>;

/// Machine-distinguishable error kind, independent of the human-readable detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotReady,
    LoadFailure,
    DuplicateRegistration,
    UnknownBackend,
    NotFound,
    Conflict,
    BackendUnavailable,
    Internal,
}

#[derive(Error, Debug)]
pub enum LakeError {
    #[error("engine not ready: {0}")]
    NotReady(String),

    #[error("extension '{name}' failed to load: {reason}")]
    LoadFailure { name: String, reason: String },

    #[error("metadata backend '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("unknown metadata backend '{0}'")]
    UnknownBackend(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LakeError::NotReady(_) => ErrorKind::NotReady,
            LakeError::LoadFailure { .. } => ErrorKind::LoadFailure,
            LakeError::DuplicateRegistration(_) => ErrorKind::DuplicateRegistration,
            LakeError::UnknownBackend(_) => ErrorKind::UnknownBackend,
            LakeError::NotFound(_) => ErrorKind::NotFound,
            LakeError::Conflict(_) => ErrorKind::Conflict,
            LakeError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            LakeError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may reasonably retry the same operation.
    ///
    /// `NotReady` clears once initialization completes; `BackendUnavailable`
    /// covers transient I/O failures. Everything else is either a usage error
    /// or a hard failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotReady | ErrorKind::BackendUnavailable
        )
    }

    /// Prefix the detail string with operation context, preserving the kind.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            LakeError::NotReady(msg) => LakeError::NotReady(format!("{context}: {msg}")),
            LakeError::LoadFailure { name, reason } => LakeError::LoadFailure {
                name,
                reason: format!("{context}: {reason}"),
            },
            LakeError::DuplicateRegistration(name) => LakeError::DuplicateRegistration(name),
            LakeError::UnknownBackend(name) => LakeError::UnknownBackend(name),
            LakeError::NotFound(msg) => LakeError::NotFound(format!("{context}: {msg}")),
            LakeError::Conflict(msg) => LakeError::Conflict(format!("{context}: {msg}")),
            LakeError::BackendUnavailable(msg) => {
                LakeError::BackendUnavailable(format!("{context}: {msg}"))
            }
            LakeError::Internal(msg) => LakeError::Internal(format!("{context}: {msg}")),
        }
    }
}

impl From<std::io::Error> for LakeError {
    fn from(e: std::io::Error) -> Self {
        LakeError::BackendUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for LakeError {
    fn from(e: serde_json::Error) -> Self {
        LakeError::Internal(format!("serialization error: {e}"))
    }
}

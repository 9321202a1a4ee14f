use crate::executor::ExecError;
use crate::store::StoreError;

/// Errors returned by registry and environment operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A save or autorun was requested on a registry without a store
    #[error("script persister not specified")]
    NoPersister,

    #[error("environment already started")]
    AlreadyStarted,

    #[error("environment already suspended")]
    AlreadySuspended,

    /// The environment outlived the registry that created it
    #[error("the registry owning this environment has been dropped")]
    RegistryDropped,

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Failure reported by the executor, passed through unchanged
    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether this error is a run that stopped because it was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Exec(ExecError::Cancelled))
    }
}

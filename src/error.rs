use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("{0} not found")]
    RepositoryNotFound(String),

    #[error("{name} must be an {expected} repository (found {found})")]
    RepositoryWrongType {
        name: String,
        expected: String,
        found: String,
    },

    #[error("bad input: {0}")]
    BadInput(String),
}

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned instead of a [`FlashResult`](crate::FlashResult), when a flash request is not
/// accepted at all.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("A flash is already in progress")]
    FlashInProgress,
}

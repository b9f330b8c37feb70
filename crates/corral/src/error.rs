//! Registry error taxonomy.

use thiserror::Error;

use crate::fetch::FetchError;

/// Errors surfaced by the registry to its callers.
///
/// Bootstrap failures never appear here: they are caught per app id during
/// [`Registry::initialize`](crate::Registry::initialize) and converted into
/// "entry absent". Likewise execution and resolution failures inside `call`
/// degrade the result instead of erroring. What remains is caller-facing:
/// unknown ids, and the one loud programming error (a bad schema kind).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No entry for this app id: it was never requested, or its bootstrap
    /// failed.
    #[error("no app registered for id {0:?}")]
    NotFound(String),

    /// Schema kind was not "input" or "output". Caller bug, fails loudly.
    #[error("invalid schema kind {0:?} (expected \"input\" or \"output\")")]
    InvalidArgument(String),

    /// Manifest/schema/resource fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The execution channel failed to open or faulted.
    #[error(transparent)]
    Channel(#[from] tether::TetherError),
}

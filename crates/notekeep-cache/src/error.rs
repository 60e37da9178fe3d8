/// Errors that can occur in the cache layer.
///
/// A cache miss is deliberately *not* an error; see
/// [`CacheBackend::get`](crate::CacheBackend::get).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The backend was reached but rejected the operation.
    #[error("cache operation failed: {0}")]
    Backend(String),
}

//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls with a deadline
//! - Cancel operations cleanly on timeout (the inner future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Outcome of a deadline-bounded call.
#[derive(Debug, Error)]
pub enum TimeoutError<E> {
    #[error("timed out after {0:?}")]
    Elapsed(Duration),
    #[error(transparent)]
    Inner(E),
}

/// Run `fut` with a deadline.
pub async fn with_timeout<F, T, E>(limit: Duration, fut: F) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Elapsed(limit)),
    }
}

//! Stage deadline policy

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use parley_core::Stage;

use crate::TurnError;

/// Run one backend call under a deadline.
///
/// Expiry drops `call`, abandoning the in-flight request. Backend errors are
/// flattened into [`TurnError::StageError`] for `stage`.
pub async fn with_timeout<T, E, F>(stage: Stage, limit: Duration, call: F) -> Result<T, TurnError>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TurnError::StageError {
            stage,
            message: e.to_string(),
        }),
        Err(_) => Err(TurnError::StageTimeout { stage, limit }),
    }
}

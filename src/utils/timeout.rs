//! Async timeout wrappers mapping elapsed timers onto transport errors.

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;

/// Run `fut` under `limit`, surfacing expiry as a connect timeout.
pub async fn with_connect_timeout<T, F>(fut: F, limit: Duration) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::ConnectTimeout(limit.as_millis() as u64)),
    }
}

/// Run `fut` under `limit`, surfacing expiry as a read (inactivity)
/// timeout.
pub async fn with_read_timeout<T, F>(fut: F, limit: Duration) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::ReadTimeout(limit.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expiry_maps_to_transport_error() {
        let result: Result<(), _> = with_read_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(TransportError::ReadTimeout(_))));
    }

    #[tokio::test]
    async fn test_completion_passes_through() {
        let result = with_connect_timeout(async { Ok(7) }, Duration::from_secs(1)).await;
        assert!(matches!(result, Ok(7)));
    }
}

//! Per-provider concurrency limit and call timeout.

use physrag_core::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Which external provider a gate protects; decides the error kind on timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Embedding,
    Index,
    Generation,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Index => "index",
            Self::Generation => "generation",
        }
    }

    fn unavailable(&self, message: String) -> AppError {
        match self {
            Self::Embedding => AppError::EmbeddingUnavailable(message),
            Self::Index => AppError::IndexUnavailable(message),
            Self::Generation => AppError::GenerationUnavailable(message),
        }
    }
}

/// Bounds in-flight calls to one provider and caps each call's duration.
///
/// Waiting for a permit counts against the timeout.
#[derive(Debug)]
pub struct ProviderGate {
    kind: ProviderKind,
    permits: Semaphore,
    timeout: Duration,
}

impl ProviderGate {
    pub fn new(kind: ProviderKind, max_in_flight: usize, timeout: Duration) -> Self {
        Self {
            kind,
            permits: Semaphore::new(max_in_flight.max(1)),
            timeout,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `call` under the gate.
    pub async fn run<T, F>(&self, op: &str, call: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let guarded = async {
            let _permit = self.permits.acquire().await.map_err(|e| {
                self.kind
                    .unavailable(format!("{} limiter closed: {}", op, e))
            })?;
            call.await
        };

        match tokio::time::timeout(self.timeout, guarded).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    provider = self.kind.as_str(),
                    op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Provider call timed out"
                );
                Err(self
                    .kind
                    .unavailable(format!("{} timed out after {:?}", op, self.timeout)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_passes_result_through() {
        let gate = ProviderGate::new(ProviderKind::Index, 2, Duration::from_secs(1));
        let value = gate.run("count", async { Ok(7u64) }).await.unwrap();
        assert_eq!(value, 7);

        let err = gate
            .run::<(), _>("count", async { Err(AppError::Config("bad".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_provider_kind() {
        let cases = [
            ProviderKind::Embedding,
            ProviderKind::Index,
            ProviderKind::Generation,
        ];
        for kind in cases {
            let gate = ProviderGate::new(kind, 1, Duration::from_millis(20));
            let err = gate
                .run("slow", async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(())
                })
                .await
                .unwrap_err();

            let matched = match kind {
                ProviderKind::Embedding => matches!(err, AppError::EmbeddingUnavailable(_)),
                ProviderKind::Index => matches!(err, AppError::IndexUnavailable(_)),
                ProviderKind::Generation => matches!(err, AppError::GenerationUnavailable(_)),
            };
            assert!(matched, "wrong error for {:?}: {}", kind, err);
        }
    }

    #[tokio::test]
    async fn test_limits_in_flight_calls() {
        let gate = Arc::new(ProviderGate::new(
            ProviderKind::Generation,
            2,
            Duration::from_secs(5),
        ));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    gate.run("call", async {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}

use super::Pipeline;
use crate::error::CallError;
use crate::outcome::Retryable;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service, ServiceExt};

/// Wraps a tower service so every request goes through a [`Pipeline`]
#[derive(Debug, Clone)]
pub struct ResilienceLayer {
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
}

impl ResilienceLayer {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort pending retries and queued requests when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl<S> Layer<S> for ResilienceLayer {
    type Service = ResilienceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResilienceService {
            inner,
            pipeline: self.pipeline.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Service produced by [`ResilienceLayer`].
///
/// Each attempt drives a fresh clone of the inner service to readiness and
/// sends it a clone of the request. Dropping the attempt future on timeout is
/// how the inner call is abandoned.
#[derive(Debug, Clone)]
pub struct ResilienceService<S> {
    inner: S,
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
}

impl<S, Req> Service<Req> for ResilienceService<S>
where
    S: Service<Req> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Retryable + Send + 'static,
    Req: Clone + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = CallError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is awaited per attempt inside the pipeline
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let inner = self.inner.clone();
        let pipeline = self.pipeline.clone();
        let cancel = self.cancel.clone();

        Box::pin(async move {
            pipeline
                .execute(&cancel, |_token| inner.clone().oneshot(req.clone()))
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::error::DependencyError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tower::service_fn;

    fn pipeline(max_retry_attempts: u32) -> Arc<Pipeline> {
        let mut config = PipelineConfig::default();
        config.retry.max_retry_attempts = max_retry_attempts;
        config.retry.base_delay_ms = 1;
        config.retry.jitter = false;
        Arc::new(Pipeline::new("tower-test", config).unwrap())
    }

    #[tokio::test]
    async fn test_layer_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let inner = service_fn(move |req: u32| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DependencyError::Unavailable("warming up".to_string()))
                } else {
                    Ok(req * 2)
                }
            }
        });

        let service = ResilienceLayer::new(pipeline(3)).layer(inner);
        let response = service.oneshot(21).await.unwrap();

        assert_eq!(response, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_layer_surfaces_permanent_errors() {
        let inner = service_fn(|_req: ()| async {
            Err::<(), _>(DependencyError::BadRequest("missing id".to_string()))
        });

        let service = ResilienceLayer::new(pipeline(3)).layer(inner);
        let err = service.oneshot(()).await.unwrap_err();

        assert!(matches!(err, CallError::Permanent(DependencyError::BadRequest(_))));
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_layer_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let inner = service_fn(|_req: ()| async { Ok::<_, DependencyError>(()) });
        let service = ResilienceLayer::new(pipeline(0))
            .with_cancellation(cancel)
            .layer(inner);

        let err = service.oneshot(()).await.unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
    }
}

use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use backoff::ExponentialBackoff;
use ember_model::{
    ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent,
};
use tracing::Instrument;

type BoxedError = Box<dyn ModelProviderError>;
type SendRequestResult = Result<ModelClientResponse, BoxedError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// How establishing a request is retried.
///
/// Only failures the provider reports as transient (the endpoint could not
/// be reached) are retried, and only before the first event arrived. Once a
/// reply is streaming, a failure ends the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound of the delay between two attempts.
    pub max_interval: Duration,
    /// Give up once this much time has passed since the first attempt.
    pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(4),
            max_elapsed_time: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    fn to_backoff(self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed_time),
            ..Default::default()
        }
    }
}

/// A wrapper around a model provider that provides a type-erased interface
/// for the controller.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    retry_policy: Option<RetryPolicy>,
}

impl ModelClient {
    /// Wraps a provider, retrying with the default [`RetryPolicy`].
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    match fut.await {
                        Ok(resp) => Ok(ModelClientResponse {
                            inner: Box::pin(resp),
                        }),
                        Err(err) => {
                            error!("request failed: {err}");
                            Err(Box::new(err) as BoxedError)
                        }
                    }
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            retry_policy: Some(RetryPolicy::default()),
        }
    }

    /// Replaces the retry policy, `None` disables retrying.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: Option<RetryPolicy>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sends a request and returns the response once the endpoint has
    /// accepted it.
    pub async fn send_request(
        &self,
        req: ModelRequest,
    ) -> Result<ModelClientResponse, BoxedError> {
        let Some(retry_policy) = self.retry_policy else {
            return (self.handler_fn)(req).await;
        };

        let handler_fn = &self.handler_fn;
        backoff::future::retry_notify(
            retry_policy.to_backoff(),
            || {
                let fut = handler_fn(req.clone());
                async move {
                    fut.await.map_err(|err| {
                        if err.kind().is_transient() {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
                }
            },
            |err: BoxedError, delay: Duration| {
                warn!("model request failed ({err}), retrying in {delay:?}");
            },
        )
        .await
    }
}

/// A response being streamed from the model client.
pub struct ModelClientResponse {
    inner: Pin<Box<dyn AnyResponse>>,
}

impl ModelClientResponse {
    /// Waits for the next event, `None` once the response is complete.
    #[inline]
    pub async fn next_event(
        &mut self,
    ) -> Result<Option<ModelResponseEvent>, BoxedError> {
        poll_fn(|cx| self.inner.as_mut().poll_next_event(cx)).await
    }

    /// Waits for the next text delta, skipping other events. `None` once the
    /// response is complete.
    pub async fn next_delta(&mut self) -> Result<Option<String>, BoxedError> {
        loop {
            match self.next_event().await? {
                Some(ModelResponseEvent::MessageDelta(delta)) => {
                    return Ok(Some(delta));
                }
                Some(ModelResponseEvent::Completed(reason)) => {
                    trace!("response completed: {reason:?}");
                }
                None => return Ok(None),
            }
        }
    }
}

trait AnyResponse: Send {
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, BoxedError>>;
}

impl<R: ModelResponse> AnyResponse for R {
    #[inline]
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, BoxedError>> {
        ModelResponse::poll_next_event(self, cx)
            .map_err(|err| Box::new(err) as BoxedError)
    }
}

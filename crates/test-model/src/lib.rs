//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use ember_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<PresetEvent>,
    finished: bool,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.finished {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let event = match this.events.pop_front() {
                Some(PresetEvent::MessageDelta(delta)) => {
                    ModelResponseEvent::MessageDelta(delta)
                }
                Some(PresetEvent::Error(message)) => {
                    this.finished = true;
                    return Poll::Ready(Err(Error::new(
                        message,
                        ErrorKind::StreamInterrupted,
                    )));
                }
                None => {
                    this.finished = true;
                    ModelResponseEvent::Completed(ModelFinishReason::Stop)
                }
            };
            return Poll::Ready(Ok(Some(event)));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond. Every request consumes the next preset response in
/// the order they were added, except for requests failed by the preset's
/// `failures` setting, which leave the preset in place. If there are no
/// presets left, an error will be returned.
///
/// All clones share the same script and request log, so a test can keep a
/// clone around to inspect what the code under test has sent.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<VecDeque<PresetResponse>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        lock(&self.script).push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, including failed ones.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }

    /// Returns the number of presets not consumed yet.
    #[inline]
    pub fn pending_responses(&self) -> usize {
        lock(&self.script).len()
    }

    fn next_response(&self, req: &ModelRequest) -> Result<TestModelResponse, Error> {
        lock(&self.requests).push(req.clone());

        let mut script = lock(&self.script);
        let Some(preset) = script.front_mut() else {
            return Err(Error::new("no more preset responses", ErrorKind::Other));
        };
        match preset.failures {
            Some(0) => {
                return Err(Error::new(
                    "connection refused",
                    ErrorKind::Connection,
                ));
            }
            Some(remaining) => {
                preset.failures = (remaining > 1).then(|| remaining - 1);
                return Err(Error::new(
                    "connection refused",
                    ErrorKind::Connection,
                ));
            }
            None => {}
        }

        let Some(preset) = script.pop_front() else {
            unreachable!("front preset was just checked");
        };
        Ok(TestModelResponse {
            events: preset.events.into(),
            finished: false,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        })
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.next_response(req))
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use ember_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{Lines, LinesError};
use crate::proto::ChatResponseChunk;

struct PartialState {
    lines: Lines,
    content: String,
    // Set when the final chunk also carried text, so the delta goes out
    // first and the completion on the next poll.
    pending_finish_reason: Option<ModelFinishReason>,
    done: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OllamaResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        content: Option<String>,
    }
}

impl OllamaResponse {
    #[inline]
    pub fn from_lines(lines: Lines) -> Self {
        let partial_state = PartialState {
            lines,
            content: String::new(),
            pending_finish_reason: None,
            done: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
            content: None,
        }
    }

    /// Returns the complete reply once the response has been drained.
    #[inline]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

impl ModelResponse for OllamaResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, partial_state)) => {
                    *this.next_event_fut = None;
                    *this.content = Some(partial_state.content);
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }
    if partial_state.done {
        return Ok((None, partial_state));
    }

    loop {
        let line = match partial_state.lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                return Err(Error::new(
                    "stream closed before the reply was complete",
                    ErrorKind::StreamInterrupted,
                ));
            }
            Err(LinesError::ChunksError(err)) => {
                return Err(Error::new(err.0, ErrorKind::StreamInterrupted));
            }
            Err(LinesError::InvalidPayload) => {
                return Err(Error::new(
                    "response is not valid UTF-8",
                    ErrorKind::MalformedResponse,
                ));
            }
        };
        trace!("got ndjson line: {line}");

        let chunk = serde_json::from_str::<ChatResponseChunk>(&line)
            .map_err(|err| {
                Error::new(
                    format!("invalid response chunk: {err}"),
                    ErrorKind::MalformedResponse,
                )
            })?;
        if let Some(error) = chunk.error {
            return Err(Error::new(error, ErrorKind::Other));
        }

        let delta = chunk.message.map(|msg| msg.content).unwrap_or_default();
        if !delta.is_empty() {
            partial_state.content.push_str(&delta);
        }

        if chunk.done {
            partial_state.done = true;
            let finish_reason = match chunk.done_reason.as_deref() {
                Some("length") => ModelFinishReason::Length,
                _ => ModelFinishReason::Stop,
            };
            if delta.is_empty() {
                return Ok((
                    Some(ModelResponseEvent::Completed(finish_reason)),
                    partial_state,
                ));
            }
            partial_state.pending_finish_reason = Some(finish_reason);
        }

        // Chunks with empty content are keep-alives, skip them.
        if !delta.is_empty() {
            return Ok((
                Some(ModelResponseEvent::MessageDelta(delta)),
                partial_state,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;

    use super::*;
    use crate::io::Chunks;

    fn response_from(chunks: Vec<Bytes>) -> OllamaResponse {
        OllamaResponse::from_lines(Lines::new(Chunks::from_vec_deque(
            chunks.into(),
        )))
    }

    #[tokio::test]
    async fn test_simple_events() {
        let resp = response_from(vec![Bytes::from_static(include_bytes!(
            "../fixtures/chat_response.ndjson"
        ))]);
        let mut resp = pin!(resp);
        let mut deltas = vec![];
        let mut finish_reason = None;
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            match event {
                ModelResponseEvent::MessageDelta(delta) => deltas.push(delta),
                ModelResponseEvent::Completed(reason) => {
                    finish_reason = Some(reason)
                }
            }
        }
        assert_eq!(deltas, ["Hel", "lo", " world"]);
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
        assert_eq!(resp.content(), Some("Hello world"));

        // Polling after completion keeps returning `None`.
        let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert_eq!(event.unwrap(), None);
    }

    #[tokio::test]
    async fn test_text_in_final_chunk() {
        let resp = response_from(vec![Bytes::from_static(
            b"{\"message\":{\"content\":\"4\"},\"done\":true,\"done_reason\":\"length\"}\n",
        )]);
        let mut resp = pin!(resp);
        let first = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert_eq!(
            first.unwrap(),
            Some(ModelResponseEvent::MessageDelta("4".to_owned()))
        );
        let second = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert_eq!(
            second.unwrap(),
            Some(ModelResponseEvent::Completed(ModelFinishReason::Length))
        );
        let third = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert_eq!(third.unwrap(), None);
    }

    #[tokio::test]
    async fn test_interrupted_stream() {
        let resp = response_from(vec![Bytes::from_static(
            b"{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
        )]);
        let mut resp = pin!(resp);
        let first = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(
            first,
            Ok(Some(ModelResponseEvent::MessageDelta(_)))
        ));
        let err = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StreamInterrupted);
    }

    #[tokio::test]
    async fn test_server_error_in_stream() {
        let resp = response_from(vec![Bytes::from_static(
            b"{\"error\":\"model runner has unexpectedly stopped\"}\n",
        )]);
        let mut resp = pin!(resp);
        let err = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Other);
        assert_eq!(err.message(), "model runner has unexpectedly stopped");
    }

    #[tokio::test]
    async fn test_malformed_chunk() {
        let resp = response_from(vec![Bytes::from_static(b"<html>\n")]);
        let mut resp = pin!(resp);
        let err = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }
}

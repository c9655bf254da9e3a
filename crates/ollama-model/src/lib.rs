//! A model provider for the chat API of a local Ollama server.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use ember_model::{ErrorKind, ModelProvider, ModelProviderError, ModelRequest};
use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};

pub use config::{DEFAULT_HOST, DEFAULT_MODEL, OllamaConfig, OllamaConfigBuilder};
use io::{Chunks, Lines};
pub use response::OllamaResponse;

/// Error type for [`OllamaProvider`].
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

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Ollama model provider.
#[derive(Clone, Debug)]
pub struct OllamaProvider {
    client: Client,
    config: Arc<OllamaConfig>,
}

impl OllamaProvider {
    /// Creates a new `OllamaProvider` with the given configuration.
    #[inline]
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this provider.
    #[inline]
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }
}

impl ModelProvider for OllamaProvider {
    type Error = Error;
    type Response = OllamaResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let chat_req = proto::create_request(req, &self.config);
        let url = self.config.chat_url();
        debug!("sending chat request to {url}");
        let resp_fut = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/x-ndjson")
            .json(&chat_req)
            .send();

        async move {
            let resp = match resp_fut.await {
                Ok(resp) => resp,
                Err(err) => return Err(request_error(&err)),
            };
            let resp = check_status(resp).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            // Ollama labels the stream `application/x-ndjson`, proxies
            // sometimes rewrite it to plain JSON.
            let is_valid_content_type = content_type
                .map(|v| {
                    v.parse()
                        .map(|m: Mime| {
                            matches!(m.subtype().as_str(), "x-ndjson" | "json")
                        })
                        .unwrap_or(false)
                })
                .unwrap_or(true);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::MalformedResponse,
                ));
            }

            // Here we got a successful response.
            let lines = Lines::new(Chunks::from_response(resp));
            Ok(OllamaResponse::from_lines(lines))
        }
    }
}

fn request_error(err: &reqwest::Error) -> Error {
    let kind = if err.is_connect() || err.is_timeout() {
        ErrorKind::Connection
    } else {
        ErrorKind::Other
    };
    Error::new(format!("{err}"), kind)
}

async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    // Ollama explains failures like a missing model in a JSON body.
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<proto::ErrorBody>(&body)
        .map(|body| body.error)
        .unwrap_or_else(|_| format!("server responded with {status}"));
    let kind = if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        ErrorKind::Connection
    } else {
        ErrorKind::Other
    };
    warn!("chat request failed with {status}: {message}");
    Err(Error::new(message, kind))
}

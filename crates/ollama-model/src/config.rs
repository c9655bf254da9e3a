/// The endpoint a local Ollama server listens on by default.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// The model used when none is configured.
pub const DEFAULT_MODEL: &str = "deepseek-r1:latest";

/// Builder for [`OllamaConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OllamaConfigBuilder {
    model: Option<String>,
    host: Option<String>,
}

impl OllamaConfigBuilder {
    /// Creates a builder with every option left at its default.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model to use.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the server address, e.g. `http://127.0.0.1:11434`.
    #[inline]
    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> OllamaConfig {
        let host = self.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        OllamaConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            host: host.trim_end_matches('/').to_string(),
        }
    }
}

/// Configuration for the Ollama provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OllamaConfig {
    pub(crate) model: String,
    pub(crate) host: String,
}

impl OllamaConfig {
    /// Returns the model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the server address without a trailing slash.
    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub(crate) fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host)
    }
}

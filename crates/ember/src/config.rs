use std::env;
use std::path::PathBuf;

use ember_core::RetryPolicy;
use ember_core::store::JsonFileStore;
use ember_ollama_model::{
    DEFAULT_HOST, DEFAULT_MODEL, OllamaConfig, OllamaConfigBuilder,
};

/// Environment variable overriding the Ollama server address.
pub const HOST_ENV: &str = "EMBER_OLLAMA_HOST";
/// Environment variable overriding the model name.
pub const MODEL_ENV: &str = "EMBER_MODEL";
/// Environment variable overriding where the conversation is stored.
pub const STATE_PATH_ENV: &str = "EMBER_STATE_PATH";

/// Settings for a chat session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Address of the Ollama server.
    pub host: String,
    /// The model to chat with.
    pub model: String,
    /// The JSON file holding the conversation.
    pub state_path: PathBuf,
    /// How connection failures are retried, `None` to fail right away.
    pub retry_policy: Option<RetryPolicy>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            state_path: default_state_path(),
            retry_policy: Some(RetryPolicy::default()),
        }
    }
}

impl Config {
    /// Reads the configuration from the environment, unset or empty
    /// variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let lookup = |key| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();
        if let Some(host) = lookup(HOST_ENV) {
            config.host = host;
        }
        if let Some(model) = lookup(MODEL_ENV) {
            config.model = model;
        }
        if let Some(path) = lookup(STATE_PATH_ENV) {
            config.state_path = PathBuf::from(path);
        }
        config
    }

    /// Returns the settings of the Ollama provider.
    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfigBuilder::new()
            .with_host(&self.host)
            .with_model(&self.model)
            .build()
    }

    /// Opens the store the conversation lives in.
    #[inline]
    pub fn open_store(&self) -> JsonFileStore {
        JsonFileStore::new(&self.state_path)
    }
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ember")
        .join("state.json")
}

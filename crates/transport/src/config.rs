use std::path::Path;

use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const BEARER_TOKEN_ENV: &str = "PARLA_BEARER_TOKEN";

/// Backend endpoint configuration. The bearer token can come from the config
/// file or, taking precedence, from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bearer_token: String::new(),
        }
    }
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
        }
        .normalized()
    }

    /// Loads from a JSON file merged over defaults. A missing or malformed
    /// file degrades to defaults with a warning; the environment token, when
    /// set, wins over the file's.
    pub fn load(path: &Path) -> Self {
        let figment =
            Figment::from(Serialized::defaults(Self::default())).merge(Json::file(path));

        let mut config = match figment.extract::<Self>() {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(
                    "failed to parse transport config from {:?}: {}. using defaults",
                    path,
                    error
                );
                Self::default()
            }
        };

        if let Ok(token) = std::env::var(BEARER_TOKEN_ENV)
            && !token.trim().is_empty()
        {
            config.bearer_token = token;
        }

        config.normalized()
    }

    fn normalized(mut self) -> Self {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if self.base_url.is_empty() {
            self.base_url = default_base_url();
        }
        self.bearer_token = self.bearer_token.trim().to_string();
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

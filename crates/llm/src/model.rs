use serde::{Deserialize, Serialize};

/// Model the companion persona was tuned against.
pub const DEFAULT_CHAT_MODEL: &str = "google/gemini-2.5-flash-preview";

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Sampling options sent with every chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    pub model_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: Option<u64>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

impl ModelOptions {
    /// Trims the model id and clamps temperature into the range providers accept.
    pub fn normalized(mut self) -> Self {
        self.model_id = self.model_id.trim().to_string();
        if self.model_id.is_empty() {
            self.model_id = DEFAULT_CHAT_MODEL.to_string();
        }
        if !self.temperature.is_finite() {
            self.temperature = DEFAULT_TEMPERATURE;
        }
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.max_tokens = self.max_tokens.filter(|value| *value > 0);
        self
    }
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

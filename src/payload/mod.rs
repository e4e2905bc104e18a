//! Native request bodies for `bedrock-runtime invoke-model`.
//!
//! Each model family expects its own JSON schema. [`InvocationRequest`]
//! validates the shared parameters once and [`InvocationRequest::body`]
//! renders them for the family inferred from the model identifier.

use serde_json::{Value, json};
use thiserror::Error;

/// Version string the Anthropic messages API requires on Bedrock.
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Default token limit for generated text.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Default nucleus sampling threshold.
pub const DEFAULT_TOP_P: f64 = 0.9;

const CLAUDE_SYSTEM_PROMPT: &str = concat!(
    "You are Claude, an AI assistant created by Anthropic to be helpful, harmless, ",
    "and honest. Your goal is to provide informative and substantive response to ",
    "queries while avoiding potential harms."
);

const NOVA_SYSTEM_PROMPT: &str = concat!(
    "You are Nova, an AI assistant created by Amazon to be helpful, harmless, ",
    "and honest. Your goal is to provide informative and substantive response to ",
    "queries while avoiding potential harms."
);

const HUMAN_TURN: &str = "\n\nHuman:";

/// Errors raised while building requests or reading responses.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PayloadError {
    /// Raised when the model identifier maps to no known family.
    #[error("unsupported model identifier: {model_id}")]
    UnsupportedModel {
        /// Identifier that was rejected.
        model_id: String,
    },
    /// Raised when the prompt is blank.
    #[error("prompt must not be empty")]
    EmptyPrompt,
    /// Raised when the token limit is zero.
    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,
    /// Raised when a sampling parameter lies outside `0.0..=1.0`.
    #[error("{parameter} must be between 0.0 and 1.0, got {value}")]
    OutOfRange {
        /// Parameter name.
        parameter: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// Raised when a response lacks generated text.
    #[error("{family} response has no text at {pointer}")]
    MissingText {
        /// Family whose schema was expected.
        family: ModelFamily,
        /// JSON pointer that was empty.
        pointer: &'static str,
    },
}

/// Request schema family for a Bedrock model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModelFamily {
    /// Claude 3 and later, using the messages API.
    AnthropicMessages,
    /// Claude v2 and Claude Instant, using the legacy text completion API.
    AnthropicTextCompletion,
    /// Amazon Nova, using the `messages-v1` schema.
    AmazonNova,
}

impl ModelFamily {
    /// Infers the family from a model id, inference profile id or ARN.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::UnsupportedModel`] when no family matches.
    pub fn from_model_id(model_id: &str) -> Result<Self, PayloadError> {
        let id = model_id.trim();
        if id.contains("anthropic.claude-v2") || id.contains("anthropic.claude-instant") {
            Ok(Self::AnthropicTextCompletion)
        } else if id.contains("anthropic.claude") {
            Ok(Self::AnthropicMessages)
        } else if id.contains("amazon.nova") {
            Ok(Self::AmazonNova)
        } else {
            Err(PayloadError::UnsupportedModel {
                model_id: id.to_owned(),
            })
        }
    }

    /// Returns a short stable name for logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AnthropicMessages => "anthropic-messages",
            Self::AnthropicTextCompletion => "anthropic-text-completion",
            Self::AmazonNova => "amazon-nova",
        }
    }

    /// Pulls the generated text out of a decoded response body.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::MissingText`] when the body does not follow
    /// the family's schema.
    pub fn extract_text(self, response: &Value) -> Result<String, PayloadError> {
        let pointer = match self {
            Self::AnthropicMessages => "/content",
            Self::AnthropicTextCompletion => "/completion",
            Self::AmazonNova => "/output/message/content",
        };
        let missing = || PayloadError::MissingText {
            family: self,
            pointer,
        };
        let node = response.pointer(pointer).ok_or_else(missing)?;
        let text = match node {
            Value::String(text) => text.clone(),
            Value::Array(blocks) => blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        };
        if text.is_empty() {
            return Err(missing());
        }
        Ok(text)
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated parameters for a single model invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationRequest {
    model_id: String,
    family: ModelFamily,
    prompt: String,
    system: Option<String>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    stop_sequences: Vec<String>,
}

impl InvocationRequest {
    /// Starts a builder for `prompt` against `model_id`.
    #[must_use]
    pub fn builder(
        model_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> InvocationRequestBuilder {
        InvocationRequestBuilder::new(model_id, prompt)
    }

    /// Model identifier passed to `--model-id`.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Family inferred from the model identifier.
    #[must_use]
    pub const fn family(&self) -> ModelFamily {
        self.family
    }

    /// Renders the native JSON body for the request's family.
    #[must_use]
    pub fn body(&self) -> Value {
        match self.family {
            ModelFamily::AnthropicMessages => {
                let mut body = json!({
                    "anthropic_version": ANTHROPIC_VERSION,
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature,
                    "top_p": self.top_p,
                    "system": self.system.as_deref().unwrap_or(CLAUDE_SYSTEM_PROMPT),
                    "messages": [{
                        "role": "user",
                        "content": [{ "type": "text", "text": self.prompt }],
                    }],
                });
                insert_stop_sequences(&mut body, "stop_sequences", &self.stop_sequences);
                body
            }
            ModelFamily::AnthropicTextCompletion => {
                let mut stop_sequences = vec![String::from(HUMAN_TURN)];
                stop_sequences.extend(self.stop_sequences.iter().cloned());
                let prompt = self.system.as_deref().map_or_else(
                    || format!("{HUMAN_TURN} {}\n\nAssistant:", self.prompt),
                    |system| format!("{system}{HUMAN_TURN} {}\n\nAssistant:", self.prompt),
                );
                json!({
                    "prompt": prompt,
                    "max_tokens_to_sample": self.max_tokens,
                    "temperature": self.temperature,
                    "top_p": self.top_p,
                    "stop_sequences": stop_sequences,
                })
            }
            ModelFamily::AmazonNova => {
                let mut inference = json!({
                    "maxTokens": self.max_tokens,
                    "temperature": self.temperature,
                    "topP": self.top_p,
                });
                insert_stop_sequences(&mut inference, "stopSequences", &self.stop_sequences);
                json!({
                    "schemaVersion": "messages-v1",
                    "system": [{ "text": self.system.as_deref().unwrap_or(NOVA_SYSTEM_PROMPT) }],
                    "messages": [{ "role": "user", "content": [{ "text": self.prompt }] }],
                    "inferenceConfig": inference,
                })
            }
        }
    }
}

/// Builder for [`InvocationRequest`] that validates on [`Self::build`].
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationRequestBuilder {
    model_id: String,
    prompt: String,
    system: Option<String>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    stop_sequences: Vec<String>,
}

impl InvocationRequestBuilder {
    /// Creates a builder with default sampling parameters.
    #[must_use]
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            system: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            stop_sequences: Vec::new(),
        }
    }

    /// Replaces the family's default system prompt.
    #[must_use]
    pub fn system(mut self, value: impl Into<String>) -> Self {
        self.system = Some(value.into());
        self
    }

    /// Sets the token limit.
    #[must_use]
    pub const fn max_tokens(mut self, value: u32) -> Self {
        self.max_tokens = value;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, value: f64) -> Self {
        self.temperature = value;
        self
    }

    /// Sets the nucleus sampling threshold.
    #[must_use]
    pub const fn top_p(mut self, value: f64) -> Self {
        self.top_p = value;
        self
    }

    /// Appends a stop sequence.
    #[must_use]
    pub fn stop_sequence(mut self, value: impl Into<String>) -> Self {
        self.stop_sequences.push(value.into());
        self
    }

    /// Validates the parameters and infers the model family.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] for an unknown model, a blank prompt, a zero
    /// token limit or sampling parameters outside `0.0..=1.0`.
    pub fn build(self) -> Result<InvocationRequest, PayloadError> {
        let family = ModelFamily::from_model_id(&self.model_id)?;
        let prompt = self.prompt.trim().to_owned();
        if prompt.is_empty() {
            return Err(PayloadError::EmptyPrompt);
        }
        if self.max_tokens == 0 {
            return Err(PayloadError::ZeroMaxTokens);
        }
        check_unit_range("temperature", self.temperature)?;
        check_unit_range("top_p", self.top_p)?;
        let system = self
            .system
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty());
        Ok(InvocationRequest {
            model_id: self.model_id.trim().to_owned(),
            family,
            prompt,
            system,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stop_sequences: self.stop_sequences,
        })
    }
}

fn insert_stop_sequences(target: &mut Value, key: &str, stop_sequences: &[String]) {
    if stop_sequences.is_empty() {
        return;
    }
    if let Some(object) = target.as_object_mut() {
        object.insert(key.to_owned(), json!(stop_sequences));
    }
}

// NaN fails `contains`, so it is rejected too.
fn check_unit_range(parameter: &'static str, value: f64) -> Result<(), PayloadError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PayloadError::OutOfRange { parameter, value })
    }
}

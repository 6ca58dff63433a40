use std::{fs, path::Path};

use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::{debug, warn};

use crate::{
    config::ChatTemplateFallback,
    error::{BackendError, ServiceError},
    model::chat_template::{ChatTemplate, ChatTemplateSource},
};

/// Subset of `tokenizer_config.json` the service reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub chat_template: Option<ChatTemplateSource>,
    #[serde(default)]
    pub bos_token: Option<SpecialToken>,
    #[serde(default)]
    pub eos_token: Option<SpecialToken>,
}

/// Special tokens appear either as bare strings or as added-token objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SpecialToken {
    Plain(String),
    Added { content: String },
}

impl SpecialToken {
    pub fn content(&self) -> &str {
        match self {
            SpecialToken::Plain(s) => s,
            SpecialToken::Added { content } => content,
        }
    }
}

impl TokenizerConfig {
    pub fn from_file(path: &Path) -> Result<Self, BackendError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| BackendError::new(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| BackendError::new(format!("parsing {}: {e}", path.display())))
    }
}

pub struct PromptTokenizer {
    inner: Tokenizer,
    chat_template: Option<ChatTemplate>,
    eos_token_id: Option<u32>,
}

impl PromptTokenizer {
    pub fn new(inner: Tokenizer, config: TokenizerConfig) -> Self {
        let bos_token = config.bos_token.as_ref().map(|t| t.content().to_string());
        let eos_token = config.eos_token.as_ref().map(|t| t.content().to_string());

        let eos_token_id = eos_token
            .as_deref()
            .and_then(|token| inner.token_to_id(token))
            .or_else(|| inner.token_to_id("</s>"))
            .or_else(|| inner.token_to_id("<|endoftext|>"))
            .or_else(|| inner.token_to_id("<|end_of_text|>"))
            .or_else(|| inner.token_to_id("<|im_end|>"));

        let chat_template = config
            .chat_template
            .and_then(ChatTemplateSource::into_default)
            .map(|source| ChatTemplate::new(source, bos_token, eos_token));

        Self {
            inner,
            chat_template,
            eos_token_id,
        }
    }

    pub fn from_files(
        tokenizer_path: &Path,
        config_path: Option<&Path>,
    ) -> Result<Self, BackendError> {
        let inner = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| BackendError::new(format!("loading tokenizer: {e}")))?;
        let config = match config_path {
            Some(path) => TokenizerConfig::from_file(path)?,
            None => TokenizerConfig::default(),
        };
        Ok(Self::new(inner, config))
    }

    pub fn has_chat_template(&self) -> bool {
        self.chat_template.is_some()
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    /// Chat-formatted ids when a template is available, otherwise (or when
    /// formatting fails) ids of the raw prompt.
    pub fn encode_prompt(
        &self,
        prompt: &str,
        fallback: ChatTemplateFallback,
    ) -> Result<Vec<u32>, ServiceError> {
        if let Some(template) = &self.chat_template {
            match self.encode_chat(template, prompt) {
                Ok(ids) => return Ok(ids),
                Err(err) => match fallback {
                    ChatTemplateFallback::Warn => warn!(
                        error = %err,
                        "chat template path failed, falling back to direct tokenization"
                    ),
                    ChatTemplateFallback::Silent => debug!(
                        error = %err,
                        "chat template path failed, falling back to direct tokenization"
                    ),
                },
            }
        }

        self.encode(prompt)
            .map_err(|e| ServiceError::Tokenization(e.to_string()))
    }

    fn encode_chat(&self, template: &ChatTemplate, prompt: &str) -> tokenizers::Result<Vec<u32>> {
        let text = template.render_user_prompt(prompt)?;
        self.encode(&text)
    }

    pub fn encode(&self, text: &str) -> tokenizers::Result<Vec<u32>> {
        let encoding = self.inner.encode(text, true)?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32]) -> tokenizers::Result<String> {
        self.inner.decode(ids, true)
    }
}

use std::fmt::Write;

use minijinja::{Environment, ErrorKind, context};
use minijinja_contrib::pycompat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Jinja chat template shipped in `tokenizer_config.json`.
#[derive(Debug, Clone)]
pub struct ChatTemplate {
    source: String,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

/// `chat_template` is either a single template or a list of named ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatTemplateSource {
    Single(String),
    Named(Vec<NamedTemplate>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedTemplate {
    pub name: String,
    pub template: String,
}

impl ChatTemplateSource {
    pub fn into_default(self) -> Option<String> {
        match self {
            ChatTemplateSource::Single(source) => Some(source),
            ChatTemplateSource::Named(named) => named
                .into_iter()
                .find(|t| t.name == "default")
                .map(|t| t.template),
        }
    }
}

impl ChatTemplate {
    pub fn new(
        source: impl Into<String>,
        bos_token: Option<String>,
        eos_token: Option<String>,
    ) -> Self {
        Self {
            source: source.into(),
            bos_token,
            eos_token,
        }
    }

    /// Wraps `prompt` as a single user turn and appends the assistant prefix.
    pub fn render_user_prompt(&self, prompt: &str) -> Result<String, minijinja::Error> {
        let mut env = Environment::new();
        env.set_unknown_method_callback(pycompat::unknown_method_callback);
        env.add_function("raise_exception", raise_exception);
        env.add_function("strftime_now", strftime_now);

        let messages = [ChatMessage {
            role: "user",
            content: prompt,
        }];

        env.render_str(
            &self.source,
            context! {
                messages => messages,
                add_generation_prompt => true,
                bos_token => self.bos_token.as_deref().unwrap_or(""),
                eos_token => self.eos_token.as_deref().unwrap_or(""),
            },
        )
    }
}

fn raise_exception(message: String) -> Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, message))
}

/// Local time rendered with a C `strftime` format string.
fn strftime_now(format: String) -> Result<String, minijinja::Error> {
    let mut out = String::new();
    write!(out, "{}", chrono::Local::now().format(&format)).map_err(|_| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid strftime format: {format}"),
        )
    })?;
    Ok(out)
}

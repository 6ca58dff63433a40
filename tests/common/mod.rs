#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokenizers::Tokenizer;
use tower::ServiceExt;

use causal_lm_service::{
    AppConfig, BackendError, LanguageModel, ModelService, build_router,
    config::ChatTemplateFallback,
    model::{ChatTemplateSource, GenerationParams, ModelMetadata, PromptTokenizer, TokenizerConfig},
};

pub const UNK: u32 = 0;
pub const EOS: u32 = 1;
pub const HELLO: u32 = 5;
/// Id of `w0`; `wN` has id `WORD_BASE + N`.
pub const WORD_BASE: u32 = 10;

pub fn word(n: u32) -> u32 {
    WORD_BASE + n
}

fn tokenizer_json() -> String {
    let mut vocab = serde_json::Map::new();
    for (token, id) in [
        ("[UNK]", UNK),
        ("</s>", EOS),
        ("user", 2),
        (":", 3),
        ("assistant", 4),
        ("Hello", HELLO),
    ] {
        vocab.insert(token.to_string(), json!(id));
    }
    for n in 0..32 {
        vocab.insert(format!("w{n}"), json!(word(n)));
    }

    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [{
            "id": EOS, "content": "</s>", "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true
        }],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {"type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]"}
    })
    .to_string()
}

pub fn tokenizer(chat_template: Option<&str>) -> PromptTokenizer {
    let inner = Tokenizer::from_bytes(tokenizer_json().as_bytes()).expect("test tokenizer");
    let config = TokenizerConfig {
        chat_template: chat_template.map(|t| ChatTemplateSource::Single(t.to_string())),
        ..TokenizerConfig::default()
    };
    PromptTokenizer::new(inner, config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Place,
    Generate,
    NoSequences,
}

/// What the scripted model saw.
#[derive(Default)]
pub struct Recorder {
    pub calls: AtomicUsize,
    pub last_input: Mutex<Vec<u32>>,
    pub last_params: Mutex<Option<GenerationParams>>,
    pub last_new_tokens: AtomicUsize,
}

impl Recorder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Appends a fixed continuation to the prompt, honouring `max_new_tokens`
/// and the end-of-sequence id.
pub struct ScriptedModel {
    continuation: Vec<u32>,
    failure: Option<Failure>,
    recorder: Arc<Recorder>,
}

impl ScriptedModel {
    pub fn new(continuation: Vec<u32>) -> (Self, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            Self {
                continuation,
                failure: None,
                recorder: recorder.clone(),
            },
            recorder,
        )
    }

    pub fn failing(failure: Failure) -> (Self, Arc<Recorder>) {
        let (mut model, recorder) = Self::new(vec![word(0)]);
        model.failure = Some(failure);
        (model, recorder)
    }
}

impl LanguageModel for ScriptedModel {
    type Input = Vec<u32>;

    fn place(&self, input_ids: &[u32]) -> Result<Vec<u32>, BackendError> {
        self.recorder.calls.fetch_add(1, Ordering::SeqCst);
        *self.recorder.last_input.lock() = input_ids.to_vec();
        if self.failure == Some(Failure::Place) {
            return Err(BackendError::new("device unavailable"));
        }
        Ok(input_ids.to_vec())
    }

    fn generate(
        &self,
        input: Vec<u32>,
        params: &GenerationParams,
    ) -> Result<Vec<Vec<u32>>, BackendError> {
        *self.recorder.last_params.lock() = Some(params.clone());
        match self.failure {
            Some(Failure::Generate) => return Err(BackendError::new("simulated exception")),
            Some(Failure::NoSequences) => return Ok(Vec::new()),
            _ => {}
        }

        let mut sequence = input;
        let mut generated = 0;
        for &token in self.continuation.iter().take(params.max_new_tokens) {
            sequence.push(token);
            generated += 1;
            if params.eos_token_id == Some(token) {
                break;
            }
        }
        self.recorder.last_new_tokens.store(generated, Ordering::SeqCst);
        Ok(vec![sequence])
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            model_id: "test/scripted".to_string(),
            device: "cpu".to_string(),
            plan: "cpu".to_string(),
            dtype: "float32".to_string(),
            quantized: false,
            size_bytes: 0,
        }
    }
}

pub fn config(api_key: Option<&str>) -> AppConfig {
    let api_key = api_key.map(str::to_string);
    AppConfig::from_lookup(|key| match key {
        "SERVER_API_KEY" => api_key.clone(),
        _ => None,
    })
    .expect("test config")
}

pub fn app(
    tokenizer: PromptTokenizer,
    model: ScriptedModel,
    api_key: Option<&str>,
    fallback: ChatTemplateFallback,
) -> Router {
    let service = Arc::new(ModelService::new(tokenizer, model, fallback));
    build_router(Arc::new(config(api_key)), service)
}

pub fn simple_app(model: ScriptedModel) -> Router {
    app(tokenizer(None), model, None, ChatTemplateFallback::Warn)
}

pub async fn post_generate(app: Router, body: Value, api_key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let request = builder
        .body(Body::from(body.to_string()))
        .expect("request");
    send(app, request).await
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

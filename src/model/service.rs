use std::sync::Arc;

use tokio::task;
use tracing::{error, info};

use crate::{
    config::ChatTemplateFallback,
    error::ServiceError,
    model::{
        GenerationParams, GenerationRequest, GenerationResponse, LanguageModel, ModelMetadata,
        PromptTokenizer,
    },
};

/// The tokenizer and model loaded at startup. Built once, shared read-only
/// for the rest of the process.
pub struct ModelService<M> {
    tokenizer: Arc<PromptTokenizer>,
    model: Arc<M>,
    fallback: ChatTemplateFallback,
}

impl<M: LanguageModel + 'static> ModelService<M> {
    pub fn new(tokenizer: PromptTokenizer, model: M, fallback: ChatTemplateFallback) -> Self {
        Self {
            tokenizer: Arc::new(tokenizer),
            model: Arc::new(model),
            fallback,
        }
    }

    pub fn metadata(&self) -> ModelMetadata {
        self.model.metadata()
    }

    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        let prompt = request.validated_prompt()?.to_string();
        let params = GenerationParams::from_request(&request, self.tokenizer.eos_token_id());

        let tokenizer = self.tokenizer.clone();
        let model = self.model.clone();
        let fallback = self.fallback;

        task::spawn_blocking(move || {
            run_generation(&tokenizer, model.as_ref(), &prompt, &params, fallback)
        })
        .await
        .map_err(|err| ServiceError::Task(err.to_string()))?
    }
}

fn run_generation<M: LanguageModel>(
    tokenizer: &PromptTokenizer,
    model: &M,
    prompt: &str,
    params: &GenerationParams,
    fallback: ChatTemplateFallback,
) -> Result<GenerationResponse, ServiceError> {
    let input_ids = tokenizer.encode_prompt(prompt, fallback).inspect_err(|err| {
        error!(error = ?err, "tokenization failed");
    })?;

    let input = model.place(&input_ids).map_err(|err| {
        error!(error = %err, "failed to move inputs to device");
        ServiceError::DevicePlacement(err.to_string())
    })?;

    info!(
        prompt_tokens = input_ids.len(),
        max_new_tokens = params.max_new_tokens,
        do_sample = params.do_sample,
        temperature = params.temperature,
        "generating"
    );

    let sequences = model.generate(input, params).map_err(|err| {
        error!(error = %err, "generation failed");
        ServiceError::Generation(err.to_string())
    })?;

    let first = sequences.first().ok_or_else(|| {
        error!("model returned no sequences");
        ServiceError::Decode("model returned no sequences".into())
    })?;

    let text = tokenizer.decode(first).map_err(|err| {
        error!(error = %err, "decoding failed");
        ServiceError::Decode(err.to_string())
    })?;

    Ok(GenerationResponse {
        text: text.trim().to_string(),
    })
}

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;
pub const DEFAULT_TEMPERATURE: f64 = 0.0;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub do_sample: Option<bool>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// The prompt as sent, rejected when blank.
    pub fn validated_prompt(&self) -> Result<&str, ServiceError> {
        match self.prompt.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => Ok(prompt),
            _ => Err(ServiceError::EmptyPrompt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GenerationResponse {
    pub text: String,
}

/// Parameters handed to the model for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eos_token_id: Option<u32>,
}

impl GenerationParams {
    /// Zero values count as unset and take the defaults.
    pub fn from_request(request: &GenerationRequest, eos_token_id: Option<u32>) -> Self {
        let max_new_tokens = request
            .max_new_tokens
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_NEW_TOKENS);
        let temperature = request
            .temperature
            .filter(|&t| t != 0.0)
            .unwrap_or(DEFAULT_TEMPERATURE);

        Self {
            max_new_tokens,
            do_sample: request.do_sample.unwrap_or(false),
            temperature,
            eos_token_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub device: String,
    pub plan: String,
    pub dtype: String,
    pub quantized: bool,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let request: GenerationRequest = serde_json::from_str(r#"{"prompt":"Hello"}"#).unwrap();
        let params = GenerationParams::from_request(&request, None);
        assert_eq!(params.max_new_tokens, 256);
        assert_eq!(params.temperature, 0.0);
        assert!(!params.do_sample);
        assert_eq!(params.eos_token_id, None);
    }

    #[test]
    fn null_and_zero_values_fall_back_to_defaults() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"prompt":"Hello","max_new_tokens":0,"temperature":null,"do_sample":null}"#,
        )
        .unwrap();
        let params = GenerationParams::from_request(&request, Some(2));
        assert_eq!(params.max_new_tokens, 256);
        assert_eq!(params.temperature, 0.0);
        assert!(!params.do_sample);
        assert_eq!(params.eos_token_id, Some(2));
    }

    #[test]
    fn explicit_values_are_kept() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"prompt":"Hello","max_new_tokens":10,"temperature":0.7,"do_sample":true}"#,
        )
        .unwrap();
        let params = GenerationParams::from_request(&request, None);
        assert_eq!(params.max_new_tokens, 10);
        assert_eq!(params.temperature, 0.7);
        assert!(params.do_sample);
    }

    #[test]
    fn absent_eos_is_omitted_from_logged_params() {
        let params = GenerationParams::from_request(&GenerationRequest::new("hi"), None);
        let value = serde_json::to_value(&params).unwrap();
        assert!(value.get("eos_token_id").is_none());
    }

    #[test]
    fn blank_prompts_are_rejected() {
        for prompt in [None, Some(""), Some("   \n\t")] {
            let request = GenerationRequest {
                prompt: prompt.map(str::to_string),
                ..GenerationRequest::default()
            };
            assert!(matches!(
                request.validated_prompt(),
                Err(ServiceError::EmptyPrompt)
            ));
        }
    }

    #[test]
    fn prompt_is_passed_through_untrimmed() {
        let request = GenerationRequest::new("  Hello ");
        assert_eq!(request.validated_prompt().unwrap(), "  Hello ");
    }
}

mod backend;
mod chat_template;
pub mod loader;
mod plan;
mod service;
mod tokenizer;
mod types;

#[cfg(feature = "tch-backend")]
mod torch;

pub use backend::LanguageModel;
pub use chat_template::{ChatMessage, ChatTemplate, ChatTemplateSource};
pub use plan::{ComputeDtype, DeviceKind, LoadPlan};
pub use service::ModelService;
pub use tokenizer::{PromptTokenizer, SpecialToken, TokenizerConfig};
pub use types::{
    DEFAULT_MAX_NEW_TOKENS, DEFAULT_TEMPERATURE, GenerationParams, GenerationRequest,
    GenerationResponse, ModelMetadata,
};

#[cfg(feature = "tch-backend")]
pub use torch::TorchModel;

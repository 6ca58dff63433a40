use std::path::{Path, PathBuf};

use hf_hub::{
    Repo, RepoType,
    api::sync::{ApiBuilder, ApiRepo},
};
use tracing::info;

use crate::{config::AppConfig, error::BackendError};

/// Where model files come from: a local directory or a Hub repository.
pub enum ArtifactSource {
    Local(PathBuf),
    Hub(ApiRepo),
}

impl ArtifactSource {
    pub fn open(config: &AppConfig) -> Result<Self, BackendError> {
        let local = Path::new(&config.model_id);
        if local.is_dir() {
            info!(path = %local.display(), "reading model artifacts from local directory");
            return Ok(ArtifactSource::Local(local.to_path_buf()));
        }

        let mut builder = ApiBuilder::new();
        if let Some(token) = config.hf_token.clone() {
            info!("using HuggingFace access token");
            builder = builder.with_token(Some(token));
        }
        let api = builder
            .build()
            .map_err(|e| BackendError::new(format!("initializing HuggingFace Hub client: {e}")))?;

        let repo = match config.revision.as_ref() {
            Some(revision) => Repo::with_revision(
                config.model_id.clone(),
                RepoType::Model,
                revision.clone(),
            ),
            None => Repo::model(config.model_id.clone()),
        };
        Ok(ArtifactSource::Hub(api.repo(repo)))
    }

    pub fn required(&self, file: &str) -> Result<PathBuf, BackendError> {
        match self {
            ArtifactSource::Local(dir) => {
                let path = dir.join(file);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(BackendError::new(format!(
                        "model artifact missing: {}",
                        path.display()
                    )))
                }
            }
            ArtifactSource::Hub(repo) => repo
                .get(file)
                .map_err(|e| BackendError::new(format!("downloading {file}: {e}"))),
        }
    }

    /// `None` when the file is absent or cannot be fetched.
    pub fn optional(&self, file: &str) -> Option<PathBuf> {
        match self.required(file) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::debug!(file, error = %err, "optional artifact unavailable");
                None
            }
        }
    }
}

#[cfg(feature = "tch-backend")]
pub use self::torch_loader::initialize;

#[cfg(feature = "tch-backend")]
mod torch_loader {
    use tracing::{info, warn};

    use super::ArtifactSource;
    use crate::{
        config::AppConfig,
        error::{BackendError, ServiceError},
        model::{LoadPlan, PromptTokenizer, TorchModel},
    };

    /// Loads tokenizer and model, or fails with a message naming the model.
    pub fn initialize(config: &AppConfig) -> Result<(PromptTokenizer, TorchModel), ServiceError> {
        let device = config.device.resolve(tch::Cuda::is_available());
        info!(%device, "using device");
        info!(model_id = %config.model_id, "model id");

        let fail = |err: BackendError| ServiceError::model_load(&config.model_id, err);

        let source = ArtifactSource::open(config).map_err(fail)?;

        info!("loading tokenizer");
        let tokenizer_path = source.required("tokenizer.json").map_err(fail)?;
        let tokenizer_config = source.optional("tokenizer_config.json");
        let tokenizer = PromptTokenizer::from_files(&tokenizer_path, tokenizer_config.as_deref())
            .map_err(fail)?;
        info!(
            chat_template = tokenizer.has_chat_template(),
            eos_token_id = ?tokenizer.eos_token_id(),
            "tokenizer loaded"
        );

        let quantized_path = if device.is_accelerated() {
            let path = source.optional(&config.quantized_module_file);
            match path {
                Some(_) => info!("8-bit artifact available, loading model in 8-bit"),
                None => info!("8-bit artifact not available, loading model in fp16"),
            }
            path
        } else {
            None
        };

        let plan = LoadPlan::select(device, quantized_path.is_some());
        let module_path = match quantized_path {
            Some(path) if plan.quantized() => path,
            _ => source.required(&config.module_file).map_err(fail)?,
        };

        if plan == LoadPlan::Cpu {
            warn!("CUDA not available, loading model on CPU. This will be slow and may run out of memory for large models");
        }
        info!(plan = plan.name(), path = %module_path.display(), "loading model");

        let model = TorchModel::load(&config.model_id, &module_path, plan).map_err(fail)?;
        info!("model loaded successfully");

        Ok((tokenizer, model))
    }
}

use crate::{
    error::BackendError,
    model::{GenerationParams, ModelMetadata},
};

/// A loaded causal language model.
///
/// Placement and generation are separate calls so a failure in either can be
/// reported as its own error kind.
pub trait LanguageModel: Send + Sync {
    /// Prompt ids after they have been moved to the model's device.
    type Input: Send;

    fn place(&self, input_ids: &[u32]) -> Result<Self::Input, BackendError>;

    /// Returns one sequence per batch row, each holding the prompt ids
    /// followed by the generated ids.
    fn generate(
        &self,
        input: Self::Input,
        params: &GenerationParams,
    ) -> Result<Vec<Vec<u32>>, BackendError>;

    fn metadata(&self) -> ModelMetadata;
}

pub mod auth;
pub mod config;
pub mod error;
pub mod model;
pub mod server;

pub use config::AppConfig;
pub use error::{BackendError, ServiceError};
pub use model::{GenerationRequest, GenerationResponse, LanguageModel, ModelService};
pub use server::build_router;

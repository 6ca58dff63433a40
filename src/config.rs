use std::{env, net::SocketAddr};

use anyhow::Context;

use crate::model::DeviceKind;

pub const DEFAULT_MODEL_ID: &str = "ibm-granite/granite-4.0-h-small";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub model_id: String,
    pub revision: Option<String>,
    pub hf_token: Option<String>,
    pub server_api_key: Option<String>,
    pub device: DevicePreference,
    pub module_file: String,
    pub quantized_module_file: String,
    pub chat_template_fallback: ChatTemplateFallback,
}

/// Which device the operator asked for. Resolved against the host at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    Auto,
    Cpu,
    Cuda(usize),
}

impl DevicePreference {
    pub fn resolve(self, cuda_available: bool) -> DeviceKind {
        match self {
            DevicePreference::Cpu => DeviceKind::Cpu,
            DevicePreference::Auto if cuda_available => DeviceKind::Cuda(0),
            DevicePreference::Auto => DeviceKind::Cpu,
            DevicePreference::Cuda(idx) if cuda_available => DeviceKind::Cuda(idx),
            DevicePreference::Cuda(idx) => {
                tracing::warn!(idx, "CUDA requested but not available, using CPU");
                DeviceKind::Cpu
            }
        }
    }
}

/// How a failed chat-template rendering is reported before falling back to
/// plain tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatTemplateFallback {
    #[default]
    Warn,
    Silent,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = non_empty("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = match non_empty("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got {raw:?}"))?,
            None => 8000,
        };
        let listen_addr = format!("{host}:{port}")
            .parse::<SocketAddr>()
            .or_else(|_| format!("[{host}]:{port}").parse::<SocketAddr>())
            .with_context(|| format!("HOST must be an IP address, got {host:?}"))?;

        let model_id = non_empty("MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
        let revision = non_empty("MODEL_REVISION");
        let hf_token = non_empty("HF_API_KEY");
        let server_api_key = non_empty("SERVER_API_KEY");

        let device = parse_device(&non_empty("DEVICE").unwrap_or_else(|| "auto".into()))?;

        let module_file = non_empty("MODEL_MODULE_FILE").unwrap_or_else(|| "model.ts".to_string());
        let quantized_module_file =
            non_empty("QUANTIZED_MODULE_FILE").unwrap_or_else(|| "model.int8.ts".to_string());

        let chat_template_fallback = match non_empty("CHAT_TEMPLATE_FALLBACK") {
            Some(raw) => parse_fallback(&raw)?,
            None => ChatTemplateFallback::default(),
        };

        Ok(Self {
            listen_addr,
            model_id,
            revision,
            hf_token,
            server_api_key,
            device,
            module_file,
            quantized_module_file,
            chat_template_fallback,
        })
    }
}

fn parse_device(raw: &str) -> anyhow::Result<DevicePreference> {
    let lower = raw.trim().to_lowercase();
    match lower.as_str() {
        "auto" => Ok(DevicePreference::Auto),
        "cpu" => Ok(DevicePreference::Cpu),
        "cuda" => Ok(DevicePreference::Cuda(0)),
        other => {
            let idx = other
                .strip_prefix("cuda:")
                .and_then(|s| s.parse::<usize>().ok())
                .with_context(|| format!("DEVICE must be auto, cpu, cuda or cuda:N, got {raw:?}"))?;
            Ok(DevicePreference::Cuda(idx))
        }
    }
}

fn parse_fallback(raw: &str) -> anyhow::Result<ChatTemplateFallback> {
    match raw.trim().to_lowercase().as_str() {
        "warn" => Ok(ChatTemplateFallback::Warn),
        "silent" => Ok(ChatTemplateFallback::Silent),
        _ => anyhow::bail!("CHAT_TEMPLATE_FALLBACK must be warn or silent, got {raw:?}"),
    }
}

use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::llm_client::DEFAULT_API_BASE;

/// Settings file location when `SETTINGS_PATH` is unset, matching the
/// original desktop deployment.
const DEFAULT_SETTINGS_PATH: &str = "settings.json";

/// Runtime configuration loaded from environment variables. Every variable
/// is optional; the defaults suit a local desktop shell.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: PathBuf,
    pub api_base: String,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Config {
            settings_path: std::env::var("SETTINGS_PATH")
                .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string())
                .into(),
            api_base: std::env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Initializes the global tracing subscriber. The embedding shell calls
    /// this once at startup, before constructing the workflow.
    pub fn init_tracing(&self) {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &self.rust_log))
            }))
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

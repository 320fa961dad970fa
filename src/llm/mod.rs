//! Generation Backend Module
//!
//! The language model is an opaque collaborator with latency and failure
//! modes. The dispatcher only sees the [`GenerationBackend`] trait and applies
//! its own hard timeout and retry policy around every call.
//!
//! ## Backends
//!
//! - **HttpBackend**: OpenAI-compatible chat-completions endpoint
//! - **TemplateBackend**: offline fallback that composes the advisory from the
//!   top-ranked procedure (no model required)

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendKind, GenerationConfig};
use crate::context::Prompt;
use crate::error::AdvisorError;

mod http_backend;
mod template_backend;

pub use http_backend::HttpBackend;
pub use template_backend::TemplateBackend;

/// Unified trait for generation backends
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate advisory text for a prompt.
    ///
    /// Errors should be `GenerationError` with `retryable` set for transient
    /// conditions (overload, connection reset); the caller enforces timeouts.
    async fn generate(&self, prompt: &Prompt) -> Result<String, AdvisorError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Build the configured backend.
pub fn create_backend(config: &GenerationConfig) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    match config.backend {
        BackendKind::Template => {
            tracing::info!("[Generation] Using template backend (no model)");
            Ok(Arc::new(TemplateBackend::new()))
        }
        BackendKind::Http => {
            let backend = HttpBackend::from_config(config)?;
            tracing::info!(
                endpoint = %backend.endpoint(),
                model = %config.model,
                "[Generation] Using HTTP chat-completions backend"
            );
            Ok(Arc::new(backend))
        }
    }
}

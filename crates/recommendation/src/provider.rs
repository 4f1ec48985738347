//! Seam for the LLM-backed content generation capability.

use async_trait::async_trait;
use serde_json::Value;

use pulse_core::error::PulseResult;

/// Opaque content generator: a prompt plus structured context in, text out.
///
/// The text is expected to contain a JSON document, possibly wrapped in
/// markdown code fences; callers parse defensively.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn generate_content(&self, prompt: &str, context: &Value) -> PulseResult<String>;
}

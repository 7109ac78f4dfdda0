use crate::error::ClassificationError;
use crate::llm::Provider;
use std::fmt;

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    /// Model or HTTP body as received; logged at debug level, never displayed.
    pub raw_output: Option<String>,
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={}, stage={}): {}",
            self.provider.as_str(),
            self.stage,
            self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

/// Maps a model-call failure onto the per-article taxonomy.
///
/// Parse-stage diagnostics mean the model answered with something unusable;
/// anything else is treated as a failed request.
pub fn into_classification_error(err: anyhow::Error) -> ClassificationError {
    if let Some(diag) = err.downcast_ref::<LlmDiagnosticsError>() {
        if let Some(raw) = &diag.raw_output {
            tracing::debug!(
                provider = diag.provider.as_str(),
                stage = diag.stage,
                raw_output = %raw,
                "model call failed"
            );
        }
        if diag.stage.starts_with("parse") {
            return ClassificationError::InvalidResponse(diag.to_string());
        }
    }
    ClassificationError::Request(format!("{err:#}"))
}

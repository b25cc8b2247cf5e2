use qraft_core::{GenerationRequest, GenerationResult, ImageSource};

use crate::bootstrap::RuntimeHandle;
use crate::error::RuntimeError;
use crate::program::{self, ProgramParams};

/// Run one generation request inside a bootstrapped runtime.
///
/// Remote background URLs are not fetched here; callers resolve them to
/// bytes first. No retries: a failure is returned as-is.
pub async fn invoke(
    handle: &RuntimeHandle,
    request: &GenerationRequest,
) -> Result<GenerationResult, RuntimeError> {
    let background = match &request.image {
        ImageSource::None => None,
        ImageSource::Upload(upload) => Some(upload.bytes.as_slice()),
        ImageSource::Url(url) => {
            return Err(RuntimeError::InvocationFailed(format!(
                "background URL {url} must be fetched before invoking the runtime"
            )));
        }
    };

    tracing::info!(
        scale = request.scale,
        kind = %request.kind,
        has_background = background.is_some(),
        "Generating QR code in runtime"
    );

    let source = program::render(&ProgramParams {
        content: &request.content,
        scale: request.scale,
        kind: request.kind,
        background,
    });

    let value = handle
        .interpreter()
        .run_python(&source)
        .await
        .inspect_err(|e| tracing::error!("QR generation failed: {e}"))?
        .ok_or_else(|| RuntimeError::InvalidResult("program produced no value".into()))?;

    let result: GenerationResult = serde_json::from_value(value)
        .map_err(|e| RuntimeError::InvalidResult(e.to_string()))?;

    tracing::debug!(description = ?result.description, "QR generation succeeded");
    Ok(result)
}

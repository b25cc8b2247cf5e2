use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use qraft_core::{GenerationRequest, GenerationResult, ImageSource, OutputKind};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::ServiceError;

/// Anything that can turn a [`GenerationRequest`] into an image.
///
/// Implementations can call the remote HTTP service, run the in-process
/// Python runtime, or return canned results for testing.
pub trait QrService: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GenerationResult, ServiceError>> + Send + 'a>>;
}

/// Error body returned by the service on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
    pub details: Option<String>,
}

impl ErrorBody {
    /// `error`, with `: details` appended when details are present.
    pub fn message(&self) -> String {
        let error = self.error.as_deref().unwrap_or("Unknown error");
        match self.details.as_deref() {
            Some(details) if !details.is_empty() => format!("{error}: {details}"),
            _ => error.to_string(),
        }
    }
}

/// Success body. The service also reports generation failures with a 2xx
/// status and an `error` field, so every field is optional here.
#[derive(Debug, Deserialize)]
struct SuccessBody {
    url: Option<String>,
    #[serde(default)]
    content: String,
    description: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

/// Client for `POST {base_url}/generate-qr`.
pub struct HttpQrService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpQrService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self) -> String {
        format!("{}/generate-qr", self.base_url)
    }

    /// `GET {base_url}/health`. True when the service answers `{"status":"ok"}`.
    pub async fn health(&self) -> Result<bool, ServiceError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(body["status"] == "ok")
    }

    fn build_form(request: &GenerationRequest) -> Form {
        let mut form = Form::new()
            .text("url", request.content.clone())
            .text("scale", request.scale.to_string());

        if request.kind != OutputKind::Png {
            form = form.text("kind", request.kind.as_str());
        }

        match &request.image {
            ImageSource::None => form,
            ImageSource::Url(url) => form.text("background_url", url.clone()),
            ImageSource::Upload(upload) => {
                let part = Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
                let part = match part.mime_str(&upload.mime_type) {
                    Ok(part) => part,
                    Err(e) => {
                        tracing::warn!(mime = %upload.mime_type, "Invalid MIME type, sending untyped: {e}");
                        Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone())
                    }
                };
                form.part("image", part)
            }
        }
    }
}

impl QrService for HttpQrService {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GenerationResult, ServiceError>> + Send + 'a>> {
        Box::pin(async move {
            let endpoint = self.endpoint();
            tracing::info!(endpoint, scale = request.scale, "Requesting QR code");

            let resp = self
                .http
                .post(&endpoint)
                .multipart(Self::build_form(request))
                .send()
                .await
                .map_err(|e| ServiceError::Network(format!("HTTP request failed: {e}")))?;

            let status = resp.status();
            tracing::debug!(%status, "Service responded");

            if !status.is_success() {
                let body = resp.json::<ErrorBody>().await.unwrap_or_else(|_| ErrorBody {
                    error: Some("Unknown error".into()),
                    details: None,
                });
                tracing::warn!(%status, error = ?body.error, "QR generation rejected");
                return Err(ServiceError::Remote(body.message()));
            }

            let body: SuccessBody = resp
                .json()
                .await
                .map_err(|e| ServiceError::Remote(format!("Failed to parse response: {e}")))?;

            let Some(url) = body.url else {
                let message = match body.error {
                    Some(error) => ErrorBody {
                        error: Some(error),
                        details: body.details,
                    }
                    .message(),
                    None => "response did not include an image URL".to_string(),
                };
                return Err(ServiceError::Remote(message));
            };

            Ok(GenerationResult {
                url,
                content: body.content,
                description: body.description,
            }
            .cache_busted())
        })
    }
}

/// Stub service that returns a fixed outcome and counts calls.
pub struct StubQrService {
    outcome: Result<GenerationResult, String>,
    delay: Duration,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl StubQrService {
    pub fn returning(result: GenerationResult) -> Self {
        Self {
            outcome: Ok(result),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Always fail with `ServiceError::Remote(message)`.
    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            ..Self::returning(GenerationResult {
                url: String::new(),
                content: String::new(),
                description: None,
            })
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl QrService for StubQrService {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GenerationResult, ServiceError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self
                .last_request
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(request.clone());
            tokio::time::sleep(self.delay).await;
            self.outcome.clone().map_err(ServiceError::Remote)
        })
    }
}

//! Per-attempt generation state machine.
//!
//! `Idle -> Validating -> Awaiting -> Success | Error`, back to `Idle` on
//! dismiss. Input that fails validation is rejected before any transition.
//! Only one attempt may be in flight; a second one gets [`ServiceError::Busy`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use qraft_core::{GenerationRequest, GenerationResult, ImageSource};
use tokio::sync::watch;

use crate::convert::{ImageConverter, normalize_upload};
use crate::error::ServiceError;
use crate::progress::ProgressTicker;
use crate::service::QrService;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Awaiting,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Transient, dismissible message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorSnapshot {
    pub phase: Phase,
    pub result: Option<GenerationResult>,
    pub notice: Option<Notice>,
}

pub struct Generator {
    service: Arc<dyn QrService>,
    converter: Arc<dyn ImageConverter>,
    in_flight: AtomicBool,
    state: watch::Sender<GeneratorSnapshot>,
    progress: Arc<watch::Sender<f32>>,
}

/// Releases the in-flight flag however the attempt ends. An attempt dropped
/// before it settled goes back to `Idle` instead of staying in a loading phase.
struct InFlight<'a>(&'a Generator);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let generator = self.0;
        let abandoned = generator.is_loading();
        if abandoned {
            tracing::debug!("Generation attempt dropped before settling");
            generator.progress.send_replace(0.0);
            generator.state.send_modify(|s| s.phase = Phase::Idle);
        }
        generator.in_flight.store(false, Ordering::SeqCst);
    }
}

impl Generator {
    pub fn new(service: Arc<dyn QrService>, converter: Arc<dyn ImageConverter>) -> Self {
        let (state, _) = watch::channel(GeneratorSnapshot::default());
        let (progress, _) = watch::channel(0.0);
        Self {
            service,
            converter,
            in_flight: AtomicBool::new(false),
            state,
            progress: Arc::new(progress),
        }
    }

    pub fn snapshot(&self) -> GeneratorSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GeneratorSnapshot> {
        self.state.subscribe()
    }

    /// Cosmetic progress, 0 to 100.
    pub fn progress(&self) -> watch::Receiver<f32> {
        self.progress.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state.borrow().phase, Phase::Validating | Phase::Awaiting)
    }

    /// Clear the notice and return to idle. The last result is kept.
    pub fn dismiss(&self) {
        self.state.send_modify(|s| {
            s.phase = Phase::Idle;
            s.notice = None;
        });
    }

    pub async fn generate(
        &self,
        mut request: GenerationRequest,
    ) -> Result<GenerationResult, ServiceError> {
        request.validate()?;

        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("Rejecting overlapping generation request");
            return Err(ServiceError::Busy);
        }
        let _guard = InFlight(self);

        self.state.send_modify(|s| {
            s.phase = Phase::Validating;
            s.notice = None;
        });

        if let ImageSource::Upload(upload) = std::mem::take(&mut request.image) {
            match normalize_upload(upload, self.converter.as_ref()).await {
                Ok(upload) => request.image = ImageSource::Upload(upload),
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            }
        }

        self.state.send_modify(|s| {
            s.phase = Phase::Awaiting;
            s.result = None;
        });

        let ticker = ProgressTicker::start(self.progress.clone());
        let outcome = self.service.generate(&request).await;
        drop(ticker);

        match outcome {
            Ok(result) => {
                tracing::info!(url = %result.url, "QR code generated");
                self.progress.send_replace(100.0);
                self.progress.send_replace(0.0);
                self.state.send_modify(|s| {
                    s.phase = Phase::Success;
                    s.result = Some(result.clone());
                    s.notice = Some(Notice {
                        kind: NoticeKind::Success,
                        message: "QR code generated".into(),
                    });
                });
                Ok(result)
            }
            Err(e) => {
                tracing::error!("Error generating image: {e}");
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn fail(&self, err: &ServiceError) {
        self.progress.send_replace(0.0);
        self.state.send_modify(|s| {
            s.phase = Phase::Error;
            s.notice = Some(Notice::error(err.to_string()));
        });
    }
}

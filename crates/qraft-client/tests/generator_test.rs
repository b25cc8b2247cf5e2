//! End-to-end generation scenarios against the stub service.
use std::sync::Arc;

use qraft_client::{Generator, GeneratorSnapshot, HeifConvert, Phase, ServiceError, StubQrService};
use qraft_core::{GenerationRequest, GenerationResult, ValidationError};

fn generator(stub: Arc<StubQrService>) -> Generator {
    Generator::new(stub, Arc::new(HeifConvert::new()))
}

#[tokio::test]
async fn hello_world_produces_an_image_url() {
    let stub = Arc::new(StubQrService::returning(GenerationResult {
        url: "http://cdn.test/qr.png#cb=1".into(),
        content: "hello world".into(),
        description: Some("QR code in PNG format".into()),
    }));
    let generator = generator(stub.clone());

    let result = generator
        .generate(GenerationRequest::new("hello world"))
        .await
        .unwrap();

    assert!(result.url.starts_with("http") || result.is_data_uri());
    assert_eq!(result.content, "hello world");
    assert_eq!(stub.last_request().unwrap().content, "hello world");
    assert_eq!(generator.snapshot().phase, Phase::Success);
}

#[tokio::test]
async fn empty_content_makes_no_calls_and_changes_nothing() {
    let stub = Arc::new(StubQrService::failing("should not be called"));
    let generator = generator(stub.clone());
    let mut updates = generator.subscribe();

    for content in ["", "   \n\t"] {
        let err = generator
            .generate(GenerationRequest::new(content))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::EmptyContent)
        ));
    }

    assert_eq!(stub.calls(), 0);
    assert_eq!(generator.snapshot(), GeneratorSnapshot::default());
    assert!(!updates.has_changed().unwrap());
}

#[tokio::test]
async fn unsupported_upload_is_rejected_locally() {
    let stub = Arc::new(StubQrService::failing("should not be called"));
    let generator = generator(stub.clone());
    let upload = qraft_core::UploadedImage::new("notes.pdf", None, vec![1]);

    let err = generator
        .generate(GenerationRequest::new("x").with_image(qraft_core::ImageSource::Upload(upload)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::UnsupportedImage(_))
    ));
    assert_eq!(stub.calls(), 0);
}

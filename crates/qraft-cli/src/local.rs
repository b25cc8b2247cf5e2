use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use qraft_client::config::RuntimeConfig;
use qraft_client::output::fetch_background;
use qraft_client::{QrService, ServiceError};
use qraft_core::{GenerationRequest, GenerationResult, ImageSource};
use qraft_runtime::process_host::ProcessHost;
use qraft_runtime::{
    BootstrapConfig, LoadOptions, RuntimeBootstrap, RuntimeError, RuntimeHandle, RuntimeState,
    bridge,
};

/// [`QrService`] backed by the in-process Python runtime.
pub struct RuntimeQrService {
    state: Arc<RuntimeState>,
}

impl RuntimeQrService {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let env_dir = config
            .env_dir
            .clone()
            .unwrap_or_else(ProcessHost::default_env_dir);
        let host = Arc::new(ProcessHost::new(config.python.clone(), env_dir));

        let mut bootstrap_config = BootstrapConfig::default();
        if let Some(index_url) = &config.index_url {
            bootstrap_config = bootstrap_config.with_index_url(index_url.clone());
        }

        let options = LoadOptions {
            on_ready: Some(Arc::new(|_: &RuntimeHandle| {
                tracing::info!("Python runtime ready")
            })),
            ..LoadOptions::default()
        };
        let bootstrap = RuntimeBootstrap::init_global(host, bootstrap_config).clone();
        Self {
            state: RuntimeState::new(bootstrap, options),
        }
    }

    pub fn state(&self) -> &Arc<RuntimeState> {
        &self.state
    }
}

fn runtime_error(e: RuntimeError) -> ServiceError {
    ServiceError::Runtime(e.to_string())
}

impl QrService for RuntimeQrService {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GenerationResult, ServiceError>> + Send + 'a>> {
        Box::pin(async move {
            let handle = self.state.load().await.map_err(runtime_error)?;

            // The runtime only takes bytes, so URL backgrounds are fetched here.
            let result = match &request.image {
                ImageSource::Url(url) => {
                    let upload = fetch_background(url).await?;
                    upload.validate()?;
                    let request = request.clone().with_image(ImageSource::Upload(upload));
                    bridge::invoke(&handle, &request).await
                }
                _ => bridge::invoke(&handle, request).await,
            };
            result.map_err(runtime_error)
        })
    }
}

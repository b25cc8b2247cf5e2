use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bootstrap::{RuntimeBootstrap, RuntimeHandle};
use crate::error::RuntimeError;

/// How long `load()` waits for a load that is already running before
/// checking again.
pub const LOAD_WAIT: Duration = Duration::from_millis(500);

/// Observable lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub ready: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub supported: bool,
}

pub type ReadyCallback = Arc<dyn Fn(&RuntimeHandle) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&RuntimeError) + Send + Sync>;

#[derive(Clone, Default)]
pub struct LoadOptions {
    pub auto_load: bool,
    pub on_ready: Option<ReadyCallback>,
    pub on_error: Option<ErrorCallback>,
}

/// Consumer-facing view of the runtime lifecycle.
///
/// Wraps a [`RuntimeBootstrap`] and publishes every transition as a
/// [`RuntimeSnapshot`] on a watch channel.
pub struct RuntimeState {
    bootstrap: Arc<RuntimeBootstrap>,
    options: LoadOptions,
    handle: Mutex<Option<RuntimeHandle>>,
    loading: AtomicBool,
    /// Bumped by `reset()`; a load that started before a reset publishes nothing.
    generation: AtomicU64,
    supported: bool,
    snapshot: watch::Sender<RuntimeSnapshot>,
}

impl RuntimeState {
    pub fn new(bootstrap: Arc<RuntimeBootstrap>, options: LoadOptions) -> Arc<Self> {
        let supported = bootstrap.supported();
        let (snapshot, _) = watch::channel(RuntimeSnapshot {
            supported,
            ..RuntimeSnapshot::default()
        });
        Arc::new(Self {
            bootstrap,
            options,
            handle: Mutex::new(None),
            loading: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            supported,
            snapshot,
        })
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RuntimeSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn handle(&self) -> Option<RuntimeHandle> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn is_ready(&self) -> bool {
        self.handle().is_some()
    }

    /// Load the runtime, or return the one already loaded.
    pub async fn load(&self) -> Result<RuntimeHandle, RuntimeError> {
        if !self.supported {
            let err = RuntimeError::Unsupported(
                "Python runtime is not available in this environment".into(),
            );
            tracing::error!("Runtime load refused: {err}");
            self.snapshot.send_modify(|s| s.error = Some(err.to_string()));
            self.notify_error(&err);
            return Err(err);
        }

        if let Some(handle) = self.handle() {
            return Ok(handle);
        }

        if self.loading.load(Ordering::SeqCst) {
            tracing::debug!("Runtime load already in progress, waiting");
            tokio::time::sleep(LOAD_WAIT).await;
            if let Some(handle) = self.handle() {
                return Ok(handle);
            }
        }

        let generation = self.generation.load(Ordering::SeqCst);
        self.loading.store(true, Ordering::SeqCst);
        self.snapshot.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let outcome = self.bootstrap.acquire().await;

        {
            let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!("Runtime reset while loading, discarding load result");
                return outcome;
            }
            if let Ok(handle) = &outcome {
                *slot = Some(handle.clone());
            }
        }

        match &outcome {
            Ok(handle) => {
                self.snapshot.send_modify(|s| {
                    s.ready = true;
                    s.error = None;
                });
                if let Some(on_ready) = &self.options.on_ready {
                    on_ready(handle);
                }
            }
            Err(err) => {
                tracing::error!("Runtime load failed: {err}");
                self.snapshot.send_modify(|s| s.error = Some(err.to_string()));
                self.notify_error(err);
            }
        }

        self.loading.store(false, Ordering::SeqCst);
        self.snapshot.send_modify(|s| s.loading = false);
        outcome
    }

    /// Drop the handle, clear all state and reset the underlying bootstrap.
    pub fn reset(&self) {
        tracing::info!("Runtime state reset");
        {
            let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            self.generation.fetch_add(1, Ordering::SeqCst);
            *slot = None;
        }
        self.loading.store(false, Ordering::SeqCst);
        self.snapshot.send_replace(RuntimeSnapshot {
            supported: self.supported,
            ..RuntimeSnapshot::default()
        });
        self.bootstrap.reset();
    }

    /// Start a background load if `auto_load` is set and nothing is loaded or
    /// loading yet. Failures are logged, never propagated.
    pub fn mount(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.options.auto_load
            || !self.supported
            || self.is_ready()
            || self.loading.load(Ordering::SeqCst)
        {
            return None;
        }

        tracing::debug!("Auto-loading Python runtime");
        let state = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = state.load().await {
                tracing::warn!("Auto-load failed: {e}");
            }
        }))
    }

    fn notify_error(&self, err: &RuntimeError) {
        if let Some(on_error) = &self.options.on_error {
            on_error(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::config::BootstrapConfig;
    use crate::stub::{FailAt, StubHost};

    fn state_with(host: Arc<StubHost>, options: LoadOptions) -> Arc<RuntimeState> {
        let bootstrap = Arc::new(RuntimeBootstrap::new(host, BootstrapConfig::default()));
        RuntimeState::new(bootstrap, options)
    }

    #[tokio::test]
    async fn load_transitions_to_ready() {
        let host = Arc::new(StubHost::new());
        let state = state_with(host.clone(), LoadOptions::default());
        let mut rx = state.subscribe();

        assert_eq!(
            state.snapshot(),
            RuntimeSnapshot {
                supported: true,
                ..RuntimeSnapshot::default()
            }
        );

        state.load().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.ready);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error, None);

        // Second load is served from the held handle.
        state.load().await.unwrap();
        assert_eq!(host.instantiations(), 1);
    }

    #[tokio::test]
    async fn unsupported_rejects_without_loading() {
        let host = Arc::new(StubHost::unsupported());
        let errors = Arc::new(AtomicUsize::new(0));
        let counted = errors.clone();
        let state = state_with(
            host.clone(),
            LoadOptions {
                on_error: Some(Arc::new(move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                })),
                ..LoadOptions::default()
            },
        );

        let err = state.load().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unsupported(_)));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(host.injections(), 0);
        assert!(!state.snapshot().supported);
        assert!(state.snapshot().error.is_some());
    }

    #[tokio::test]
    async fn failure_is_recorded_then_cleared_by_reset() {
        let host = Arc::new(StubHost::new().failing_times(FailAt::Packages, 1));
        let state = state_with(host.clone(), LoadOptions::default());

        assert!(state.load().await.is_err());
        let snapshot = state.snapshot();
        assert!(!snapshot.ready);
        assert!(!snapshot.loading);
        assert!(snapshot.error.as_deref().unwrap().contains("stub package failure"));

        state.reset();
        assert_eq!(state.snapshot().error, None);

        state.load().await.unwrap();
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn reset_during_load_discards_its_handle() {
        let host = Arc::new(StubHost::new().with_delay(Duration::from_millis(50)));
        let state = state_with(host.clone(), LoadOptions::default());

        let in_flight = tokio::spawn({
            let state = state.clone();
            async move { state.load().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        state.reset();

        // The caller still gets a handle, but the state stays reset.
        in_flight.await.unwrap().unwrap();
        assert!(!state.is_ready());
        assert_eq!(
            state.snapshot(),
            RuntimeSnapshot {
                supported: true,
                ..RuntimeSnapshot::default()
            }
        );

        state.load().await.unwrap();
        assert!(state.is_ready());
        assert_eq!(host.instantiations(), 2);
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_bootstrap() {
        let host = Arc::new(StubHost::new().with_delay(Duration::from_millis(50)));
        let state = state_with(host.clone(), LoadOptions::default());

        let (a, b) = tokio::join!(state.load(), state.load());
        assert!(a.unwrap().same_instance(&b.unwrap()));
        assert_eq!(host.installs(), 1);
    }

    #[tokio::test]
    async fn mount_auto_loads_and_calls_on_ready() {
        let host = Arc::new(StubHost::new());
        let ready = Arc::new(AtomicUsize::new(0));
        let counted = ready.clone();
        let state = state_with(
            host,
            LoadOptions {
                auto_load: true,
                on_ready: Some(Arc::new(move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                })),
                ..LoadOptions::default()
            },
        );

        state.mount().expect("auto-load task").await.unwrap();
        assert!(state.is_ready());
        assert_eq!(ready.load(Ordering::SeqCst), 1);

        // Nothing left to do once ready.
        assert!(state.mount().is_none());
    }

    #[tokio::test]
    async fn mount_swallows_failures() {
        let host = Arc::new(StubHost::new().failing_at(FailAt::Loader));
        let state = state_with(
            host,
            LoadOptions {
                auto_load: true,
                ..LoadOptions::default()
            },
        );

        state.mount().expect("auto-load task").await.unwrap();
        assert!(!state.is_ready());
        assert!(state.snapshot().error.is_some());
    }

    #[tokio::test]
    async fn mount_without_auto_load_is_noop() {
        let state = state_with(Arc::new(StubHost::new()), LoadOptions::default());
        assert!(state.mount().is_none());
    }
}

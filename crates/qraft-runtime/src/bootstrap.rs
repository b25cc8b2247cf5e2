use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::config::BootstrapConfig;
use crate::error::RuntimeError;
use crate::host::{Interpreter, RuntimeHost};
use crate::process_host::ProcessHost;
use crate::program;

/// Handle to a fully bootstrapped interpreter. Cheap to clone; every clone
/// refers to the same underlying instance.
#[derive(Clone)]
pub struct RuntimeHandle {
    interpreter: Arc<dyn Interpreter>,
}

impl RuntimeHandle {
    pub fn interpreter(&self) -> &dyn Interpreter {
        self.interpreter.as_ref()
    }

    /// True if both handles refer to the same interpreter instance.
    pub fn same_instance(&self, other: &RuntimeHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.interpreter) as *const (),
            Arc::as_ptr(&other.interpreter) as *const (),
        )
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("instance", &(Arc::as_ptr(&self.interpreter) as *const ()))
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<RuntimeBootstrap>> = OnceLock::new();

type PendingBootstrap = Shared<BoxFuture<'static, Result<RuntimeHandle, RuntimeError>>>;

#[derive(Default)]
struct Slot {
    instance: Option<RuntimeHandle>,
    pending: Option<PendingBootstrap>,
    /// Bumped by `reset()` so a bootstrap that finishes afterwards does not
    /// repopulate the slot.
    generation: u64,
}

/// Loads the Python runtime once and hands the same instance to every caller.
///
/// # Concurrency
///
/// At most one bootstrap sequence runs at a time. Callers arriving while one
/// is in flight await the same shared future and observe the same outcome.
/// A failed bootstrap leaves nothing memoized, so the next `acquire()` starts
/// over from the capability check.
pub struct RuntimeBootstrap {
    host: Arc<dyn RuntimeHost>,
    config: BootstrapConfig,
    slot: Arc<Mutex<Slot>>,
}

impl RuntimeBootstrap {
    pub fn new(host: Arc<dyn RuntimeHost>, config: BootstrapConfig) -> Self {
        Self {
            host,
            config,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Process-wide bootstrap. Backed by a default [`ProcessHost`] unless
    /// [`init_global`](Self::init_global) ran first.
    pub fn global() -> &'static Arc<RuntimeBootstrap> {
        GLOBAL.get_or_init(|| {
            Arc::new(RuntimeBootstrap::new(
                Arc::new(ProcessHost::default()),
                BootstrapConfig::default(),
            ))
        })
    }

    /// Set up the process-wide bootstrap with the given host and config.
    /// The first initialization wins; later calls return the existing one.
    pub fn init_global(
        host: Arc<dyn RuntimeHost>,
        config: BootstrapConfig,
    ) -> &'static Arc<RuntimeBootstrap> {
        let mut fresh = Some((host, config));
        let global = GLOBAL.get_or_init(|| {
            let (host, config) = fresh.take().unwrap_or_else(|| {
                (Arc::new(ProcessHost::default()), BootstrapConfig::default())
            });
            Arc::new(RuntimeBootstrap::new(host, config))
        });
        if fresh.is_some() {
            tracing::warn!("Runtime bootstrap already initialized, ignoring new settings");
        }
        global
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Capability check. Never loads anything.
    pub fn supported(&self) -> bool {
        self.host.is_supported()
    }

    /// The memoized handle, if a bootstrap has completed since the last reset.
    pub fn current(&self) -> Option<RuntimeHandle> {
        lock(&self.slot).instance.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }

    /// Return the runtime, bootstrapping it if needed.
    pub async fn acquire(&self) -> Result<RuntimeHandle, RuntimeError> {
        let pending = {
            let mut slot = lock(&self.slot);

            if let Some(handle) = &slot.instance {
                return Ok(handle.clone());
            }

            match &slot.pending {
                Some(pending) => {
                    tracing::debug!("Runtime bootstrap already in flight, joining it");
                    pending.clone()
                }
                None => {
                    if !self.host.is_supported() {
                        tracing::warn!("Runtime host reports no capability, refusing to bootstrap");
                        return Err(RuntimeError::Unsupported(
                            "host cannot execute the Python runtime".into(),
                        ));
                    }

                    let pending = bootstrap(
                        self.host.clone(),
                        self.config.clone(),
                        self.slot.clone(),
                        slot.generation,
                    )
                    .boxed()
                    .shared();
                    slot.pending = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Forget the instance and any in-flight bootstrap. The next `acquire()`
    /// runs the full sequence again.
    pub fn reset(&self) {
        let mut slot = lock(&self.slot);
        slot.instance = None;
        slot.pending = None;
        slot.generation += 1;
        tracing::info!(generation = slot.generation, "Runtime reset");
    }
}

async fn bootstrap(
    host: Arc<dyn RuntimeHost>,
    config: BootstrapConfig,
    slot: Arc<Mutex<Slot>>,
    generation: u64,
) -> Result<RuntimeHandle, RuntimeError> {
    let outcome = run_sequence(host.as_ref(), &config).await;

    let mut slot = lock(&slot);
    if slot.generation != generation {
        tracing::debug!("Bootstrap finished after a reset, not memoizing");
        return outcome;
    }

    slot.pending = None;
    match &outcome {
        Ok(handle) => {
            slot.instance = Some(handle.clone());
            tracing::info!("Python runtime fully initialized");
        }
        Err(e) => tracing::error!("Python runtime bootstrap failed: {e}"),
    }
    outcome
}

async fn run_sequence(
    host: &dyn RuntimeHost,
    config: &BootstrapConfig,
) -> Result<RuntimeHandle, RuntimeError> {
    if host.loader_present() {
        tracing::debug!("Runtime loader already present, skipping injection");
    } else {
        tracing::info!("Injecting runtime loader");
        host.inject_loader().await?;
    }

    tracing::info!(index_url = %config.index_url, "Instantiating Python runtime");
    let interpreter = host.instantiate(&config.index_url).await?;

    tracing::info!(packages = ?config.base_packages, "Loading base packages");
    interpreter.load_packages(&config.base_packages).await?;

    tracing::info!(packages = ?config.pure_packages, "Installing Python packages");
    interpreter
        .run_python(&program::install_program(&config.pure_packages))
        .await
        .map_err(|e| RuntimeError::InstallFailed(e.to_string()))?;

    Ok(RuntimeHandle { interpreter })
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

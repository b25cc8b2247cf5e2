//! Deterministic in-memory host for tests and dry runs.
//!
//! Counts every bootstrap step so callers can assert how many times the
//! loader was injected, the interpreter instantiated, or packages installed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::RuntimeError;
use crate::host::{HostFuture, Interpreter, RuntimeHost};
use crate::program;

/// Bootstrap step a [`StubHost`] can be told to fail at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Loader,
    Instantiate,
    Packages,
    Install,
}

pub type Responder = Arc<dyn Fn(&str) -> Option<serde_json::Value> + Send + Sync>;

#[derive(Default)]
struct Counters {
    injections: AtomicUsize,
    instantiations: AtomicUsize,
    package_loads: AtomicUsize,
    installs: AtomicUsize,
    executions: AtomicUsize,
}

pub struct StubHost {
    supported: bool,
    loader_present: AtomicBool,
    delay: Duration,
    fail_at: Option<FailAt>,
    failures_left: AtomicUsize,
    responder: Responder,
    counters: Arc<Counters>,
}

impl Default for StubHost {
    fn default() -> Self {
        Self::new()
    }
}

impl StubHost {
    pub fn new() -> Self {
        Self {
            supported: true,
            loader_present: AtomicBool::new(false),
            delay: Duration::ZERO,
            fail_at: None,
            failures_left: AtomicUsize::new(0),
            responder: Arc::new(|_| {
                Some(serde_json::json!({
                    "url": "data:image/png;base64,iVBORw0KGgo=",
                    "content": "stub",
                    "description": "QR code in PNG format",
                }))
            }),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn with_loader_present(self) -> Self {
        self.loader_present.store(true, Ordering::SeqCst);
        self
    }

    /// Sleep this long inside loader injection and instantiation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_at(self, stage: FailAt) -> Self {
        self.failing_times(stage, usize::MAX)
    }

    pub fn failing_times(mut self, stage: FailAt, times: usize) -> Self {
        self.fail_at = Some(stage);
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_install(self) -> Self {
        self.failing_at(FailAt::Install)
    }

    /// Answer every non-install program with `responder(source)`.
    pub fn with_responder(
        mut self,
        responder: impl Fn(&str) -> Option<serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    pub fn injections(&self) -> usize {
        self.counters.injections.load(Ordering::SeqCst)
    }

    pub fn instantiations(&self) -> usize {
        self.counters.instantiations.load(Ordering::SeqCst)
    }

    pub fn package_loads(&self) -> usize {
        self.counters.package_loads.load(Ordering::SeqCst)
    }

    pub fn installs(&self) -> usize {
        self.counters.installs.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.counters.executions.load(Ordering::SeqCst)
    }

    fn should_fail(&self, stage: FailAt) -> bool {
        should_fail(self.fail_at, &self.failures_left, stage)
    }
}

fn should_fail(fail_at: Option<FailAt>, failures_left: &AtomicUsize, stage: FailAt) -> bool {
    if fail_at != Some(stage) {
        return false;
    }
    failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl RuntimeHost for StubHost {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn loader_present(&self) -> bool {
        self.loader_present.load(Ordering::SeqCst)
    }

    fn inject_loader(&self) -> HostFuture<'_, ()> {
        Box::pin(async move {
            self.counters.injections.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.should_fail(FailAt::Loader) {
                return Err(RuntimeError::LoaderFailed("stub loader failure".into()));
            }
            self.loader_present.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn instantiate<'a>(&'a self, _index_url: &'a str) -> HostFuture<'a, Arc<dyn Interpreter>> {
        Box::pin(async move {
            self.counters.instantiations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.should_fail(FailAt::Instantiate) {
                return Err(RuntimeError::InstantiationFailed(
                    "stub instantiation failure".into(),
                ));
            }
            // Failure budget for later stages is decided up front so the
            // interpreter does not need a back-reference to the host.
            let fail_packages = self.should_fail(FailAt::Packages);
            let fail_install = self.should_fail(FailAt::Install);
            let interpreter: Arc<dyn Interpreter> = Arc::new(StubInterpreter {
                fail_packages,
                fail_install,
                responder: self.responder.clone(),
                counters: self.counters.clone(),
            });
            Ok(interpreter)
        })
    }
}

struct StubInterpreter {
    fail_packages: bool,
    fail_install: bool,
    responder: Responder,
    counters: Arc<Counters>,
}

impl Interpreter for StubInterpreter {
    fn load_packages<'a>(&'a self, _packages: &'a [String]) -> HostFuture<'a, ()> {
        Box::pin(async move {
            self.counters.package_loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_packages {
                return Err(RuntimeError::PackageLoadFailed("stub package failure".into()));
            }
            Ok(())
        })
    }

    fn run_python<'a>(&'a self, source: &'a str) -> HostFuture<'a, Option<serde_json::Value>> {
        Box::pin(async move {
            if source.starts_with(program::INSTALL_HEADER) {
                self.counters.installs.fetch_add(1, Ordering::SeqCst);
                if self.fail_install {
                    return Err(RuntimeError::InvocationFailed("pip exited with 1".into()));
                }
                return Ok(None);
            }
            self.counters.executions.fetch_add(1, Ordering::SeqCst);
            Ok((self.responder)(source))
        })
    }
}

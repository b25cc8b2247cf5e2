use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::RuntimeError;

pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RuntimeError>> + Send + 'a>>;

/// The environment a Python interpreter is brought up in.
///
/// The bootstrap drives a host through a fixed sequence: capability check,
/// loader injection (skipped when already present), instantiation. Hosts only
/// implement the individual steps; sequencing and memoization live in
/// [`RuntimeBootstrap`](crate::RuntimeBootstrap).
pub trait RuntimeHost: Send + Sync {
    /// Pure, synchronous capability check. Must not load or install anything.
    fn is_supported(&self) -> bool;

    /// True if a previous attempt already installed the loader.
    fn loader_present(&self) -> bool;

    /// Install the loader the interpreter factory needs.
    fn inject_loader(&self) -> HostFuture<'_, ()>;

    /// Create an interpreter bound to the given package index.
    fn instantiate<'a>(&'a self, index_url: &'a str) -> HostFuture<'a, Arc<dyn Interpreter>>;
}

/// A live interpreter.
pub trait Interpreter: Send + Sync {
    /// Load native-extension packages from the interpreter's distribution.
    fn load_packages<'a>(&'a self, packages: &'a [String]) -> HostFuture<'a, ()>;

    /// Execute a program and return the value of its trailing expression,
    /// already converted to plain JSON. `None` when the last statement is not
    /// an expression or evaluates to `None`.
    fn run_python<'a>(&'a self, source: &'a str) -> HostFuture<'a, Option<serde_json::Value>>;
}

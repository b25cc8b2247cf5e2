//! Python runtime bootstrap and invocation bridge for qraft.
//!
//! Provides [`RuntimeBootstrap`], which brings an interpreter up exactly once
//! and shares it, [`bridge::invoke`], which turns a generation request into a
//! synthesized program and runs it, and [`RuntimeState`], a consumer-facing
//! view of the load lifecycle.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use qraft_core::GenerationRequest;
//! use qraft_runtime::{RuntimeBootstrap, bridge};
//!
//! # async fn run() -> Result<(), qraft_runtime::RuntimeError> {
//! let runtime = RuntimeBootstrap::global().acquire().await?;
//! let result = bridge::invoke(&runtime, &GenerationRequest::new("hello world").with_scale(8)).await?;
//! println!("{}", result.url);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod process_host;
pub mod program;
pub mod state;
pub mod stub;

pub use bootstrap::{RuntimeBootstrap, RuntimeHandle};
pub use config::BootstrapConfig;
pub use error::RuntimeError;
pub use host::{Interpreter, RuntimeHost};
pub use process_host::ProcessHost;
pub use state::{LoadOptions, RuntimeSnapshot, RuntimeState};

//! Shared data model for qraft.
//!
//! Both invocation paths (the remote `/generate-qr` service and the
//! in-process Python runtime) speak in terms of the types defined here:
//! a [`GenerationRequest`] goes in, a [`GenerationResult`] comes out.

pub mod data_uri;
pub mod error;
pub mod image;
pub mod types;

pub use error::ValidationError;
pub use types::{GenerationRequest, GenerationResult, ImageSource, OutputKind, UploadedImage};

//! Client side of qraft: the `/generate-qr` HTTP service, the generation
//! state machine that drives it, and what happens to an image afterwards.

pub mod config;
pub mod convert;
pub mod error;
pub mod generator;
pub mod output;
pub mod progress;
pub mod service;

pub use config::QraftConfig;
pub use convert::{HeifConvert, ImageConverter};
pub use error::ServiceError;
pub use generator::{Generator, GeneratorSnapshot, Notice, NoticeKind, Phase};
pub use service::{HttpQrService, QrService, StubQrService};

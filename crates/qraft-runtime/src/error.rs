use thiserror::Error;

/// Errors from bootstrapping or invoking the Python runtime.
///
/// `Clone` because one in-flight bootstrap hands the same outcome to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Python runtime is not supported on this host: {0}")]
    Unsupported(String),

    #[error("Failed to load runtime loader: {0}")]
    LoaderFailed(String),

    #[error("Runtime instantiation failed: {0}")]
    InstantiationFailed(String),

    #[error("Package loading failed: {0}")]
    PackageLoadFailed(String),

    #[error("Package installation failed: {0}")]
    InstallFailed(String),

    #[error("Invocation failed: {0}")]
    InvocationFailed(String),

    #[error("invalid result from runtime: {0}")]
    InvalidResult(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl RuntimeError {
    /// True for failures of the one-time bootstrap sequence.
    pub fn is_bootstrap(&self) -> bool {
        matches!(
            self,
            Self::LoaderFailed(_)
                | Self::InstantiationFailed(_)
                | Self::PackageLoadFailed(_)
                | Self::InstallFailed(_)
        )
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

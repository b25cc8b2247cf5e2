/// Package index the interpreter installs from.
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";

/// Native-extension packages loaded right after instantiation.
pub const BASE_PACKAGES: &[&str] = &["pillow"];

/// Pure-Python packages installed by the in-interpreter bootstrap program.
pub const PURE_PACKAGES: &[&str] = &["segno>=1.6.6", "qrcode-artistic>=3.0.2"];

/// What the bootstrap installs and where from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub index_url: String,
    pub base_packages: Vec<String>,
    pub pure_packages: Vec<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.into(),
            base_packages: BASE_PACKAGES.iter().map(|p| p.to_string()).collect(),
            pure_packages: PURE_PACKAGES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl BootstrapConfig {
    pub fn with_index_url(mut self, index_url: impl Into<String>) -> Self {
        self.index_url = index_url.into();
        self
    }
}

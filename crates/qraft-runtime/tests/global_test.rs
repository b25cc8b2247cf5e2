//! The process-wide bootstrap. Kept in its own test binary so nothing else
//! initializes the global first.
use std::sync::Arc;

use qraft_runtime::stub::StubHost;
use qraft_runtime::{BootstrapConfig, RuntimeBootstrap};

#[tokio::test]
async fn global_is_one_shared_instance() {
    let host = Arc::new(StubHost::new());
    let first = RuntimeBootstrap::init_global(host.clone(), BootstrapConfig::default());
    let again = RuntimeBootstrap::global();
    assert!(Arc::ptr_eq(first, again));
    assert!(std::ptr::eq(first, again));

    // Later settings are ignored.
    let other = Arc::new(StubHost::new());
    let later = RuntimeBootstrap::init_global(other.clone(), BootstrapConfig::default());
    assert!(Arc::ptr_eq(first, later));

    let a = tokio::spawn(async { RuntimeBootstrap::global().acquire().await });
    let b = tokio::spawn(async { RuntimeBootstrap::global().acquire().await });
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

    assert!(a.same_instance(&b));
    assert_eq!(host.installs(), 1);
    assert_eq!(other.instantiations(), 0);
}

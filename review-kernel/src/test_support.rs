//! Shared helpers for the crate's tests.

use std::path::Path;
use std::sync::Mutex;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` with `REVIEW_DATA_DIR` pointed at `dir`, serialized across all
/// tests in this crate (env vars are process-global).
pub(crate) fn with_data_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    unsafe { std::env::set_var("REVIEW_DATA_DIR", dir) };
    let out = f();
    unsafe { std::env::remove_var("REVIEW_DATA_DIR") };
    out
}

/// Same, for async bodies: the guard is held across the await.
pub(crate) async fn with_data_dir_async<T, F>(dir: &Path, fut: F) -> T
where
    F: Future<Output = T>,
{
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    unsafe { std::env::set_var("REVIEW_DATA_DIR", dir) };
    let out = fut.await;
    unsafe { std::env::remove_var("REVIEW_DATA_DIR") };
    out
}

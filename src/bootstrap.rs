//! Bootstrap helpers for waprovision.
//!
//! Env vars needed before any config resolution (database selection, pooled
//! gateway owner) may live in `~/.waprovision/.env` next to the default
//! libSQL database file.

use std::path::PathBuf;

/// Base directory for local state: `~/.waprovision`.
pub fn waprovision_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".waprovision")
}

/// Path to the service-specific `.env` file: `~/.waprovision/.env`.
pub fn waprovision_env_path() -> PathBuf {
    waprovision_dir().join(".env")
}

/// Load env vars from `./.env` and then `~/.waprovision/.env`.
///
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.waprovision/.env`
pub fn load_waprovision_env() {
    let _ = dotenvy::dotenv();

    let path = waprovision_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        tracing::warn!("Failed to load {}: {}", path.display(), e);
    }
}

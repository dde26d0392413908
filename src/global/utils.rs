use std::path::PathBuf;
use directories::BaseDirs;
use crate::error::{Error, IoContext, Result};

/// Name of the directory created under the user cache root.
pub const APP_NAME: &str = "tooldock";

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "TOOLDOCK_CACHE_DIR";

/// Returns the cache root: `$TOOLDOCK_CACHE_DIR` if set, otherwise
/// `<user cache dir>/tooldock` (e.g. `~/.cache/tooldock` on Linux).
pub fn get_global_cache_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|dir| !dir.is_empty()) {
        let dir = PathBuf::from(dir);
        return std::path::absolute(&dir).at(dir);
    }
    let base = BaseDirs::new().ok_or(Error::Home)?;
    Ok(base.cache_dir().join(APP_NAME))
}

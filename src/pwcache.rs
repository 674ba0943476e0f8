//! Password prompt with a per-user cache in /dev/shm.
//!
//! The cache keeps repeated fleet runs from prompting on every invocation;
//! /dev/shm keeps it off persistent storage. The stored value is base64 to
//! survive newlines, not to protect it — the file mode does that.

use std::io;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::warn;

fn cache_path() -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/dev/shm/gpcache-{user}")
}

/// Get the password: from the cache when allowed, otherwise by prompting.
/// With `clear_cache`, the cache file is deleted first.
pub fn get_password(cache_allowed: bool, clear_cache: bool) -> io::Result<String> {
    let path = cache_path();

    if clear_cache {
        std::fs::remove_file(&path)?;
    }

    if cache_allowed {
        if let Ok(cached) = std::fs::read(&path) {
            if let Ok(decoded) = BASE64.decode(cached.trim_ascii()) {
                if let Ok(password) = String::from_utf8(decoded) {
                    return Ok(password);
                }
            }
        }
    }

    let password = rpassword::prompt_password("Please enter the password to use: ")?;

    if cache_allowed {
        if let Err(error) = write_cache(&path, &password) {
            // Not being able to cache is not fatal.
            warn!("failed to cache password in {path:?}: {error}");
        }
    }

    Ok(password)
}

fn write_cache(path: &str, password: &str) -> io::Result<()> {
    use std::io::Write as _;
    use std::os::unix::fs::OpenOptionsExt as _;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(BASE64.encode(password).as_bytes())
}

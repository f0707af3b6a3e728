//! Path resolution for upup
//!
//! State directory priority:
//! 1. `--state-dir` / `UPUP_STATE_DIR`
//! 2. `XDG_STATE_HOME/upup` (if set)
//! 3. `~/.local/state/upup`
//! 4. `./.upup-state` when no home directory is known

use std::path::PathBuf;

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "UPUP_STATE_DIR";

/// Resolve the directory the local backend keeps its objects in
pub fn state_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(dir) = explicit {
        let path = expand(dir);
        log::debug!("Using state dir from flag or {ENV_STATE_DIR}: {}", path.display());
        return path;
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("upup");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return path;
    }

    match dirs::home_dir() {
        Some(home) => {
            let path = home.join(".local").join("state").join("upup");
            log::debug!("Using default state dir: {}", path.display());
            path
        }
        None => {
            log::warn!("Could not determine home directory, keeping state in ./.upup-state");
            PathBuf::from(".upup-state")
        }
    }
}

/// Expand ~ and environment variables in a path string
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

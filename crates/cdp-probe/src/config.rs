//! Probe configuration.
//!
//! Defaults describe the constrained deployment image (browser binary at a
//! fixed path, one writable scratch root); `TITLEPROBE_*` environment
//! variables override them for local runs.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, path::PathBuf};

use which::which;

/// Path the deployment image ships the browser binary at.
pub const DEFAULT_EXECUTABLE: &str = "/opt/chromium";

/// The one writable area available under a read-only root.
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub executable: PathBuf,
    pub scratch_dir: PathBuf,
    pub headless: bool,
    /// Root budget margin against the platform ceiling.
    pub margin: Duration,
    /// How long the launched process may take to publish its DevTools
    /// endpoint.
    pub launch_timeout: Duration,
    /// Ceiling for a single protocol command round-trip.
    pub command_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            scratch_dir: default_scratch_dir(),
            headless: resolve_headless_default(),
            margin: crate::budget::DEFAULT_MARGIN,
            launch_timeout: Duration::from_secs(20),
            command_timeout: Duration::from_secs(30),
        }
    }
}

fn resolve_headless_default() -> bool {
    match env::var("TITLEPROBE_HEADLESS") {
        Ok(value) => {
            let lower = value.to_ascii_lowercase();
            !matches!(lower.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}

fn default_scratch_dir() -> PathBuf {
    match env::var("TITLEPROBE_SCRATCH_DIR") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
        _ => PathBuf::from(DEFAULT_SCRATCH_DIR),
    }
}

fn default_executable() -> PathBuf {
    detect_executable().unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE))
}

/// Locate a Chromium binary: explicit env override first, then the
/// deployment path, then PATH lookup.
pub fn detect_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("TITLEPROBE_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    let deployed = PathBuf::from(DEFAULT_EXECUTABLE);
    if deployed.exists() {
        return Some(deployed);
    }

    for name in executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    None
}

fn executable_names() -> &'static [&'static str] {
    &[
        "chromium",
        "chromium-browser",
        "google-chrome-stable",
        "google-chrome",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn detects_from_env_var() {
        let dir = tempdir().unwrap();
        let exe_path = dir.path().join("my-chromium");
        fs::write(&exe_path, b"").unwrap();
        let original = env::var("TITLEPROBE_CHROME").ok();
        env::set_var("TITLEPROBE_CHROME", exe_path.to_string_lossy().to_string());
        let detected = detect_executable();
        if let Some(value) = original {
            env::set_var("TITLEPROBE_CHROME", value);
        } else {
            env::remove_var("TITLEPROBE_CHROME");
        }
        assert_eq!(detected, Some(exe_path));
    }

    #[test]
    fn default_scratch_falls_back_to_tmp() {
        if env::var("TITLEPROBE_SCRATCH_DIR").is_err() {
            assert_eq!(default_scratch_dir(), PathBuf::from(DEFAULT_SCRATCH_DIR));
        }
    }
}

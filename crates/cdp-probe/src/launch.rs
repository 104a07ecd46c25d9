//! Declarative launch configuration for the browser process.
//!
//! The plan is an ordered list of `(key, value|flag)` entries built once
//! and consumed exactly once by the allocator. Later entries override
//! earlier ones with the same key; resolution is deterministic
//! (last-written value at the key's first position).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ProbeConfig;

/// Key consumed by the launcher itself rather than forwarded verbatim:
/// chromiumoxide routes the profile directory through its own builder.
const USER_DATA_DIR: &str = "user-data-dir";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchEntry {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchPlan {
    executable: PathBuf,
    headless: bool,
    entries: Vec<LaunchEntry>,
}

impl LaunchPlan {
    /// The full entry list for a sandboxless, read-only-root environment:
    /// headless/GPU/sandbox flags, reduced process-model flags,
    /// writable-path redirection into the scratch area, and
    /// background-activity suppression.
    pub fn for_restricted_env(cfg: &ProbeConfig) -> Self {
        let scratch = cfg.scratch_dir.as_path();
        let mut plan = Self {
            executable: cfg.executable.clone(),
            headless: cfg.headless,
            entries: Vec::new(),
        };

        if cfg.headless {
            plan.push_value("headless", "new");
            plan.push_flag("hide-scrollbars");
            plan.push_flag("mute-audio");
        }
        plan.push_flag("disable-gpu");
        // Both sandbox flags: no privileged sandbox helper exists in the
        // target image, and older images shipped only the setuid variant.
        plan.push_flag("no-sandbox");
        plan.push_flag("disable-setuid-sandbox");

        plan.push_flag("single-process");
        plan.push_flag("no-zygote");

        plan.push_path(USER_DATA_DIR, scratch.join("user-data"));
        plan.push_path("disk-cache-dir", scratch.join("cache-dir"));
        plan.push_path("data-path", scratch.join("data-path"));
        plan.push_path("homedir", scratch.to_path_buf());

        plan.push_flag("disable-sync");
        plan.push_flag("disable-background-networking");
        plan.push_flag("disable-extensions");
        plan.push_flag("disable-component-update");
        plan.push_flag("disable-dev-shm-usage");
        plan.push_flag("no-first-run");
        plan.push_flag("no-default-browser-check");
        plan.push_flag("metrics-recording-only");
        plan.push_flag("ignore-certificate-errors");

        plan
    }

    pub fn push_flag(&mut self, key: impl Into<String>) {
        self.entries.push(LaunchEntry {
            key: key.into(),
            value: None,
        });
    }

    pub fn push_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push(LaunchEntry {
            key: key.into(),
            value: Some(value.into()),
        });
    }

    fn push_path(&mut self, key: &str, path: PathBuf) {
        self.push_value(key, path.to_string_lossy().into_owned());
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    /// Deduplicated entry list, last write per key winning.
    pub fn resolved(&self) -> Vec<LaunchEntry> {
        let mut resolved: Vec<LaunchEntry> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            match resolved.iter_mut().find(|e| e.key == entry.key) {
                Some(existing) => existing.value = entry.value.clone(),
                None => resolved.push(entry.clone()),
            }
        }
        resolved
    }

    /// Resolved profile directory, when the plan redirects one.
    pub fn user_data_dir(&self) -> Option<PathBuf> {
        self.resolved()
            .into_iter()
            .find(|e| e.key == USER_DATA_DIR)
            .and_then(|e| e.value)
            .map(PathBuf::from)
    }

    /// Writable directories the plan expects to exist before launch.
    pub fn writable_dirs(&self) -> Vec<PathBuf> {
        self.resolved()
            .into_iter()
            .filter(|e| {
                matches!(
                    e.key.as_str(),
                    USER_DATA_DIR | "disk-cache-dir" | "data-path" | "homedir"
                )
            })
            .filter_map(|e| e.value)
            .map(PathBuf::from)
            .collect()
    }

    /// Command-line arguments for the launcher, `user-data-dir` excluded.
    pub fn resolved_args(&self) -> Vec<String> {
        self.resolved()
            .into_iter()
            .filter(|e| e.key != USER_DATA_DIR)
            .map(|e| match e.value {
                Some(value) => format!("--{}={}", e.key, value),
                None => format!("--{}", e.key),
            })
            .collect()
    }
}

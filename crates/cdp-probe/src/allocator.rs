//! Browser process allocation.
//!
//! One allocation attempt per invocation. The returned handle exclusively
//! owns the process and its control connection; releasing the handle (or
//! the allocation scope above it) terminates both.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use tracing::info;

use crate::budget::Scope;
use crate::config::ProbeConfig;
use crate::error::{Phase, ProbeError, ProbeErrorKind};
use crate::launch::LaunchPlan;
use crate::transport::{CdpTransport, ChromiumTransport};

/// One OS-level browser process plus its control-connection endpoint.
pub struct BrowserProcess {
    transport: Arc<dyn CdpTransport>,
}

impl BrowserProcess {
    pub fn from_transport(transport: Arc<dyn CdpTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn CdpTransport> {
        Arc::clone(&self.transport)
    }

    /// Terminate the process and close its connection. Idempotent.
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}

/// Allocation seam. Fakes implement this to track open/close behavior.
#[async_trait]
pub trait Allocate: Send + Sync {
    async fn allocate(
        &self,
        scope: &Scope,
        plan: &LaunchPlan,
    ) -> Result<BrowserProcess, ProbeError>;
}

pub struct ChromiumAllocator {
    launch_timeout: Duration,
    command_timeout: Duration,
}

impl ChromiumAllocator {
    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self {
            launch_timeout: cfg.launch_timeout,
            command_timeout: cfg.command_timeout,
        }
    }

    fn browser_config(&self, plan: &LaunchPlan) -> Result<BrowserConfig, ProbeError> {
        let executable = plan.executable();
        if executable.as_os_str().is_empty() || !executable.exists() {
            return Err(ProbeError::new(ProbeErrorKind::Internal).with_hint(format!(
                "browser executable not found at {}",
                executable.display()
            )));
        }

        for dir in plan.writable_dirs() {
            fs::create_dir_all(&dir).map_err(|err| {
                ProbeError::new(ProbeErrorKind::Internal)
                    .with_hint(format!("failed to prepare {}: {err}", dir.display()))
            })?;
        }

        let mut builder = BrowserConfig::builder()
            .request_timeout(self.command_timeout)
            .launch_timeout(self.launch_timeout)
            .chrome_executable(executable.to_path_buf())
            .args(plan.resolved_args());

        if !plan.headless() {
            builder = builder.with_head();
        }
        if let Some(profile) = plan.user_data_dir() {
            builder = builder.user_data_dir(profile);
        }

        builder.build().map_err(|err| {
            ProbeError::new(ProbeErrorKind::Internal)
                .with_hint(format!("browser config error: {err}"))
        })
    }
}

#[async_trait]
impl Allocate for ChromiumAllocator {
    async fn allocate(
        &self,
        scope: &Scope,
        plan: &LaunchPlan,
    ) -> Result<BrowserProcess, ProbeError> {
        let result = scope
            .run(Phase::Allocation, async {
                let config = self.browser_config(plan)?;
                let transport =
                    ChromiumTransport::start(config, self.launch_timeout, self.command_timeout)
                        .await?;
                info!(target: "cdp-probe", executable = %plan.executable().display(), "browser process allocated");
                Ok(BrowserProcess::from_transport(Arc::new(transport)))
            })
            .await;

        result.map_err(|err| err.classify(Phase::Allocation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::InvocationBudget;
    use std::path::PathBuf;

    #[tokio::test]
    async fn missing_executable_fails_allocation() {
        let scratch = tempfile::tempdir().unwrap();
        let cfg = ProbeConfig {
            executable: PathBuf::from("/nonexistent/chromium"),
            scratch_dir: scratch.path().to_path_buf(),
            ..ProbeConfig::default()
        };
        let plan = LaunchPlan::for_restricted_env(&cfg);
        let budget = InvocationBudget::new(None, Duration::from_secs(5));
        let scope = budget.allocation_scope();

        let err = ChromiumAllocator::from_config(&cfg)
            .allocate(&scope, &plan)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProbeErrorKind::Allocation);
        assert_eq!(err.phase, Some(Phase::Allocation));
        assert!(err.hint.unwrap_or_default().contains("not found"));
    }

    #[tokio::test]
    async fn expired_scope_fails_allocation_as_timeout() {
        let cfg = ProbeConfig::default();
        let plan = LaunchPlan::for_restricted_env(&cfg);
        let budget = InvocationBudget::new(None, Duration::from_secs(5));
        let scope = budget.allocation_scope();
        scope.cancel();

        let err = ChromiumAllocator::from_config(&cfg)
            .allocate(&scope, &plan)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProbeErrorKind::Timeout);
    }
}

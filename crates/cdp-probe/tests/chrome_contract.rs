//! Contract tests bridging the probe to a real Chromium binary. Ignored
//! by default because they require Chrome/Chromium on the host machine.

use std::env;
use std::time::Duration;

use cdp_probe::{
    probe, Allocate, ChromiumAllocator, CommandTarget, InvocationBudget, LaunchPlan, ProbeConfig,
};
use serde_json::json;

fn contract_enabled() -> bool {
    env::var("TITLEPROBE_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Isolated scratch root so nothing leaks into the real /tmp layout.
fn contract_config() -> (ProbeConfig, tempfile::TempDir) {
    let scratch = tempfile::tempdir().expect("create scratch dir");
    let cfg = ProbeConfig {
        scratch_dir: scratch.path().to_path_buf(),
        ..ProbeConfig::default()
    };
    (cfg, scratch)
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set TITLEPROBE_CONTRACT=1"]
async fn contract_allocates_and_answers_version() {
    if !contract_enabled() {
        eprintln!("skipping contract test (TITLEPROBE_CONTRACT not enabled)");
        return;
    }

    let (cfg, _scratch) = contract_config();
    let plan = LaunchPlan::for_restricted_env(&cfg);
    let budget = InvocationBudget::new(None, Duration::from_secs(60));
    let scope = budget.allocation_scope();

    let process = ChromiumAllocator::from_config(&cfg)
        .allocate(&scope, &plan)
        .await
        .expect("allocate browser");

    let version = process
        .transport()
        .send_command(CommandTarget::Browser, "Browser.getVersion", json!({}))
        .await
        .expect("browser answers getVersion");
    assert!(version.get("product").is_some());

    process.shutdown().await;
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium and network access; set TITLEPROBE_CONTRACT=1"]
async fn contract_full_probe_reports_a_title() {
    if !contract_enabled() {
        eprintln!("skipping contract test (TITLEPROBE_CONTRACT not enabled)");
        return;
    }

    let (cfg, _scratch) = contract_config();
    let message = probe::run(&cfg, None).await.expect("probe succeeds");
    assert!(
        message.starts_with("Successfully got title: "),
        "unexpected message: {message}"
    );
}

use std::{process::Command, time::Duration};

use anyhow::Result;
use tokio::time::timeout;

use user_service::utils::shutdown_signal;

/// Test: SIGTERM from the process supervisor starts a graceful shutdown
#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_resolves_shutdown_signal() -> Result<()> {
    let shutdown = shutdown_signal();

    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()?;
    assert!(status.success());

    timeout(Duration::from_secs(5), shutdown).await?;

    Ok(())
}

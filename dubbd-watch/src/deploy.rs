//! Deployment of a detected version.
//!
//! The default deployer renders a shell command template with the version
//! and runs it through `sh -c`, inheriting our stdout/stderr so zarf's
//! progress output lands in the watcher's log stream.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Command run for each new version. `{version}` is replaced before launch.
pub const DEFAULT_DEPLOY_COMMAND: &str = "zarf package deploy oci://ghcr.io/defenseunicorns/packages/dubbd-k3d:{version}-amd64 --oci-concurrency=15 --confirm";

const VERSION_PLACEHOLDER: &str = "{version}";

/// How a deployment attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Succeeded,
    /// The command ran and exited non-zero. `code` is `None` when killed by a signal.
    Failed { code: Option<i32> },
    /// The shell could not be started.
    LaunchFailed { reason: String },
}

impl DeployOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeployOutcome::Succeeded)
    }
}

/// Applies a version to the target environment.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, version: &str) -> DeployOutcome;
}

/// Substitute every `{version}` in `template`.
pub fn render_command(template: &str, version: &str) -> String {
    template.replace(VERSION_PLACEHOLDER, version)
}

/// Runs the rendered command template through a system shell.
pub struct ShellDeployer {
    shell: String,
    template: String,
    dry_run: bool,
}

impl ShellDeployer {
    pub fn new(template: &str) -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            template: template.to_string(),
            dry_run: false,
        }
    }

    pub fn with_shell(mut self, shell: &str) -> Self {
        self.shell = shell.to_string();
        self
    }

    /// Log the command instead of running it.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[async_trait]
impl Deployer for ShellDeployer {
    async fn deploy(&self, version: &str) -> DeployOutcome {
        let command = render_command(&self.template, version);

        if self.dry_run {
            tracing::info!(%command, "Dry run, not executing deploy command");
            return DeployOutcome::Succeeded;
        }

        tracing::info!(%command, "Running deploy command");
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await;

        match status {
            Ok(s) if s.success() => DeployOutcome::Succeeded,
            Ok(s) => DeployOutcome::Failed { code: s.code() },
            Err(e) => DeployOutcome::LaunchFailed {
                reason: format!("failed to start {}: {e}", self.shell),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_embeds_version_in_oci_ref() {
        let cmd = render_command(DEFAULT_DEPLOY_COMMAND, "1.1.0");
        assert_eq!(
            cmd,
            "zarf package deploy oci://ghcr.io/defenseunicorns/packages/dubbd-k3d:1.1.0-amd64 --oci-concurrency=15 --confirm"
        );
    }

    #[test]
    fn every_placeholder_is_replaced() {
        assert_eq!(render_command("echo {version} {version}", "2.0.0"), "echo 2.0.0 2.0.0");
        assert_eq!(render_command("echo fixed", "2.0.0"), "echo fixed");
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let outcome = ShellDeployer::new("exit 0").deploy("1.0.0").await;
        assert_eq!(outcome, DeployOutcome::Succeeded);
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_with_code() {
        let outcome = ShellDeployer::new("exit 3").deploy("1.0.0").await;
        assert_eq!(outcome, DeployOutcome::Failed { code: Some(3) });
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn version_reaches_the_command() {
        let outcome = ShellDeployer::new("test \"{version}\" = \"4.5.6\"")
            .deploy("4.5.6")
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn missing_shell_is_launch_failure() {
        let outcome = ShellDeployer::new("true")
            .with_shell("/nonexistent/shell")
            .deploy("1.0.0")
            .await;
        assert!(matches!(outcome, DeployOutcome::LaunchFailed { .. }));
    }

    #[tokio::test]
    async fn dry_run_does_not_execute() {
        let outcome = ShellDeployer::new("exit 1").dry_run(true).deploy("1.0.0").await;
        assert_eq!(outcome, DeployOutcome::Succeeded);
    }
}

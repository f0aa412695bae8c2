//! Source control collaborator

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{CollaboratorError, SourceControl};
use crate::process::{CommandRunner, CommandSpec};

/// Checks out revisions with the git CLI
pub struct GitCheckout {
    runner: Arc<dyn CommandRunner>,
    workdir: String,
}

impl GitCheckout {
    pub fn new(runner: Arc<dyn CommandRunner>, workdir: &str) -> Self {
        Self {
            runner,
            workdir: workdir.to_string(),
        }
    }

    fn git(&self) -> CommandSpec {
        CommandSpec::new("git").args(["-C", self.workdir.as_str()])
    }
}

#[async_trait]
impl SourceControl for GitCheckout {
    async fn checkout(&self, revision: Option<&str>) -> Result<(), CollaboratorError> {
        let Some(revision) = revision else {
            info!("No revision requested, using workspace {} as-is", self.workdir);
            return Ok(());
        };

        info!("Checking out {} in {}", revision, self.workdir);

        let verify = self
            .git()
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("{}^{{commit}}", revision));
        self.runner.run(&verify).await?.check(&verify)?;

        let checkout = self.git().args(["checkout", "--force", "--detach", revision]);
        self.runner.run(&checkout).await?.check(&checkout)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::test_support::RecordingRunner;

    #[tokio::test]
    async fn test_checkout_without_revision_is_noop() {
        let runner = Arc::new(RecordingRunner::new());
        GitCheckout::new(runner.clone(), ".")
            .checkout(None)
            .await
            .unwrap();
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_revision() {
        let runner = Arc::new(RecordingRunner::new());
        GitCheckout::new(runner.clone(), "/src")
            .checkout(Some("a1b2c3"))
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "git -C /src rev-parse --verify --quiet a1b2c3^{commit}",
                "git -C /src checkout --force --detach a1b2c3",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_revision_fails_before_checkout() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(Ok(CommandOutput::failed(1, "")));

        let result = GitCheckout::new(runner.clone(), ".")
            .checkout(Some("nope"))
            .await;

        assert!(result.is_err());
        assert_eq!(runner.calls().len(), 1);
    }
}

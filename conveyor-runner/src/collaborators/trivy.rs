//! Image scanner collaborator

use async_trait::async_trait;
use conveyor_core::domain::ImageRef;
use std::sync::Arc;
use tracing::info;

use super::{CollaboratorError, Scanner};
use crate::process::{CommandRunner, CommandSpec};

/// Scans images with trivy
///
/// The scan fails when any finding matches the configured severities.
pub struct TrivyScanner {
    runner: Arc<dyn CommandRunner>,
    severity: String,
}

impl TrivyScanner {
    pub fn new(runner: Arc<dyn CommandRunner>, severity: &str) -> Self {
        Self {
            runner,
            severity: severity.to_string(),
        }
    }
}

#[async_trait]
impl Scanner for TrivyScanner {
    async fn scan(&self, image: &ImageRef) -> Result<(), CollaboratorError> {
        info!("Scanning {} for {} findings", image, self.severity);

        let command = CommandSpec::new("trivy")
            .args(["image", "--exit-code", "1", "--no-progress", "--severity"])
            .arg(&self.severity)
            .arg(image.to_string());

        self.runner.run(&command).await?.check(&command)?;
        Ok(())
    }
}

//! Fake collaborators for scenario tests
//!
//! A single [`FakeWorld`] implements every collaborator trait and records
//! each call in a shared log, so tests can assert on the exact sequence of
//! external actions a run performed.

#![allow(dead_code)]

use async_trait::async_trait;
use conveyor_core::config::DeployConfig;
use conveyor_core::domain::{ImageRef, PipelineContext, RunParameters};
use conveyor_runner::collaborators::{
    CollaboratorError, Collaborators, ImageBuilder, LivenessProber, ProbeResult, Registry,
    RegistrySession, RemoveOutcome, Scanner, SourceControl, TestOutcome, TestRunner,
};
use conveyor_runner::deploy::{DeploySpec, DeploymentTarget};
use conveyor_runner::process::{CommandOutput, CommandRunner, CommandSpec};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// How the fake collaborators behave
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub checkout_fails: bool,
    pub build_fails: bool,
    pub test_exit_code: i32,
    pub scan_fails: bool,
    pub push_denied: bool,
    pub deploy_error: Option<CollaboratorError>,
    pub rollout_error: Option<CollaboratorError>,
    pub rollback_supported: bool,
    /// Probe answers in order; probes beyond the list are unreachable
    pub probes: Vec<bool>,
    pub remove_fails: bool,
}

pub struct FakeWorld {
    plan: Plan,
    calls: Mutex<Vec<String>>,
    probes: Mutex<VecDeque<bool>>,
}

impl FakeWorld {
    pub fn new(plan: Plan) -> Arc<Self> {
        let probes = plan.probes.iter().copied().collect();
        Arc::new(Self {
            plan,
            calls: Mutex::new(Vec::new()),
            probes: Mutex::new(probes),
        })
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            source: self.clone(),
            builder: self.clone(),
            tests: self.clone(),
            scanner: self.clone(),
            registry: self.clone(),
            target: self.clone(),
            prober: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose first word is `action`
    pub fn count(&self, action: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(action))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn failed(what: &str) -> CollaboratorError {
        CollaboratorError::CommandFailed {
            command: what.to_string(),
            exit_code: 1,
            detail: format!("{} failed", what),
        }
    }
}

#[async_trait]
impl SourceControl for FakeWorld {
    async fn checkout(&self, revision: Option<&str>) -> Result<(), CollaboratorError> {
        self.record(format!("checkout {}", revision.unwrap_or("-")));
        if self.plan.checkout_fails {
            return Err(Self::failed("checkout"));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageBuilder for FakeWorld {
    async fn build(&self, source: &str, image: &ImageRef) -> Result<ImageRef, CollaboratorError> {
        self.record(format!("build {} {}", source, image));
        if self.plan.build_fails {
            return Err(Self::failed("build"));
        }
        Ok(image.clone())
    }

    async fn tag(&self, image: &ImageRef, alias: &ImageRef) -> Result<(), CollaboratorError> {
        self.record(format!("tag {} {}", image, alias));
        Ok(())
    }

    async fn remove(&self, image: &ImageRef) -> Result<RemoveOutcome, CollaboratorError> {
        self.record(format!("remove {}", image));
        if self.plan.remove_fails {
            return Err(Self::failed("remove"));
        }
        Ok(RemoveOutcome::Removed)
    }

    async fn prune(&self) -> Result<(), CollaboratorError> {
        self.record("prune".to_string());
        Ok(())
    }
}

#[async_trait]
impl TestRunner for FakeWorld {
    async fn run_in_container(
        &self,
        image: &ImageRef,
        command: &[String],
    ) -> Result<TestOutcome, CollaboratorError> {
        self.record(format!("test {} {}", image, command.join(" ")));
        let output = if self.plan.test_exit_code == 0 {
            "all tests passed".to_string()
        } else {
            "1 passing\n1 failing\nAssertionError: expected 200".to_string()
        };
        Ok(TestOutcome {
            exit_code: self.plan.test_exit_code,
            output,
        })
    }
}

#[async_trait]
impl Scanner for FakeWorld {
    async fn scan(&self, image: &ImageRef) -> Result<(), CollaboratorError> {
        self.record(format!("scan {}", image));
        if self.plan.scan_fails {
            return Err(Self::failed("scan"));
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for FakeWorld {
    async fn authenticate(&self, credential: &str) -> Result<RegistrySession, CollaboratorError> {
        self.record(format!("authenticate {}", credential));
        Ok(RegistrySession {
            registry: "registry.example.com".to_string(),
            username: "ci".to_string(),
        })
    }

    async fn push(
        &self,
        image: &ImageRef,
        _session: &RegistrySession,
    ) -> Result<(), CollaboratorError> {
        self.record(format!("push {}", image));
        if self.plan.push_denied {
            return Err(CollaboratorError::Denied("requested access is denied".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeploymentTarget for FakeWorld {
    fn strategy(&self) -> &'static str {
        "fake"
    }

    async fn deploy(&self, spec: &DeploySpec) -> Result<(), CollaboratorError> {
        self.record(format!(
            "deploy {} {} {}",
            spec.image, spec.environment, spec.port
        ));
        match &self.plan.deploy_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn await_rollout(&self, spec: &DeploySpec) -> Result<(), CollaboratorError> {
        self.record(format!("await_rollout {}", spec.qualified_name()));
        match &self.plan.rollout_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn rollback(&self, spec: &DeploySpec) -> Result<bool, CollaboratorError> {
        self.record(format!("rollback {}", spec.qualified_name()));
        Ok(self.plan.rollback_supported)
    }
}

#[async_trait]
impl LivenessProber for FakeWorld {
    async fn probe(&self, url: &str) -> ProbeResult {
        self.record(format!("probe {}", url));
        match self.probes.lock().unwrap().pop_front() {
            Some(true) => ProbeResult::Reachable,
            _ => ProbeResult::Unreachable("connection refused".to_string()),
        }
    }
}

/// Command runner answering by command line prefix
///
/// Commands with no matching answer succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    answers: Vec<(String, CommandOutput)>,
    lines: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.answers.push((prefix.to_string(), output));
        self
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CollaboratorError> {
        let line = command.to_string();
        self.lines.lock().unwrap().push(line.clone());

        Ok(self
            .answers
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}

/// Configuration with the given strategy table
pub fn config_with(strategy: serde_json::Value) -> DeployConfig {
    serde_json::from_value(serde_json::json!({
        "image": "shop/web",
        "registry": { "url": "https://registry.example.com", "credential": "REGISTRY_CREDS" },
        "app": { "port": 3000, "health_path": "/health" },
        "strategy": strategy
    }))
    .unwrap()
}

pub fn config() -> DeployConfig {
    config_with(serde_json::json!({ "kind": "container" }))
}

pub fn context(
    config: &DeployConfig,
    branch: &str,
    build_number: u64,
    change_id: Option<&str>,
) -> PipelineContext {
    PipelineContext::new(
        RunParameters {
            branch: branch.to_string(),
            build_number,
            revision: Some("a1b2c3d".to_string()),
            change_id: change_id.map(str::to_string),
        },
        config,
    )
    .unwrap()
}

mod common;

use common::{FakeWorld, Plan, ScriptedRunner, config, config_with, context};
use conveyor_core::domain::{Environment, RunState, RunStatus, StageKind, StageStatus};
use conveyor_runner::collaborators::{CollaboratorError, Collaborators};
use conveyor_runner::process::CommandOutput;
use std::sync::Arc;
use conveyor_runner::{CancelFlag, Orchestrator};
use std::time::Duration;
use tokio::time::Instant;

const PROBE_URL: &str = "probe http://localhost:3000/health";

#[tokio::test(start_paused = true)]
async fn test_main_build_deploys_to_production() {
    let world = FakeWorld::new(Plan {
        probes: vec![true],
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "main", 42, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.final_state, RunState::Done);
    assert_eq!(report.environment, Environment::Production);
    assert_eq!(report.tag, "42");
    assert_eq!(report.image, "registry.example.com/shop/web:42");
    assert_eq!(report.verification_attempts, 1);
    assert!(report.failed_stage.is_none());
    assert!(report.summary().contains("production"));

    for stage in StageKind::PIPELINE {
        assert_eq!(report.stage_status(stage), Some(StageStatus::Success), "{stage}");
    }
    assert_eq!(report.stage_status(StageKind::Cleanup), Some(StageStatus::Success));

    assert_eq!(
        world.calls(),
        vec![
            "checkout a1b2c3d",
            "build . shop/web:42",
            "tag shop/web:42 registry.example.com/shop/web:42",
            "tag shop/web:42 registry.example.com/shop/web:latest",
            "test shop/web:42 npm test",
            "scan shop/web:42",
            "authenticate REGISTRY_CREDS",
            "push registry.example.com/shop/web:42",
            "push registry.example.com/shop/web:latest",
            "deploy registry.example.com/shop/web:42 production 3000",
            "await_rollout web-production",
            PROBE_URL,
            "remove registry.example.com/shop/web:latest",
            "remove registry.example.com/shop/web:42",
            "remove shop/web:42",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_feature_branch_test_failure_stops_pipeline() {
    let world = FakeWorld::new(Plan {
        test_exit_code: 1,
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "feature/x", 7, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.final_state, RunState::DoneFailed);
    assert_eq!(report.environment, Environment::Staging);
    assert_eq!(report.failed_stage, Some(StageKind::Test));

    let test = report.stage(StageKind::Test).unwrap();
    assert_eq!(test.error_kind.as_deref(), Some("TestFailure"));
    assert!(test.error.as_deref().unwrap().contains("AssertionError"));

    for action in ["scan", "authenticate", "push", "deploy", "await_rollout", "probe"] {
        assert_eq!(world.count(action), 0, "{action} must not run");
    }
    for stage in [StageKind::Scan, StageKind::Push, StageKind::Deploy, StageKind::Verify] {
        assert!(report.stage(stage).is_none());
    }

    assert_eq!(world.count("remove"), 3);
    assert_eq!(
        report
            .stages
            .iter()
            .filter(|s| s.stage == StageKind::Cleanup)
            .count(),
        1
    );
    assert_eq!(report.verification_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_change_request_skips_release_stages() {
    let world = FakeWorld::new(Plan::default());
    let config = config();
    let ctx = context(&config, "feature/x", 8, Some("123"));

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.final_state, RunState::Done);
    for stage in [StageKind::Push, StageKind::Deploy, StageKind::Verify] {
        assert_eq!(report.stage_status(stage), Some(StageStatus::Skipped));
    }
    for stage in [StageKind::Checkout, StageKind::Build, StageKind::Test, StageKind::Scan] {
        assert_eq!(report.stage_status(stage), Some(StageStatus::Success));
    }
    for action in ["authenticate", "push", "deploy", "probe"] {
        assert_eq!(world.count(action), 0);
    }
    assert_eq!(world.count("remove"), 3);

    let summary = report.summary();
    assert!(summary.starts_with("built registry.example.com/shop/web:8"), "{summary}");
    assert!(!summary.contains("deployed"));
}

#[tokio::test(start_paused = true)]
async fn test_change_request_status_follows_build_stages() {
    let world = FakeWorld::new(Plan {
        build_fails: true,
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "feature/x", 9, Some("124"));

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_stage, Some(StageKind::Build));
    assert_eq!(
        report.stage(StageKind::Build).unwrap().error_kind.as_deref(),
        Some("BuildFailure")
    );
    assert_eq!(world.count("test"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_verification_exhausts_three_attempts() {
    let world = FakeWorld::new(Plan::default());
    let config = config();
    let ctx = context(&config, "main", 43, None);

    let started = Instant::now();
    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_stage, Some(StageKind::Verify));
    assert_eq!(report.verification_attempts, 3);
    assert_eq!(
        report.stage(StageKind::Verify).unwrap().error_kind.as_deref(),
        Some("VerificationFailure")
    );
    assert_eq!(world.count("probe"), 3);
    assert_eq!(world.count("remove"), 3);
    // Rollback is opt-in
    assert_eq!(world.count("rollback"), 0);
    // Fixed 10s delay before each of the three probes
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_verification_stops_at_first_success() {
    let world = FakeWorld::new(Plan {
        probes: vec![false, true, true],
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "main", 44, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.verification_attempts, 2);
    assert_eq!(world.count("probe"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_failure_keeps_success() {
    let world = FakeWorld::new(Plan {
        probes: vec![true],
        remove_fails: true,
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "main", 45, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.final_state, RunState::Done);
    let cleanup = report.stage(StageKind::Cleanup).unwrap();
    assert_eq!(cleanup.status, StageStatus::Failed);
    assert!(!cleanup.required);
    assert_eq!(cleanup.error_kind.as_deref(), Some("CleanupFailure"));
    // Every image is attempted even after the first removal fails
    assert_eq!(world.count("remove"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_failure_keeps_failure() {
    let world = FakeWorld::new(Plan {
        checkout_fails: true,
        remove_fails: true,
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "main", 46, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_stage, Some(StageKind::Checkout));
    assert_eq!(report.final_state, RunState::DoneFailed);
    assert_eq!(world.count("build"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rollout_timeout_is_deploy_failure() {
    let world = FakeWorld::new(Plan {
        rollout_error: Some(CollaboratorError::Timeout {
            operation: "deployment/web".to_string(),
            after_secs: 300,
        }),
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "main", 47, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_stage, Some(StageKind::Deploy));
    let deploy = report.stage(StageKind::Deploy).unwrap();
    assert_eq!(deploy.error_kind.as_deref(), Some("DeployFailure"));
    assert!(deploy.error.as_deref().unwrap().contains("300s"));
    assert_eq!(world.count("probe"), 0);
    assert_eq!(world.count("remove"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_deploy_command_timeout_is_not_a_rollout_timeout() {
    let world = FakeWorld::new(Plan {
        deploy_error: Some(CollaboratorError::Timeout {
            operation: "docker run --detach --name web-production".to_string(),
            after_secs: 1800,
        }),
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "main", 48, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.failed_stage, Some(StageKind::Deploy));
    let deploy = report.stage(StageKind::Deploy).unwrap();
    assert_eq!(deploy.error_kind.as_deref(), Some("DeployFailure"));
    let error = deploy.error.as_deref().unwrap();
    assert!(error.starts_with("deployment failed:"), "{error}");
    assert!(!error.contains("rollout"));
    assert_eq!(world.count("await_rollout"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_push_denied() {
    let world = FakeWorld::new(Plan {
        push_denied: true,
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "main", 48, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.failed_stage, Some(StageKind::Push));
    assert_eq!(
        report.stage(StageKind::Push).unwrap().error_kind.as_deref(),
        Some("PushDenied")
    );
    assert_eq!(world.count("push"), 1);
    assert_eq!(world.count("deploy"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_advisory_scan_failure_does_not_fail_run() {
    let world = FakeWorld::new(Plan {
        scan_fails: true,
        probes: vec![true],
        ..Plan::default()
    });
    let mut config = config();
    config.scan.advisory = true;
    let ctx = context(&config, "main", 49, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Success);
    let scan = report.stage(StageKind::Scan).unwrap();
    assert_eq!(scan.status, StageStatus::Failed);
    assert!(!scan.required);
    assert_eq!(world.count("deploy"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_required_scan_failure_fails_run() {
    let world = FakeWorld::new(Plan {
        scan_fails: true,
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "main", 50, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.failed_stage, Some(StageKind::Scan));
    assert_eq!(world.count("push"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_scan_is_skipped() {
    let world = FakeWorld::new(Plan {
        probes: vec![true],
        ..Plan::default()
    });
    let mut config = config();
    config.scan.enabled = false;
    let ctx = context(&config, "main", 51, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.stage_status(StageKind::Scan), Some(StageStatus::Skipped));
    assert_eq!(world.count("scan"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_after_failed_verification() {
    let world = FakeWorld::new(Plan {
        rollback_supported: true,
        ..Plan::default()
    });
    let config = config_with(serde_json::json!({
        "kind": "kubernetes",
        "deployment": "web",
        "rollback_on_failure": true
    }));
    let ctx = context(&config, "main", 52, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_stage, Some(StageKind::Verify));
    assert_eq!(world.count("rollback"), 1);

    let calls = world.calls();
    let rollback = calls.iter().position(|c| c.starts_with("rollback")).unwrap();
    let first_remove = calls.iter().position(|c| c.starts_with("remove")).unwrap();
    assert!(rollback < first_remove);
    assert!(report.logs.iter().any(|l| l.message.contains("Rolled back")));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_only_cleans_up() {
    let world = FakeWorld::new(Plan::default());
    let config = config();
    let ctx = context(&config, "main", 53, None);

    let cancel = CancelFlag::new();
    cancel.cancel();

    let report = Orchestrator::new(&config, world.collaborators())
        .with_cancel_flag(cancel)
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_stage, Some(StageKind::Checkout));
    assert_eq!(
        report.stage(StageKind::Checkout).unwrap().error_kind.as_deref(),
        Some("Cancelled")
    );
    assert!(world.calls().iter().all(|c| c.starts_with("remove")));
    assert_eq!(world.count("remove"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_report_carries_stage_logs() {
    let world = FakeWorld::new(Plan {
        test_exit_code: 2,
        ..Plan::default()
    });
    let config = config();
    let ctx = context(&config, "develop", 54, None);

    let report = Orchestrator::new(&config, world.collaborators())
        .run(&ctx)
        .await;

    assert!(!report.logs.is_empty());
    assert!(
        report
            .logs
            .iter()
            .any(|l| l.stage.as_deref() == Some("test") && l.message.contains("AssertionError"))
    );
    assert!(report.logs.iter().any(|l| l.stage.as_deref() == Some("cleanup")));
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_with_kubernetes_strategy() {
    let config = config_with(serde_json::json!({
        "kind": "kubernetes",
        "deployment": "web",
        "namespace": "shop"
    }));
    let ctx = context(&config, "main", 55, None);

    let orchestrator = Orchestrator::new(&config, Collaborators::dry_run(&config));
    assert_eq!(orchestrator.strategy(), "kubernetes");

    let report = orchestrator.run(&ctx).await;

    assert_eq!(report.status, RunStatus::Success, "{}", report.summary());
    assert_eq!(report.verification_attempts, 1);
    assert_eq!(report.stage_status(StageKind::Push), Some(StageStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn test_container_cleanup_keeps_image_of_running_container() {
    let world = FakeWorld::new(Plan {
        probes: vec![true],
        ..Plan::default()
    });
    let runner = Arc::new(
        ScriptedRunner::new()
            .answer("docker container inspect", CommandOutput::ok("true\n"))
            .answer(
                "docker image rm shop/web:42",
                CommandOutput::failed(
                    1,
                    "Error response from daemon: conflict: unable to remove repository reference \"shop/web:42\" (must force) - container 3f2a is using its referenced image 9b1c",
                ),
            ),
    );
    let config = config();
    let ctx = context(&config, "main", 42, None);

    let collaborators = Collaborators {
        registry: world.clone(),
        ..Collaborators::from_config(&config, runner.clone(), world.clone())
    };
    let report = Orchestrator::new(&config, collaborators).run(&ctx).await;

    assert_eq!(report.status, RunStatus::Success, "{}", report.summary());
    assert_eq!(report.stage_status(StageKind::Cleanup), Some(StageStatus::Success));
    assert!(
        runner
            .lines()
            .iter()
            .any(|l| l.starts_with("docker run --detach --name web-production"))
    );
    assert_eq!(runner.lines().last().map(String::as_str), Some("docker image rm shop/web:42"));
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_with_ecs_strategy() {
    let config = config_with(serde_json::json!({
        "kind": "ecs",
        "cluster": "shop",
        "service": "web"
    }));
    let ctx = context(&config, "main", 56, None);

    let report = Orchestrator::new(&config, Collaborators::dry_run(&config))
        .run(&ctx)
        .await;

    assert_eq!(report.status, RunStatus::Success, "{}", report.summary());
    assert_eq!(report.stage_status(StageKind::Deploy), Some(StageStatus::Success));
}

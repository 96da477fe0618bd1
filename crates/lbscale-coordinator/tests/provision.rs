//! Provisioning pipeline against an in-memory compute API
//!
//! The fake rejects any create whose dependencies do not exist yet, so a
//! successful run proves the creation order.

mod test_utils;

use lbscale_common::ResourceKind;
use lbscale_coordinator::gcloud::GcloudError;
use lbscale_coordinator::orchestrator::{
    run_setup, CreateOutcome, FrontendWait, LogReporter, ProvisionError, ProvisionTiming,
    Provisioner, Step, StepError,
};
use lbscale_coordinator::wait::PollConfig;
use std::time::Duration;
use test_utils::{fast_timing, test_plan, FakeCompute, TEST_ADDRESS};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_setup_creates_everything_in_dependency_order() {
    let fake = FakeCompute::new();
    let plan = test_plan();
    let reporter = LogReporter::new();

    let outcomes = Provisioner::new(&fake, &plan, &reporter)
        .with_timing(fast_timing())
        .run()
        .await
        .expect("provisioning should succeed");

    let steps: Vec<Step> = outcomes.iter().map(|o| o.step).collect();
    assert_eq!(steps, Step::PROVISION_ORDER.to_vec());
    assert!(outcomes
        .iter()
        .flat_map(|o| &o.resources)
        .all(|r| r.outcome == CreateOutcome::Created));

    let order = [
        "create_firewall_rule fw-allow-health-checks",
        "create_router nat-router-us1",
        "create_nat nat-config",
        "create_instance webserver",
        "stop_instance webserver",
        "create_image mywebserver",
        "create_instance_template mywebserver-template",
        "create_health_check http-health-check",
        "create_instance_group us-1-mig",
        "create_backend_service http-backend",
        "add_backend us-1-mig",
        "create_url_map http-lb",
        "create_target_proxy http-lb-target-proxy",
        "create_forwarding_rule http-lb-forwarding-rule",
    ];
    let positions: Vec<usize> = order.iter().map(|c| fake.position(c)).collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "calls out of order: {:#?}",
        fake.calls()
    );

    // Both groups get their port and autoscaler before the backend service
    let backend = fake.position("create_backend_service http-backend");
    for group in ["us-1-mig", "notus-1-mig"] {
        assert!(fake.position(&format!("set_autoscaling {group}")) < backend);
        assert!(fake.position(&format!("set_named_ports {group}")) < backend);
    }
    assert!(fake.exists("rule/http-lb-forwarding-rule-ipv6"));
}

#[tokio::test]
async fn test_builder_is_removed_after_baking() {
    let fake = FakeCompute::new();
    let plan = test_plan();
    let reporter = LogReporter::new();

    Provisioner::new(&fake, &plan, &reporter)
        .with_timing(fast_timing())
        .run()
        .await
        .unwrap();

    assert!(fake.exists("image/mywebserver"));
    assert!(!fake.exists("instance/webserver"));
    assert!(!fake.exists("disk/webserver"));
    assert!(fake.position("delete_instance webserver") < fake.position("delete_disk webserver"));
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let fake = FakeCompute::new();
    let plan = test_plan();
    let reporter = LogReporter::new();
    let provisioner = Provisioner::new(&fake, &plan, &reporter).with_timing(fast_timing());

    provisioner.run().await.unwrap();
    let resources_after_first = fake.resource_keys();

    let outcomes = provisioner.run().await.expect("re-run should succeed");

    assert!(outcomes.iter().all(|o| o.was_noop()));
    assert_eq!(fake.resource_keys(), resources_after_first);
    // The existing image short-circuits baking
    assert_eq!(fake.count_calls("create_instance webserver"), 1);
    assert_eq!(fake.count_calls("create_image mywebserver"), 1);
}

#[tokio::test]
async fn test_resumes_after_partial_run() {
    let fake = FakeCompute::new();
    fake.seed("firewall/fw-allow-health-checks");
    fake.seed("router/nat-router-us1");
    let plan = test_plan();
    let reporter = LogReporter::new();

    let outcomes = Provisioner::new(&fake, &plan, &reporter)
        .with_timing(fast_timing())
        .run()
        .await
        .unwrap();

    assert!(outcomes[0].was_noop());
    let router_nat = &outcomes[1].resources;
    assert_eq!(router_nat[0].kind, ResourceKind::Router);
    assert_eq!(router_nat[0].outcome, CreateOutcome::AlreadyExists);
    assert_eq!(router_nat[1].kind, ResourceKind::Nat);
    assert_eq!(router_nat[1].outcome, CreateOutcome::Created);
}

#[tokio::test]
async fn test_failed_step_stops_pipeline_and_keeps_earlier_resources() {
    let fake = FakeCompute::new();
    fake.fail_next(
        "create_health_check",
        "http-health-check",
        GcloudError::Command {
            status: Some(1),
            message: "Quota 'HEALTH_CHECKS' exceeded".to_string(),
        },
    );
    let plan = test_plan();
    let reporter = LogReporter::new();

    let err = Provisioner::new(&fake, &plan, &reporter)
        .with_timing(fast_timing())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.step(), Step::HealthCheck);
    assert!(matches!(
        err,
        ProvisionError::StepFailed {
            source: StepError::Gcloud(GcloudError::Command { .. }),
            ..
        }
    ));
    assert!(err.to_string().contains("lbscale cleanup"));

    // Nothing after the failed step ran, nothing before it was rolled back
    assert!(fake.calls_matching("create_instance_group").is_empty());
    assert!(fake.exists("firewall/fw-allow-health-checks"));
    assert!(fake.exists("template/mywebserver-template"));
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_startup_script_before_stopping_builder() {
    let fake = FakeCompute::new();
    fake.set_serial_pending(Some(3));
    let plan = test_plan();
    let reporter = LogReporter::new();

    Provisioner::new(&fake, &plan, &reporter)
        .with_timing(fast_timing())
        .run()
        .await
        .unwrap();

    assert_eq!(fake.count_calls("serial_output webserver"), 4);
    let last_read = fake
        .calls()
        .iter()
        .rposition(|c| c == "serial_output webserver")
        .unwrap();
    assert!(last_read < fake.position("stop_instance webserver"));
}

#[tokio::test(start_paused = true)]
async fn test_builder_startup_timeout_fails_image_step() {
    let fake = FakeCompute::new();
    fake.set_serial_pending(None);
    let plan = test_plan();
    let reporter = LogReporter::new();

    let err = Provisioner::new(&fake, &plan, &reporter)
        .with_timing(fast_timing())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.step(), Step::SourceImage);
    match err {
        ProvisionError::StepFailed {
            source: StepError::Wait(wait),
            ..
        } => assert!(wait.is_timeout()),
        other => panic!("expected a wait timeout, got {other:?}"),
    }
    assert_eq!(fake.count_calls("serial_output webserver"), 5);
    assert!(fake.calls_matching("stop_instance").is_empty());
}

#[tokio::test]
async fn test_setup_without_wait_reports_address() {
    let fake = FakeCompute::new();
    let plan = test_plan();
    let reporter = LogReporter::new();
    let provisioner = Provisioner::new(&fake, &plan, &reporter).with_timing(fast_timing());

    let report = run_setup(&provisioner, &reporter, None).await.unwrap();

    assert_eq!(report.steps.len(), Step::PROVISION_ORDER.len());
    assert_eq!(report.address.as_deref(), Some(TEST_ADDRESS));
    assert_eq!(report.url().as_deref(), Some("http://34.117.1.2/"));
    assert_eq!(report.ready_after, None);
}

#[tokio::test]
async fn test_cancelled_frontend_wait_is_not_an_error() {
    let fake = FakeCompute::new();
    let plan = test_plan();
    let reporter = LogReporter::new();
    let provisioner = Provisioner::new(&fake, &plan, &reporter).with_timing(fast_timing());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = run_setup(
        &provisioner,
        &reporter,
        Some(FrontendWait {
            marker: "Apache2",
            poll: PollConfig::unbounded(Duration::from_secs(10)),
            cancel: &cancel,
        }),
    )
    .await
    .expect("cancellation only stops the wait");

    assert_eq!(report.ready_after, None);
    assert!(report.address.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_image_bake() {
    let fake = FakeCompute::new();
    fake.set_serial_pending(None);
    let plan = test_plan();
    let reporter = LogReporter::new();
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(25)).await;
        canceller.cancel();
    });
    let slow = ProvisionTiming {
        startup_script: PollConfig::unbounded(Duration::from_secs(10)),
        ..fast_timing()
    };

    let err = Provisioner::new(&fake, &plan, &reporter)
        .with_timing(slow)
        .with_cancel(&cancel)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.step(), Step::SourceImage);
    match err {
        ProvisionError::StepFailed {
            source: StepError::Wait(wait),
            ..
        } => assert!(wait.is_cancelled()),
        other => panic!("expected a cancelled wait, got {other:?}"),
    }
    // Reads at 0s, 10s and 20s, then the token fires during the next sleep
    assert_eq!(fake.count_calls("serial_output webserver"), 3);
    assert!(fake.calls_matching("stop_instance").is_empty());
    assert!(fake.calls_matching("create_instance_template").is_empty());
}

#[tokio::test]
async fn test_cancelled_setup_stops_before_next_step() {
    let fake = FakeCompute::new();
    let plan = test_plan();
    let reporter = LogReporter::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Provisioner::new(&fake, &plan, &reporter)
        .with_timing(fast_timing())
        .with_cancel(&cancel)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.step(), Step::Firewall);
    assert!(fake.calls().is_empty());
}

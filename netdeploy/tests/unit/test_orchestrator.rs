//! Orchestrator and deployment task tests against scripted devices

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use netdeploy::app::options::DeployOptions;
use netdeploy::deploy::fsm::DeployState;
use netdeploy::deploy::orchestrator::Orchestrator;
use netdeploy::deploy::task::{DeployTask, TaskContext, ALREADY_DESIRED};
use netdeploy::deploy::RUNNING_CONFIG_COMMAND;
use netdeploy::errors::DeployError;
use netdeploy::models::config::ConfigLine;
use netdeploy::models::device::Device;
use netdeploy::models::result::DeployResult;
use netdeploy::session::mock::{MockConnector, MockDevice};
use netdeploy::storage::layout::StorageLayout;
use netdeploy::storage::settings::Settings;
use tokio_test::{assert_err, assert_ok};

const SHOW_CONFIG: &str = "exec:show configuration commands";

struct Lab {
    _root: tempfile::TempDir,
    layout: StorageLayout,
    devices: BTreeMap<String, Device>,
    connector: MockConnector,
}

impl Lab {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        Self {
            _root: root,
            layout,
            devices: BTreeMap::new(),
            connector: MockConnector::new(),
        }
    }

    /// Register a device with its rendered intended config
    async fn device(&mut self, name: &str, host: &str, intended: &str, mock: MockDevice) {
        self.layout
            .intended_file(name)
            .write_string(intended)
            .await
            .unwrap();
        self.devices
            .insert(name.to_string(), Device::new(name, host));
        self.connector = self.connector.clone().with_device(host, mock);
    }

    fn context(&self, timeout: Duration) -> TaskContext {
        let mut options = DeployOptions::from_settings(
            self.layout.clone(),
            &Settings::default(),
            Some("vyos".to_string()),
        )
        .unwrap();
        options.command_timeout = timeout;
        TaskContext::new(options, Arc::new(self.connector.clone()))
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.context(Duration::from_secs(5)))
    }
}

fn by_name<'a>(results: &'a [DeployResult], name: &str) -> &'a DeployResult {
    results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no result for {name}"))
}

fn assert_path_under(path: &Path, dir: &Path) {
    assert!(path.starts_with(dir), "{} not under {}", path.display(), dir.display());
}

fn position(events: &[String], event: &str) -> usize {
    events
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("{event} not in {events:?}"))
}

#[tokio::test]
async fn test_missing_line_is_applied_after_backup() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a"]);
    lab.device("R1", "192.0.2.11", "set a\nset b\n", r1.clone()).await;

    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 4).await);
    assert_eq!(results.len(), 1);

    let result = &results[0];
    assert!(result.ok, "{}", result.message);
    assert!(result.changed);
    assert_eq!(result.delta, vec![ConfigLine::new("set b")]);
    assert_eq!(result.message, "applied delta and validated");

    // Exactly one backup, holding the pre-change running config
    let backups = lab.layout.backups_dir().list_files().await.unwrap();
    assert_eq!(backups.len(), 1);
    let backup = result.backup.as_ref().unwrap();
    assert_eq!(backup.path, backups[0].0);
    assert_path_under(&backup.path, lab.layout.backups_dir().path());
    assert_eq!(std::fs::read_to_string(&backup.path).unwrap(), "set a");
    assert!(backup.captured_at < result.applied_at.unwrap());

    // The backup read happens strictly before configuration mode
    let events = r1.events();
    let show_calls: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.as_str() == SHOW_CONFIG)
        .map(|(i, _)| i)
        .collect();
    assert!(show_calls.len() >= 2);
    assert!(show_calls[1] < position(&events, "configure"));
    assert!(position(&events, "push:1") < position(&events, "commit"));
    assert!(position(&events, "commit") < position(&events, "save"));
    assert_eq!(events.last().map(String::as_str), Some("disconnect"));

    assert_eq!(r1.running(), vec!["set a".to_string(), "set b".to_string()]);
}

#[tokio::test]
async fn test_device_in_desired_state_is_untouched() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set b", "set a", "set legacy"]);
    lab.device("R1", "192.0.2.11", "set a\nset b\n", r1.clone()).await;

    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 1).await);
    let result = &results[0];

    assert!(result.ok);
    assert!(!result.changed);
    assert!(result.delta.is_empty());
    assert!(result.backup.is_none());
    assert!(result.validation.is_none());
    assert_eq!(result.message, ALREADY_DESIRED);
    assert!(!r1.entered_config_mode());
    assert!(!lab.layout.backups_dir().exists().await);
}

#[tokio::test]
async fn test_flagged_validation_points_to_backup() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a"]).fail_command("show ip bgp summary");
    lab.device("R1", "192.0.2.11", "set a\nset protocols bgp system-as 65001\n", r1.clone())
        .await;

    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 1).await);
    let result = &results[0];

    assert!(!result.ok);
    assert!(result.changed);
    let backup = result.backup.as_ref().unwrap();
    assert!(result.message.contains("manual rollback"));
    assert!(result.message.contains(&backup.path.display().to_string()));

    let report = result.validation.as_ref().unwrap();
    assert!(!report.ok);
    assert!(report.evidence.contains("# error:"));
    let log = std::fs::read_to_string(report.log_path.as_ref().unwrap()).unwrap();
    assert!(log.starts_with("# R1 validation: FLAGGED"));

    // The failing check stops the battery
    assert!(!r1.events().iter().any(|e| e == "exec:show ip route 0.0.0.0/0"));
}

#[tokio::test]
async fn test_unreachable_device_does_not_affect_others() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a"]);
    let r2 = MockDevice::with_running(&[]).refuse_connections();
    let r3 = MockDevice::with_running(&["set c", "set d"]);
    lab.device("R1", "192.0.2.11", "set a\nset b\n", r1).await;
    lab.device("R2", "192.0.2.12", "set a\n", r2.clone()).await;
    lab.device("R3", "192.0.2.13", "set c\nset d\n", r3).await;

    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 2).await);
    assert_eq!(results.len(), 3);

    let r1_result = by_name(&results, "R1");
    assert!(r1_result.ok && r1_result.changed);
    assert_eq!(r1_result.delta, vec![ConfigLine::new("set b")]);

    let r2_result = by_name(&results, "R2");
    assert!(!r2_result.ok);
    assert!(!r2_result.changed);
    assert!(r2_result.message.contains("Connection error"));
    assert_eq!(r2.events(), vec!["connect".to_string()]);

    let r3_result = by_name(&results, "R3");
    assert!(r3_result.ok && !r3_result.changed);
}

#[tokio::test]
async fn test_panicking_task_still_yields_one_result() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&[]).panic_on(RUNNING_CONFIG_COMMAND);
    lab.device("R1", "192.0.2.11", "set a\n", r1).await;
    lab.device("R2", "192.0.2.12", "set a\n", MockDevice::with_running(&[])).await;

    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 2).await);
    assert_eq!(results.len(), 2);

    let crashed = by_name(&results, "R1");
    assert!(!crashed.ok);
    assert!(crashed.message.contains("task aborted"));
    assert!(crashed.message.contains("simulated crash"));
    assert!(by_name(&results, "R2").ok);
    assert_eq!(lab.connector.active_sessions(), 0);
}

#[tokio::test]
async fn test_missing_intended_config_fails_only_that_device() {
    let mut lab = Lab::new();
    lab.device("R1", "192.0.2.11", "set a\n", MockDevice::with_running(&[])).await;
    lab.devices
        .insert("R9".to_string(), Device::new("R9", "192.0.2.19"));
    let r9 = MockDevice::with_running(&[]);
    lab.connector = lab.connector.clone().with_device("192.0.2.19", r9.clone());

    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 2).await);
    assert_eq!(results.len(), 2);
    let missing = by_name(&results, "R9");
    assert!(!missing.ok);
    assert!(missing.message.contains("failed to read intended config"));
    assert!(!r9.entered_config_mode());
}

#[tokio::test]
async fn test_concurrency_is_capped() {
    let mut lab = Lab::new();
    for i in 0..6 {
        let mock = MockDevice::with_running(&[]).delay(Duration::from_millis(15));
        lab.device(&format!("R{i}"), &format!("192.0.2.{}", 10 + i), "set a\n", mock)
            .await;
    }

    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 2).await);
    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.ok));
    assert!(lab.connector.peak_sessions() <= 2);
    assert!(lab.connector.peak_sessions() >= 1);
    assert_eq!(lab.connector.active_sessions(), 0);
}

#[tokio::test]
async fn test_zero_limit_is_rejected_before_any_work() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&[]);
    lab.device("R1", "192.0.2.11", "set a\n", r1.clone()).await;

    let err = assert_err!(lab.orchestrator().run(&lab.devices, 0).await);
    assert!(matches!(err, DeployError::ConfigError(_)));
    assert!(r1.events().is_empty());
}

#[tokio::test]
async fn test_empty_inventory_yields_no_results() {
    let lab = Lab::new();
    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 3).await);
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_commit_failure_requests_manual_inspection() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a"]).fail_commit();
    lab.device("R1", "192.0.2.11", "set a\nset b\n", r1.clone()).await;

    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 1).await);
    let result = &results[0];

    assert!(!result.ok);
    assert!(!result.changed);
    assert!(result.message.contains("apply failed"));
    assert!(result.message.contains("inspect it manually"));
    assert!(result.backup.is_some());

    // No automatic undo and nothing saved
    let events = r1.events();
    assert!(!events.iter().any(|e| e == "save"));
    assert_eq!(events.last().map(String::as_str), Some("disconnect"));
    assert_eq!(r1.running(), vec!["set a".to_string()]);
}

#[tokio::test]
async fn test_commit_timeout_leaves_device_unchanged() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a"]).delay_on("commit", Duration::from_millis(500));
    lab.device("R1", "192.0.2.11", "set a\nset b\n", r1.clone()).await;

    let orchestrator = Orchestrator::new(lab.context(Duration::from_millis(100)));
    let results = assert_ok!(orchestrator.run(&lab.devices, 1).await);
    let result = &results[0];

    assert!(!result.ok);
    assert!(!result.changed);
    assert!(result.message.contains("apply failed"));
    assert!(result.message.contains("timed out"));
    assert_eq!(r1.running(), vec!["set a".to_string()]);
}

#[tokio::test]
async fn test_save_timeout_after_commit_reports_change() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a"]).delay_on("save", Duration::from_millis(500));
    lab.device("R1", "192.0.2.11", "set a\nset b\n", r1.clone()).await;

    let orchestrator = Orchestrator::new(lab.context(Duration::from_millis(100)));
    let results = assert_ok!(orchestrator.run(&lab.devices, 1).await);
    let result = &results[0];

    assert!(!result.ok);
    assert!(result.changed);
    assert!(result.validation.is_none());
    assert!(result.message.contains("apply failed"));
    assert!(result.message.contains("inspect it manually"));
    let backup = result.backup.as_ref().unwrap();
    assert!(result.message.contains(&backup.path.display().to_string()));

    // The committed line is live; the session is still closed
    assert_eq!(r1.running(), vec!["set a".to_string(), "set b".to_string()]);
    assert_eq!(r1.events().last().map(String::as_str), Some("disconnect"));
    assert_eq!(lab.connector.active_sessions(), 0);
}

#[tokio::test]
async fn test_save_failure_after_commit_reports_change() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a"]).fail_save();
    lab.device("R1", "192.0.2.11", "set a\nset b\n", r1.clone()).await;

    let results = assert_ok!(lab.orchestrator().run(&lab.devices, 1).await);
    let result = &results[0];

    assert!(!result.ok);
    assert!(result.changed);
    assert!(result.message.contains("save failed"));
    assert!(result.message.contains("inspect it manually"));
    assert_eq!(r1.running(), vec!["set a".to_string(), "set b".to_string()]);
    assert!(!r1.events().iter().any(|e| e == "exit"));
}

#[tokio::test]
async fn test_slow_device_times_out() {
    let mut lab = Lab::new();
    let slow = MockDevice::with_running(&[]).delay(Duration::from_millis(500));
    lab.device("R1", "192.0.2.11", "set a\n", slow).await;
    lab.device("R2", "192.0.2.12", "set a\n", MockDevice::with_running(&["set a"]))
        .await;

    let orchestrator = Orchestrator::new(lab.context(Duration::from_millis(100)));
    let results = assert_ok!(orchestrator.run(&lab.devices, 2).await);

    let slow_result = by_name(&results, "R1");
    assert!(!slow_result.ok);
    assert!(slow_result.message.contains("did not answer within"));
    assert_eq!(by_name(&results, "R2").message, ALREADY_DESIRED);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a"]);
    lab.device("R1", "192.0.2.11", "set a\nset b\nset c\n", r1.clone()).await;

    let first = assert_ok!(lab.orchestrator().run(&lab.devices, 1).await);
    assert!(first[0].changed);

    let second = assert_ok!(lab.orchestrator().run(&lab.devices, 1).await);
    assert!(second[0].ok);
    assert!(!second[0].changed);
    assert_eq!(second[0].message, ALREADY_DESIRED);
    assert_eq!(lab.layout.backups_dir().list_files().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_plan_changes_nothing() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a", "set legacy"]);
    lab.device("R1", "192.0.2.11", "set a\nset b\n", r1.clone()).await;
    lab.devices
        .insert("R2".to_string(), Device::new("R2", "192.0.2.12"));

    let plans = assert_ok!(lab.orchestrator().plan(&lab.devices, 2).await);
    assert_eq!(plans.len(), 2);

    let r1_plan = plans.iter().find(|p| p.name == "R1").unwrap();
    assert!(r1_plan.has_changes());
    assert_eq!(r1_plan.delta, vec![ConfigLine::new("set b")]);
    assert_eq!(r1_plan.running_only, vec![ConfigLine::new("set legacy")]);
    assert!(!r1.entered_config_mode());

    let r2_plan = plans.iter().find(|p| p.name == "R2").unwrap();
    assert!(r2_plan.error.is_some());
}

#[tokio::test]
async fn test_task_walks_every_state() {
    let mut lab = Lab::new();
    lab.device("R1", "192.0.2.11", "set a\n", MockDevice::with_running(&[])).await;

    let device = lab.devices["R1"].clone();
    let task = DeployTask::new(device, lab.context(Duration::from_secs(5)));
    assert_eq!(task.state(), &DeployState::Pending);

    let (result, history) = task.run_with_history().await;
    assert!(result.ok);
    assert_eq!(
        history,
        vec![
            DeployState::Pending,
            DeployState::Connected,
            DeployState::DeltaComputed { empty: false },
            DeployState::BackedUp,
            DeployState::Applied,
            DeployState::Validated { ok: true },
            DeployState::Done,
        ]
    );
}

#[tokio::test]
async fn test_refused_task_fails_from_pending() {
    let mut lab = Lab::new();
    lab.device(
        "R1",
        "192.0.2.11",
        "set a\n",
        MockDevice::with_running(&[]).refuse_connections(),
    )
    .await;

    let device = lab.devices["R1"].clone();
    let (result, history) = DeployTask::new(device, lab.context(Duration::from_secs(5)))
        .run_with_history()
        .await;
    assert!(!result.ok);
    assert_eq!(history, vec![DeployState::Pending, DeployState::Failed]);
}

#[tokio::test]
async fn test_backup_snapshots_every_device() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&["set a", "set b"]);
    let r2 = MockDevice::with_running(&[]).refuse_connections();
    lab.device("R1", "192.0.2.11", "set a\n", r1.clone()).await;
    lab.device("R2", "192.0.2.12", "set a\n", r2).await;

    let outcomes = assert_ok!(lab.orchestrator().backup(&lab.devices, 2).await);
    assert_eq!(outcomes.len(), 2);

    let saved = outcomes.iter().find(|o| o.name == "R1").unwrap();
    assert!(saved.ok());
    let artifact = saved.artifact.as_ref().unwrap();
    assert_path_under(&artifact.path, lab.layout.backups_dir().path());
    assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), "set a\nset b");

    let refused = outcomes.iter().find(|o| o.name == "R2").unwrap();
    assert!(!refused.ok());
    assert!(refused.artifact.is_none());
    assert!(refused.error.as_ref().unwrap().contains("Connection error"));

    // A snapshot never enters configuration mode
    assert!(!r1.entered_config_mode());
    assert_eq!(lab.layout.backups_dir().list_files().await.unwrap().len(), 1);
    assert_eq!(lab.connector.active_sessions(), 0);
}

#[tokio::test]
async fn test_validate_runs_battery_on_every_device() {
    let mut lab = Lab::new();
    let healthy = MockDevice::with_running(&["set a"]);
    let broken = MockDevice::with_running(&["set a"]).fail_command("show ip bgp summary");
    lab.device("R1", "192.0.2.11", "set a\n", healthy.clone()).await;
    lab.device("R2", "192.0.2.12", "set a\n", broken).await;

    let outcomes = assert_ok!(lab.orchestrator().validate(&lab.devices, 2).await);
    assert_eq!(outcomes.len(), 2);

    let passed = outcomes.iter().find(|o| o.name == "R1").unwrap();
    assert!(passed.ok(), "{:?}", passed.error);
    let report = passed.report.as_ref().unwrap();
    let log = std::fs::read_to_string(report.log_path.as_ref().unwrap()).unwrap();
    assert!(log.starts_with("# R1 validation: PASS"));
    assert!(!healthy.entered_config_mode());

    let flagged = outcomes.iter().find(|o| o.name == "R2").unwrap();
    assert!(!flagged.ok());
    assert!(flagged.error.is_none());
    assert!(!flagged.report.as_ref().unwrap().ok);
    assert_eq!(lab.connector.active_sessions(), 0);
}

#[tokio::test]
async fn test_validate_survives_a_crashing_device() {
    let mut lab = Lab::new();
    let r1 = MockDevice::with_running(&[]).panic_on("show ip ospf neighbor");
    lab.device("R1", "192.0.2.11", "set a\n", r1).await;
    lab.device("R2", "192.0.2.12", "set a\n", MockDevice::with_running(&[])).await;

    let outcomes = assert_ok!(lab.orchestrator().validate(&lab.devices, 1).await);
    assert_eq!(outcomes.len(), 2);
    let crashed = outcomes.iter().find(|o| o.name == "R1").unwrap();
    assert!(crashed.error.as_ref().unwrap().contains("simulated crash"));
    assert!(outcomes.iter().find(|o| o.name == "R2").unwrap().ok());
}

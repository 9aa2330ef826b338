//! Backup executor tests

use periodic_backup::managers::backup::{BackupError, BackupExecutor, BackupGuard, BackupPlan};
use periodic_backup::managers::host::HostHooks;
use periodic_backup::selection::{FileSelector, SelectionRules};
use serial_test::serial;
use std::sync::Arc;
use test_utils::*;

fn executor(host: &RecordingHost) -> BackupExecutor {
    BackupExecutor::new(Arc::new(host.clone()))
}

fn plan_with(ctx: &TestContext, destinations: Vec<Box<dyn Destination>>) -> BackupPlan {
    let mut plan = ctx.plan();
    plan.destinations = destinations;
    plan
}

#[test]
#[serial]
fn test_backup_stores_everywhere_and_cleans_up() {
    let builder = ConfigBuilder::minimal().with_sample_tree();
    let second = builder.temp_dir().join("second");
    std::fs::create_dir_all(&second).unwrap();
    let ctx = TestContext::from_builder(builder.add_local_destination("second", &second));
    let plan = ctx.plan();
    let host = RecordingHost::new();

    let report = executor(&host).run_backup(&plan).unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.stored_count(), 2);
    assert_eq!(report.files_selected, ALL_FILES.len());
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.blobs.len(), 1);

    for dir in [ctx.destination_dir("local"), second] {
        let entries = dir_entries(&dir);
        let manifests = stored_manifests(&dir);
        assert_eq!(manifests.len(), 1, "{:?}", entries);
        assert_eq!(entries.len(), 2, "{:?}", entries);
        assert!(entries.contains(&report.blobs[0]));

        let stored = BackupManifest::from_file(&dir.join(&manifests[0])).unwrap();
        assert_eq!(stored.timestamp(), report.timestamp);
        assert_eq!(stored.archiver(), &ArchiverConfig::TarGzip);
        assert_eq!(stored.selector(), &ctx.config().selector());
    }

    assert!(dir_entries(&plan.temp_dir).is_empty());
    assert!(!BackupGuard::is_held());
}

#[test]
#[serial]
fn test_failing_destination_does_not_block_others() {
    let ctx = TestContext::with_sample_tree();
    let broken = MockDestination::new("broken", ctx.create_subdir("broken")).with_failing_store();
    let healthy = MockDestination::new("healthy", ctx.destination_dir("local"));
    let mut plan = plan_with(
        &ctx,
        vec![Box::new(broken.clone()), Box::new(healthy.clone())],
    );
    plan.retention = RetentionPolicy { cycle_quantity: 5, cycle_days: 0 };

    let report = executor(&RecordingHost::new()).run_backup(&plan).unwrap();

    assert!(!report.all_succeeded());
    assert_eq!(report.stored_count(), 1);
    let broken_report = &report.destinations[0];
    assert_eq!(broken_report.name, "broken");
    assert!(broken_report.outcome.is_none());
    assert!(broken_report.error.as_deref().unwrap().contains("Mock store failure"));

    // Retention only ran where the store worked
    assert!(!broken.get_calls().contains(&DestinationCall::List));
    assert!(healthy.get_calls().contains(&DestinationCall::List));
    assert_eq!(stored_manifests(healthy.path()).len(), 1);
    assert!(dir_entries(&plan.temp_dir).is_empty());
}

#[test]
#[serial]
fn test_retention_keeps_newest() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal().with_sample_tree().with_retention(2, 0),
    );
    let plan = ctx.plan();
    let executor = executor(&RecordingHost::new());

    let mut timestamps = Vec::new();
    let mut evicted = 0;
    for _ in 0..4 {
        let report = executor.run_backup(&plan).unwrap();
        evicted += report.destinations[0].evicted;
        timestamps.push(report.timestamp);
    }

    assert_eq!(evicted, 2);
    let kept = LocalDirectory::at("local", ctx.destination_dir("local"))
        .available_backups()
        .unwrap()
        .iter()
        .map(|m| m.timestamp())
        .collect::<Vec<_>>();
    assert_eq!(kept, timestamps[2..]);
}

#[test]
#[serial]
fn test_timestamps_are_unique() {
    let ctx = TestContext::with_sample_tree();
    let plan = ctx.plan();
    let executor = executor(&RecordingHost::new());

    let first = executor.run_backup(&plan).unwrap();
    let second = executor.run_backup(&plan).unwrap();

    assert!(second.timestamp > first.timestamp);
    assert_eq!(stored_manifests(&ctx.destination_dir("local")).len(), 2);
}

#[test]
#[serial]
fn test_rejected_while_another_backup_runs() {
    let ctx = TestContext::with_sample_tree();
    let plan = ctx.plan();
    let host = RecordingHost::new();

    let guard = BackupGuard::try_acquire().expect("guard should be free");
    let result = executor(&host).run_backup(&plan);
    assert!(matches!(result, Err(BackupError::AlreadyInProgress)));
    assert!(host.get_events().is_empty());
    assert!(stored_manifests(&ctx.destination_dir("local")).is_empty());

    drop(guard);
    executor(&host).run_backup(&plan).unwrap();
    assert_eq!(stored_manifests(&ctx.destination_dir("local")).len(), 1);
}

#[test]
#[serial]
fn test_selection_failure_releases_guard() {
    let ctx = TestContext::with_sample_tree();
    let mut plan = ctx.plan();
    plan.selector = FileSelector::new(
        ctx.temp_dir().join("vanished-root"),
        SelectionRules::everything().unwrap(),
    );
    let host = RecordingHost::new();

    let result = executor(&host).run_backup(&plan);

    assert!(matches!(result, Err(BackupError::Selection(_))));
    assert!(!BackupGuard::is_held());
    assert_eq!(host.status_history(), vec!["Creating backup...", ""]);
    assert!(stored_manifests(&ctx.destination_dir("local")).is_empty());
}

#[test]
#[serial]
fn test_status_message_cleared_after_run() {
    let ctx = TestContext::with_sample_tree();
    let host = RecordingHost::new();

    executor(&host).run_backup(&ctx.plan()).unwrap();

    assert_eq!(host.status_history(), vec!["Creating backup...", ""]);
    assert_eq!(host.status_message(), "");
    assert_eq!(host.open_restart_blocks(), 0);
}

#[test]
#[serial]
fn test_disabled_destination_is_skipped() {
    let builder = ConfigBuilder::minimal().with_sample_tree();
    let off = builder.temp_dir().join("off");
    std::fs::create_dir_all(&off).unwrap();
    let ctx = TestContext::from_builder(builder.add_disabled_destination("off", &off));

    let report = executor(&RecordingHost::new()).run_backup(&ctx.plan()).unwrap();

    assert!(report.all_succeeded());
    let off_report = report.destinations.iter().find(|d| d.name == "off").unwrap();
    assert_eq!(off_report.outcome, Some(StoreOutcome::Skipped("disabled".to_string())));
    assert!(dir_entries(&off).is_empty());
    assert_eq!(stored_manifests(&ctx.destination_dir("local")).len(), 1);
}

#[test]
#[serial]
fn test_multi_volume_backup_stores_every_volume() {
    let builder = ConfigBuilder::minimal()
        .with_sample_tree()
        .with_archiver(ArchiverConfig::Zip { multi_volume: true, volume_size: 16 });
    let ctx = TestContext::from_builder(builder);

    let report = executor(&RecordingHost::new()).run_backup(&ctx.plan()).unwrap();

    assert_eq!(report.blobs.len(), ALL_FILES.len());
    let entries = dir_entries(&ctx.destination_dir("local"));
    for blob in &report.blobs {
        assert!(entries.contains(blob), "{} missing from {:?}", blob, entries);
    }
}

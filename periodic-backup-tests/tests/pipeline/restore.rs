//! Restore executor tests: back up, damage the root, restore

use periodic_backup::managers::backup::BackupExecutor;
use periodic_backup::managers::restore::{RestoreError, RestoreExecutor, FINAL_RESULT_DIR};
use rstest::rstest;
use serial_test::serial;
use std::fs;
use std::sync::Arc;
use test_utils::*;

/// Run one backup and return its manifest as listed by the destination
fn back_up(ctx: &TestContext) -> BackupManifest {
    BackupExecutor::new(Arc::new(RecordingHost::new()))
        .run_backup(&ctx.plan())
        .unwrap();
    LocalDirectory::at("local", ctx.destination_dir("local"))
        .available_backups()
        .unwrap()
        .pop()
        .expect("backup should be listed")
}

fn damage(ctx: &TestContext) {
    fs::write(ctx.root().join(CONFIG_XML), "overwritten").unwrap();
    fs::remove_file(ctx.root().join(PLUGIN)).unwrap();
    ctx.write_root_file("jobs/other/config.xml", "created later");
}

fn restorer(ctx: &TestContext, host: &RecordingHost) -> RestoreExecutor {
    RestoreExecutor::new(ctx.selector(), Arc::new(host.clone()))
}

#[rstest]
#[case::tar_gzip(ArchiverConfig::TarGzip)]
#[case::zip(ArchiverConfig::Zip { multi_volume: false, volume_size: 0 })]
#[case::zip_volumes(ArchiverConfig::Zip { multi_volume: true, volume_size: 64 })]
#[case::null(ArchiverConfig::Null)]
#[serial]
fn test_round_trip(#[case] archiver: ArchiverConfig) {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal().with_sample_tree().with_archiver(archiver),
    );
    let before = ctx.root_snapshot();
    let manifest = back_up(&ctx);
    damage(&ctx);

    let host = RecordingHost::new();
    let temp = ctx.restore_dir();
    let report = restorer(&ctx, &host).run_restore(&manifest, &temp).unwrap();

    assert!(report.blobs_retrieved >= 1);
    assert_eq!(report.blobs_extracted, report.blobs_retrieved);
    assert_eq!(report.blobs_failed, 0);
    assert_eq!(report.replaced.unwrap().failed, 0);
    assert!(report.reloaded);
    assert_eq!(ctx.root_snapshot(), before);

    // Retrieved blobs are gone; only the staging directory remains
    assert_eq!(dir_entries(&temp), vec![FINAL_RESULT_DIR]);
}

#[test]
#[serial]
fn test_host_hooks_around_restore() {
    let ctx = TestContext::with_sample_tree();
    let manifest = back_up(&ctx);
    let host = RecordingHost::new();

    restorer(&ctx, &host)
        .run_restore(&manifest, &ctx.restore_dir())
        .unwrap();

    let events = host.get_events();
    assert_eq!(events.first(), Some(&HostEvent::RestartReady(false)));
    assert_eq!(events.last(), Some(&HostEvent::RestartReady(true)));
    assert_eq!(host.open_restart_blocks(), 0);
    assert_eq!(host.reload_count(), 1);
    assert_eq!(host.status_history(), vec!["Restoring backup...", ""]);
}

#[test]
#[serial]
fn test_failed_reload_is_not_fatal() {
    let ctx = TestContext::with_sample_tree();
    let manifest = back_up(&ctx);
    damage(&ctx);
    let host = RecordingHost::new().with_failing_reload();

    let report = restorer(&ctx, &host)
        .run_restore(&manifest, &ctx.restore_dir())
        .unwrap();

    assert!(!report.reloaded);
    assert!(report.replaced.is_some());
    assert_eq!(ctx.read_root_file(CONFIG_XML).unwrap(), format!("contents of {}", CONFIG_XML));
    assert_eq!(host.open_restart_blocks(), 0);
}

#[test]
#[serial]
fn test_unusable_temp_dir_leaves_root_untouched() {
    let ctx = TestContext::with_sample_tree();
    let manifest = back_up(&ctx);
    damage(&ctx);
    let damaged = ctx.root_snapshot();
    let host = RecordingHost::new();

    let not_a_dir = ctx.temp_dir().join("plain-file");
    fs::write(&not_a_dir, "").unwrap();
    let result = restorer(&ctx, &host).run_restore(&manifest, &not_a_dir);

    assert!(matches!(result, Err(RestoreError::TempNotWritable(_))));
    assert_eq!(ctx.root_snapshot(), damaged);
    assert_eq!(host.open_restart_blocks(), 0);
    assert_eq!(host.reload_count(), 0);
}

#[test]
#[serial]
fn test_missing_blobs_leave_root_untouched() {
    let ctx = TestContext::with_sample_tree();
    let manifest = back_up(&ctx);
    let dir = ctx.destination_dir("local");
    for name in dir_entries(&dir) {
        if !name.ends_with(".manifest") {
            fs::remove_file(dir.join(name)).unwrap();
        }
    }
    damage(&ctx);
    let damaged = ctx.root_snapshot();

    let report = restorer(&ctx, &RecordingHost::new())
        .run_restore(&manifest, &ctx.restore_dir())
        .unwrap();

    assert_eq!(report.blobs_retrieved, 0);
    assert!(report.replaced.is_none());
    assert_eq!(ctx.root_snapshot(), damaged);
}

#[test]
#[serial]
fn test_stale_staging_is_cleared() {
    let ctx = TestContext::with_sample_tree();
    let manifest = back_up(&ctx);
    let temp = ctx.restore_dir();
    let stale = temp.join(FINAL_RESULT_DIR).join("leftover.txt");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "from an earlier restore").unwrap();

    restorer(&ctx, &RecordingHost::new())
        .run_restore(&manifest, &temp)
        .unwrap();

    assert!(!ctx.root().join("leftover.txt").exists());
    assert!(!stale.exists());
}

#[test]
#[serial]
fn test_temp_dir_inside_root_survives() {
    let ctx = TestContext::with_sample_tree();
    let manifest = back_up(&ctx);
    let temp = ctx.root().join(".restore");
    fs::create_dir_all(&temp).unwrap();

    let report = restorer(&ctx, &RecordingHost::new())
        .run_restore(&manifest, &temp)
        .unwrap();

    assert!(report.replaced.is_some());
    assert!(temp.join(FINAL_RESULT_DIR).is_dir());
    for file in ALL_FILES {
        assert!(ctx.root().join(file).is_file(), "{} was not restored", file);
    }
}

#[test]
#[serial]
fn test_working_directories_inside_root_survive() {
    let builder = ConfigBuilder::minimal().with_sample_tree();
    let stored_inside = builder.root().join(".backups");
    fs::create_dir_all(&stored_inside).unwrap();
    let ctx = TestContext::from_builder(builder.add_local_destination("inside", &stored_inside));
    let manifest = back_up(&ctx);
    damage(&ctx);

    let mut config = ctx.config().clone();
    config.global.temp_directory = ctx.root().join(".work");
    let lock = ctx.write_root_file(".work/periodic-backup.lock", "");

    let report = restorer(&ctx, &RecordingHost::new())
        .with_protected_paths(config.protected_paths())
        .run_restore(&manifest, &ctx.restore_dir())
        .unwrap();

    assert!(report.replaced.is_some());
    assert!(lock.is_file());
    assert_eq!(stored_manifests(&stored_inside).len(), 1);
    assert!(!ctx.root().join("jobs/other/config.xml").exists());
    assert_eq!(ctx.read_root_file(CONFIG_XML).unwrap(), format!("contents of {}", CONFIG_XML));
}

#[test]
#[serial]
fn test_spawned_restore() {
    let ctx = TestContext::with_sample_tree();
    let before = ctx.root_snapshot();
    let manifest = back_up(&ctx);
    damage(&ctx);

    let handle = restorer(&ctx, &RecordingHost::new())
        .spawn(manifest, ctx.restore_dir())
        .unwrap();
    let report = handle.join().unwrap().unwrap();

    assert!(report.replaced.is_some());
    assert_eq!(ctx.root_snapshot(), before);
}

#[test]
#[serial]
fn test_restore_from_mock_listing() {
    let ctx = TestContext::with_sample_tree();
    back_up(&ctx);
    let mock = MockDestination::new("local", ctx.destination_dir("local"));
    let manifest = mock.available_backups().unwrap().remove(0);

    // The listed manifest points back at the directory it came from
    let report = restorer(&ctx, &RecordingHost::new())
        .run_restore(&manifest, &ctx.restore_dir())
        .unwrap();

    assert_eq!(report.blobs_retrieved, 1);
    assert_eq!(mock.get_calls(), vec![DestinationCall::List]);
}

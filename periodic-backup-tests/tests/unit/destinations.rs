//! Unit tests for destinations and the recording mock

use std::fs;
use test_utils::*;

#[test]
fn test_build_local_from_config() {
    let builder = ConfigBuilder::minimal();
    let path = builder.destination_path("local").unwrap();
    let config = builder.build();

    let destination = config.destinations["local"].build().unwrap();
    assert_eq!(destination.name(), "local");
    assert!(destination.is_enabled());
    destination.check_connectivity().assert_ok();

    fs::remove_dir_all(&path).unwrap();
    destination.check_connectivity().assert_err_contains("not a writable directory");
}

#[test]
fn test_listing_reads_only_manifests() {
    let ctx = TestContext::with_sample_tree();
    let dir = ctx.destination_dir("local");
    let older = manifest_days_ago(3, ctx.root());
    let newer = manifest_days_ago(1, ctx.root());
    store_fake_backup(&dir, &newer);
    store_fake_backup(&dir, &older);
    fs::write(dir.join("notes.txt"), "unrelated").unwrap();

    let destination = LocalDirectory::at("local", &dir);
    let listed = destination.available_backups().unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].timestamp(), older.timestamp());
    assert_eq!(listed[1].timestamp(), newer.timestamp());
    assert!(listed.iter().all(|m| m.destination().map(|d| d.name.as_str()) == Some("local")));
}

#[test]
fn test_retrieve_ignores_partial_copies() {
    let ctx = TestContext::with_sample_tree();
    let dir = ctx.destination_dir("local");
    let manifest = manifest_days_ago(0, ctx.root());
    store_fake_backup(&dir, &manifest);
    fs::write(
        dir.join(format!("{}.part002.zip.partial", manifest.file_name_base())),
        "half written",
    )
    .unwrap();

    let destination = LocalDirectory::at("local", &dir);
    let out = ctx.create_subdir("retrieved");
    let blobs = destination.retrieve_backup(&manifest, &out).unwrap();

    assert_eq!(blobs, vec![out.join(format!("{}.tar.gz", manifest.file_name_base()))]);
}

#[test]
fn test_directory_blobs_round_trip() {
    let ctx = TestContext::with_sample_tree();
    let staging = ctx.create_subdir("staging");
    let manifest = manifest_days_ago(0, ctx.root());
    let blob = staging.join(format!("{}.null", manifest.file_name_base()));
    fs::create_dir_all(blob.join("nested")).unwrap();
    fs::write(blob.join("nested/file.txt"), "inside").unwrap();
    let manifest_file = manifest.write_to(&staging).unwrap();

    let destination = LocalDirectory::at("local", ctx.destination_dir("local"));
    assert_eq!(
        destination.store_backup(&[blob], &manifest_file).unwrap(),
        StoreOutcome::Stored
    );

    let out = ctx.create_subdir("retrieved");
    let blobs = destination.retrieve_backup(&manifest, &out).unwrap();
    assert_eq!(blobs.len(), 1);
    assert_eq!(fs::read_to_string(blobs[0].join("nested/file.txt")).unwrap(), "inside");

    assert_eq!(destination.delete_backup_files(&manifest).unwrap(), 2);
    assert!(dir_entries(&ctx.destination_dir("local")).is_empty());
}

#[test]
fn test_mock_records_calls() {
    let ctx = TestContext::with_sample_tree();
    let mock = MockDestination::new("mock", ctx.destination_dir("local"));
    let manifest = manifest_days_ago(2, ctx.root());
    store_fake_backup(mock.path(), &manifest);

    mock.check_connectivity().unwrap();
    let listed = mock.available_backups().unwrap();
    mock.delete_backup_files(&listed[0]).unwrap();

    assert_eq!(
        mock.get_calls(),
        vec![
            DestinationCall::CheckConnectivity,
            DestinationCall::List,
            DestinationCall::Delete {
                marker: manifest.file_name_base()
            },
        ]
    );
    assert!(mock.delete_called());
    assert!(stored_manifests(mock.path()).is_empty());
}

#[test]
fn test_mock_failures() {
    let ctx = TestContext::with_sample_tree();
    let dir = ctx.destination_dir("local");
    let manifest = manifest_days_ago(0, ctx.root());
    let manifest_file = store_fake_backup(&ctx.create_subdir("staging"), &manifest);

    let mock = MockDestination::new("mock", &dir)
        .with_failing_store()
        .with_failing_list();

    mock.store_backup(&[], &manifest_file)
        .assert_err_contains("Mock store failure");
    mock.available_backups()
        .assert_err_contains("Mock list failure");
    assert_eq!(mock.store_count(), 1);
    assert!(dir_entries(&dir).is_empty());
}

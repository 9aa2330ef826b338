//! Unit tests for retention against a real destination directory

use chrono::Duration;
use periodic_backup::managers::retention::apply_retention;
use test_utils::*;

/// Destination holding one fake backup per entry of `ages` (in days)
fn destination_with(ctx: &TestContext, ages: &[i64]) -> LocalDirectory {
    let dir = ctx.destination_dir("local");
    for &days in ages {
        store_fake_backup(&dir, &manifest_days_ago(days, ctx.root()));
    }
    LocalDirectory::at("local", dir)
}

fn remaining_ages(destination: &LocalDirectory) -> Vec<i64> {
    destination
        .available_backups()
        .unwrap()
        .iter()
        .map(|m| (reference_time() - m.timestamp()).num_days())
        .collect()
}

#[test]
fn test_quantity_keeps_newest() {
    let ctx = TestContext::with_sample_tree();
    let destination = destination_with(&ctx, &[5, 4, 3, 2, 1]);
    let policy = RetentionPolicy { cycle_quantity: 3, cycle_days: 0 };

    let evicted = apply_retention(&destination, &policy, reference_time()).unwrap();

    assert_eq!(evicted, 2);
    assert_eq!(remaining_ages(&destination), vec![3, 2, 1]);
    // Blobs of evicted backups go with their manifests
    assert_eq!(dir_entries(destination.path()).len(), 6);
}

#[test]
fn test_retention_is_idempotent() {
    let ctx = TestContext::with_sample_tree();
    let destination = destination_with(&ctx, &[5, 4, 3, 2, 1]);
    let policy = RetentionPolicy { cycle_quantity: 2, cycle_days: 0 };

    assert_eq!(apply_retention(&destination, &policy, reference_time()).unwrap(), 3);
    assert_eq!(apply_retention(&destination, &policy, reference_time()).unwrap(), 0);
    assert_eq!(remaining_ages(&destination), vec![2, 1]);
}

#[test]
fn test_either_threshold_evicts() {
    let ctx = TestContext::with_sample_tree();
    let destination = destination_with(&ctx, &[30, 10, 6, 2, 1]);
    // Either threshold alone is enough to evict: 30 is past both, 10 only past the age
    let policy = RetentionPolicy { cycle_quantity: 4, cycle_days: 7 };

    let evicted = apply_retention(&destination, &policy, reference_time()).unwrap();

    assert_eq!(evicted, 2);
    assert_eq!(remaining_ages(&destination), vec![6, 2, 1]);
}

#[test]
fn test_unlimited_deletes_nothing() {
    let ctx = TestContext::with_sample_tree();
    let destination = destination_with(&ctx, &[400, 200, 1]);
    let policy = RetentionPolicy::default();

    assert!(policy.is_unlimited());
    assert_eq!(apply_retention(&destination, &policy, reference_time()).unwrap(), 0);
    assert_eq!(remaining_ages(&destination).len(), 3);
}

#[test]
fn test_age_boundary_is_kept() {
    let ctx = TestContext::with_sample_tree();
    let destination = destination_with(&ctx, &[7, 8]);
    let policy = RetentionPolicy { cycle_quantity: 0, cycle_days: 7 };

    apply_retention(&destination, &policy, reference_time()).unwrap();
    assert_eq!(remaining_ages(&destination), vec![7]);

    // An hour later the seven day old backup crosses the line
    apply_retention(&destination, &policy, reference_time() + Duration::hours(1)).unwrap();
    assert!(remaining_ages(&destination).is_empty());
}

#[test]
fn test_failed_listing_is_an_error() {
    let ctx = TestContext::with_sample_tree();
    let mock = MockDestination::new("mock", ctx.destination_dir("local")).with_failing_list();
    let policy = RetentionPolicy { cycle_quantity: 1, cycle_days: 0 };

    apply_retention(&mock, &policy, reference_time()).assert_err_contains("Failed to list");
    assert!(!mock.delete_called());
}

#[test]
fn test_failed_delete_is_not_counted() {
    let ctx = TestContext::with_sample_tree();
    let dir = ctx.destination_dir("local");
    for days in [3, 2, 1] {
        store_fake_backup(&dir, &manifest_days_ago(days, ctx.root()));
    }
    let mock = MockDestination::new("mock", &dir).with_failing_delete();
    let policy = RetentionPolicy { cycle_quantity: 1, cycle_days: 0 };

    assert_eq!(apply_retention(&mock, &policy, reference_time()).unwrap(), 0);
    assert_eq!(stored_manifests(&dir).len(), 3);
}

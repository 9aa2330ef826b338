//! Unit tests for archivers: every format must give back what it was fed

use periodic_backup::archivers::Archiver;
use periodic_backup::selection::SelectedFile;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use test_utils::*;

fn archive_selection(ctx: &TestContext, archiver: &dyn Archiver, out: &Path) -> Vec<PathBuf> {
    let files = ctx.selector().select().unwrap();
    let mut session = archiver.backup_start(out, "backup_2026_06_01_08_00_00").unwrap();
    for file in &files {
        session.add_file(file).unwrap();
    }
    session.finish().unwrap()
}

#[rstest]
#[case::tar_gzip(ArchiverConfig::TarGzip)]
#[case::zip(ArchiverConfig::Zip { multi_volume: false, volume_size: 0 })]
#[case::zip_volumes(ArchiverConfig::Zip { multi_volume: true, volume_size: 1 << 20 })]
#[case::null(ArchiverConfig::Null)]
fn test_archive_then_extract(#[case] config: ArchiverConfig) {
    let ctx = TestContext::with_sample_tree();
    let archiver = config.build();
    let out = ctx.create_subdir("out");
    let extracted = ctx.create_subdir("extracted");

    let blobs = archive_selection(&ctx, archiver.as_ref(), &out);
    assert_eq!(blobs.len(), 1);
    let name = blobs[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("backup_2026_06_01_08_00_00"));
    assert!(name.ends_with(archiver.extension()));

    let stats = archiver.unarchive_files(&blobs, &extracted);
    assert_eq!(stats.extracted, 1);
    assert_eq!(stats.failed, 0);

    let original = ctx.root_snapshot();
    let restored = snapshot_tree(&extracted);
    let expected: std::collections::BTreeMap<_, _> = original
        .into_iter()
        .filter(|(path, _)| ALL_FILES.contains(&path.as_str()))
        .collect();
    assert_eq!(restored, expected);
}

#[test]
fn test_multi_volume_splits_on_size() {
    let ctx = TestContext::with_sample_tree();
    for i in 0..6 {
        ctx.write_root_file(&format!("data/chunk{}.bin", i), &"z".repeat(4096));
    }
    let archiver = ArchiverConfig::Zip { multi_volume: true, volume_size: 8192 }.build();
    let out = ctx.create_subdir("out");
    let extracted = ctx.create_subdir("extracted");

    let blobs = archive_selection(&ctx, archiver.as_ref(), &out);
    assert!(blobs.len() > 1, "expected several volumes, got {:?}", blobs);
    for (i, blob) in blobs.iter().enumerate() {
        let name = blob.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("backup_2026_06_01_08_00_00.part{:03}.zip", i + 1));
    }

    let stats = archiver.unarchive_files(&blobs, &extracted);
    assert_eq!(stats.extracted, blobs.len());
    for i in 0..6 {
        let chunk = fs::read(extracted.join(format!("data/chunk{}.bin", i))).unwrap();
        assert_eq!(chunk.len(), 4096);
    }
}

#[test]
fn test_corrupt_blob_counts_as_failed() {
    let ctx = TestContext::with_sample_tree();
    let out = ctx.create_subdir("out");
    let good = archive_selection(&ctx, ArchiverConfig::TarGzip.build().as_ref(), &out);

    let bad = out.join("broken.tar.gz");
    fs::write(&bad, "definitely not gzip").unwrap();

    let extracted = ctx.create_subdir("extracted");
    let mut blobs = vec![bad];
    blobs.extend(good);
    let stats = ArchiverConfig::TarGzip.build().unarchive_files(&blobs, &extracted);

    assert_eq!(stats.extracted, 1);
    assert_eq!(stats.failed, 1);
    assert!(extracted.join(CONFIG_XML).is_file());
}

#[test]
fn test_unreadable_file_is_reported_not_fatal() {
    let ctx = TestContext::with_sample_tree();
    let out = ctx.create_subdir("out");
    let archiver = ArchiverConfig::TarGzip.build();

    let mut session = archiver.backup_start(&out, "base").unwrap();
    let missing = SelectedFile {
        path: ctx.root().join("vanished.txt"),
        relative: PathBuf::from("vanished.txt"),
    };
    assert!(session.add_file(&missing).is_err());

    for file in ctx.selector().select().unwrap() {
        session.add_file(&file).unwrap();
    }
    let blobs = session.finish().unwrap();

    let extracted = ctx.create_subdir("extracted");
    archiver.unarchive_files(&blobs, &extracted);
    assert!(extracted.join(PLUGIN).is_file());
    assert!(!extracted.join("vanished.txt").exists());
}

#[test]
fn test_stale_output_is_replaced() {
    let ctx = TestContext::with_sample_tree();
    let out = ctx.create_subdir("out");
    fs::write(out.join("base.tar.gz"), "stale").unwrap();

    let archiver = ArchiverConfig::TarGzip.build();
    let session = archiver.backup_start(&out, "base").unwrap();
    let blobs = session.finish().unwrap();

    assert_eq!(blobs, vec![out.join("base.tar.gz")]);
    assert_ne!(fs::read(&blobs[0]).unwrap(), b"stale");
}

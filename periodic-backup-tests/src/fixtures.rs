//! Test fixtures and sample data
//!
//! The sample tree mimics an application home directory: a top-level
//! config, one job with a build record, and a plugin.

use periodic_backup::config::{ArchiverConfig, SelectorConfig};
use periodic_backup::manifest::BackupManifest;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const CONFIG_XML: &str = "config.xml";
pub const BUILD_XML: &str = "jobs/myjob/builds/1/build.xml";
pub const JOB_CONFIG_XML: &str = "jobs/myjob/config.xml";
pub const NEXT_BUILD_NUMBER: &str = "jobs/myjob/nextBuildNumber";
pub const PLUGIN: &str = "plugins/periodicbackup.jpl";
/// Symbolic link pointing outside the root (unix only)
pub const SOFTLINK: &str = "soft-link-to-source.txt";

/// Regular files of the sample tree, in selection order
pub const ALL_FILES: [&str; 5] = [CONFIG_XML, BUILD_XML, JOB_CONFIG_XML, NEXT_BUILD_NUMBER, PLUGIN];

/// Populate `root` with the sample tree; each file holds its own path.
///
/// On unix a symbolic link to a file next to `root` is added as well.
pub fn create_sample_tree(root: &Path) {
    for file in ALL_FILES {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create fixture dir");
        fs::write(&path, format!("contents of {}", file)).expect("Failed to write fixture");
    }

    #[cfg(unix)]
    {
        let outside = root
            .parent()
            .expect("root needs a parent")
            .join("outside-source.txt");
        fs::write(&outside, "linked source").expect("Failed to write link target");
        std::os::unix::fs::symlink(&outside, root.join(SOFTLINK)).expect("Failed to create symlink");
    }
}

/// Relative path -> content of every regular file under `root`
pub fn snapshot_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// Names of the entries directly inside `dir`, sorted
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Manifest files stored in a local destination directory
pub fn stored_manifests(dir: &Path) -> Vec<String> {
    dir_entries(dir)
        .into_iter()
        .filter(|n| n.ends_with(".manifest"))
        .collect()
}

/// A fixed point in time tests can count from
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
}

/// Manifest for a backup taken `days` before [`reference_time`]
pub fn manifest_days_ago(days: i64, root: &Path) -> BackupManifest {
    BackupManifest::new(
        reference_time() - Duration::days(days),
        ArchiverConfig::TarGzip,
        SelectorConfig {
            root: root.to_path_buf(),
            includes: None,
            excludes: None,
            follow_symlinks: false,
        },
    )
}

/// Write a fake stored backup (one blob plus manifest) into `dir`
pub fn store_fake_backup(dir: &Path, manifest: &BackupManifest) -> PathBuf {
    fs::create_dir_all(dir).expect("Failed to create destination dir");
    fs::write(
        dir.join(format!("{}.tar.gz", manifest.file_name_base())),
        "not really a tarball",
    )
    .expect("Failed to write blob");
    manifest.write_to(dir).expect("Failed to write manifest")
}

/// Config file text for a local-destination setup
pub fn config_toml(root: &Path, temp: &Path, backups: &Path, logs: &Path) -> String {
    format!(
        r#"
[global]
root = "{}"
temp_directory = "{}"
cron = "0 8 * * *"
cycle_quantity = 3
log_directory = "{}"

[selection]
excludes = "**/nextBuildNumber"

[archiver]
type = "tar_gzip"

[destinations.local]
type = "local"
path = "{}"
"#,
        toml_path(root),
        toml_path(temp),
        toml_path(logs),
        toml_path(backups)
    )
}

fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

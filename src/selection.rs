//! File selection: which files under the root go into a backup
//!
//! Rules are ANT-style globs separated by `;`. A file is selected when it
//! matches at least one include pattern and no exclude pattern. The selector
//! also owns the root on the way back: [`FileSelector::restore_files`]
//! replaces the live tree with an extracted backup.

use crate::config::SelectorConfig;
use crate::utils::fs::{canonical_or_self, copy_tree, to_slash_path};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Backup root {path:?} is not readable: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid selection pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Compiled include/exclude rules
#[derive(Debug, Clone)]
pub struct SelectionRules {
    includes: GlobSet,
    excludes: GlobSet,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    /// Rule strings as given, recorded in manifests
    raw_includes: Option<String>,
    raw_excludes: Option<String>,
    follow_symlinks: bool,
}

impl SelectionRules {
    /// Build rules from `;`-separated pattern strings.
    ///
    /// A missing or blank include string selects everything; a missing or
    /// blank exclude string excludes nothing.
    pub fn new(
        includes: Option<&str>,
        excludes: Option<&str>,
        follow_symlinks: bool,
    ) -> Result<Self, SelectionError> {
        let mut include_patterns = split_patterns(includes);
        if include_patterns.is_empty() {
            include_patterns.push("**".to_string());
        }
        let exclude_patterns = split_patterns(excludes);

        Ok(Self {
            includes: build_globset(&include_patterns)?,
            excludes: build_globset(&exclude_patterns)?,
            include_patterns,
            exclude_patterns,
            raw_includes: includes.map(str::to_string),
            raw_excludes: excludes.map(str::to_string),
            follow_symlinks,
        })
    }

    /// Rules that select every regular file
    pub fn everything() -> Result<Self, SelectionError> {
        Self::new(None, None, false)
    }

    /// Evaluate the rules for a `/`-separated path relative to the root
    pub fn is_selected(&self, relative: &str) -> bool {
        self.includes.is_match(relative) && !self.excludes.is_match(relative)
    }

    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    pub fn include_patterns(&self) -> &[String] {
        &self.include_patterns
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }
}

/// Split a `;`-separated rule string into normalized patterns
pub fn split_patterns(patterns: Option<&str>) -> Vec<String> {
    patterns
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(normalize_pattern)
        .collect()
}

/// ANT conventions: `\` is a separator, and `dir/` means everything below `dir`.
///
/// Only `*`, `?` and `**` are wildcards; glob class and alternation
/// characters are matched literally.
fn normalize_pattern(pattern: &str) -> String {
    let mut normalized = String::with_capacity(pattern.len());
    for c in pattern.trim_start_matches(['/', '\\']).chars() {
        match c {
            '\\' => normalized.push('/'),
            '[' | ']' | '{' | '}' => {
                normalized.push('[');
                normalized.push(c);
                normalized.push(']');
            }
            _ => normalized.push(c),
        }
    }
    if normalized.ends_with('/') {
        normalized.push_str("**");
    }
    normalized
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, SelectionError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| SelectionError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| SelectionError::InvalidPattern {
        pattern: patterns.join(";"),
        source,
    })
}

impl SelectorConfig {
    /// Create the selector described by this descriptor
    pub fn build(&self) -> Result<FileSelector, SelectionError> {
        FileSelector::from_config(self)
    }
}

/// A file chosen for backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Location on disk
    pub path: PathBuf,
    /// Location relative to the backup root
    pub relative: PathBuf,
}

impl SelectedFile {
    /// Relative path with `/` separators, as stored inside archives
    pub fn archive_name(&self) -> String {
        to_slash_path(&self.relative)
    }
}

/// Counts from replacing the live tree during a restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub deleted: usize,
    pub copied: usize,
    pub failed: usize,
}

/// Walks a root directory and applies selection rules
#[derive(Debug, Clone)]
pub struct FileSelector {
    root: PathBuf,
    rules: SelectionRules,
}

impl FileSelector {
    pub fn new(root: impl Into<PathBuf>, rules: SelectionRules) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    /// Build a selector from its serialized descriptor
    pub fn from_config(config: &SelectorConfig) -> Result<Self, SelectionError> {
        let rules = SelectionRules::new(
            config.includes.as_deref(),
            config.excludes.as_deref(),
            config.follow_symlinks,
        )?;
        Ok(Self::new(&config.root, rules))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rules(&self) -> &SelectionRules {
        &self.rules
    }

    /// Descriptor that rebuilds this selector via [`FileSelector::from_config`]
    pub fn config(&self) -> SelectorConfig {
        SelectorConfig {
            root: self.root.clone(),
            includes: self.rules.raw_includes.clone(),
            excludes: self.rules.raw_excludes.clone(),
            follow_symlinks: self.rules.follow_symlinks,
        }
    }

    /// Enumerate the files to back up.
    ///
    /// Entries are visited in file-name order, so the result is stable for an
    /// unchanged tree. An unreadable root is an error; anything unreadable
    /// below it is skipped with a warning.
    pub fn select(&self) -> Result<Vec<SelectedFile>, SelectionError> {
        fs::read_dir(&self.root).map_err(|source| SelectionError::RootUnreadable {
            path: self.root.clone(),
            source,
        })?;

        let follow = self.rules.follow_symlinks();
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(follow)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry during selection: {}", e);
                    continue;
                }
            };

            // Without follow_links walkdir reports the link itself; treat it as a leaf
            if entry.path_is_symlink() && !follow {
                debug!("Skipping symbolic link {:?}", entry.path());
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };

            if self.rules.is_selected(&to_slash_path(relative)) {
                files.push(SelectedFile {
                    path: entry.path().to_path_buf(),
                    relative: relative.to_path_buf(),
                });
            }
        }

        info!("Selected {} files under {:?}", files.len(), self.root);
        Ok(files)
    }

    /// Replace the live tree with the contents of `source`.
    ///
    /// Every deletable file below the root is removed first, then the whole
    /// of `source` is copied in. Paths inside `protected` (and their parent
    /// directories) are never touched. Individual failures are logged.
    pub fn restore_files(&self, source: &Path, protected: &[&Path]) -> RestoreStats {
        let root = canonical_or_self(&self.root);
        let protected: Vec<PathBuf> = protected.iter().map(|p| canonical_or_self(p)).collect();
        let mut stats = RestoreStats::default();

        info!("Deleting current files under {:?}", root);

        for entry in WalkDir::new(&root)
            .min_depth(1)
            .contents_first(true)
            .follow_links(false)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Could not inspect entry during restore: {}", e);
                    stats.failed += 1;
                    continue;
                }
            };

            let path = entry.path();
            if protected
                .iter()
                .any(|p| path.starts_with(p) || p.starts_with(path))
            {
                continue;
            }

            if entry.file_type().is_dir() {
                if let Err(e) = fs::remove_dir(path) {
                    debug!("Keeping directory {:?}: {}", path, e);
                }
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => stats.deleted += 1,
                Err(e) => {
                    warn!("Could not delete {:?}: {}", path, e);
                    stats.failed += 1;
                }
            }
        }

        info!("Copying restored files from {:?} to {:?}", source, root);
        let copy = copy_tree(source, &root);
        stats.copied = copy.copied;
        stats.failed += copy.failed;

        info!(
            "Restore replaced files under {:?}: {} deleted, {} copied, {} failed",
            root, stats.deleted, stats.copied, stats.failed
        );
        stats
    }
}

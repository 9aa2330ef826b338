use super::{is_blob_of, parse_manifests, Destination, StoreOutcome};
use crate::config::{DestinationConfig, DestinationKind};
use crate::manifest::{is_manifest_name, BackupManifest};
use anyhow::{anyhow, Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// An S3 (or S3-compatible) bucket, optionally under a key prefix.
///
/// Objects are stored as `<prefix>/<file name>`. The client is async; each
/// destination owns a current-thread runtime and blocks on it, so callers
/// stay synchronous.
pub struct S3Destination {
    config: DestinationConfig,
    bucket: String,
    prefix: Option<String>,
    client: Client,
    runtime: Runtime,
}

impl S3Destination {
    pub fn new(config: DestinationConfig) -> Result<Self> {
        let (bucket, prefix, region, profile, endpoint) = match config.kind {
            DestinationKind::S3 {
                ref bucket,
                ref prefix,
                ref region,
                ref credentials_profile,
                ref endpoint_url,
            } => (
                bucket.clone(),
                prefix
                    .as_deref()
                    .map(|p| p.trim_matches('/').to_string())
                    .filter(|p| !p.is_empty()),
                region.clone(),
                credentials_profile.clone(),
                endpoint_url.clone(),
            ),
            _ => anyhow::bail!("Destination '{}' is not an S3 bucket", config.name),
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start runtime for S3 client")?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(ref endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = runtime.block_on(loader.load());

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if endpoint.is_some() {
            // MinIO and LocalStack want path-style addressing
            s3_config = s3_config.force_path_style(true);
        }
        let client = Client::from_conf(s3_config.build());

        Ok(Self {
            config,
            bucket,
            prefix,
            client,
            runtime,
        })
    }

    fn key_for(&self, name: &str) -> String {
        match self.prefix {
            Some(ref prefix) => format!("{}/{}", prefix, name),
            None => name.to_string(),
        }
    }

    fn bucket_exists(&self) -> bool {
        let result = self
            .runtime
            .block_on(self.client.head_bucket().bucket(&self.bucket).send());
        match result {
            Ok(_) => true,
            Err(e) => {
                debug!("head_bucket {} failed: {}", self.bucket, DisplayErrorContext(e));
                false
            }
        }
    }

    /// Keys directly under this destination's prefix
    fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(self.prefix.as_ref().map(|p| format!("{}/", p)))
                .set_continuation_token(token.take());
            let response = self.runtime.block_on(request.send()).map_err(|e| {
                anyhow!("Failed to list s3://{}: {}", self.bucket, DisplayErrorContext(e))
            })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter(|key| key_matches_prefix(key, self.prefix.as_deref()))
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| anyhow!("Failed to get {}: {}", key, DisplayErrorContext(e)))?;
            let data = output
                .body
                .collect()
                .await
                .with_context(|| format!("Failed to read body of {}", key))?;
            Ok::<_, anyhow::Error>(data.into_bytes().to_vec())
        })
    }

    /// Stream one object into `target` without buffering it in memory
    fn download_to(&self, key: &str, target: &Path) -> Result<()> {
        self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| anyhow!("Failed to get {}: {}", key, DisplayErrorContext(e)))?;

            write_stream(output.body, target)
                .await
                .with_context(|| format!("Failed to download {}", key))
                .map(|_| ())
        })
    }

    fn put_file(&self, path: &Path) -> Result<String> {
        if path.is_dir() {
            anyhow::bail!("{:?} is a directory; S3 destinations only store files", path);
        }
        let name = file_name(path)?;
        let key = self.key_for(&name);

        info!("Uploading {:?} to s3://{}/{}", path, self.bucket, key);
        self.runtime.block_on(async {
            let body = ByteStream::from_path(path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(body)
                .send()
                .await
                .map_err(|e| anyhow!("Failed to upload {}: {}", key, DisplayErrorContext(e)))?;
            Ok::<_, anyhow::Error>(())
        })?;

        Ok(key)
    }

    fn delete_key(&self, key: &str) -> Result<()> {
        self.runtime
            .block_on(
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send(),
            )
            .map_err(|e| anyhow!("Failed to delete {}: {}", key, DisplayErrorContext(e)))?;
        Ok(())
    }

    fn upload_all(&self, archives: &[PathBuf], manifest_file: &Path, uploaded: &mut Vec<String>) -> Result<()> {
        for archive in archives {
            uploaded.push(self.put_file(archive)?);
        }
        uploaded.push(self.put_file(manifest_file)?);
        Ok(())
    }
}

impl Destination for S3Destination {
    fn config(&self) -> &DestinationConfig {
        &self.config
    }

    fn check_connectivity(&self) -> Result<()> {
        if !self.bucket_exists() {
            anyhow::bail!("Bucket '{}' does not exist or is not reachable", self.bucket);
        }
        Ok(())
    }

    fn store_backup(&self, archives: &[PathBuf], manifest_file: &Path) -> Result<StoreOutcome> {
        if !self.config.enabled {
            warn!("Skipping location '{}' since it is disabled", self.config.name);
            return Ok(StoreOutcome::Skipped("disabled".to_string()));
        }
        if !self.bucket_exists() {
            warn!(
                "Skipping location '{}' since bucket '{}' is not reachable",
                self.config.name, self.bucket
            );
            return Ok(StoreOutcome::Skipped(format!(
                "bucket '{}' is not reachable",
                self.bucket
            )));
        }

        let mut uploaded = Vec::new();
        match self.upload_all(archives, manifest_file, &mut uploaded) {
            Ok(()) => {
                info!("Stored backup in '{}' (s3://{})", self.config.name, self.bucket);
                Ok(StoreOutcome::Stored)
            }
            Err(e) => {
                for key in uploaded.iter().rev() {
                    if let Err(cleanup) = self.delete_key(key) {
                        warn!("Could not remove {} after failed upload: {:#}", key, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    fn available_backups(&self) -> Result<Vec<BackupManifest>> {
        let records = self
            .list_keys()?
            .into_iter()
            .filter(|key| is_manifest_name(key))
            .map(|key| {
                let bytes = self.get_bytes(&key);
                (key, bytes)
            })
            .collect::<Vec<_>>();

        Ok(parse_manifests(&self.config, records))
    }

    fn retrieve_backup(&self, manifest: &BackupManifest, temp_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(temp_dir)
            .with_context(|| format!("Failed to create {:?}", temp_dir))?;

        let mut retrieved = Vec::new();
        for key in self.list_keys()? {
            let name = object_name(&key).to_string();
            if !is_blob_of(manifest, &name) {
                continue;
            }

            let target = temp_dir.join(&name);
            debug!("Downloading s3://{}/{} to {:?}", self.bucket, key, target);
            match self.download_to(&key, &target) {
                Ok(()) => retrieved.push(target),
                Err(e) => {
                    warn!("Could not retrieve {}: {:#}", key, e);
                    if target.exists() {
                        let _ = fs::remove_file(&target);
                    }
                }
            }
        }

        info!(
            "Retrieved {} blob(s) for {} from '{}'",
            retrieved.len(),
            manifest.file_name_base(),
            self.config.name
        );
        Ok(retrieved)
    }

    fn delete_backup_files(&self, manifest: &BackupManifest) -> Result<usize> {
        info!("Deleting backup {} from '{}'", manifest.file_name_base(), self.config.name);

        let mut deleted = 0;
        for key in self.list_keys()? {
            if !manifest.owns(object_name(&key)) {
                continue;
            }
            match self.delete_key(&key) {
                Ok(()) => {
                    debug!("Deleted s3://{}/{}", self.bucket, key);
                    deleted += 1;
                }
                Err(e) => warn!("{:#}", e),
            }
        }
        Ok(deleted)
    }
}

/// Copy an object body into a new file at `target` chunk by chunk
async fn write_stream(body: ByteStream, target: &Path) -> Result<u64> {
    let mut body = body.into_async_read();
    let mut file = tokio::fs::File::create(target)
        .await
        .with_context(|| format!("Failed to create {:?}", target))?;
    let written = tokio::io::copy(&mut body, &mut file)
        .await
        .with_context(|| format!("Failed to write {:?}", target))?;
    file.flush()
        .await
        .with_context(|| format!("Failed to flush {:?}", target))?;
    Ok(written)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("Invalid blob path {:?}", path))
}

/// Last path segment of an object key
fn object_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// A key without a parent belongs to an unprefixed destination only; otherwise
/// its parent must be the prefix (or nested below it)
fn key_matches_prefix(key: &str, prefix: Option<&str>) -> bool {
    let parent = Path::new(key)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty());

    match (parent, prefix) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(_), None) => false,
        (Some(parent), Some(prefix)) => parent.starts_with(prefix),
    }
}

//! An OpenDAL-backed remote backend (S3-compatible object storage).
//!
//! Path-style S3 addressing, a logging layer, and a bounded retry layer.
//! opendal gives a uniform `Operator` across S3-compatible services; one
//! concrete remote backend is enough to prove the trait, so this one is
//! registered under the tag the caller chooses (`"s3"` by convention).

use crate::backend::{StorageBackend, StoreOpts, WatchCallback, WatchHandle};
use anyhow::Context;
use async_trait::async_trait;
use opendal::Operator;
use pvsync_core::error::{SyncError, SyncResult};
use pvsync_core::types::{Rev, SaveOutcome, Stat};

/// Connection parameters for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for an S3-compatible endpoint.
///
/// Uses path-style addressing (opendal 0.55's default), required by
/// MinIO/SeaweedFS-style deployments — do not call
/// `enable_virtual_host_style()` for these.
pub fn build_operator(cfg: &S3Config) -> anyhow::Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

pub struct S3Backend {
    tag: String,
    op: Operator,
}

impl S3Backend {
    pub fn new(tag: impl Into<String>, op: Operator) -> Self {
        S3Backend { tag: tag.into(), op }
    }

    pub fn from_config(tag: impl Into<String>, cfg: &S3Config) -> anyhow::Result<Self> {
        Ok(S3Backend::new(tag, build_operator(cfg)?))
    }

    fn map_stat_err(e: opendal::Error, path: &str) -> SyncError {
        if e.kind() == opendal::ErrorKind::NotFound {
            SyncError::NotFound(path.to_string())
        } else {
            SyncError::StorageStat(format!("{path}: {e}"))
        }
    }

    fn etag_rev(meta: &opendal::Metadata) -> Option<Rev> {
        meta.etag()
            .map(str::to_string)
            .or_else(|| meta.last_modified().map(|t| t.to_rfc3339()))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn load(&self, path: &str, _opts: &StoreOpts) -> SyncResult<(Vec<u8>, Stat)> {
        let buf = self
            .op
            .read(path)
            .await
            .map_err(|e| Self::map_stat_err(e, path))?;
        let meta = self
            .op
            .stat(path)
            .await
            .map_err(|e| Self::map_stat_err(e, path))?;
        Ok((buf.to_vec(), Stat { rev: Self::etag_rev(&meta) }))
    }

    async fn save(
        &self,
        path: &str,
        _opts: &StoreOpts,
        bytes: Vec<u8>,
        expected_rev: Option<&Rev>,
    ) -> SyncResult<SaveOutcome> {
        if let Some(expected) = expected_rev {
            match self.op.stat(path).await {
                Ok(meta) => {
                    if Self::etag_rev(&meta).as_ref() != Some(expected) {
                        return Err(SyncError::RevConflict);
                    }
                }
                Err(e) if e.kind() == opendal::ErrorKind::NotFound => {}
                Err(e) => return Err(SyncError::StorageSave(format!("{path}: {e}"))),
            }
        }

        self.op
            .write(path, bytes)
            .await
            .map_err(|e| SyncError::StorageSave(format!("{path}: {e}")))?;

        let meta = self
            .op
            .stat(path)
            .await
            .map_err(|e| SyncError::StorageSave(format!("post-write stat {path}: {e}")))?;
        Ok(SaveOutcome {
            rev: Self::etag_rev(&meta),
            path: None,
        })
    }

    async fn stat(&self, path: &str, _opts: &StoreOpts) -> SyncResult<Stat> {
        let meta = self
            .op
            .stat(path)
            .await
            .map_err(|e| Self::map_stat_err(e, path))?;
        Ok(Stat { rev: Self::etag_rev(&meta) })
    }

    fn supports_watch(&self) -> bool {
        false
    }

    fn watch(&self, _path: &str, _opts: &StoreOpts, _on_change: WatchCallback) -> SyncResult<WatchHandle> {
        Err(SyncError::Other(anyhow::anyhow!(
            "backend '{}' does not support watch",
            self.tag
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_operator_accepts_valid_config() {
        let cfg = S3Config {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "test-bucket".into(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
        };
        assert!(build_operator(&cfg).is_ok());
    }
}

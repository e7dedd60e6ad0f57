//! Local disk artifact store
//!
//! Objects live under `{work_dir}/artifacts/{object_key}`. Writes go to a
//! tmp file first and are renamed into place, so readers never see a
//! half-written PDF.

use async_trait::async_trait;
use shared::models::SignedUrl;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use super::{ArtifactError, ArtifactResult, ArtifactStore, UrlSigner, validate_object_key};

#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    signer: UrlSigner,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            root: root.into(),
            signer,
        }
    }

    fn path_for(&self, object_key: &str) -> ArtifactResult<PathBuf> {
        validate_object_key(object_key)?;
        Ok(self.root.join(object_key))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, object_key: &str, bytes: Vec<u8>) -> ArtifactResult<()> {
        let path = self.path_for(object_key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: tmp file + rename
        let tmp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!(object_key = %object_key, size = bytes.len(), "Artifact stored");
        Ok(())
    }

    async fn get(&self, object_key: &str) -> ArtifactResult<Vec<u8>> {
        let path = self.path_for(object_key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(object_key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, object_key: &str) -> ArtifactResult<bool> {
        let path = self.path_for(object_key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, object_key: &str) -> ArtifactResult<()> {
        let path = self.path_for(object_key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn signed_url(&self, object_key: &str, ttl: Duration) -> ArtifactResult<SignedUrl> {
        if !self.exists(object_key).await? {
            return Err(ArtifactError::NotFound(object_key.to_string()));
        }

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = shared::util::now_millis().saturating_add(ttl_ms);
        Ok(SignedUrl {
            object_key: object_key.to_string(),
            url: self.signer.url_for(object_key, expires_at),
            expires_at,
        })
    }
}

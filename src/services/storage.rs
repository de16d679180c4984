use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::R2Settings;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Object key of a job's finished clip. One object per job, never shared.
pub fn artifact_key(job_id: Uuid) -> String {
    format!("videos/{}.mp4", job_id)
}

/// A finished clip ready to be sent to a client.
pub enum Artifact {
    File(tokio::fs::File),
    Bytes(Vec<u8>),
}

/// Storage for finished clips, addressed by job ID.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store the clip at `local` for `job_id`. Returns the location recorded
    /// in the job result.
    async fn publish(&self, job_id: Uuid, local: &Path) -> Result<String, StorageError>;

    /// Open the clip for `job_id`, or `None` if none was published.
    async fn open(&self, job_id: Uuid) -> Result<Option<Artifact>, StorageError>;
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
}

impl R2Client {
    pub fn new(settings: &R2Settings) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: settings.endpoint.clone(),
        };

        let credentials = Credentials::new(
            Some(&settings.access_key),
            Some(&settings.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(&settings.bucket, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }
}

#[async_trait]
impl ArtifactStore for R2Client {
    async fn publish(&self, job_id: Uuid, local: &Path) -> Result<String, StorageError> {
        let key = artifact_key(job_id);
        let data = tokio::fs::read(local).await?;
        let response = self
            .bucket
            .put_object_with_content_type(&key, &data, VIDEO_CONTENT_TYPE)
            .await?;
        if !(200..300).contains(&response.status_code()) {
            return Err(StorageError::Status(response.status_code()));
        }

        tracing::debug!(job_id = %job_id, key = %key, bytes = data.len(), "Uploaded clip to R2");
        Ok(key)
    }

    async fn open(&self, job_id: Uuid) -> Result<Option<Artifact>, StorageError> {
        let response = self.bucket.get_object(artifact_key(job_id)).await?;
        match response.status_code() {
            404 => Ok(None),
            200..=299 => Ok(Some(Artifact::Bytes(response.to_vec()))),
            code => Err(StorageError::Status(code)),
        }
    }
}

/// Clips kept in a directory on the serving node.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, job_id: Uuid) -> PathBuf {
        self.root.join(format!("{}.mp4", job_id))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn publish(&self, job_id: Uuid, local: &Path) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.path_for(job_id);
        // copy under a temporary name so readers never see a partial file
        let partial = target.with_extension("mp4.part");
        tokio::fs::copy(local, &partial).await?;
        tokio::fs::rename(&partial, &target).await?;
        Ok(target.to_string_lossy().into_owned())
    }

    async fn open(&self, job_id: Uuid) -> Result<Option<Artifact>, StorageError> {
        match tokio::fs::File::open(self.path_for(job_id)).await {
            Ok(file) => Ok(Some(Artifact::File(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("S3 returned status {0}")]
    Status(u16),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

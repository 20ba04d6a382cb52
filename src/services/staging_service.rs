//! StagingService: intermediate storage for audio payloads that are too large
//! to hand to the fingerprint service inline. Metadata lives in SQLite, bytes
//! on local disk sharded beneath `base_path/{shard}/{shard}/{key}`. Objects are
//! exposed read-only through `public_url` so external services can fetch them,
//! and are removed after use or by the TTL sweep.

use crate::models::staged_object::StagedObject;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staged object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object key")]
    InvalidKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StagingResult<T> = Result<T, StagingError>;

#[derive(Clone)]
pub struct StagingService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where staged payloads are stored.
    pub base_path: PathBuf,

    /// Externally reachable base URL of this service, without trailing slash.
    pub public_base_url: String,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;

impl StagingService {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin with `/`, contain `..`, backslashes or control bytes.
    fn ensure_key_safe(&self, key: &str) -> StagingResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StagingError::InvalidKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StagingError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StagingError::InvalidKey);
        }
        Ok(())
    }

    /// Two-level shard identifiers: the first two bytes of MD5(key) as hex.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// base_path/{shard}/{shard}/{key}. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_object(&self, key: &str) -> StagingResult<StagedObject> {
        sqlx::query_as::<_, StagedObject>(
            "SELECT id, key, content_type, size_bytes, etag, created_at
             FROM staged_objects WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StagingError::ObjectNotFound(key.to_string()),
            other => StagingError::Sqlx(other),
        })
    }

    /// URL at which an external service can download the object.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/staging/{}", self.public_base_url, key)
    }

    /// Stage an in-memory payload under `prefix` with a fresh random key.
    pub async fn put_bytes(
        &self,
        prefix: &str,
        payload: Bytes,
        content_type: Option<String>,
    ) -> StagingResult<StagedObject> {
        let key = format!("{}{}", prefix, Uuid::new_v4());
        let body = stream::once(async move { Ok::<_, io::Error>(payload) });
        self.put_stream(&key, content_type, body).await
    }

    /// Stream a payload to disk and record its metadata.
    ///
    /// Writes to a temp file, fsyncs, then renames into place. The temp file is
    /// removed on any error.
    pub async fn put_stream<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StagingResult<StagedObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StagingError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StagingError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StagingError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StagingError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StagingError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StagingError::Io(err));
        }

        let etag = format!("{:x}", digest.compute());
        let insert_result = sqlx::query_as::<_, StagedObject>(
            r#"
            INSERT INTO staged_objects (id, key, content_type, size_bytes, etag, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                created_at = excluded.created_at
            RETURNING id, key, content_type, size_bytes, etag, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                debug!(key = %obj.key, size_bytes, "staged object");
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StagingError::Sqlx(err))
            }
        }
    }

    /// Metadata plus an open file handle ready for streaming out.
    pub async fn open(&self, key: &str) -> StagingResult<(StagedObject, File)> {
        self.ensure_key_safe(key)?;
        let object = self.fetch_object(key).await?;
        let file = File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StagingError::ObjectNotFound(key.to_string())
            } else {
                StagingError::Io(err)
            }
        })?;
        Ok((object, file))
    }

    /// Remove an object's row and payload. Missing payloads are tolerated.
    pub async fn delete(&self, key: &str) -> StagingResult<StagedObject> {
        self.ensure_key_safe(key)?;
        let object = self.fetch_object(key).await?;

        sqlx::query("DELETE FROM staged_objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed staged file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("staged file {} already missing", file_path.display());
            }
            Err(err) => return Err(StagingError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }

        Ok(object)
    }

    /// Delete every object under `prefix` staged more than `ttl` ago.
    ///
    /// Returns how many objects were removed. Individual failures are logged
    /// and skipped so one bad file does not stall the sweep.
    pub async fn sweep_expired(&self, prefix: &str, ttl: Duration) -> StagingResult<usize> {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(36_500));
        let cutoff = Utc::now()
            .checked_sub_signed(ttl)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM staged_objects WHERE key LIKE ? AND created_at < ? ORDER BY created_at",
        )
        .bind(format!("{}%", prefix))
        .bind(cutoff)
        .fetch_all(&*self.db)
        .await?;

        let mut removed = 0;
        for key in keys {
            match self.delete(&key).await {
                Ok(_) => removed += 1,
                Err(StagingError::ObjectNotFound(_)) => {}
                Err(err) => warn!(key = %key, "failed to sweep staged object: {}", err),
            }
        }

        if removed > 0 {
            info!(prefix, removed, "swept expired staged objects");
        }
        Ok(removed)
    }

    /// Recursively remove empty directories up to the staging root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models::staged_object::FINGERPRINT_TEMP_PREFIX};
    use tokio::io::AsyncReadExt;

    async fn service(dir: &Path) -> StagingService {
        let pool = db::memory_pool().await.unwrap();
        StagingService::new(Arc::new(pool), dir, "http://localhost:3000/")
    }

    #[tokio::test]
    async fn put_open_and_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let staging = service(dir.path()).await;

        let obj = staging
            .put_bytes(
                FINGERPRINT_TEMP_PREFIX,
                Bytes::from_static(b"ID3 fake audio"),
                Some("audio/mpeg".into()),
            )
            .await
            .unwrap();
        assert!(obj.key.starts_with(FINGERPRINT_TEMP_PREFIX));
        assert_eq!(obj.size_bytes, 14);
        assert_eq!(obj.etag, format!("{:x}", md5::compute(b"ID3 fake audio")));
        assert_eq!(
            staging.public_url(&obj.key),
            format!("http://localhost:3000/staging/{}", obj.key)
        );

        let (_, mut file) = staging.open(&obj.key).await.unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"ID3 fake audio");

        staging.delete(&obj.key).await.unwrap();
        assert!(matches!(
            staging.open(&obj.key).await,
            Err(StagingError::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let staging = service(dir.path()).await;
        let body = stream::once(async { Ok::<_, io::Error>(Bytes::from_static(b"x")) });
        let result = staging.put_stream("../escape", None, body).await;
        assert!(matches!(result, Err(StagingError::InvalidKey)));
    }

    #[tokio::test]
    async fn sweep_only_removes_expired_objects_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let staging = service(dir.path()).await;

        let old = staging
            .put_bytes(FINGERPRINT_TEMP_PREFIX, Bytes::from_static(b"old"), None)
            .await
            .unwrap();
        let fresh = staging
            .put_bytes(FINGERPRINT_TEMP_PREFIX, Bytes::from_static(b"new"), None)
            .await
            .unwrap();
        let other = staging
            .put_bytes("covers/", Bytes::from_static(b"art"), None)
            .await
            .unwrap();

        let long_ago = Utc::now() - ChronoDuration::hours(48);
        for key in [&old.key, &other.key] {
            sqlx::query("UPDATE staged_objects SET created_at = ? WHERE key = ?")
                .bind(long_ago)
                .bind(key)
                .execute(&*staging.db)
                .await
                .unwrap();
        }

        let removed = staging
            .sweep_expired(FINGERPRINT_TEMP_PREFIX, Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(staging.open(&old.key).await.is_err());
        assert!(staging.open(&fresh.key).await.is_ok());
        assert!(staging.open(&other.key).await.is_ok());
    }
}

//! Local filesystem blob store backend.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};

use crate::{
    BlobError,
    BlobMetadata,
    BlobReader,
    BlobResult,
    BlobStore,
    BlobStream,
    DiskSettings,
    EnumerationResult,
    streaming::copy_exact,
    traits::non_empty_token,
};

/// Suffix of in-flight write files. They are hidden from every read path.
const PARTIAL_SUFFIX: &str = ".partial";

/// Local filesystem blob store.
///
/// A key is a `/`-separated path relative to the root directory. Writes go
/// to a hidden temporary file next to the target and are renamed into place
/// once complete. Enumeration walks the root recursively, sorts keys
/// bytewise and pages by offset; the continuation token is that offset.
pub struct DiskBlobStore {
    root: PathBuf,
    page_size: usize,
}

impl DiskBlobStore {
    /// Create a new local filesystem blob store, creating the root directory
    /// if needed.
    pub fn new(settings: &DiskSettings) -> BlobResult<Self> {
        settings.validate()?;
        std::fs::create_dir_all(&settings.directory)?;
        debug!(root = %settings.directory.display(), "Created disk blob store");
        Ok(Self {
            root: settings.directory.clone(),
            page_size: settings.page_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key onto a path under the root, refusing anything that could
    /// escape it.
    fn key_to_path(&self, key: &str) -> BlobResult<PathBuf> {
        let invalid = |reason: &str| BlobError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if key.trim().is_empty() {
            return Err(invalid("key must not be empty"));
        }
        if key.ends_with(PARTIAL_SUFFIX) {
            return Err(invalid("key uses a reserved suffix"));
        }

        let mut path = self.root.clone();
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(invalid("key must be a relative path without '..'")),
            }
        }
        if path == self.root {
            return Err(invalid("key does not name a file"));
        }
        Ok(path)
    }

    fn partial_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}{}", name, uuid::Uuid::new_v4(), PARTIAL_SUFFIX))
    }

    fn content_type(key: &str) -> String {
        mime_guess::from_path(key)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    fn metadata(key: String, md: &std::fs::Metadata) -> BlobMetadata {
        let created = md
            .created()
            .or_else(|_| md.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        BlobMetadata {
            content_type: Some(Self::content_type(&key)),
            key,
            content_length: md.len(),
            created: DateTime::<Utc>::from(created),
            etag: None,
        }
    }

    /// Stat that reports regular files only; directories are not blobs.
    async fn file_metadata(path: &Path) -> BlobResult<Option<std::fs::Metadata>> {
        match fs::metadata(path).await {
            Ok(md) if md.is_file() => Ok(Some(md)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn prepare_parent(path: &Path) -> BlobResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn commit(partial: &Path, path: &Path, result: BlobResult<()>) -> BlobResult<()> {
        let result = match result {
            Ok(()) => fs::rename(partial, path).await.map_err(BlobError::from),
            Err(e) => Err(e),
        };
        if result.is_err() {
            if let Err(e) = fs::remove_file(partial).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %partial.display(), "failed to remove partial file: {}", e);
                }
            }
        }
        result
    }

    /// Collects every key under the root, `/`-separated and sorted.
    async fn list_keys(&self) -> BlobResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let name = entry.file_name();
                if name.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                    continue;
                }
                if let Some(key) = self.path_to_key(&path) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    fn decode_token(token: &str) -> BlobResult<usize> {
        token
            .trim()
            .parse::<usize>()
            .map_err(|_| BlobError::InvalidContinuationToken {
                token: token.to_string(),
            })
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn write(&self, key: &str, _content_type: Option<&str>, data: Bytes) -> BlobResult<()> {
        let path = self.key_to_path(key)?;
        Self::prepare_parent(&path).await?;
        let partial = Self::partial_path(&path);
        debug!(key, size = data.len(), "writing blob to disk");
        let result = fs::write(&partial, &data).await.map_err(BlobError::from);
        Self::commit(&partial, &path, result).await
    }

    async fn write_stream(
        &self,
        key: &str,
        _content_type: Option<&str>,
        content_length: u64,
        mut reader: BlobReader,
    ) -> BlobResult<()> {
        let path = self.key_to_path(key)?;
        Self::prepare_parent(&path).await?;
        let partial = Self::partial_path(&path);
        debug!(key, content_length, "streaming blob to disk");

        let result = async {
            let mut file = fs::File::create(&partial).await?;
            copy_exact(&mut reader, &mut file, content_length).await?;
            file.sync_all().await?;
            Ok::<(), BlobError>(())
        }
        .await;
        Self::commit(&partial, &path, result).await
    }

    async fn get(&self, key: &str) -> BlobResult<Option<Bytes>> {
        let path = self.key_to_path(key)?;
        if Self::file_metadata(&path).await?.is_none() {
            return Ok(None);
        }
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_stream(&self, key: &str) -> BlobResult<Option<BlobStream>> {
        let path = self.key_to_path(key)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // Length comes from the open handle, so a concurrent replace of the
        // path cannot skew it.
        let md = file.metadata().await?;
        if !md.is_file() {
            return Ok(None);
        }
        Ok(Some(BlobStream::new(md.len(), file)))
    }

    async fn delete(&self, key: &str) -> BlobResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(Self::file_metadata(&path).await?.is_some())
    }

    async fn get_metadata(&self, key: &str) -> BlobResult<Option<BlobMetadata>> {
        let path = self.key_to_path(key)?;
        Ok(Self::file_metadata(&path)
            .await?
            .map(|md| Self::metadata(key.to_string(), &md)))
    }

    async fn enumerate(&self, continuation_token: Option<&str>) -> BlobResult<EnumerationResult> {
        let offset = match non_empty_token(continuation_token) {
            Some(token) => Self::decode_token(token)?,
            None => 0,
        };

        let keys = self.list_keys().await?;
        let end = offset.saturating_add(self.page_size).min(keys.len());
        let page = keys.get(offset..end).unwrap_or_default();

        let mut blobs = Vec::with_capacity(page.len());
        for key in page {
            // Entries removed since the walk are skipped.
            let Some(md) = Self::file_metadata(&self.key_to_path(key)?).await? else {
                continue;
            };
            blobs.push(Self::metadata(key.clone(), &md));
        }

        let next_token = (end < keys.len()).then(|| end.to_string());
        Ok(EnumerationResult { next_token, blobs })
    }
}
